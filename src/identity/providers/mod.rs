// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! External OAuth providers.
//!
//! Each provider implements [`OAuthProvider`]: build an authorization URL,
//! exchange the returned code (Authorization Code + PKCE) for an access token,
//! and turn the provider's user API into a [`ProviderProfile`]. The
//! [`ProviderRegistry`] maps provider names to implementations and is built
//! once from configuration.

pub mod github;
pub mod google;

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use oauth2::basic::BasicClient;
use oauth2::{
    AuthUrl, AuthorizationCode, ClientId, ClientSecret, CsrfToken, EndpointNotSet, EndpointSet,
    PkceCodeChallenge, PkceCodeVerifier, RedirectUrl, Scope, TokenResponse, TokenUrl,
};
use tracing::info;

use crate::config::{ProviderSettings, Settings};

pub use github::GitHubProvider;
pub use google::GoogleProvider;

#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("invalid provider configuration: {0}")]
    Config(String),

    #[error("token exchange failed: {0}")]
    Exchange(String),

    #[error("profile request failed: {0}")]
    Profile(String),

    #[error("unexpected profile payload: {0}")]
    Payload(String),
}

/// Profile asserted by a provider after a successful exchange.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderProfile {
    /// Stable account id at the provider
    pub provider_account_id: String,
    pub email: Option<String>,
    pub full_name: Option<String>,
    pub avatar_url: Option<String>,
    /// Payload as returned by the provider
    pub raw: serde_json::Value,
}

/// Redirect target plus the secrets the callback will need.
#[derive(Debug, Clone)]
pub struct AuthorizationRequest {
    pub url: String,
    /// CSRF `state` parameter
    pub state: String,
    pub pkce_verifier: String,
}

#[async_trait]
pub trait OAuthProvider: Send + Sync + 'static {
    /// Name used in routes and stored in linked identities.
    fn name(&self) -> &'static str;

    /// Authorization URL with a fresh CSRF state and PKCE challenge.
    fn authorization_request(&self) -> AuthorizationRequest;

    /// Exchange an authorization code for an access token.
    async fn exchange_code(&self, code: &str, pkce_verifier: &str) -> Result<String, ProviderError>;

    /// Fetch the signed-in user's profile.
    async fn fetch_profile(&self, access_token: &str) -> Result<ProviderProfile, ProviderError>;
}

// =============================================================================
// Shared OAuth2 client
// =============================================================================

/// OAuth client type with auth URL, token URL and redirect URL set.
type ConfiguredClient = oauth2::Client<
    oauth2::basic::BasicErrorResponse,
    oauth2::basic::BasicTokenResponse,
    oauth2::basic::BasicTokenIntrospectionResponse,
    oauth2::StandardRevocableToken,
    oauth2::basic::BasicRevocationErrorResponse,
    EndpointSet,
    EndpointNotSet,
    EndpointNotSet,
    EndpointNotSet,
    EndpointSet,
>;

/// Endpoints and scopes of one provider.
pub(crate) struct ProviderEndpoints {
    pub auth_url: &'static str,
    pub token_url: &'static str,
    pub scopes: &'static [&'static str],
}

/// Authorization-code client shared by the provider implementations.
pub(crate) struct OAuthClient {
    client: ConfiguredClient,
    scopes: &'static [&'static str],
    /// Used for the token exchange; never follows redirects
    token_http: reqwest::Client,
    /// Used for provider API calls
    pub(crate) api_http: reqwest::Client,
}

impl OAuthClient {
    pub(crate) fn new(
        settings: &ProviderSettings,
        endpoints: ProviderEndpoints,
        user_agent: &str,
    ) -> Result<Self, ProviderError> {
        let config = |e: &dyn std::fmt::Display| ProviderError::Config(e.to_string());

        let client = BasicClient::new(ClientId::new(settings.client_id.clone()))
            .set_client_secret(ClientSecret::new(settings.client_secret.clone()))
            .set_auth_uri(AuthUrl::new(endpoints.auth_url.to_string()).map_err(|e| config(&e))?)
            .set_token_uri(TokenUrl::new(endpoints.token_url.to_string()).map_err(|e| config(&e))?)
            .set_redirect_uri(
                RedirectUrl::new(settings.redirect_uri.clone()).map_err(|e| config(&e))?,
            );

        let token_http = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .user_agent(user_agent)
            .build()
            .map_err(|e| config(&e))?;
        let api_http = reqwest::Client::builder()
            .user_agent(user_agent)
            .build()
            .map_err(|e| config(&e))?;

        Ok(Self {
            client,
            scopes: endpoints.scopes,
            token_http,
            api_http,
        })
    }

    pub(crate) fn authorization_request(&self) -> AuthorizationRequest {
        let (pkce_challenge, pkce_verifier) = PkceCodeChallenge::new_random_sha256();

        let mut request = self.client.authorize_url(CsrfToken::new_random);
        for scope in self.scopes {
            request = request.add_scope(Scope::new((*scope).to_string()));
        }
        let (url, csrf_state) = request.set_pkce_challenge(pkce_challenge).url();

        AuthorizationRequest {
            url: url.to_string(),
            state: csrf_state.secret().clone(),
            pkce_verifier: pkce_verifier.secret().clone(),
        }
    }

    pub(crate) async fn exchange_code(
        &self,
        code: &str,
        pkce_verifier: &str,
    ) -> Result<String, ProviderError> {
        let token = self
            .client
            .exchange_code(AuthorizationCode::new(code.to_string()))
            .set_pkce_verifier(PkceCodeVerifier::new(pkce_verifier.to_string()))
            .request_async(&self.token_http)
            .await
            .map_err(|e| ProviderError::Exchange(e.to_string()))?;

        Ok(token.access_token().secret().clone())
    }

    /// GET a provider API resource with a bearer token and decode it as JSON.
    pub(crate) async fn get_json(
        &self,
        url: &str,
        access_token: &str,
    ) -> Result<serde_json::Value, ProviderError> {
        let response = self
            .api_http
            .get(url)
            .bearer_auth(access_token)
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| ProviderError::Profile(e.to_string()))?;

        if !response.status().is_success() {
            return Err(ProviderError::Profile(format!(
                "HTTP {} from {url}",
                response.status()
            )));
        }

        response
            .json()
            .await
            .map_err(|e| ProviderError::Payload(e.to_string()))
    }
}

/// Read an optional, non-empty string field.
pub(crate) fn string_field(raw: &serde_json::Value, key: &str) -> Option<String> {
    raw.get(key)
        .and_then(serde_json::Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

// =============================================================================
// Registry
// =============================================================================

/// Enabled providers by name.
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    providers: BTreeMap<&'static str, Arc<dyn OAuthProvider>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register every provider that is fully configured.
    pub fn from_settings(settings: &Settings) -> Result<Self, ProviderError> {
        let mut registry = Self::new();
        if let Some(google) = &settings.google {
            registry.register(Arc::new(GoogleProvider::new(google, &settings.app_name)?));
        }
        if let Some(github) = &settings.github {
            registry.register(Arc::new(GitHubProvider::new(github, &settings.app_name)?));
        }
        info!(providers = ?registry.names(), "OAuth providers configured");
        Ok(registry)
    }

    pub fn register(&mut self, provider: Arc<dyn OAuthProvider>) {
        self.providers.insert(provider.name(), provider);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn OAuthProvider>> {
        self.providers.get(name).cloned()
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.providers.keys().copied().collect()
    }
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("providers", &self.names())
            .finish()
    }
}
