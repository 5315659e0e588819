// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Google sign-in (OpenID Connect userinfo).

use async_trait::async_trait;

use super::{
    string_field, AuthorizationRequest, OAuthClient, OAuthProvider, ProviderEndpoints,
    ProviderError, ProviderProfile,
};
use crate::config::ProviderSettings;

const AUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
const TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const USERINFO_URL: &str = "https://openidconnect.googleapis.com/v1/userinfo";

pub struct GoogleProvider {
    client: OAuthClient,
}

impl GoogleProvider {
    pub fn new(settings: &ProviderSettings, user_agent: &str) -> Result<Self, ProviderError> {
        let client = OAuthClient::new(
            settings,
            ProviderEndpoints {
                auth_url: AUTH_URL,
                token_url: TOKEN_URL,
                scopes: &["openid", "email", "profile"],
            },
            user_agent,
        )?;
        Ok(Self { client })
    }
}

#[async_trait]
impl OAuthProvider for GoogleProvider {
    fn name(&self) -> &'static str {
        "google"
    }

    fn authorization_request(&self) -> AuthorizationRequest {
        self.client.authorization_request()
    }

    async fn exchange_code(&self, code: &str, pkce_verifier: &str) -> Result<String, ProviderError> {
        self.client.exchange_code(code, pkce_verifier).await
    }

    async fn fetch_profile(&self, access_token: &str) -> Result<ProviderProfile, ProviderError> {
        let userinfo = self.client.get_json(USERINFO_URL, access_token).await?;
        profile_from_userinfo(userinfo)
    }
}

/// Map an OpenID userinfo document onto a profile.
pub(crate) fn profile_from_userinfo(
    userinfo: serde_json::Value,
) -> Result<ProviderProfile, ProviderError> {
    let provider_account_id = string_field(&userinfo, "sub")
        .ok_or_else(|| ProviderError::Payload("userinfo without sub".to_string()))?;

    Ok(ProviderProfile {
        provider_account_id,
        email: string_field(&userinfo, "email"),
        full_name: string_field(&userinfo, "name"),
        avatar_url: string_field(&userinfo, "picture"),
        raw: userinfo,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn userinfo_maps_to_profile() {
        let userinfo = json!({
            "sub": "10769150350006150715113082367",
            "email": "jane@example.com",
            "email_verified": true,
            "name": "Jane Doe",
            "picture": "https://lh3.googleusercontent.com/a/photo.jpg",
        });

        let profile = profile_from_userinfo(userinfo.clone()).unwrap();
        assert_eq!(profile.provider_account_id, "10769150350006150715113082367");
        assert_eq!(profile.email.as_deref(), Some("jane@example.com"));
        assert_eq!(profile.full_name.as_deref(), Some("Jane Doe"));
        assert_eq!(
            profile.avatar_url.as_deref(),
            Some("https://lh3.googleusercontent.com/a/photo.jpg")
        );
        assert_eq!(profile.raw, userinfo);
    }

    #[test]
    fn missing_email_is_left_to_caller() {
        let profile = profile_from_userinfo(json!({ "sub": "1" })).unwrap();
        assert!(profile.email.is_none());
        assert!(profile.full_name.is_none());
    }

    #[test]
    fn missing_sub_is_rejected() {
        let result = profile_from_userinfo(json!({ "email": "jane@example.com" }));
        assert!(matches!(result, Err(ProviderError::Payload(_))));
    }

    #[test]
    fn requests_openid_scopes() {
        let provider = GoogleProvider::new(
            &ProviderSettings {
                client_id: "id".to_string(),
                client_secret: "secret".to_string(),
                redirect_uri: "https://id.example.com/auth/google/callback".to_string(),
            },
            "test",
        )
        .unwrap();

        let request = provider.authorization_request();
        assert!(request.url.starts_with(AUTH_URL));
        assert!(request.url.contains("scope=openid+email+profile"));
    }
}
