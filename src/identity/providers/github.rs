// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! GitHub sign-in.
//!
//! `/user` only lists an email when the user made one public. Otherwise
//! `/user/emails` is consulted: the primary address wins, else the first one
//! listed.

use async_trait::async_trait;
use serde::Deserialize;

use super::{
    string_field, AuthorizationRequest, OAuthClient, OAuthProvider, ProviderEndpoints,
    ProviderError, ProviderProfile,
};
use crate::config::ProviderSettings;

const AUTH_URL: &str = "https://github.com/login/oauth/authorize";
const TOKEN_URL: &str = "https://github.com/login/oauth/access_token";
const USER_URL: &str = "https://api.github.com/user";
const USER_EMAILS_URL: &str = "https://api.github.com/user/emails";

/// Entry of `/user/emails`.
#[derive(Debug, Deserialize)]
pub(crate) struct GitHubEmail {
    email: String,
    #[serde(default)]
    primary: bool,
}

pub struct GitHubProvider {
    client: OAuthClient,
}

impl GitHubProvider {
    pub fn new(settings: &ProviderSettings, user_agent: &str) -> Result<Self, ProviderError> {
        let client = OAuthClient::new(
            settings,
            ProviderEndpoints {
                auth_url: AUTH_URL,
                token_url: TOKEN_URL,
                scopes: &["read:user", "user:email"],
            },
            user_agent,
        )?;
        Ok(Self { client })
    }
}

#[async_trait]
impl OAuthProvider for GitHubProvider {
    fn name(&self) -> &'static str {
        "github"
    }

    fn authorization_request(&self) -> AuthorizationRequest {
        self.client.authorization_request()
    }

    async fn exchange_code(&self, code: &str, pkce_verifier: &str) -> Result<String, ProviderError> {
        self.client.exchange_code(code, pkce_verifier).await
    }

    async fn fetch_profile(&self, access_token: &str) -> Result<ProviderProfile, ProviderError> {
        let user = self.client.get_json(USER_URL, access_token).await?;

        let fallback_email = if string_field(&user, "email").is_none() {
            let emails = self.client.get_json(USER_EMAILS_URL, access_token).await?;
            let emails: Vec<GitHubEmail> = serde_json::from_value(emails)
                .map_err(|e| ProviderError::Payload(e.to_string()))?;
            pick_email(emails)
        } else {
            None
        };

        profile_from_user(user, fallback_email)
    }
}

/// Primary address, else the first listed. Blank entries are ignored.
pub(crate) fn pick_email(emails: Vec<GitHubEmail>) -> Option<String> {
    let mut usable: Vec<GitHubEmail> = emails
        .into_iter()
        .filter(|e| !e.email.trim().is_empty())
        .collect();
    let chosen = usable.iter().position(|e| e.primary).unwrap_or(0);
    (chosen < usable.len()).then(|| usable.swap_remove(chosen).email)
}

/// Map a `/user` document onto a profile.
pub(crate) fn profile_from_user(
    user: serde_json::Value,
    fallback_email: Option<String>,
) -> Result<ProviderProfile, ProviderError> {
    let provider_account_id = match user.get("id") {
        Some(serde_json::Value::Number(id)) => id.to_string(),
        Some(serde_json::Value::String(id)) if !id.is_empty() => id.clone(),
        _ => return Err(ProviderError::Payload("user without id".to_string())),
    };

    Ok(ProviderProfile {
        provider_account_id,
        email: string_field(&user, "email").or(fallback_email),
        full_name: string_field(&user, "name").or_else(|| string_field(&user, "login")),
        avatar_url: string_field(&user, "avatar_url"),
        raw: user,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn emails(value: serde_json::Value) -> Vec<GitHubEmail> {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn user_maps_to_profile() {
        let user = json!({
            "id": 583231,
            "login": "octocat",
            "name": "The Octocat",
            "email": "octocat@github.com",
            "avatar_url": "https://avatars.githubusercontent.com/u/583231",
        });

        let profile = profile_from_user(user.clone(), None).unwrap();
        assert_eq!(profile.provider_account_id, "583231");
        assert_eq!(profile.email.as_deref(), Some("octocat@github.com"));
        assert_eq!(profile.full_name.as_deref(), Some("The Octocat"));
        assert_eq!(
            profile.avatar_url.as_deref(),
            Some("https://avatars.githubusercontent.com/u/583231")
        );
        assert_eq!(profile.raw, user);
    }

    #[test]
    fn login_stands_in_for_missing_name() {
        let user = json!({ "id": 1, "login": "octocat", "name": null, "email": null });
        let profile = profile_from_user(user, Some("fallback@example.com".to_string())).unwrap();
        assert_eq!(profile.full_name.as_deref(), Some("octocat"));
        assert_eq!(profile.email.as_deref(), Some("fallback@example.com"));
    }

    #[test]
    fn public_email_beats_fallback() {
        let user = json!({ "id": 1, "login": "o", "email": "public@example.com" });
        let profile = profile_from_user(user, Some("other@example.com".to_string())).unwrap();
        assert_eq!(profile.email.as_deref(), Some("public@example.com"));
    }

    #[test]
    fn user_without_id_is_rejected() {
        let result = profile_from_user(json!({ "login": "o" }), None);
        assert!(matches!(result, Err(ProviderError::Payload(_))));
    }

    #[test]
    fn primary_email_is_preferred() {
        let list = emails(json!([
            { "email": "first@example.com", "primary": false, "verified": true },
            { "email": "primary@example.com", "primary": true, "verified": true },
        ]));
        assert_eq!(pick_email(list).as_deref(), Some("primary@example.com"));
    }

    #[test]
    fn first_email_when_none_primary() {
        let list = emails(json!([
            { "email": "first@example.com", "primary": false },
            { "email": "second@example.com", "primary": false },
        ]));
        assert_eq!(pick_email(list).as_deref(), Some("first@example.com"));
    }

    #[test]
    fn blank_primary_falls_back_to_first_usable() {
        let list = emails(json!([
            { "email": "  ", "primary": true },
            { "email": "", "primary": false },
            { "email": "backup@example.com", "primary": false },
        ]));
        assert_eq!(pick_email(list).as_deref(), Some("backup@example.com"));

        let only_blank = emails(json!([{ "email": " ", "primary": true }]));
        assert_eq!(pick_email(only_blank), None);
    }

    #[test]
    fn no_emails_yields_none() {
        assert_eq!(pick_email(Vec::new()), None);
    }
}
