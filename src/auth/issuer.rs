// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Token issuance.

use std::sync::Arc;

use chrono::{Duration, Utc};
use jsonwebtoken::{encode, Header};

use super::claims::TokenClaims;
use super::keys::KeyManager;
use crate::config::TokenSettings;

/// Signs access tokens with the process key.
#[derive(Debug, Clone)]
pub struct TokenIssuer {
    keys: Arc<KeyManager>,
    ttl: Duration,
    issuer: Option<String>,
    audience: Option<String>,
}

impl TokenIssuer {
    pub fn new(keys: Arc<KeyManager>, settings: &TokenSettings) -> Self {
        Self {
            keys,
            ttl: Duration::minutes(settings.ttl_minutes),
            issuer: settings.issuer.clone(),
            audience: settings.audience.clone(),
        }
    }

    /// Issue a token for `subject`, valid for the configured TTL.
    pub fn issue(
        &self,
        subject: &str,
        email: Option<&str>,
    ) -> jsonwebtoken::errors::Result<String> {
        let claims = TokenClaims {
            sub: subject.to_string(),
            exp: (Utc::now() + self.ttl).timestamp(),
            email: email.map(str::to_string),
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
        };
        self.sign(&claims)
    }

    /// Sign arbitrary claims; the header gets the `kid` for asymmetric keys.
    pub fn sign(&self, claims: &TokenClaims) -> jsonwebtoken::errors::Result<String> {
        let key = self.keys.active_key();
        let mut header = Header::new(key.algorithm);
        header.kid = key.kid.map(str::to_string);
        encode(&header, claims, key.signing)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::keys::tests::{rsa_token_settings, token_settings};
    use jsonwebtoken::{decode_header, Algorithm};

    #[test]
    fn symmetric_header_has_no_kid() {
        let settings = token_settings(Algorithm::HS256);
        let keys = Arc::new(KeyManager::resolve(&settings).unwrap());
        let token = TokenIssuer::new(keys, &settings).issue("sub", None).unwrap();

        let header = decode_header(&token).unwrap();
        assert_eq!(header.alg, Algorithm::HS256);
        assert!(header.kid.is_none());
    }

    #[test]
    fn asymmetric_header_carries_kid() {
        let settings = rsa_token_settings();
        let keys = Arc::new(KeyManager::resolve(&settings).unwrap());
        let token = TokenIssuer::new(keys.clone(), &settings)
            .issue("sub", Some("a@example.com"))
            .unwrap();

        let header = decode_header(&token).unwrap();
        assert_eq!(header.alg, Algorithm::RS256);
        assert_eq!(header.kid.as_deref(), keys.kid());
    }

    #[test]
    fn expiry_is_absolute_now_plus_ttl() {
        let mut settings = token_settings(Algorithm::HS256);
        settings.ttl_minutes = 5;
        let keys = Arc::new(KeyManager::resolve(&settings).unwrap());
        let issuer = TokenIssuer::new(keys, &settings);

        let before = Utc::now().timestamp();
        let token = issuer.issue("sub", None).unwrap();
        let payload = token.split('.').nth(1).unwrap();
        let bytes = base64::Engine::decode(
            &base64::engine::general_purpose::URL_SAFE_NO_PAD,
            payload,
        )
        .unwrap();
        let claims: TokenClaims = serde_json::from_slice(&bytes).unwrap();

        assert!(claims.exp >= before + 300);
        assert!(claims.exp <= Utc::now().timestamp() + 300);
        assert!(claims.iss.is_none());
        assert!(claims.email.is_none());
    }
}
