// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Token verification.
//!
//! [`TokenVerifier::check`] returns the precise [`TokenRejection`] for logging;
//! [`TokenVerifier::verify`] logs it and hands callers a plain present/absent
//! result. No clock skew leeway is applied.

use std::sync::Arc;

use jsonwebtoken::{decode, decode_header, Validation};
use tracing::debug;

use super::claims::TokenClaims;
use super::error::TokenRejection;
use super::keys::KeyManager;
use crate::config::TokenSettings;

#[derive(Debug, Clone)]
pub struct TokenVerifier {
    keys: Arc<KeyManager>,
    validation: Validation,
}

impl TokenVerifier {
    pub fn new(keys: Arc<KeyManager>, settings: &TokenSettings) -> Self {
        let mut validation = Validation::new(keys.algorithm());
        validation.leeway = 0;

        if let Some(ref issuer) = settings.issuer {
            validation.set_issuer(&[issuer]);
        }

        if let Some(ref audience) = settings.audience {
            validation.set_audience(&[audience]);
        } else {
            validation.validate_aud = false;
        }

        Self { keys, validation }
    }

    /// Verify signature, expiry and the configured issuer / audience.
    pub fn check(&self, token: &str) -> Result<TokenClaims, TokenRejection> {
        let header = decode_header(token)?;
        let key = self.keys.active_key();

        if let Some(kid) = key.kid {
            if header.kid.as_deref() != Some(kid) {
                return Err(TokenRejection::UnknownKey);
            }
        }

        let data = decode::<TokenClaims>(token, key.verifying, &self.validation)?;
        Ok(data.claims)
    }

    /// Verify a token, collapsing every failure into `None`.
    pub fn verify(&self, token: &str) -> Option<TokenClaims> {
        match self.check(token) {
            Ok(claims) => Some(claims),
            Err(reason) => {
                debug!(%reason, "Token rejected");
                None
            }
        }
    }
}
