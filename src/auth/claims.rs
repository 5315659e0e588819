// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Token claims and the authenticated user representation.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Payload of every token this service signs.
///
/// `exp` is an absolute Unix timestamp (seconds). Optional claims are left out
/// of the encoded token entirely when unset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenClaims {
    /// Subject: canonical user id
    pub sub: String,

    /// Expiration (Unix seconds)
    pub exp: i64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iss: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aud: Option<String>,
}

/// Caller identity established from a verified bearer token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedUser {
    /// Canonical user ID (`sub` claim)
    pub user_id: Uuid,

    /// Email asserted in the token, if any
    pub email: Option<String>,

    /// Token expiration (Unix timestamp)
    pub expires_at: i64,
}

impl AuthenticatedUser {
    /// Build from verified claims. `None` if the subject is not a user id.
    pub fn from_claims(claims: TokenClaims) -> Option<Self> {
        let user_id = Uuid::parse_str(&claims.sub).ok()?;
        Some(Self {
            user_id,
            email: claims.email,
            expires_at: claims.exp,
        })
    }
}
