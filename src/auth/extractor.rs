// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Axum extractor for authenticated users.
//!
//! Use the `Auth` extractor in handlers to require a bearer token:
//!
//! ```rust,ignore
//! async fn my_handler(Auth(user): Auth) -> impl IntoResponse {
//!     // user is AuthenticatedUser
//! }
//! ```

use axum::{
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts},
};
use tracing::debug;

use super::{AuthError, AuthenticatedUser};
use crate::state::AppState;

/// Extractor for authenticated users.
///
/// Reads `Authorization: Bearer <token>`, verifies it with the process key and
/// requires the subject to be a user id. Every verification failure is
/// reported as [`AuthError::InvalidToken`].
pub struct Auth(pub AuthenticatedUser);

impl FromRequestParts<AppState> for Auth {
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let auth_header = parts
            .headers
            .get(AUTHORIZATION)
            .ok_or(AuthError::MissingAuthHeader)?
            .to_str()
            .map_err(|_| AuthError::InvalidAuthHeader)?;

        let token = bearer_token(auth_header).ok_or(AuthError::InvalidAuthHeader)?;

        let claims = state.verifier.verify(token).ok_or(AuthError::InvalidToken)?;
        let user = AuthenticatedUser::from_claims(claims).ok_or_else(|| {
            debug!("Token subject is not a user id");
            AuthError::InvalidToken
        })?;

        Ok(Auth(user))
    }
}

/// Strip the `Bearer` scheme (case-insensitive) from a header value.
fn bearer_token(header: &str) -> Option<&str> {
    let (scheme, token) = header.split_once(' ')?;
    let token = token.trim();
    (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then_some(token)
}
