// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{extract::State, Json};
use jsonwebtoken::jwk::JwkSet;

use crate::state::AppState;

/// Public keys for verifying issued tokens. Empty for shared-secret deployments.
#[utoipa::path(
    get,
    path = "/.well-known/jwks.json",
    tag = "Keys",
    responses(
        (status = 200, description = "JSON Web Key Set", body = Object)
    )
)]
pub async fn jwks(State(state): State<AppState>) -> Json<JwkSet> {
    Json(state.jwks.publish())
}
