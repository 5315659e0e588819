// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{
    extract::{Query, State},
    Json,
};

use crate::error::ApiError;
use crate::models::{PublicProfile, PublicProfilesQuery};
use crate::state::AppState;
use crate::storage::UserRepository;

/// Largest number of ids one lookup may ask for.
pub const MAX_PUBLIC_PROFILE_IDS: usize = 100;

/// Public profile fields for a set of users.
///
/// Unknown and malformed ids are skipped. Never returns email or provider data.
#[utoipa::path(
    get,
    path = "/users/public",
    tag = "Users",
    params(PublicProfilesQuery),
    responses(
        (status = 200, description = "Profiles found", body = Vec<PublicProfile>),
        (status = 400, description = "Too many ids")
    )
)]
pub async fn public_profiles(
    State(state): State<AppState>,
    Query(query): Query<PublicProfilesQuery>,
) -> Result<Json<Vec<PublicProfile>>, ApiError> {
    let ids = query.parsed_ids();
    if ids.len() > MAX_PUBLIC_PROFILE_IDS {
        return Err(ApiError::bad_request(format!(
            "At most {MAX_PUBLIC_PROFILE_IDS} ids per request"
        )));
    }
    if ids.is_empty() {
        return Ok(Json(Vec::new()));
    }

    let users = state.db.get_many(&ids)?;
    Ok(Json(users.into_iter().map(PublicProfile::from).collect()))
}
