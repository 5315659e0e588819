// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Provider sign-in: redirect out, come back, resolve to a local user.

use axum::{
    extract::{Path, Query, State},
    response::{IntoResponse, Redirect, Response},
    Json,
};
use tracing::{debug, info, warn};

use crate::error::ApiError;
use crate::identity::{ExternalIdentity, IdentityResolver, OAuthProvider};
use crate::models::{OAuthCallbackQuery, TokenResponse};
use crate::state::AppState;
use crate::storage::{OAuthStateStore, PendingAuthorization};

fn enabled_provider(
    state: &AppState,
    provider: &str,
) -> Result<std::sync::Arc<dyn OAuthProvider>, ApiError> {
    state.providers.get(provider).ok_or_else(|| {
        debug!(provider = %provider, "Login requested for disabled provider");
        ApiError::provider_not_enabled()
    })
}

/// Redirect the browser to the provider's consent page.
#[utoipa::path(
    get,
    path = "/auth/{provider}/login",
    tag = "OAuth",
    params(("provider" = String, Path, description = "`google` or `github`")),
    responses(
        (status = 303, description = "Redirect to the provider"),
        (status = 400, description = "Provider not enabled")
    )
)]
pub async fn login(
    State(state): State<AppState>,
    Path(provider): Path<String>,
) -> Result<Redirect, ApiError> {
    let provider = enabled_provider(&state, &provider)?;
    let request = provider.authorization_request();

    state.db.save(
        &request.state,
        &PendingAuthorization::new(provider.name(), request.pkce_verifier),
    )?;

    debug!(provider = provider.name(), "Redirecting to provider");
    Ok(Redirect::to(&request.url))
}

/// Finish a provider sign-in and issue a token.
///
/// With `FRONTEND_REDIRECT_URL` set the token is handed to the frontend in
/// the URL fragment; otherwise it is returned as JSON.
#[utoipa::path(
    get,
    path = "/auth/{provider}/callback",
    tag = "OAuth",
    params(
        ("provider" = String, Path, description = "`google` or `github`"),
        OAuthCallbackQuery
    ),
    responses(
        (status = 200, description = "Token issued", body = TokenResponse),
        (status = 303, description = "Redirect to the frontend with the token"),
        (status = 400, description = "Invalid callback or provider not enabled"),
        (status = 409, description = "Email belongs to an account that may not be linked"),
        (status = 502, description = "Provider request failed")
    )
)]
pub async fn callback(
    State(state): State<AppState>,
    Path(provider): Path<String>,
    Query(query): Query<OAuthCallbackQuery>,
) -> Result<Response, ApiError> {
    let provider = enabled_provider(&state, &provider)?;

    if let Some(error) = query.error {
        info!(provider = provider.name(), error = %error, "Provider refused authorization");
        return Err(ApiError::bad_request("Authorization was denied by the provider"));
    }
    let (Some(code), Some(csrf_state)) = (query.code, query.state) else {
        return Err(ApiError::bad_request("Missing code or state"));
    };

    let Some(pending) = state.db.take(&csrf_state, provider.name())? else {
        warn!(provider = provider.name(), "Unknown or expired OAuth state");
        return Err(ApiError::bad_request("Invalid or expired OAuth state"));
    };

    let access_token = provider.exchange_code(&code, &pending.pkce_verifier).await?;
    let profile = provider.fetch_profile(&access_token).await?;
    let identity = ExternalIdentity::from_profile(provider.name(), profile)
        .ok_or_else(ApiError::provider_email_missing)?;

    let resolved =
        IdentityResolver::new(&*state.db, state.settings.link_policy).resolve(&identity)?;
    let user = resolved.user;
    info!(
        user_id = %user.id,
        provider = provider.name(),
        outcome = resolved.outcome.as_str(),
        "Provider login"
    );

    let token = state.issuer.issue(&user.id.to_string(), Some(&user.email))?;

    match &state.settings.frontend_redirect_url {
        Some(frontend) => {
            let mut target = frontend.clone();
            target.set_fragment(Some(&format!("access_token={token}&token_type=bearer")));
            Ok(Redirect::to(target.as_str()).into_response())
        }
        None => Ok(Json(TokenResponse::bearer(token)).into_response()),
    }
}
