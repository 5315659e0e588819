// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Password accounts and the caller's own profile.
//!
//! bcrypt runs on the blocking pool so a login does not stall the runtime.

use axum::{extract::State, http::StatusCode, Form, Json};
use tracing::{debug, info};

use crate::auth::{Auth, CredentialStore};
use crate::avatars::is_supported_content_type;
use crate::error::ApiError;
use crate::models::{
    AvatarUploadRequest, AvatarUploadResponse, PasswordLoginForm, ProfileUpdate, RegisterRequest,
    TokenResponse, UserPublic,
};
use crate::state::AppState;
use crate::storage::{StorageError, User, UserRepository};

async fn hash_password(credentials: CredentialStore, password: String) -> Result<String, ApiError> {
    tokio::task::spawn_blocking(move || credentials.hash(&password))
        .await
        .map_err(ApiError::internal)?
        .map_err(ApiError::from)
}

async fn verify_password(
    credentials: CredentialStore,
    password: String,
    hash: Option<String>,
) -> Result<bool, ApiError> {
    tokio::task::spawn_blocking(move || credentials.verify_or_decoy(&password, hash.as_deref()))
        .await
        .map_err(ApiError::internal)
}

/// Register a password account.
#[utoipa::path(
    post,
    path = "/auth/register",
    tag = "Auth",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "Account created", body = UserPublic),
        (status = 400, description = "Invalid email or password"),
        (status = 409, description = "Email already registered")
    )
)]
pub async fn register(
    State(state): State<AppState>,
    Json(payload): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<UserPublic>), ApiError> {
    let email = payload.email.trim().to_string();
    if email.is_empty() || !email.contains('@') {
        return Err(ApiError::bad_request("A valid email address is required"));
    }
    if payload.password.is_empty() {
        return Err(ApiError::bad_request("Password is required"));
    }

    if state.db.find_by_email(&email)?.is_some() {
        return Err(ApiError::duplicate_account());
    }

    let password_hash = hash_password(state.credentials, payload.password).await?;
    let full_name = payload
        .full_name
        .map(|name| name.trim().to_string())
        .filter(|name| !name.is_empty());
    let user = User::with_password(email, full_name, password_hash);

    match state.db.insert(&user) {
        Ok(()) => {}
        Err(StorageError::AlreadyExists(_)) => return Err(ApiError::duplicate_account()),
        Err(e) => return Err(e.into()),
    }

    info!(user_id = %user.id, "User registered");
    Ok((StatusCode::CREATED, Json(user.into())))
}

/// Exchange email and password for a bearer token (OAuth2 password form).
#[utoipa::path(
    post,
    path = "/auth/token",
    tag = "Auth",
    request_body(content = PasswordLoginForm, content_type = "application/x-www-form-urlencoded"),
    responses(
        (status = 200, description = "Token issued", body = TokenResponse),
        (status = 401, description = "Invalid credentials")
    )
)]
pub async fn login(
    State(state): State<AppState>,
    Form(form): Form<PasswordLoginForm>,
) -> Result<Json<TokenResponse>, ApiError> {
    let user = state.db.find_by_email(&form.username)?;
    let hash = user.as_ref().and_then(|u| u.password_hash.clone());

    // Unknown and password-less accounts still pay for one bcrypt check
    let matched = verify_password(state.credentials, form.password, hash).await?;
    let Some(user) = user.filter(|_| matched) else {
        debug!("Password login rejected");
        return Err(ApiError::invalid_credentials());
    };

    let token = state.issuer.issue(&user.id.to_string(), Some(&user.email))?;
    info!(user_id = %user.id, "Password login");
    Ok(Json(TokenResponse::bearer(token)))
}

async fn load_user(state: &AppState, user_id: uuid::Uuid) -> Result<User, ApiError> {
    state
        .db
        .get(user_id)?
        .ok_or_else(|| ApiError::not_found("User not found"))
}

fn user_write_error(err: StorageError) -> ApiError {
    match err {
        StorageError::NotFound(_) => ApiError::not_found("User not found"),
        other => other.into(),
    }
}

/// Get the caller's account.
#[utoipa::path(
    get,
    path = "/auth/me",
    tag = "Auth",
    security(("bearer" = [])),
    responses(
        (status = 200, description = "Current user", body = UserPublic),
        (status = 401, description = "Invalid token"),
        (status = 404, description = "User no longer exists")
    )
)]
pub async fn get_me(
    Auth(caller): Auth,
    State(state): State<AppState>,
) -> Result<Json<UserPublic>, ApiError> {
    let user = load_user(&state, caller.user_id).await?;
    Ok(Json(user.into()))
}

/// Merge profile fields into the caller's account.
#[utoipa::path(
    patch,
    path = "/auth/me",
    tag = "Auth",
    security(("bearer" = [])),
    request_body = ProfileUpdate,
    responses(
        (status = 200, description = "Updated user", body = UserPublic),
        (status = 401, description = "Invalid token"),
        (status = 404, description = "User no longer exists")
    )
)]
pub async fn update_me(
    Auth(caller): Auth,
    State(state): State<AppState>,
    Json(update): Json<ProfileUpdate>,
) -> Result<Json<UserPublic>, ApiError> {
    let user = state
        .db
        .update_with(caller.user_id, &mut |user: &mut User| update.clone().apply_to(user))
        .map_err(user_write_error)?;
    debug!(user_id = %user.id, "Profile updated");
    Ok(Json(user.into()))
}

/// Reserve an avatar upload slot and point the profile at it.
#[utoipa::path(
    post,
    path = "/auth/me/avatar",
    tag = "Auth",
    security(("bearer" = [])),
    request_body = AvatarUploadRequest,
    responses(
        (status = 200, description = "Presigned upload", body = AvatarUploadResponse),
        (status = 400, description = "Unsupported image type"),
        (status = 401, description = "Invalid token"),
        (status = 503, description = "Avatar storage not configured")
    )
)]
pub async fn avatar_upload(
    Auth(caller): Auth,
    State(state): State<AppState>,
    Json(request): Json<AvatarUploadRequest>,
) -> Result<Json<AvatarUploadResponse>, ApiError> {
    let Some(avatars) = state.avatars.clone() else {
        return Err(ApiError::service_unavailable("Avatar storage not configured"));
    };
    if !is_supported_content_type(&request.content_type) {
        return Err(ApiError::bad_request("Unsupported image type"));
    }

    let user = load_user(&state, caller.user_id).await?;
    let upload = avatars
        .presign_upload(user.id, request.content_type.trim())
        .await
        .map_err(|e| {
            tracing::warn!(error = %e, "Avatar presign failed");
            ApiError::bad_gateway("Avatar storage unavailable")
        })?;

    let public_url = upload.public_url.clone();
    state
        .db
        .update_with(user.id, &mut |user: &mut User| {
            user.profile.avatar_url = Some(public_url.clone());
        })
        .map_err(user_write_error)?;

    Ok(Json(AvatarUploadResponse {
        upload_url: upload.upload_url,
        avatar_url: upload.public_url,
        expires_in: upload.expires_in,
    }))
}
