// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{
    http::{header, HeaderValue, Method},
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};
use tracing::warn;
use utoipa::{
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};
use utoipa_swagger_ui::SwaggerUi;

use crate::{
    models::{
        AvatarUploadRequest, AvatarUploadResponse, PasswordLoginForm, ProfileUpdate,
        PublicProfile, RegisterRequest, TokenResponse, UserPublic,
    },
    state::AppState,
    storage::{EditableProfile, PostalAddress},
};

pub mod auth;
pub mod health;
pub mod jwks;
pub mod oauth;
pub mod users;

pub fn router(state: AppState) -> Router {
    let cors = cors_layer(&state.settings.allowed_origins);

    let routes = Router::new()
        .route("/health", get(health::health))
        .route("/health/live", get(health::liveness))
        .route("/auth/register", post(auth::register))
        .route("/auth/token", post(auth::login))
        .route("/auth/me", get(auth::get_me).patch(auth::update_me))
        .route("/auth/me/avatar", post(auth::avatar_upload))
        .route("/auth/{provider}/login", get(oauth::login))
        .route("/auth/{provider}/callback", get(oauth::callback))
        .route("/users/public", get(users::public_profiles))
        .route("/.well-known/jwks.json", get(jwks::jwks))
        .with_state(state);

    let app = Router::new()
        .merge(routes)
        .merge(SwaggerUi::new("/docs").url("/api-doc/openapi.json", ApiDoc::openapi()))
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(TraceLayer::new_for_http())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid));

    match cors {
        Some(cors) => app.layer(cors),
        None => app,
    }
}

/// CORS for the configured origins, with credentials. `None` when no origin
/// is configured.
fn cors_layer(allowed_origins: &[String]) -> Option<CorsLayer> {
    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    if origins.is_empty() {
        return None;
    }

    Some(
        CorsLayer::new()
            .allow_origin(AllowOrigin::list(origins))
            .allow_methods([Method::GET, Method::POST, Method::PATCH, Method::OPTIONS])
            .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
            .allow_credentials(true),
    )
}

struct BearerSecurity;

impl Modify for BearerSecurity {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        health::health,
        health::liveness,
        auth::register,
        auth::login,
        auth::get_me,
        auth::update_me,
        auth::avatar_upload,
        oauth::login,
        oauth::callback,
        users::public_profiles,
        jwks::jwks
    ),
    components(
        schemas(
            RegisterRequest,
            PasswordLoginForm,
            TokenResponse,
            UserPublic,
            ProfileUpdate,
            PublicProfile,
            EditableProfile,
            PostalAddress,
            AvatarUploadRequest,
            AvatarUploadResponse,
            health::ReadyResponse,
            health::HealthChecks,
            health::HealthResponse
        )
    ),
    modifiers(&BearerSecurity),
    tags(
        (name = "Health", description = "Liveness and readiness"),
        (name = "Auth", description = "Password accounts and the current user"),
        (name = "OAuth", description = "Google and GitHub sign-in"),
        (name = "Users", description = "Public profiles"),
        (name = "Keys", description = "Token verification keys")
    )
)]
struct ApiDoc;
