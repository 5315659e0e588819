// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use tracing::{error, warn};

use crate::auth::CredentialError;
use crate::identity::{IdentityError, ProviderError};
use crate::storage::StorageError;

#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(StatusCode::CONFLICT, message)
    }

    pub fn bad_gateway(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_GATEWAY, message)
    }

    pub fn service_unavailable(message: impl Into<String>) -> Self {
        Self::new(StatusCode::SERVICE_UNAVAILABLE, message)
    }

    /// Generic 500. The detail is logged, never returned.
    pub fn internal(detail: impl std::fmt::Display) -> Self {
        error!(error = %detail, "Internal error");
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
    }

    pub fn invalid_credentials() -> Self {
        Self::unauthorized("Invalid credentials")
    }

    pub fn duplicate_account() -> Self {
        Self::conflict("Email already registered")
    }

    pub fn provider_not_enabled() -> Self {
        Self::bad_request("Provider not enabled")
    }

    pub fn provider_email_missing() -> Self {
        Self::bad_request("Provider did not return an email")
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(ErrorBody {
            error: self.message,
        });
        (self.status, body).into_response()
    }
}

impl From<StorageError> for ApiError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound(what) => ApiError::not_found(format!("{what} not found")),
            other => ApiError::internal(other),
        }
    }
}

impl From<IdentityError> for ApiError {
    fn from(err: IdentityError) -> Self {
        match err {
            IdentityError::LinkingDisabled => {
                ApiError::conflict("An account with this email already exists")
            }
            IdentityError::Contention(_) => ApiError::internal(err),
            IdentityError::Storage(e) => e.into(),
        }
    }
}

impl From<ProviderError> for ApiError {
    fn from(err: ProviderError) -> Self {
        match err {
            ProviderError::Config(_) => ApiError::internal(err),
            other => {
                warn!(error = %other, "Provider exchange failed");
                ApiError::bad_gateway("Provider authentication failed")
            }
        }
    }
}

impl From<CredentialError> for ApiError {
    fn from(err: CredentialError) -> Self {
        ApiError::internal(err)
    }
}

impl From<jsonwebtoken::errors::Error> for ApiError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        ApiError::internal(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    #[test]
    fn constructors_set_status_and_message() {
        let nf = ApiError::not_found("missing");
        assert_eq!(nf.status, StatusCode::NOT_FOUND);
        assert_eq!(nf.message, "missing");

        let creds = ApiError::invalid_credentials();
        assert_eq!(creds.status, StatusCode::UNAUTHORIZED);
        assert_eq!(creds.message, "Invalid credentials");

        let dup = ApiError::duplicate_account();
        assert_eq!(dup.status, StatusCode::CONFLICT);
        assert_eq!(dup.message, "Email already registered");

        let unavailable = ApiError::service_unavailable("Avatar storage not configured");
        assert_eq!(unavailable.status, StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn into_response_returns_json_body() {
        let response = ApiError::bad_request("bad data").into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let body_bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = String::from_utf8(body_bytes.to_vec()).unwrap();
        assert_eq!(body, r#"{"error":"bad data"}"#);
    }

    #[tokio::test]
    async fn internal_errors_hide_details() {
        let err: ApiError = StorageError::Io(std::io::Error::other("disk on fire")).into();
        assert_eq!(err.status, StatusCode::INTERNAL_SERVER_ERROR);

        let body_bytes = to_bytes(err.into_response().into_body(), usize::MAX)
            .await
            .unwrap();
        let body = String::from_utf8(body_bytes.to_vec()).unwrap();
        assert!(!body.contains("disk on fire"));
    }

    #[test]
    fn provider_failures_map_to_bad_gateway() {
        let err: ApiError = ProviderError::Exchange("invalid_grant".to_string()).into();
        assert_eq!(err.status, StatusCode::BAD_GATEWAY);
        assert!(!err.message.contains("invalid_grant"));

        let config: ApiError = ProviderError::Config("bad url".to_string()).into();
        assert_eq!(config.status, StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn identity_errors_map_to_statuses() {
        let disabled: ApiError = IdentityError::LinkingDisabled.into();
        assert_eq!(disabled.status, StatusCode::CONFLICT);

        let missing: ApiError =
            IdentityError::Storage(StorageError::NotFound("User x".to_string())).into();
        assert_eq!(missing.status, StatusCode::NOT_FOUND);
    }
}
