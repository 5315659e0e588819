// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # API Data Models
//!
//! Request and response bodies of the REST API. All types derive
//! `ToSchema` for the OpenAPI document.
//!
//! ## Model Categories
//!
//! - **Credentials**: registration, password login, issued tokens
//! - **Users**: owner view, profile updates, public profiles
//! - **Avatars**: upload slots from the avatar storage collaborator

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::storage::{EditableProfile, User};

// =============================================================================
// Credential Models
// =============================================================================

/// Request to create a password account.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct RegisterRequest {
    /// Email address (unique, case-insensitive)
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub full_name: Option<String>,
}

/// OAuth2 password grant form (`application/x-www-form-urlencoded`).
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct PasswordLoginForm {
    /// Account email
    pub username: String,
    pub password: String,
}

/// Issued bearer token.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
pub struct TokenResponse {
    pub access_token: String,
    /// Always `bearer`
    pub token_type: String,
}

impl TokenResponse {
    pub fn bearer(access_token: String) -> Self {
        Self {
            access_token,
            token_type: "bearer".to_string(),
        }
    }
}

// =============================================================================
// User Models
// =============================================================================

/// A user as seen by its owner.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct UserPublic {
    pub id: Uuid,
    pub email: String,
    pub full_name: Option<String>,
    /// Linked provider (`google`, `github`), if any
    pub provider: Option<String>,
    pub profile: EditableProfile,
    /// Payload from the last provider login
    #[schema(value_type = Object)]
    pub provider_data: serde_json::Value,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl From<User> for UserPublic {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            email: user.email,
            full_name: user.full_name,
            provider: user.linked_identity.map(|l| l.provider),
            profile: user.profile,
            provider_data: user.provider_data,
            is_active: user.is_active,
            created_at: user.created_at,
        }
    }
}

/// Partial profile update. Absent fields are left unchanged.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct ProfileUpdate {
    pub full_name: Option<String>,
    pub display_name: Option<String>,
    pub bio: Option<String>,
    pub avatar_url: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub address_line1: Option<String>,
    pub address_line2: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub zip: Option<String>,
    pub organizations: Option<Vec<String>>,
}

impl ProfileUpdate {
    /// Merge the provided fields into `user`.
    pub fn apply_to(self, user: &mut User) {
        fn set(target: &mut Option<String>, value: Option<String>) {
            if value.is_some() {
                *target = value;
            }
        }

        set(&mut user.full_name, self.full_name);

        let profile = &mut user.profile;
        set(&mut profile.display_name, self.display_name);
        set(&mut profile.bio, self.bio);
        set(&mut profile.avatar_url, self.avatar_url);
        set(&mut profile.first_name, self.first_name);
        set(&mut profile.last_name, self.last_name);
        set(&mut profile.address.line1, self.address_line1);
        set(&mut profile.address.line2, self.address_line2);
        set(&mut profile.address.city, self.city);
        set(&mut profile.address.state, self.state);
        set(&mut profile.address.zip, self.zip);
        if let Some(organizations) = self.organizations {
            profile.organizations = organizations;
        }
    }
}

/// Fields of a user anyone may see.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
pub struct PublicProfile {
    pub id: Uuid,
    pub full_name: Option<String>,
    pub display_name: Option<String>,
    pub avatar_url: Option<String>,
}

impl From<User> for PublicProfile {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            full_name: user.full_name,
            display_name: user.profile.display_name,
            avatar_url: user.profile.avatar_url,
        }
    }
}

/// Query for `GET /users/public`.
#[derive(Debug, Clone, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct PublicProfilesQuery {
    /// Comma-separated user ids
    #[serde(default)]
    pub ids: String,
}

impl PublicProfilesQuery {
    /// Parsed ids in first-seen order; blanks, malformed entries and repeats
    /// are dropped.
    pub fn parsed_ids(&self) -> Vec<Uuid> {
        let mut seen = HashSet::new();
        self.ids
            .split(',')
            .filter_map(|raw| Uuid::parse_str(raw.trim()).ok())
            .filter(|id| seen.insert(*id))
            .collect()
    }
}

// =============================================================================
// OAuth Models
// =============================================================================

/// Query parameters the provider appends to the callback URL.
#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct OAuthCallbackQuery {
    pub code: Option<String>,
    pub state: Option<String>,
    /// Set by the provider when the user denied access
    pub error: Option<String>,
}

// =============================================================================
// Avatar Models
// =============================================================================

/// Request for an avatar upload slot.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AvatarUploadRequest {
    /// MIME type of the image to upload
    pub content_type: String,
}

/// Presigned upload slot.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
pub struct AvatarUploadResponse {
    /// URL to `PUT` the image to
    pub upload_url: String,
    /// Where the image will be served from; already stored as the avatar
    pub avatar_url: String,
    /// Seconds the upload URL stays valid
    pub expires_in: u64,
}
