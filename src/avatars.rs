// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Avatar upload slots.
//!
//! Images are stored by an external object store that hands out presigned
//! upload URLs. This module only defines the seam; when no store is
//! configured, the avatar endpoint answers 503.

use async_trait::async_trait;
use uuid::Uuid;

/// Image types accepted for avatars.
pub const ALLOWED_AVATAR_TYPES: &[&str] = &["image/png", "image/jpeg", "image/webp", "image/gif"];

pub fn is_supported_content_type(content_type: &str) -> bool {
    ALLOWED_AVATAR_TYPES
        .iter()
        .any(|allowed| allowed.eq_ignore_ascii_case(content_type.trim()))
}

#[derive(Debug, thiserror::Error)]
pub enum AvatarStorageError {
    #[error("object store request failed: {0}")]
    Backend(String),
}

/// Presigned upload returned by the object store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AvatarUpload {
    pub upload_url: String,
    pub public_url: String,
    pub expires_in: u64,
}

#[async_trait]
pub trait AvatarStorage: Send + Sync {
    /// Reserve an object for `user_id`'s avatar and presign its upload.
    async fn presign_upload(
        &self,
        user_id: Uuid,
        content_type: &str,
    ) -> Result<AvatarUpload, AvatarStorageError>;
}
