// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::sync::Arc;

use crate::auth::{CredentialStore, JwksPublisher, KeyManager, TokenIssuer, TokenVerifier};
use crate::avatars::AvatarStorage;
use crate::config::Settings;
use crate::identity::ProviderRegistry;
use crate::storage::IdentityDatabase;

/// Shared handler state.
///
/// Issuer, verifier and JWKS publisher hold the same [`KeyManager`], which is
/// resolved before the state is built and never replaced.
#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub credentials: CredentialStore,
    pub issuer: TokenIssuer,
    pub verifier: TokenVerifier,
    pub jwks: JwksPublisher,
    pub db: Arc<IdentityDatabase>,
    pub providers: ProviderRegistry,
    pub avatars: Option<Arc<dyn AvatarStorage>>,
}

impl AppState {
    pub fn new(
        settings: Settings,
        keys: KeyManager,
        db: IdentityDatabase,
        providers: ProviderRegistry,
    ) -> Self {
        let keys = Arc::new(keys);
        Self {
            credentials: CredentialStore::new(settings.password_hash_cost),
            issuer: TokenIssuer::new(keys.clone(), &settings.token),
            verifier: TokenVerifier::new(keys.clone(), &settings.token),
            jwks: JwksPublisher::new(keys),
            db: Arc::new(db),
            providers,
            avatars: None,
            settings: Arc::new(settings),
        }
    }

    pub fn with_avatar_storage(mut self, avatars: Arc<dyn AvatarStorage>) -> Self {
        self.avatars = Some(avatars);
        self
    }
}

/// State over a throw-away database with HS256 keys and bcrypt cost 4.
#[cfg(test)]
pub(crate) fn test_state() -> (AppState, tempfile::TempDir) {
    test_state_with(|_| {})
}

/// Like [`test_state`], with settings adjusted by `configure` first.
#[cfg(test)]
pub(crate) fn test_state_with(
    configure: impl FnOnce(&mut Settings),
) -> (AppState, tempfile::TempDir) {
    let temp_dir = tempfile::TempDir::new().expect("Failed to create temp dir");
    let mut settings = Settings::from_lookup(|name| match name {
        "SECRET_KEY" => Some("test-secret-key-with-enough-entropy".to_string()),
        "PASSWORD_HASH_COST" => Some("4".to_string()),
        _ => None,
    })
    .expect("test settings");
    settings.data_dir = temp_dir.path().to_path_buf();
    configure(&mut settings);

    let keys = KeyManager::resolve(&settings.token).expect("test keys");
    let db = IdentityDatabase::open(&settings.database_path()).expect("test database");
    let state = AppState::new(settings, keys, db, ProviderRegistry::new());
    (state, temp_dir)
}
