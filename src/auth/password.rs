// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Password hashing and verification (bcrypt).
//!
//! bcrypt only reads the first 72 bytes of its input. Passwords are cut to
//! that length (UTF-8 bytes) before hashing and before verifying, so two
//! passwords that differ only after byte 72 produce interchangeable hashes.

use std::sync::OnceLock;

use pwhash::bcrypt::{self, BcryptSetup};

/// bcrypt input limit in bytes.
pub const MAX_PASSWORD_BYTES: usize = 72;

/// Default work factor.
pub const DEFAULT_HASH_COST: u32 = 12;

/// Hash checked when a login names no password account, so that branch costs
/// one bcrypt round like a real mismatch.
static DECOY_HASH: OnceLock<Option<String>> = OnceLock::new();

#[derive(Debug, thiserror::Error)]
pub enum CredentialError {
    #[error("password hashing failed: {0}")]
    Hash(String),
}

/// Salted, cost-tunable password hasher.
#[derive(Debug, Clone, Copy)]
pub struct CredentialStore {
    cost: u32,
}

impl Default for CredentialStore {
    fn default() -> Self {
        Self::new(DEFAULT_HASH_COST)
    }
}

impl CredentialStore {
    pub fn new(cost: u32) -> Self {
        Self { cost }
    }

    pub fn cost(&self) -> u32 {
        self.cost
    }

    /// Hash a password with a fresh random salt.
    pub fn hash(&self, password: &str) -> Result<String, CredentialError> {
        let setup = BcryptSetup {
            cost: Some(self.cost),
            ..Default::default()
        };
        bcrypt::hash_with(setup, truncate(password)).map_err(|e| CredentialError::Hash(e.to_string()))
    }

    /// Check a password against a stored hash.
    ///
    /// A malformed or foreign hash yields `false`.
    pub fn verify(&self, password: &str, hash: &str) -> bool {
        bcrypt::verify(truncate(password), hash)
    }

    /// Verify against a stored hash if there is one, otherwise against a
    /// decoy. The work done is the same either way; no hash always fails.
    pub fn verify_or_decoy(&self, password: &str, hash: Option<&str>) -> bool {
        match hash {
            Some(hash) => self.verify(password, hash),
            None => {
                if let Some(decoy) = DECOY_HASH.get_or_init(|| self.hash("decoy").ok()) {
                    let _ = bcrypt::verify(truncate(password), decoy);
                }
                false
            }
        }
    }
}

fn truncate(password: &str) -> &[u8] {
    let bytes = password.as_bytes();
    &bytes[..bytes.len().min(MAX_PASSWORD_BYTES)]
}
