// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! User records and the repository that persists them.
//!
//! A [`User`] is the canonical identity record. Emails are unique
//! case-insensitively: the `users_by_email` index is keyed on the trimmed,
//! lowercased address and is checked inside the same write transaction that
//! inserts the row.

use chrono::{DateTime, Utc};
use redb::{ReadableDatabase, ReadableTable};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use super::database::{IdentityDatabase, USERS, USERS_BY_EMAIL, USERS_BY_PROVIDER};
use super::{StorageError, StorageResult};

// =============================================================================
// Records
// =============================================================================

/// Provider identity attached to a user.
///
/// Holding provider and account id together makes "provider set implies
/// account id set" hold by construction.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LinkedIdentity {
    /// Provider name (`google`, `github`)
    pub provider: String,
    /// Stable account id assigned by the provider
    pub account_id: String,
}

impl LinkedIdentity {
    pub fn new(provider: impl Into<String>, account_id: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            account_id: account_id.into(),
        }
    }

    fn index_key(&self) -> String {
        provider_key(&self.provider, &self.account_id)
    }
}

/// Postal address block of the editable profile.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
pub struct PostalAddress {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line1: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line2: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zip: Option<String>,
}

/// Profile fields the user edits.
///
/// Provider payloads are kept apart in [`User::provider_data`] and are never
/// merged into this record.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
pub struct EditableProfile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bio: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    #[serde(default)]
    pub address: PostalAddress,
    #[serde(default)]
    pub organizations: Vec<String>,
}

/// Canonical identity record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct User {
    /// Unique user identifier (UUID v4), used as the token subject
    pub id: Uuid,
    /// Email address as supplied (unique, case-insensitive)
    pub email: String,
    /// bcrypt hash; absent for accounts created through OAuth only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password_hash: Option<String>,
    #[serde(default)]
    pub full_name: Option<String>,
    /// At most one provider identity; linking replaces it
    #[serde(default)]
    pub linked_identity: Option<LinkedIdentity>,
    #[serde(default)]
    pub profile: EditableProfile,
    /// Opaque payload from the last provider login
    #[serde(default)]
    pub provider_data: serde_json::Value,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl User {
    /// New password-based account.
    pub fn with_password(
        email: impl Into<String>,
        full_name: Option<String>,
        password_hash: String,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            email: email.into(),
            password_hash: Some(password_hash),
            full_name,
            linked_identity: None,
            profile: EditableProfile::default(),
            provider_data: serde_json::Value::Null,
            is_active: true,
            created_at: Utc::now(),
        }
    }

    /// New account created from a provider login, without a password.
    pub fn from_provider(
        email: impl Into<String>,
        full_name: Option<String>,
        identity: LinkedIdentity,
        provider_data: serde_json::Value,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            email: email.into(),
            password_hash: None,
            full_name,
            linked_identity: Some(identity),
            profile: EditableProfile::default(),
            provider_data,
            is_active: true,
            created_at: Utc::now(),
        }
    }

    /// Name of the linked provider, if any.
    pub fn provider(&self) -> Option<&str> {
        self.linked_identity.as_ref().map(|l| l.provider.as_str())
    }
}

/// Normalize an email for uniqueness checks and lookups.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

fn provider_key(provider: &str, account_id: &str) -> String {
    format!("{provider}|{account_id}")
}

// =============================================================================
// Repository
// =============================================================================

/// Persistence operations the identity flows depend on.
///
/// Each call runs in its own transaction. `insert` and `update` enforce the
/// uniqueness constraints and report violations as
/// [`StorageError::AlreadyExists`] so callers can re-read and retry.
pub trait UserRepository: Send + Sync {
    fn get(&self, id: Uuid) -> StorageResult<Option<User>>;

    /// Fetch several users at once; unknown ids are skipped.
    fn get_many(&self, ids: &[Uuid]) -> StorageResult<Vec<User>>;

    fn find_by_email(&self, email: &str) -> StorageResult<Option<User>>;

    fn find_by_provider(&self, provider: &str, account_id: &str) -> StorageResult<Option<User>>;

    /// Insert a new user. Fails if the email or provider identity is taken.
    fn insert(&self, user: &User) -> StorageResult<()>;

    /// Replace an existing user record and re-index its provider identity.
    ///
    /// The stored email is immutable; the email of `user` is ignored.
    fn update(&self, user: &User) -> StorageResult<User>;

    /// Read, mutate and write back one user inside a single write
    /// transaction, so concurrent edits to other fields are not lost.
    ///
    /// `id` and email are immutable. Fails with `NotFound` if the user is
    /// gone, or `AlreadyExists` if the new provider link belongs to someone
    /// else.
    fn update_with(&self, id: Uuid, mutate: &mut dyn FnMut(&mut User)) -> StorageResult<User>;

    /// Cheap round trip to the database for health checks.
    fn ping(&self) -> StorageResult<()>;
}

fn read_user<T>(table: &T, id: &str) -> StorageResult<Option<User>>
where
    T: ReadableTable<&'static str, &'static [u8]>,
{
    match table.get(id)? {
        Some(value) => Ok(Some(serde_json::from_slice(value.value())?)),
        None => Ok(None),
    }
}

impl IdentityDatabase {
    fn find_by_index(
        &self,
        index: redb::TableDefinition<&str, &str>,
        key: &str,
    ) -> StorageResult<Option<User>> {
        let read_txn = self.db.begin_read()?;
        let index_table = read_txn.open_table(index)?;
        let user_id = match index_table.get(key)? {
            Some(value) => value.value().to_string(),
            None => return Ok(None),
        };
        let users = read_txn.open_table(USERS)?;
        read_user(&users, &user_id)
    }
}

impl UserRepository for IdentityDatabase {
    fn get(&self, id: Uuid) -> StorageResult<Option<User>> {
        let read_txn = self.db.begin_read()?;
        let users = read_txn.open_table(USERS)?;
        read_user(&users, &id.to_string())
    }

    fn get_many(&self, ids: &[Uuid]) -> StorageResult<Vec<User>> {
        let read_txn = self.db.begin_read()?;
        let users = read_txn.open_table(USERS)?;
        let mut found = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(user) = read_user(&users, &id.to_string())? {
                found.push(user);
            }
        }
        Ok(found)
    }

    fn find_by_email(&self, email: &str) -> StorageResult<Option<User>> {
        self.find_by_index(USERS_BY_EMAIL, &normalize_email(email))
    }

    fn find_by_provider(&self, provider: &str, account_id: &str) -> StorageResult<Option<User>> {
        self.find_by_index(USERS_BY_PROVIDER, &provider_key(provider, account_id))
    }

    fn insert(&self, user: &User) -> StorageResult<()> {
        let json = serde_json::to_vec(user)?;
        let user_id = user.id.to_string();
        let email_key = normalize_email(&user.email);

        let write_txn = self.db.begin_write()?;
        {
            let mut by_email = write_txn.open_table(USERS_BY_EMAIL)?;
            if by_email.get(email_key.as_str())?.is_some() {
                return Err(StorageError::AlreadyExists(format!(
                    "User with email {}",
                    user.email
                )));
            }

            if let Some(identity) = &user.linked_identity {
                let mut by_provider = write_txn.open_table(USERS_BY_PROVIDER)?;
                let key = identity.index_key();
                if by_provider.get(key.as_str())?.is_some() {
                    return Err(StorageError::AlreadyExists(format!(
                        "User linked to {} account {}",
                        identity.provider, identity.account_id
                    )));
                }
                by_provider.insert(key.as_str(), user_id.as_str())?;
            }

            by_email.insert(email_key.as_str(), user_id.as_str())?;
            let mut users = write_txn.open_table(USERS)?;
            users.insert(user_id.as_str(), json.as_slice())?;
        }
        write_txn.commit()?;
        Ok(())
    }

    fn update(&self, user: &User) -> StorageResult<User> {
        self.update_with(user.id, &mut |stored: &mut User| *stored = user.clone())
    }

    fn update_with(&self, id: Uuid, mutate: &mut dyn FnMut(&mut User)) -> StorageResult<User> {
        let user_id = id.to_string();

        let write_txn = self.db.begin_write()?;
        let stored = {
            let mut users = write_txn.open_table(USERS)?;
            let existing = read_user(&users, &user_id)?
                .ok_or_else(|| StorageError::NotFound(format!("User {user_id}")))?;

            let mut stored = existing.clone();
            mutate(&mut stored);
            stored.id = existing.id;
            stored.email = existing.email.clone();

            let old_key = existing.linked_identity.as_ref().map(LinkedIdentity::index_key);
            let new_key = stored.linked_identity.as_ref().map(LinkedIdentity::index_key);

            if old_key != new_key {
                let mut by_provider = write_txn.open_table(USERS_BY_PROVIDER)?;
                if let Some(key) = &new_key {
                    let owner = by_provider.get(key.as_str())?.map(|v| v.value().to_string());
                    if owner.is_some_and(|owner| owner != user_id) {
                        return Err(StorageError::AlreadyExists(format!(
                            "Provider identity {key} is linked to another user"
                        )));
                    }
                    by_provider.insert(key.as_str(), user_id.as_str())?;
                }
                if let Some(key) = &old_key {
                    by_provider.remove(key.as_str())?;
                }
            }

            let json = serde_json::to_vec(&stored)?;
            users.insert(user_id.as_str(), json.as_slice())?;
            stored
        };
        write_txn.commit()?;
        Ok(stored)
    }

    fn ping(&self) -> StorageResult<()> {
        IdentityDatabase::ping(self)
    }
}
