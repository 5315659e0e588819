// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Pending OAuth authorizations keyed by their CSRF `state` value.
//!
//! A state is single use: [`OAuthStateStore::take`] removes the row in the
//! same write transaction that reads it, so a replayed callback finds nothing.

use chrono::{DateTime, Duration, Utc};
use redb::ReadableTable;
use serde::{Deserialize, Serialize};

use super::database::{IdentityDatabase, OAUTH_STATES};
use super::StorageResult;

/// How long a login redirect stays redeemable.
pub const PENDING_AUTHORIZATION_TTL_MINUTES: i64 = 10;

/// What the callback needs to finish a login started by this server.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PendingAuthorization {
    /// Provider the login was started for
    pub provider: String,
    /// PKCE verifier matching the challenge sent to the provider
    pub pkce_verifier: String,
    pub expires_at: DateTime<Utc>,
}

impl PendingAuthorization {
    pub fn new(provider: impl Into<String>, pkce_verifier: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            pkce_verifier: pkce_verifier.into(),
            expires_at: Utc::now() + Duration::minutes(PENDING_AUTHORIZATION_TTL_MINUTES),
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// Storage for pending authorizations.
pub trait OAuthStateStore: Send + Sync {
    /// Remember a pending authorization; expired rows are swept on the way.
    fn save(&self, state: &str, pending: &PendingAuthorization) -> StorageResult<()>;

    /// Consume a state. Returns `None` if it is unknown, already used,
    /// expired, or was issued for another provider.
    fn take(&self, state: &str, provider: &str) -> StorageResult<Option<PendingAuthorization>>;
}

impl OAuthStateStore for IdentityDatabase {
    fn save(&self, state: &str, pending: &PendingAuthorization) -> StorageResult<()> {
        let json = serde_json::to_vec(pending)?;
        let now = Utc::now();

        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(OAUTH_STATES)?;

            let mut expired = Vec::new();
            for entry in table.iter()? {
                let (key, value) = entry?;
                let stale = serde_json::from_slice::<PendingAuthorization>(value.value())
                    .map(|p| p.is_expired(now))
                    .unwrap_or(true);
                if stale {
                    expired.push(key.value().to_string());
                }
            }
            for key in &expired {
                table.remove(key.as_str())?;
            }

            table.insert(state, json.as_slice())?;
        }
        write_txn.commit()?;
        Ok(())
    }

    fn take(&self, state: &str, provider: &str) -> StorageResult<Option<PendingAuthorization>> {
        let write_txn = self.db.begin_write()?;
        let removed = {
            let mut table = write_txn.open_table(OAUTH_STATES)?;
            let bytes = table.remove(state)?.map(|v| v.value().to_vec());
            bytes
        };
        write_txn.commit()?;

        let Some(bytes) = removed else {
            return Ok(None);
        };
        let pending: PendingAuthorization = serde_json::from_slice(&bytes)?;
        if pending.provider != provider || pending.is_expired(Utc::now()) {
            return Ok(None);
        }
        Ok(Some(pending))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn test_db() -> (IdentityDatabase, TempDir) {
        let dir = TempDir::new().unwrap();
        let db = IdentityDatabase::open(&dir.path().join("pidp.redb")).unwrap();
        (db, dir)
    }

    #[test]
    fn state_is_single_use() {
        let (db, _dir) = test_db();
        db.save("abc", &PendingAuthorization::new("github", "verifier"))
            .unwrap();

        let first = db.take("abc", "github").unwrap().expect("pending state");
        assert_eq!(first.pkce_verifier, "verifier");
        assert!(db.take("abc", "github").unwrap().is_none());
    }

    #[test]
    fn state_for_other_provider_is_rejected_and_consumed() {
        let (db, _dir) = test_db();
        db.save("abc", &PendingAuthorization::new("google", "v")).unwrap();

        assert!(db.take("abc", "github").unwrap().is_none());
        assert!(db.take("abc", "google").unwrap().is_none());
    }

    #[test]
    fn expired_state_is_rejected() {
        let (db, _dir) = test_db();
        let mut pending = PendingAuthorization::new("google", "v");
        pending.expires_at = Utc::now() - Duration::seconds(1);
        db.save("old", &pending).unwrap();

        assert!(db.take("old", "google").unwrap().is_none());
    }

    #[test]
    fn save_sweeps_expired_states() {
        let (db, _dir) = test_db();
        let mut stale = PendingAuthorization::new("google", "v");
        stale.expires_at = Utc::now() - Duration::minutes(1);
        db.save("stale", &stale).unwrap();
        db.save("fresh", &PendingAuthorization::new("google", "w"))
            .unwrap();

        let read_txn = redb::ReadableDatabase::begin_read(&db.db).unwrap();
        let table = read_txn.open_table(OAUTH_STATES).unwrap();
        assert!(table.get("stale").unwrap().is_none());
        assert!(table.get("fresh").unwrap().is_some());
    }

    #[test]
    fn unknown_state_is_none() {
        let (db, _dir) = test_db();
        assert!(db.take("nope", "google").unwrap().is_none());
    }
}
