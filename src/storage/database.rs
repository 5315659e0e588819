// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Embedded identity database backed by redb (pure Rust, ACID).
//!
//! ## Table Layout
//!
//! - `users`: user id → serialized User (JSON bytes)
//! - `users_by_email`: normalized email → user id (uniqueness constraint)
//! - `users_by_provider`: `provider|account_id` → user id
//! - `oauth_states`: CSRF state → serialized PendingAuthorization
//!
//! redb admits a single write transaction at a time, so every check-then-write
//! performed inside one write transaction is atomic with respect to other
//! requests.

use std::path::Path;

use redb::{Database, ReadableDatabase, TableDefinition};

// =============================================================================
// Table Definitions
// =============================================================================

/// Primary table: user id → serialized User (JSON bytes).
pub(crate) const USERS: TableDefinition<&str, &[u8]> = TableDefinition::new("users");

/// Index: normalized (trimmed, lowercase) email → user id.
pub(crate) const USERS_BY_EMAIL: TableDefinition<&str, &str> =
    TableDefinition::new("users_by_email");

/// Index: `provider|account_id` → user id.
pub(crate) const USERS_BY_PROVIDER: TableDefinition<&str, &str> =
    TableDefinition::new("users_by_provider");

/// Pending OAuth authorizations: state → serialized PendingAuthorization.
pub(crate) const OAUTH_STATES: TableDefinition<&str, &[u8]> = TableDefinition::new("oauth_states");

// =============================================================================
// Error Type
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("redb error: {0}")]
    Redb(#[from] redb::Error),

    #[error("redb database error: {0}")]
    RedbDatabase(#[from] redb::DatabaseError),

    #[error("redb transaction error: {0}")]
    RedbTransaction(#[from] redb::TransactionError),

    #[error("redb table error: {0}")]
    RedbTable(#[from] redb::TableError),

    #[error("redb storage error: {0}")]
    RedbStorage(#[from] redb::StorageError),

    #[error("redb commit error: {0}")]
    RedbCommit(#[from] redb::CommitError),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),
}

pub type StorageResult<T> = Result<T, StorageError>;

// =============================================================================
// IdentityDatabase
// =============================================================================

/// Embedded ACID database holding user records and pending OAuth states.
pub struct IdentityDatabase {
    pub(crate) db: Database,
}

impl IdentityDatabase {
    /// Open (or create) the database at the given path.
    pub fn open(path: &Path) -> StorageResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let db = Database::create(path)?;

        // Pre-create all tables so later read transactions don't fail
        let write_txn = db.begin_write()?;
        {
            let _ = write_txn.open_table(USERS)?;
            let _ = write_txn.open_table(USERS_BY_EMAIL)?;
            let _ = write_txn.open_table(USERS_BY_PROVIDER)?;
            let _ = write_txn.open_table(OAUTH_STATES)?;
        }
        write_txn.commit()?;

        Ok(Self { db })
    }

    /// Verify the database answers a read transaction.
    pub fn ping(&self) -> StorageResult<()> {
        let read_txn = self.db.begin_read()?;
        let _ = read_txn.open_table(USERS)?;
        Ok(())
    }
}
