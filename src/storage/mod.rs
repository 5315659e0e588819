// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Storage Module
//!
//! Persistent state lives in a single redb file under `DATA_DIR`:
//!
//! ```text
//! {DATA_DIR}/
//!   pidp.redb
//!     users               # id -> User (JSON)
//!     users_by_email      # lowercase email -> id
//!     users_by_provider   # provider|account_id -> id
//!     oauth_states        # state -> PendingAuthorization (JSON)
//! ```
//!
//! Handlers and the identity resolver depend on the [`UserRepository`] and
//! [`OAuthStateStore`] traits, not on redb directly.

pub mod database;
pub mod oauth_states;
pub mod users;

pub use database::{IdentityDatabase, StorageError, StorageResult};
pub use oauth_states::{OAuthStateStore, PendingAuthorization};
pub use users::{
    normalize_email, EditableProfile, LinkedIdentity, PostalAddress, User, UserRepository,
};
