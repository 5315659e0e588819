// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! PIdP - Personal Identity Provider
//!
//! Authenticates users with a local password or an OAuth provider, resolves
//! every login to one canonical account per email, and issues signed bearer
//! tokens. RSA deployments publish their verification key as a JWKS.
//!
//! ## Modules
//!
//! - `api` - HTTP API handlers (Axum)
//! - `auth` - Password hashing, signing keys, token issue/verify, JWKS
//! - `identity` - OAuth providers and account linking
//! - `storage` - User records and pending OAuth logins (redb)

pub mod api;
pub mod auth;
pub mod avatars;
pub mod config;
pub mod error;
pub mod identity;
pub mod models;
pub mod state;
pub mod storage;
