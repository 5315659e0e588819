// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Authentication Module
//!
//! Credentials in, signed bearer tokens out.
//!
//! ## Flow
//!
//! 1. Password login checks the bcrypt hash ([`CredentialStore`]); OAuth
//!    logins go through [`crate::identity::IdentityResolver`].
//! 2. The canonical user id becomes the `sub` of a token signed by
//!    [`TokenIssuer`] with the key held by [`KeyManager`].
//! 3. Requests present `Authorization: Bearer <token>`; the [`Auth`]
//!    extractor verifies it with [`TokenVerifier`].
//! 4. Clients holding an RSA-signed token can verify it offline against the
//!    key set served by [`JwksPublisher`].
//!
//! ## Security
//!
//! - Verification failures are logged with their reason at `debug` and
//!   answered with one generic 401
//! - No clock skew tolerance
//! - The shared secret is never published

pub mod claims;
pub mod error;
pub mod extractor;
pub mod issuer;
pub mod jwks;
pub mod keys;
pub mod password;
pub mod verifier;

pub use claims::{AuthenticatedUser, TokenClaims};
pub use error::{AuthError, TokenRejection};
pub use extractor::Auth;
pub use issuer::TokenIssuer;
pub use jwks::JwksPublisher;
pub use keys::{KeyError, KeyFamily, KeyManager};
pub use password::{CredentialError, CredentialStore};
pub use verifier::TokenVerifier;
