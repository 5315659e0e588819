// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Identity Module
//!
//! Maps provider sign-ins onto canonical user records.
//!
//! - `providers` - OAuth provider abstraction (Google, GitHub)
//! - `resolver` - returning / link-by-email / create algorithm

pub mod providers;
pub mod resolver;

pub use providers::{OAuthProvider, ProviderError, ProviderProfile, ProviderRegistry};
pub use resolver::{
    ExternalIdentity, IdentityError, IdentityResolver, LinkPolicy, ResolutionOutcome,
    ResolvedIdentity,
};
