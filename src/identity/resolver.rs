// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Reconciles a provider-authenticated identity with stored users.
//!
//! Resolution order:
//!
//! 1. Same `(provider, account id)` as a stored link: returning user. The
//!    provider payload is replaced. The full name is replaced by the
//!    provider's name; a provider that sends no name leaves the stored one
//!    in place rather than erasing it.
//! 2. Same email as a stored user: the provider identity is linked to that
//!    account, replacing any previous link and provider payload. Governed by
//!    [`LinkPolicy`].
//! 3. Otherwise a new password-less user is created.
//!
//! Branches 1 and 2 apply their changes with
//! [`UserRepository::update_with`], so fields edited concurrently by the user
//! survive. Writes rely on the repository's uniqueness constraints. When a concurrent
//! request wins the race (`AlreadyExists`), the whole lookup is run again and
//! finds the row the other request wrote.

use std::str::FromStr;

use tracing::{debug, info, warn};

use super::providers::ProviderProfile;
use crate::storage::{LinkedIdentity, StorageError, User, UserRepository};

/// Attempts before a persistently conflicting resolution gives up.
pub const MAX_RESOLVE_ATTEMPTS: usize = 3;

/// Whether a provider-asserted email is enough to attach that provider to an
/// existing account with the same email.
///
/// `TrustProviderEmail` links without any further confirmation. A provider
/// that lets users claim unverified addresses can therefore take over the
/// matching local account. `Disabled` refuses such logins instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LinkPolicy {
    #[default]
    TrustProviderEmail,
    Disabled,
}

impl LinkPolicy {
    pub fn links_by_email(self) -> bool {
        matches!(self, LinkPolicy::TrustProviderEmail)
    }
}

impl FromStr for LinkPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "trust_email" => Ok(LinkPolicy::TrustProviderEmail),
            "disabled" => Ok(LinkPolicy::Disabled),
            other => Err(format!(
                "unknown account linking policy {other:?} (expected trust_email or disabled)"
            )),
        }
    }
}

/// Identity asserted by a provider, with the email already required.
#[derive(Debug, Clone, PartialEq)]
pub struct ExternalIdentity {
    pub provider: String,
    pub provider_account_id: String,
    pub email: String,
    pub full_name: Option<String>,
    pub avatar_url: Option<String>,
    pub raw: serde_json::Value,
}

impl ExternalIdentity {
    /// `None` when the provider did not disclose an email.
    pub fn from_profile(provider: &str, profile: ProviderProfile) -> Option<Self> {
        let email = profile.email?.trim().to_string();
        if email.is_empty() {
            return None;
        }
        Some(Self {
            provider: provider.to_string(),
            provider_account_id: profile.provider_account_id,
            email,
            full_name: profile.full_name,
            avatar_url: profile.avatar_url,
            raw: profile.raw,
        })
    }

    fn linked_identity(&self) -> LinkedIdentity {
        LinkedIdentity::new(&self.provider, &self.provider_account_id)
    }
}

/// Which resolution branch produced the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionOutcome {
    Returning,
    Linked,
    Created,
}

impl ResolutionOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResolutionOutcome::Returning => "returning",
            ResolutionOutcome::Linked => "linked",
            ResolutionOutcome::Created => "created",
        }
    }
}

#[derive(Debug, Clone)]
pub struct ResolvedIdentity {
    pub user: User,
    pub outcome: ResolutionOutcome,
}

#[derive(Debug, thiserror::Error)]
pub enum IdentityError {
    #[error("an account with this email already exists and account linking is disabled")]
    LinkingDisabled,

    #[error("identity still conflicting after {0} attempts")]
    Contention(usize),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Identity resolver over a user repository.
pub struct IdentityResolver<'a> {
    users: &'a dyn UserRepository,
    policy: LinkPolicy,
}

impl<'a> IdentityResolver<'a> {
    pub fn new(users: &'a dyn UserRepository, policy: LinkPolicy) -> Self {
        Self { users, policy }
    }

    pub fn resolve(&self, identity: &ExternalIdentity) -> Result<ResolvedIdentity, IdentityError> {
        for attempt in 1..=MAX_RESOLVE_ATTEMPTS {
            match self.try_resolve(identity) {
                Err(IdentityError::Storage(StorageError::AlreadyExists(what))) => {
                    debug!(attempt, conflict = %what, "Identity write lost a race; retrying");
                }
                Ok(resolved) => {
                    info!(
                        user_id = %resolved.user.id,
                        provider = %identity.provider,
                        outcome = resolved.outcome.as_str(),
                        "Provider identity resolved"
                    );
                    return Ok(resolved);
                }
                Err(e) => return Err(e),
            }
        }
        warn!(provider = %identity.provider, "Identity resolution kept conflicting");
        Err(IdentityError::Contention(MAX_RESOLVE_ATTEMPTS))
    }

    fn try_resolve(&self, identity: &ExternalIdentity) -> Result<ResolvedIdentity, IdentityError> {
        if let Some(user) = self
            .users
            .find_by_provider(&identity.provider, &identity.provider_account_id)?
        {
            let user = self.users.update_with(user.id, &mut |stored: &mut User| {
                if identity.full_name.is_some() {
                    stored.full_name = identity.full_name.clone();
                }
                stored.provider_data = identity.raw.clone();
            })?;
            return Ok(ResolvedIdentity {
                user,
                outcome: ResolutionOutcome::Returning,
            });
        }

        if let Some(user) = self.users.find_by_email(&identity.email)? {
            if !self.policy.links_by_email() {
                return Err(IdentityError::LinkingDisabled);
            }
            let user = self.users.update_with(user.id, &mut |stored: &mut User| {
                stored.linked_identity = Some(identity.linked_identity());
                stored.provider_data = identity.raw.clone();
            })?;
            return Ok(ResolvedIdentity {
                user,
                outcome: ResolutionOutcome::Linked,
            });
        }

        let mut user = User::from_provider(
            identity.email.clone(),
            identity.full_name.clone(),
            identity.linked_identity(),
            identity.raw.clone(),
        );
        user.profile.avatar_url = identity.avatar_url.clone();
        self.users.insert(&user)?;
        Ok(ResolvedIdentity {
            user,
            outcome: ResolutionOutcome::Created,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{IdentityDatabase, StorageResult};
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;
    use uuid::Uuid;

    fn test_db() -> (IdentityDatabase, TempDir) {
        let dir = TempDir::new().unwrap();
        let db = IdentityDatabase::open(&dir.path().join("pidp.redb")).unwrap();
        (db, dir)
    }

    fn github(account_id: &str, email: &str, raw: serde_json::Value) -> ExternalIdentity {
        ExternalIdentity {
            provider: "github".to_string(),
            provider_account_id: account_id.to_string(),
            email: email.to_string(),
            full_name: Some("Octo Cat".to_string()),
            avatar_url: Some("https://avatars.example.com/1".to_string()),
            raw,
        }
    }

    #[test]
    fn first_login_creates_passwordless_user() {
        let (db, _dir) = test_db();
        let resolver = IdentityResolver::new(&db, LinkPolicy::default());

        let resolved = resolver
            .resolve(&github("1", "octo@example.com", json!({ "id": 1 })))
            .unwrap();
        assert_eq!(resolved.outcome, ResolutionOutcome::Created);

        let user = db.get(resolved.user.id).unwrap().unwrap();
        assert!(user.password_hash.is_none());
        assert_eq!(user.provider(), Some("github"));
        assert_eq!(user.full_name.as_deref(), Some("Octo Cat"));
        assert_eq!(
            user.profile.avatar_url.as_deref(),
            Some("https://avatars.example.com/1")
        );
        assert_eq!(user.provider_data, json!({ "id": 1 }));
    }

    #[test]
    fn returning_login_keeps_one_row_with_latest_payload() {
        let (db, _dir) = test_db();
        let resolver = IdentityResolver::new(&db, LinkPolicy::default());

        let first = resolver
            .resolve(&github("1", "octo@example.com", json!({ "bio": "first" })))
            .unwrap();
        let mut again = github("1", "octo@example.com", json!({ "company": "second" }));
        again.full_name = Some("Renamed".to_string());
        let second = resolver.resolve(&again).unwrap();

        assert_eq!(second.outcome, ResolutionOutcome::Returning);
        assert_eq!(second.user.id, first.user.id);

        let stored = db.get(first.user.id).unwrap().unwrap();
        assert_eq!(stored.provider_data, json!({ "company": "second" }));
        assert_eq!(stored.full_name.as_deref(), Some("Renamed"));
        assert_eq!(db.get_many(&[first.user.id]).unwrap().len(), 1);
    }

    #[test]
    fn returning_login_without_name_keeps_stored_name() {
        let (db, _dir) = test_db();
        let resolver = IdentityResolver::new(&db, LinkPolicy::default());
        let first = resolver.resolve(&github("1", "octo@example.com", json!({}))).unwrap();

        let mut nameless = github("1", "octo@example.com", json!({ "v": 2 }));
        nameless.full_name = None;
        let again = resolver.resolve(&nameless).unwrap();

        assert_eq!(again.user.id, first.user.id);
        assert_eq!(again.user.full_name.as_deref(), Some("Octo Cat"));
        assert_eq!(again.user.provider_data, json!({ "v": 2 }));
    }

    #[test]
    fn linking_keeps_profile_edit_made_after_lookup() {
        let (db, _dir) = test_db();
        let local = User::with_password("edit@example.com", None, "h".to_string());
        db.insert(&local).unwrap();

        // The profile edit commits while the callback is between lookup and write
        let stale = db.get(local.id).unwrap().unwrap();
        db.update_with(local.id, &mut |u: &mut User| {
            u.profile.bio = Some("fresh".to_string());
        })
        .unwrap();

        let resolver = IdentityResolver::new(&db, LinkPolicy::default());
        let linked = resolver
            .resolve(&github("42", "edit@example.com", json!({ "id": 42 })))
            .unwrap();

        assert_eq!(linked.user.id, stale.id);
        assert_eq!(linked.user.profile.bio.as_deref(), Some("fresh"));
        assert_eq!(
            linked.user.linked_identity,
            Some(LinkedIdentity::new("github", "42"))
        );
    }

    #[test]
    fn provider_email_links_password_account() {
        let (db, _dir) = test_db();
        let local = User::with_password("alice@example.com", Some("Alice".to_string()), "h".to_string());
        db.insert(&local).unwrap();

        let resolver = IdentityResolver::new(&db, LinkPolicy::TrustProviderEmail);
        let resolved = resolver
            .resolve(&github("42", "Alice@Example.com", json!({ "id": 42 })))
            .unwrap();

        assert_eq!(resolved.outcome, ResolutionOutcome::Linked);
        assert_eq!(resolved.user.id, local.id);

        let stored = db.get(local.id).unwrap().unwrap();
        assert_eq!(
            stored.linked_identity,
            Some(LinkedIdentity::new("github", "42"))
        );
        assert_eq!(stored.password_hash.as_deref(), Some("h"));
        assert_eq!(stored.full_name.as_deref(), Some("Alice"));
        assert_eq!(stored.email, "alice@example.com");
        assert!(db.find_by_provider("github", "42").unwrap().is_some());
    }

    #[test]
    fn linking_replaces_previous_provider() {
        let (db, _dir) = test_db();
        let resolver = IdentityResolver::new(&db, LinkPolicy::TrustProviderEmail);

        let created = resolver
            .resolve(&github("7", "dev@example.com", json!({})))
            .unwrap();
        let google = ExternalIdentity {
            provider: "google".to_string(),
            provider_account_id: "g-7".to_string(),
            email: "dev@example.com".to_string(),
            full_name: None,
            avatar_url: None,
            raw: json!({ "sub": "g-7" }),
        };
        let linked = resolver.resolve(&google).unwrap();

        assert_eq!(linked.outcome, ResolutionOutcome::Linked);
        assert_eq!(linked.user.id, created.user.id);
        assert_eq!(linked.user.provider(), Some("google"));
        assert!(db.find_by_provider("github", "7").unwrap().is_none());
        assert_eq!(linked.user.provider_data, json!({ "sub": "g-7" }));
    }

    #[test]
    fn disabled_policy_refuses_email_link() {
        let (db, _dir) = test_db();
        let local = User::with_password("alice@example.com", None, "h".to_string());
        db.insert(&local).unwrap();

        let resolver = IdentityResolver::new(&db, LinkPolicy::Disabled);
        let result = resolver.resolve(&github("42", "alice@example.com", json!({})));

        assert!(matches!(result, Err(IdentityError::LinkingDisabled)));
        assert!(db.get(local.id).unwrap().unwrap().linked_identity.is_none());
    }

    #[test]
    fn disabled_policy_still_admits_returning_and_new_users() {
        let (db, _dir) = test_db();
        let resolver = IdentityResolver::new(&db, LinkPolicy::Disabled);

        let created = resolver.resolve(&github("9", "new@example.com", json!({}))).unwrap();
        let returning = resolver.resolve(&github("9", "new@example.com", json!({}))).unwrap();
        assert_eq!(created.outcome, ResolutionOutcome::Created);
        assert_eq!(returning.outcome, ResolutionOutcome::Returning);
    }

    /// Repository whose first inserts fail as if another request got there first.
    struct RacingRepository<'a> {
        inner: &'a IdentityDatabase,
        winner: User,
        lost_races: AtomicUsize,
        races_to_lose: usize,
    }

    impl UserRepository for RacingRepository<'_> {
        fn get(&self, id: Uuid) -> StorageResult<Option<User>> {
            self.inner.get(id)
        }
        fn get_many(&self, ids: &[Uuid]) -> StorageResult<Vec<User>> {
            self.inner.get_many(ids)
        }
        fn find_by_email(&self, email: &str) -> StorageResult<Option<User>> {
            self.inner.find_by_email(email)
        }
        fn find_by_provider(&self, provider: &str, account_id: &str) -> StorageResult<Option<User>> {
            self.inner.find_by_provider(provider, account_id)
        }
        fn insert(&self, user: &User) -> StorageResult<()> {
            if self.lost_races.fetch_add(1, Ordering::SeqCst) < self.races_to_lose {
                // The concurrent request commits its row first
                let _ = self.inner.insert(&self.winner);
                return Err(StorageError::AlreadyExists("email".to_string()));
            }
            self.inner.insert(user)
        }
        fn update(&self, user: &User) -> StorageResult<User> {
            self.inner.update(user)
        }
        fn update_with(
            &self,
            id: Uuid,
            mutate: &mut dyn FnMut(&mut User),
        ) -> StorageResult<User> {
            self.inner.update_with(id, mutate)
        }
        fn ping(&self) -> StorageResult<()> {
            self.inner.ping()
        }
    }

    #[test]
    fn lost_creation_race_resolves_to_winner() {
        let (db, _dir) = test_db();
        let winner = User::from_provider(
            "race@example.com",
            None,
            LinkedIdentity::new("github", "5"),
            json!({}),
        );
        let repo = RacingRepository {
            inner: &db,
            winner: winner.clone(),
            lost_races: AtomicUsize::new(0),
            races_to_lose: 1,
        };

        let resolver = IdentityResolver::new(&repo, LinkPolicy::default());
        let resolved = resolver
            .resolve(&github("5", "race@example.com", json!({ "late": true })))
            .unwrap();

        assert_eq!(resolved.user.id, winner.id);
        assert_eq!(resolved.outcome, ResolutionOutcome::Returning);
        assert_eq!(db.find_by_email("race@example.com").unwrap().unwrap().id, winner.id);
    }

    #[test]
    fn persistent_conflict_gives_up() {
        let (db, _dir) = test_db();
        let repo = RacingRepository {
            inner: &db,
            // Different email, so every retry misses it and tries to insert again
            winner: User::with_password("other@example.com", None, "h".to_string()),
            lost_races: AtomicUsize::new(0),
            races_to_lose: usize::MAX,
        };

        let resolver = IdentityResolver::new(&repo, LinkPolicy::default());
        let result = resolver.resolve(&github("5", "stuck@example.com", json!({})));
        assert!(matches!(
            result,
            Err(IdentityError::Contention(MAX_RESOLVE_ATTEMPTS))
        ));
    }

    #[test]
    fn profile_without_email_is_not_an_identity() {
        let profile = ProviderProfile {
            provider_account_id: "1".to_string(),
            email: None,
            full_name: None,
            avatar_url: None,
            raw: json!({}),
        };
        assert!(ExternalIdentity::from_profile("github", profile.clone()).is_none());

        let blank = ProviderProfile {
            email: Some("  ".to_string()),
            ..profile.clone()
        };
        assert!(ExternalIdentity::from_profile("github", blank).is_none());

        let with_email = ProviderProfile {
            email: Some(" a@example.com ".to_string()),
            ..profile
        };
        let identity = ExternalIdentity::from_profile("github", with_email).unwrap();
        assert_eq!(identity.email, "a@example.com");
        assert_eq!(identity.provider, "github");
    }

    #[test]
    fn link_policy_parsing() {
        assert_eq!("trust_email".parse::<LinkPolicy>(), Ok(LinkPolicy::TrustProviderEmail));
        assert_eq!("DISABLED".parse::<LinkPolicy>(), Ok(LinkPolicy::Disabled));
        assert!("maybe".parse::<LinkPolicy>().is_err());
        assert!(LinkPolicy::default().links_by_email());
    }
}
