//! User aggregate.
//!
//! Accounts are keyed by the identity provider's user id; usernames are
//! normalized and must be unique. Writes that claim a username run a lookup
//! effect first.

use super::{Outcome, insert_failure};
use crate::auth::Actor;
use crate::error::ApiError;
use crate::storage::repo;
use crate::types::{AppUser, UserId, UserRequest};
use chrono::{DateTime, Utc};
use eventgram_core::effect::Effect;
use eventgram_core::entity_store::{Entity, EntityStore, EntityStoreError, Query};
use eventgram_core::environment::Clock;
use eventgram_core::reducer::Reducer;
use eventgram_core::{SmallVec, smallvec};
use std::sync::Arc;
use thiserror::Error;

/// Longest accepted username.
pub const MAX_USERNAME_LENGTH: usize = 30;

const NOT_OWNER: &str = "Not authorized to change another user!";

// ============================================================================
// Username and record rules
// ============================================================================

/// Why a username was rejected.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum UsernameError {
    /// Blank after trimming
    #[error("Username is required.")]
    Empty,

    /// Longer than [`MAX_USERNAME_LENGTH`]
    #[error("Username must be at most 30 characters.")]
    TooLong,

    /// Outside `[a-z0-9_.-]`
    #[error("Username may only contain letters, digits, '_', '-' and '.'.")]
    InvalidCharacter,
}

/// Trims and lower-cases a username.
#[must_use]
pub fn normalize_username(raw: &str) -> String {
    raw.trim().to_lowercase()
}

/// Checks a normalized username.
///
/// # Errors
///
/// [`UsernameError`] naming the first rule broken.
pub fn check_username(username: &str) -> Result<(), UsernameError> {
    if username.is_empty() {
        return Err(UsernameError::Empty);
    }
    if username.chars().count() > MAX_USERNAME_LENGTH {
        return Err(UsernameError::TooLong);
    }
    if !username
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
    {
        return Err(UsernameError::InvalidCharacter);
    }
    Ok(())
}

/// Why a user record is not complete.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserRuleError {
    /// No identifier
    #[error("User identifier is required.")]
    MissingId,

    /// No username
    #[error("Username is required.")]
    MissingUsername,

    /// No registration time
    #[error("User creation time is required.")]
    MissingCreated,

    /// No modification time
    #[error("User modification time is required.")]
    MissingModified,
}

/// Final gate for a user record.
///
/// # Errors
///
/// Returns the first missing field: id, username, created, modified.
pub fn check_user(user: &AppUser) -> Result<(), UserRuleError> {
    if user.id.is_empty() {
        return Err(UserRuleError::MissingId);
    }
    if user.username.is_empty() {
        return Err(UserRuleError::MissingUsername);
    }
    if user.created == DateTime::<Utc>::default() {
        return Err(UserRuleError::MissingCreated);
    }
    if user.modified == DateTime::<Utc>::default() {
        return Err(UserRuleError::MissingModified);
    }
    Ok(())
}

// ============================================================================
// State
// ============================================================================

/// A write waiting for the username lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PendingWrite {
    /// New account
    Register(AppUser),
    /// Changed account
    Update(AppUser),
}

/// Request-scoped state of the user aggregate.
#[derive(Debug, Clone)]
pub struct UserState {
    /// Caller
    pub actor: Actor,
    /// The stored user a command targets
    pub current: Option<AppUser>,
    /// Write held back by the username lookup
    pub pending: Option<PendingWrite>,
    /// Settled result
    pub outcome: Outcome<AppUser>,
}

impl UserState {
    /// State for a command issued by `actor`.
    #[must_use]
    pub fn new(actor: Actor) -> Self {
        Self {
            actor,
            current: None,
            pending: None,
            outcome: Outcome::Pending,
        }
    }

    /// Adds the stored user the command targets.
    #[must_use]
    pub fn with_current(mut self, user: Option<AppUser>) -> Self {
        self.current = user;
        self
    }
}

// ============================================================================
// Actions
// ============================================================================

/// Commands from the shell and facts fed back by effects.
#[derive(Debug, Clone)]
pub enum UserAction {
    // Commands
    /// Create an account for the signed-in identity
    RegisterUser {
        /// Client payload
        request: UserRequest,
    },

    /// Update the loaded account
    UpdateUser {
        /// Username in the request path
        username: String,
        /// Client payload
        request: UserRequest,
    },

    /// Delete the loaded account
    DeleteUser {
        /// Username in the request path
        username: String,
    },

    // Facts
    /// Nobody else holds the requested username
    UsernameAvailable,

    /// Another account holds the requested username
    UsernameTaken {
        /// The contested username
        username: String,
    },

    /// The account was created
    UserRegistered {
        /// Stored user
        user: AppUser,
    },

    /// The account was updated
    UserUpdated {
        /// Stored user
        user: AppUser,
    },

    /// The account was removed
    UserDeleted {
        /// Removed user
        user_id: UserId,
    },

    /// An effect failed
    Failed {
        /// What went wrong
        error: ApiError,
    },
}

// ============================================================================
// Environment
// ============================================================================

/// Collaborators of the user aggregate.
#[derive(Clone)]
pub struct UserEnvironment {
    /// Clock for "now"
    pub clock: Arc<dyn Clock>,
    /// Record storage
    pub entities: Arc<dyn EntityStore>,
}

impl UserEnvironment {
    /// Creates a new `UserEnvironment`
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>, entities: Arc<dyn EntityStore>) -> Self {
        Self { clock, entities }
    }
}

// ============================================================================
// Reducer
// ============================================================================

/// Reducer for the user aggregate.
#[derive(Clone, Debug, Default)]
pub struct UserReducer;

impl UserReducer {
    /// Creates a new `UserReducer`
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    fn fail(state: &mut UserState, error: ApiError) -> SmallVec<[Effect<UserAction>; 4]> {
        match &error {
            ApiError::Forbidden(reason) => tracing::warn!(reason = %reason, "User command forbidden"),
            ApiError::Internal { .. } => {},
            other => tracing::debug!(reason = %other, "User command rejected"),
        }
        state.outcome = Outcome::Failed(error);
        SmallVec::new()
    }

    fn username(raw: &str) -> Result<String, ApiError> {
        let username = normalize_username(raw);
        check_username(&username).map_err(ApiError::validation)?;
        Ok(username)
    }

    /// Effect checking whether `username` belongs to anyone but `owner`.
    fn lookup(username: String, owner: UserId, env: &UserEnvironment) -> Effect<UserAction> {
        let entities = Arc::clone(&env.entities);
        Effect::future(async move {
            let holders: Vec<AppUser> = match repo::find(
                entities.as_ref(),
                Query::new(AppUser::KIND).filter("username", username.as_str()),
            )
            .await
            {
                Ok(holders) => holders,
                Err(error) => {
                    return Some(UserAction::Failed {
                        error: ApiError::internal("lookup_username", None, error),
                    });
                },
            };

            if holders.iter().any(|holder| holder.id != owner) {
                Some(UserAction::UsernameTaken { username })
            } else {
                Some(UserAction::UsernameAvailable)
            }
        })
    }

    fn owned_current(state: &UserState, username: &str) -> Result<AppUser, ApiError> {
        let caller = state.actor.registered()?;
        let user = state
            .current
            .as_ref()
            .filter(|user| user.username == normalize_username(username))
            .ok_or_else(|| ApiError::not_found("User", username))?;
        if user.id != caller.id {
            return Err(ApiError::forbidden(NOT_OWNER));
        }
        Ok(user.clone())
    }

    fn register(
        state: &mut UserState,
        request: UserRequest,
        env: &UserEnvironment,
    ) -> SmallVec<[Effect<UserAction>; 4]> {
        let identity = match &state.actor {
            Actor::Anonymous => return Self::fail(state, ApiError::NotSignedIn),
            Actor::Registered(user) => {
                let error = ApiError::Conflict(format!(
                    "You already have an account with the username '{}'.",
                    user.username
                ));
                return Self::fail(state, error);
            },
            Actor::Unregistered(identity) => identity.clone(),
        };

        let username = match Self::username(&request.username) {
            Ok(username) => username,
            Err(error) => return Self::fail(state, error),
        };

        let now = env.clock.now();
        let user = AppUser {
            id: identity.id,
            email: identity.email,
            username: username.clone(),
            first_name: request.first_name,
            last_name: request.last_name,
            private: request.private,
            created: now,
            modified: now,
        };
        if let Err(reason) = check_user(&user) {
            return Self::fail(
                state,
                ApiError::internal("register_user", Some(user.id.as_str()), reason),
            );
        }

        let owner = user.id.clone();
        state.pending = Some(PendingWrite::Register(user));
        smallvec![Self::lookup(username, owner, env)]
    }

    fn update(
        state: &mut UserState,
        username: &str,
        request: UserRequest,
        env: &UserEnvironment,
    ) -> SmallVec<[Effect<UserAction>; 4]> {
        let current = match Self::owned_current(state, username) {
            Ok(user) => user,
            Err(error) => return Self::fail(state, error),
        };
        let requested = match Self::username(&request.username) {
            Ok(username) => username,
            Err(error) => return Self::fail(state, error),
        };

        let mut updated = current.clone();
        updated.username = requested.clone();
        updated.first_name = request.first_name;
        updated.last_name = request.last_name;
        updated.private = request.private;
        updated.modified = env.clock.now();
        if let Err(reason) = check_user(&updated) {
            return Self::fail(state, ApiError::validation(reason));
        }

        if requested == current.username {
            return smallvec![Self::write(PendingWrite::Update(updated), env)];
        }
        let owner = updated.id.clone();
        state.pending = Some(PendingWrite::Update(updated));
        smallvec![Self::lookup(requested, owner, env)]
    }

    fn write(pending: PendingWrite, env: &UserEnvironment) -> Effect<UserAction> {
        let entities = Arc::clone(&env.entities);
        Effect::future(async move {
            match pending {
                PendingWrite::Register(user) => match repo::create(entities.as_ref(), &user).await {
                    Ok(()) => Some(UserAction::UserRegistered { user }),
                    Err(EntityStoreError::AlreadyExists(_)) => Some(UserAction::Failed {
                        error: ApiError::Conflict(
                            "An account already exists for this sign-in.".to_string(),
                        ),
                    }),
                    Err(error) => Some(UserAction::Failed {
                        error: insert_failure("register_user", AppUser::KIND, user.id.as_str(), &error),
                    }),
                },
                PendingWrite::Update(user) => match repo::save(entities.as_ref(), &user).await {
                    Ok(()) => Some(UserAction::UserUpdated { user }),
                    Err(error) => Some(UserAction::Failed {
                        error: ApiError::internal("update_user", Some(user.id.as_str()), error),
                    }),
                },
            }
        })
    }

    fn delete(
        state: &mut UserState,
        username: &str,
        env: &UserEnvironment,
    ) -> SmallVec<[Effect<UserAction>; 4]> {
        let user = match Self::owned_current(state, username) {
            Ok(user) => user,
            Err(error) => return Self::fail(state, error),
        };

        let entities = Arc::clone(&env.entities);
        smallvec![Effect::future(async move {
            match repo::remove::<AppUser>(entities.as_ref(), user.id.as_str()).await {
                Ok(_) => Some(UserAction::UserDeleted { user_id: user.id }),
                Err(error) => Some(UserAction::Failed {
                    error: ApiError::internal("delete_user", Some(user.id.as_str()), error),
                }),
            }
        })]
    }
}

impl Reducer for UserReducer {
    type State = UserState;
    type Action = UserAction;
    type Environment = UserEnvironment;

    fn reduce(
        &self,
        state: &mut Self::State,
        action: Self::Action,
        env: &Self::Environment,
    ) -> SmallVec<[Effect<Self::Action>; 4]> {
        match action {
            UserAction::RegisterUser { request } => Self::register(state, request, env),
            UserAction::UpdateUser { username, request } => {
                Self::update(state, &username, request, env)
            },
            UserAction::DeleteUser { username } => Self::delete(state, &username, env),
            UserAction::UsernameAvailable => match state.pending.take() {
                Some(pending) => smallvec![Self::write(pending, env)],
                None => SmallVec::new(),
            },
            UserAction::UsernameTaken { username } => {
                state.pending = None;
                Self::fail(
                    state,
                    ApiError::Conflict(format!("Sorry, the username '{username}' is already taken!")),
                )
            },
            UserAction::UserRegistered { user } => {
                tracing::info!(user_id = %user.id, username = %user.username, "User registered");
                state.outcome = Outcome::Done(user);
                SmallVec::new()
            },
            UserAction::UserUpdated { user } => {
                tracing::info!(user_id = %user.id, username = %user.username, "User updated");
                state.current = Some(user.clone());
                state.outcome = Outcome::Done(user);
                SmallVec::new()
            },
            UserAction::UserDeleted { user_id } => {
                tracing::info!(user_id = %user_id, "User deleted");
                state.outcome = match state.current.take() {
                    Some(user) => Outcome::Done(user),
                    None => Outcome::Failed(ApiError::not_found("User", user_id)),
                };
                SmallVec::new()
            },
            UserAction::Failed { error } => Self::fail(state, error),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)] // Test code can use unwrap/expect
mod tests {
    use super::*;
    use crate::aggregates::dispatch;
    use crate::auth::Identity;
    use crate::storage::InMemoryEntityStore;
    use eventgram_testing::{ReducerTest, assertions, test_clock};
    use proptest::prelude::*;

    fn now() -> DateTime<Utc> {
        test_clock().now()
    }

    fn env(store: &InMemoryEntityStore) -> UserEnvironment {
        UserEnvironment::new(Arc::new(test_clock()), Arc::new(store.clone()))
    }

    fn identity(id: &str) -> Actor {
        Actor::Unregistered(Identity {
            id: UserId::new(id),
            email: format!("{id}@example.com"),
        })
    }

    fn account(id: &str, username: &str) -> AppUser {
        AppUser {
            id: UserId::new(id),
            email: format!("{id}@example.com"),
            username: username.to_string(),
            created: now(),
            modified: now(),
            ..AppUser::default()
        }
    }

    fn request(username: &str) -> UserRequest {
        UserRequest {
            username: username.to_string(),
            first_name: "Ada".to_string(),
            last_name: "Lovelace".to_string(),
            private: false,
        }
    }

    #[test]
    fn usernames_are_normalized_and_checked() {
        assert_eq!(normalize_username("  Ada.L  "), "ada.l");
        assert_eq!(check_username("ada_l-1.x"), Ok(()));
        assert_eq!(check_username(""), Err(UsernameError::Empty));
        assert_eq!(check_username(&"a".repeat(31)), Err(UsernameError::TooLong));
        assert_eq!(check_username("ada lovelace"), Err(UsernameError::InvalidCharacter));
        assert_eq!(check_username("ädä"), Err(UsernameError::InvalidCharacter));
    }

    #[test]
    fn user_gate_requires_every_server_field() {
        assert_eq!(check_user(&account("u1", "ada")), Ok(()));
        assert_eq!(check_user(&account("", "ada")), Err(UserRuleError::MissingId));
        assert_eq!(check_user(&account("u1", "")), Err(UserRuleError::MissingUsername));

        let mut unmodified = account("u1", "ada");
        unmodified.modified = DateTime::<Utc>::default();
        assert_eq!(check_user(&unmodified), Err(UserRuleError::MissingModified));
    }

    proptest! {
        #[test]
        fn normalized_valid_names_stay_valid(raw in "[A-Za-z0-9_.-]{1,30}") {
            let username = normalize_username(&raw);
            prop_assert_eq!(check_username(&username), Ok(()));
            prop_assert_eq!(normalize_username(&username), username);
        }
    }

    #[test]
    fn anonymous_callers_cannot_register() {
        ReducerTest::new(UserReducer::new())
            .with_env(env(&InMemoryEntityStore::new()))
            .given_state(UserState::new(Actor::Anonymous))
            .when_action(UserAction::RegisterUser {
                request: request("ada"),
            })
            .then_state(|state| {
                assert_eq!(state.outcome, Outcome::Failed(ApiError::NotSignedIn));
            })
            .then_effects(assertions::assert_no_effects)
            .run();
    }

    #[test]
    fn registered_callers_get_a_conflict() {
        ReducerTest::new(UserReducer::new())
            .with_env(env(&InMemoryEntityStore::new()))
            .given_state(UserState::new(Actor::Registered(account("u1", "ada"))))
            .when_action(UserAction::RegisterUser {
                request: request("other"),
            })
            .then_state(|state| {
                assert_eq!(
                    state.outcome,
                    Outcome::Failed(ApiError::Conflict(
                        "You already have an account with the username 'ada'.".to_string()
                    ))
                );
            })
            .run();
    }

    #[test]
    fn register_looks_up_the_username_first() {
        ReducerTest::new(UserReducer::new())
            .with_env(env(&InMemoryEntityStore::new()))
            .given_state(UserState::new(identity("u1")))
            .when_action(UserAction::RegisterUser {
                request: request(" Ada "),
            })
            .then_state(|state| {
                let Some(PendingWrite::Register(user)) = &state.pending else {
                    unreachable!("registration should wait for the lookup");
                };
                assert_eq!(user.username, "ada");
                assert_eq!(user.email, "u1@example.com");
                assert!(state.outcome.is_pending());
            })
            .then_effects(assertions::assert_has_future_effect)
            .run();
    }

    #[tokio::test]
    async fn register_stores_the_account() {
        let store = InMemoryEntityStore::new();
        let settled = dispatch(
            UserReducer::new(),
            UserState::new(identity("u1")),
            env(&store),
            UserAction::RegisterUser {
                request: request("Ada"),
            },
        )
        .await
        .unwrap();

        let user = settled.outcome.into_result("register_user").unwrap();
        assert_eq!(user.username, "ada");
        assert_eq!(repo::fetch::<AppUser>(&store, "u1").await.unwrap(), Some(user));
    }

    #[tokio::test]
    async fn taken_username_is_a_conflict() {
        let store = InMemoryEntityStore::new();
        repo::save(&store, &account("u2", "ada")).await.unwrap();

        let settled = dispatch(
            UserReducer::new(),
            UserState::new(identity("u1")),
            env(&store),
            UserAction::RegisterUser {
                request: request("ADA"),
            },
        )
        .await
        .unwrap();

        assert_eq!(
            settled.outcome,
            Outcome::Failed(ApiError::Conflict(
                "Sorry, the username 'ada' is already taken!".to_string()
            ))
        );
        assert_eq!(store.count(AppUser::KIND), 1);
    }

    #[test]
    fn updating_another_user_is_forbidden() {
        ReducerTest::new(UserReducer::new())
            .with_env(env(&InMemoryEntityStore::new()))
            .given_state(
                UserState::new(Actor::Registered(account("u2", "bob")))
                    .with_current(Some(account("u1", "ada"))),
            )
            .when_action(UserAction::UpdateUser {
                username: "ada".to_string(),
                request: request("ada"),
            })
            .then_state(|state| {
                assert_eq!(state.outcome, Outcome::Failed(ApiError::forbidden(NOT_OWNER)));
            })
            .then_effects(assertions::assert_no_effects)
            .run();
    }

    #[tokio::test]
    async fn update_without_rename_skips_the_lookup() {
        let store = InMemoryEntityStore::new();
        let ada = account("u1", "ada");
        repo::save(&store, &ada).await.unwrap();

        let mut change = request("ada");
        change.private = true;
        let settled = dispatch(
            UserReducer::new(),
            UserState::new(Actor::Registered(ada.clone())).with_current(Some(ada)),
            env(&store),
            UserAction::UpdateUser {
                username: "ada".to_string(),
                request: change,
            },
        )
        .await
        .unwrap();

        let user = settled.outcome.into_result("update_user").unwrap();
        assert!(user.private);
        assert_eq!(user.first_name, "Ada");
    }

    #[tokio::test]
    async fn rename_to_a_taken_username_is_a_conflict() {
        let store = InMemoryEntityStore::new();
        let ada = account("u1", "ada");
        repo::save(&store, &ada).await.unwrap();
        repo::save(&store, &account("u2", "bob")).await.unwrap();

        let settled = dispatch(
            UserReducer::new(),
            UserState::new(Actor::Registered(ada.clone())).with_current(Some(ada)),
            env(&store),
            UserAction::UpdateUser {
                username: "ada".to_string(),
                request: request("bob"),
            },
        )
        .await
        .unwrap();

        assert!(matches!(settled.outcome, Outcome::Failed(ApiError::Conflict(_))));
        let kept = repo::fetch::<AppUser>(&store, "u1").await.unwrap().unwrap();
        assert_eq!(kept.username, "ada");
    }

    #[tokio::test]
    async fn delete_removes_the_account() {
        let store = InMemoryEntityStore::new();
        let ada = account("u1", "ada");
        repo::save(&store, &ada).await.unwrap();

        let settled = dispatch(
            UserReducer::new(),
            UserState::new(Actor::Registered(ada.clone())).with_current(Some(ada)),
            env(&store),
            UserAction::DeleteUser {
                username: "ada".to_string(),
            },
        )
        .await
        .unwrap();

        assert!(matches!(settled.outcome, Outcome::Done(_)));
        assert_eq!(store.count(AppUser::KIND), 0);
    }
}
