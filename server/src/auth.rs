//! Caller resolution.
//!
//! The caller is resolved once per request by the [`Caller`] extractor and
//! passed explicitly into every decision as an [`Actor`]:
//!
//! 1. Read the bearer token (none → [`Actor::Anonymous`])
//! 2. Resolve it with the [`IdentityProvider`] (unknown → anonymous)
//! 3. Load the user record keyed by the identity's user id
//!    (absent → [`Actor::Unregistered`])

use crate::error::ApiError;
use crate::server::AppState;
use crate::storage::repo;
use crate::types::{AppUser, Event, UserId};
use axum::{async_trait, extract::FromRequestParts, http::request::Parts};
use eventgram_web::BearerToken;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// Identity asserted by the identity provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    /// Provider user id (also the key of the user record)
    pub id: UserId,
    /// Verified email address
    pub email: String,
}

/// Identity provider failures.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    /// The provider could not be reached
    #[error("Identity provider unavailable: {0}")]
    Unavailable(String),
}

/// Resolves bearer tokens to identities.
pub trait IdentityProvider: Send + Sync {
    /// Resolves `token`; `Ok(None)` when the token is unknown.
    ///
    /// # Errors
    ///
    /// [`AuthError`] when the provider cannot answer.
    fn resolve(
        &self,
        token: String,
    ) -> Pin<Box<dyn Future<Output = Result<Option<Identity>, AuthError>> + Send + '_>>;
}

/// Identity provider with a fixed token table.
#[derive(Debug, Clone, Default)]
pub struct StaticIdentityProvider {
    tokens: HashMap<String, Identity>,
}

impl StaticIdentityProvider {
    /// Parses `token=user_id:email` entries separated by `;`.
    ///
    /// Malformed entries are skipped with a warning.
    #[must_use]
    pub fn parse(table: &str) -> Self {
        let mut tokens = HashMap::new();
        for entry in table.split(';').map(str::trim).filter(|e| !e.is_empty()) {
            let parsed = entry.split_once('=').and_then(|(token, identity)| {
                let (id, email) = identity.split_once(':')?;
                let (token, id) = (token.trim(), id.trim());
                if token.is_empty() || id.is_empty() {
                    return None;
                }
                Some((
                    token.to_string(),
                    Identity {
                        id: UserId::new(id),
                        email: email.trim().to_string(),
                    },
                ))
            });

            match parsed {
                Some((token, identity)) => {
                    tokens.insert(token, identity);
                },
                None => tracing::warn!("Skipping malformed static token entry"),
            }
        }
        Self { tokens }
    }

    /// Number of known tokens.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    /// True when no tokens are configured.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

impl IdentityProvider for StaticIdentityProvider {
    fn resolve(
        &self,
        token: String,
    ) -> Pin<Box<dyn Future<Output = Result<Option<Identity>, AuthError>> + Send + '_>> {
        let identity = self.tokens.get(&token).cloned();
        Box::pin(async move { Ok(identity) })
    }
}

/// The resolved caller of a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Actor {
    /// No valid credential
    Anonymous,
    /// Signed in without an account
    Unregistered(Identity),
    /// Signed in with an account
    Registered(AppUser),
}

impl Actor {
    /// The caller's account.
    ///
    /// # Errors
    ///
    /// [`ApiError::NotSignedIn`] or [`ApiError::NotRegistered`].
    pub fn registered(&self) -> Result<&AppUser, ApiError> {
        match self {
            Self::Anonymous => Err(ApiError::NotSignedIn),
            Self::Unregistered(_) => Err(ApiError::NotRegistered),
            Self::Registered(user) => Ok(user),
        }
    }

    /// The caller's user id, if signed in.
    #[must_use]
    pub const fn user_id(&self) -> Option<&UserId> {
        match self {
            Self::Anonymous => None,
            Self::Unregistered(identity) => Some(&identity.id),
            Self::Registered(user) => Some(&user.id),
        }
    }

    /// Fails unless the caller is signed in.
    ///
    /// # Errors
    ///
    /// [`ApiError::NotSignedIn`].
    pub fn signed_in(&self) -> Result<(), ApiError> {
        match self {
            Self::Anonymous => Err(ApiError::NotSignedIn),
            _ => Ok(()),
        }
    }
}

/// Private events are visible to their creator only.
#[must_use]
pub fn can_view_event(event: &Event, actor: &Actor) -> bool {
    !event.private || actor.user_id() == Some(&event.creator)
}

/// Private profiles are visible to their owner only.
#[must_use]
pub fn can_view_user(user: &AppUser, actor: &Actor) -> bool {
    !user.private || actor.user_id() == Some(&user.id)
}

/// Extractor resolving the caller of a request.
#[derive(Debug, Clone)]
pub struct Caller(pub Actor);

#[async_trait]
impl FromRequestParts<AppState> for Caller {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let BearerToken(token) = match BearerToken::from_request_parts(parts, state).await {
            Ok(token) => token,
            Err(never) => match never {},
        };
        let Some(token) = token else {
            return Ok(Self(Actor::Anonymous));
        };

        let identity = state
            .identity
            .resolve(token)
            .await
            .map_err(|e| ApiError::internal("resolve_identity", None, e))?;
        let Some(identity) = identity else {
            tracing::warn!("Unknown bearer token");
            return Ok(Self(Actor::Anonymous));
        };

        match repo::fetch::<AppUser>(state.entities.as_ref(), identity.id.as_str()).await {
            Ok(Some(user)) => Ok(Self(Actor::Registered(user))),
            Ok(None) => Ok(Self(Actor::Unregistered(identity))),
            Err(error) => Err(ApiError::internal(
                "load_caller",
                Some(identity.id.as_str()),
                error,
            )),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)] // Test code can use unwrap/expect
mod tests {
    use super::*;

    #[tokio::test]
    async fn parses_static_token_table() {
        let provider =
            StaticIdentityProvider::parse("tok-a=u1:ada@example.com; tok-b = u2:bob@example.com;");
        assert_eq!(provider.len(), 2);

        let ada = provider.resolve("tok-a".to_string()).await.unwrap().unwrap();
        assert_eq!(ada.id, UserId::new("u1"));
        assert_eq!(ada.email, "ada@example.com");
        assert!(provider.resolve("tok-z".to_string()).await.unwrap().is_none());
    }

    #[test]
    fn skips_malformed_entries() {
        let provider = StaticIdentityProvider::parse("broken;=u1:x;tok=:x;tok-ok=u3:c@example.com");
        assert_eq!(provider.len(), 1);
        assert!(StaticIdentityProvider::parse("").is_empty());
    }

    #[test]
    fn actor_gates() {
        let identity = Identity {
            id: UserId::new("u1"),
            email: "ada@example.com".to_string(),
        };

        assert_eq!(Actor::Anonymous.registered(), Err(ApiError::NotSignedIn));
        assert_eq!(
            Actor::Unregistered(identity.clone()).registered(),
            Err(ApiError::NotRegistered)
        );
        assert_eq!(Actor::Anonymous.signed_in(), Err(ApiError::NotSignedIn));
        assert_eq!(Actor::Unregistered(identity).signed_in(), Ok(()));
    }

    #[test]
    fn private_event_visible_to_creator_only() {
        let event = Event {
            private: true,
            creator: UserId::new("u1"),
            ..Event::default()
        };
        let owner = Actor::Registered(AppUser {
            id: UserId::new("u1"),
            ..AppUser::default()
        });
        let other = Actor::Registered(AppUser {
            id: UserId::new("u2"),
            ..AppUser::default()
        });

        assert!(can_view_event(&event, &owner));
        assert!(!can_view_event(&event, &other));
        assert!(!can_view_event(&event, &Actor::Anonymous));
        assert!(can_view_event(&Event::default(), &Actor::Anonymous));
    }
}
