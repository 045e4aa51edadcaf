//! Domain types for Eventgram.
//!
//! Records are stored as JSON documents, so the serde shape of each type is
//! both the storage schema and the wire format. Request types carry only the
//! fields a client may set; server-owned fields are filled in by the reducers.

use crate::lifecycle::{self, EventPolicy};
use chrono::{DateTime, Utc};
use eventgram_core::entity_store::Entity;
use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Wraps an existing identifier
            #[must_use]
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// The identifier as a string slice
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// True until the server assigns an identifier
            #[must_use]
            pub fn is_empty(&self) -> bool {
                self.0.is_empty()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

string_id!(
    /// Unique identifier for an event
    EventId
);
string_id!(
    /// Unique identifier for a post
    PostId
);
string_id!(
    /// Identifier of a user, issued by the identity provider
    UserId
);

// ============================================================================
// Event
// ============================================================================

/// A time-bounded event that posts attach to.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Event {
    /// Server-assigned identifier, immutable after creation
    pub id: EventId,
    /// Display name
    pub name: String,
    /// Description (required in strict mode)
    #[serde(rename = "desc", default)]
    pub description: String,
    /// Start of the active window
    #[serde(default)]
    pub start: Option<DateTime<Utc>>,
    /// End of the active window
    #[serde(default)]
    pub end: Option<DateTime<Utc>>,
    /// Private events are only visible to their creator
    #[serde(default)]
    pub private: bool,
    /// User who created the event
    pub creator: UserId,
    /// Creation time, immutable
    pub created: DateTime<Utc>,
    /// Time of the last mutation
    pub modified: DateTime<Utc>,
}

impl Entity for Event {
    const KIND: &'static str = "event";

    fn entity_id(&self) -> &str {
        self.id.as_str()
    }
}

/// Client payload for creating or updating an event.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct EventRequest {
    /// Display name
    pub name: String,
    /// Description
    #[serde(rename = "desc")]
    pub description: String,
    /// Requested start (clamped forward to now when in the past)
    pub start: Option<DateTime<Utc>>,
    /// Requested end
    pub end: Option<DateTime<Utc>>,
    /// Visibility
    pub private: bool,
}

/// Event as returned to clients, with activity derived at read time.
#[derive(Debug, Clone, Serialize)]
pub struct EventView {
    /// The stored event
    #[serde(flatten)]
    pub event: Event,
    /// Whether the event is active at the time of the read
    #[serde(rename = "isActive")]
    pub is_active: bool,
}

impl EventView {
    /// Builds the view of `event` as seen at `now`.
    #[must_use]
    pub fn at(event: Event, now: DateTime<Utc>, policy: &EventPolicy) -> Self {
        let is_active = lifecycle::is_active(&event, now, policy);
        Self { event, is_active }
    }
}

// ============================================================================
// Post
// ============================================================================

/// Text and optional image attached to an event.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Post {
    /// Owning user
    pub user: UserId,
    /// Server-assigned identifier
    pub id: PostId,
    /// Referenced event, immutable after creation
    pub event: EventId,
    /// Public link of the attached image, set at most once
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    /// Text body (may be empty)
    #[serde(default)]
    pub text: String,
    /// Creation time
    pub posted: DateTime<Utc>,
    /// Time of the last mutation
    pub modified: DateTime<Utc>,
}

impl Entity for Post {
    const KIND: &'static str = "post";

    fn entity_id(&self) -> &str {
        self.id.as_str()
    }
}

/// Client payload for creating or updating a post.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct PostRequest {
    /// Event the post belongs to (required on create, immutable afterwards)
    pub event: Option<EventId>,
    /// Text body
    pub text: String,
}

/// Post as returned to clients, with the author's username resolved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PostView {
    /// Author's username
    pub username: String,
    /// Post identifier
    pub id: PostId,
    /// Referenced event
    pub event: EventId,
    /// Public image link
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    /// Text body
    pub text: String,
    /// Creation time
    pub posted: DateTime<Utc>,
    /// Time of the last mutation
    pub modified: DateTime<Utc>,
}

impl PostView {
    /// Combines a post with its author's username.
    #[must_use]
    pub fn new(post: Post, username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            id: post.id,
            event: post.event,
            image: post.image,
            text: post.text,
            posted: post.posted,
            modified: post.modified,
        }
    }
}

// ============================================================================
// User
// ============================================================================

/// A registered account, keyed by the identity provider's user id.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppUser {
    /// Identity provider user id
    pub id: UserId,
    /// Email reported by the identity provider (never exposed in views)
    #[serde(default)]
    pub email: String,
    /// Unique, lower-cased username
    pub username: String,
    /// Given name
    #[serde(default)]
    pub first_name: String,
    /// Family name
    #[serde(default)]
    pub last_name: String,
    /// Private profiles are only visible to their owner
    #[serde(default)]
    pub private: bool,
    /// Registration time
    pub created: DateTime<Utc>,
    /// Time of the last mutation
    pub modified: DateTime<Utc>,
}

impl Entity for AppUser {
    const KIND: &'static str = "user";

    fn entity_id(&self) -> &str {
        self.id.as_str()
    }
}

/// Client payload for registering or updating an account.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct UserRequest {
    /// Requested username (normalized before use)
    pub username: String,
    /// Given name
    pub first_name: String,
    /// Family name
    pub last_name: String,
    /// Visibility
    pub private: bool,
}

/// Public profile of a user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserView {
    /// User id
    pub id: UserId,
    /// Username
    pub username: String,
    /// Given name
    pub first_name: String,
    /// Family name
    pub last_name: String,
    /// Visibility
    pub private: bool,
    /// Registration time
    pub created: DateTime<Utc>,
    /// Time of the last mutation
    pub modified: DateTime<Utc>,
}

impl From<AppUser> for UserView {
    fn from(user: AppUser) -> Self {
        Self {
            id: user.id,
            username: user.username,
            first_name: user.first_name,
            last_name: user.last_name,
            private: user.private,
            created: user.created,
            modified: user.modified,
        }
    }
}
