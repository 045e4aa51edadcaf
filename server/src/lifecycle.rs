//! Event lifecycle and post eligibility rules.
//!
//! Every predicate takes `now` explicitly; callers read it from the injected
//! [`Clock`](eventgram_core::environment::Clock). Validation is tiered and
//! short-circuits on the first failure:
//!
//! 1. [`check_duration`]: the time window alone
//! 2. [`check_request`]: a client payload, before server fields exist
//! 3. [`check_record`]: the final gate, right before persistence
//!
//! Activity ([`is_active`]) is derived at read time and never stored.

use crate::config::PolicyConfig;
use crate::types::{Event, EventRequest, Post};
use chrono::{DateTime, Duration, Utc};
use thiserror::Error;

/// Configurable limits applied to event windows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventPolicy {
    /// Longest allowed `end - start`
    pub max_length: Duration,
    /// Furthest allowed `start - now`
    pub max_lookahead: Duration,
    /// Whether an event that already ended may still be updated
    pub allow_extending_expired: bool,
    /// Strict mode: a description is required
    pub require_description: bool,
}

impl Default for EventPolicy {
    fn default() -> Self {
        Self::from(&PolicyConfig::default())
    }
}

impl From<&PolicyConfig> for EventPolicy {
    fn from(config: &PolicyConfig) -> Self {
        Self {
            max_length: Duration::try_hours(config.max_event_length_hours)
                .unwrap_or_else(|| Duration::weeks(1)),
            max_lookahead: Duration::try_hours(config.max_lookahead_hours)
                .unwrap_or_else(|| Duration::weeks(4)),
            allow_extending_expired: config.allow_extending_expired,
            require_description: config.require_description,
        }
    }
}

/// Why an event window is not acceptable.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum DurationError {
    /// No start time
    #[error("Event start time is required.")]
    MissingStart,

    /// No end time
    #[error("Event end time is required.")]
    MissingEnd,

    /// Start after end
    #[error("Event cannot end before it starts.")]
    StartAfterEnd,

    /// End already passed
    #[error("Event has already ended.")]
    Ended,

    /// Window longer than the policy allows
    #[error("Event cannot last longer than {max_hours} hours.")]
    TooLong {
        /// Policy limit in hours
        max_hours: i64,
    },

    /// Start too far in the future
    #[error("Event cannot start more than {max_hours} hours from now.")]
    TooFarAhead {
        /// Policy limit in hours
        max_hours: i64,
    },
}

/// Why an event payload or record is not acceptable.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventRuleError {
    /// Record has no identifier
    #[error("Event identifier is required.")]
    MissingId,

    /// Empty name
    #[error("Event name is required.")]
    MissingName,

    /// Empty description in strict mode
    #[error("Event description is required.")]
    MissingDescription,

    /// Record has no creator
    #[error("Event creator is required.")]
    MissingCreator,

    /// Record has no creation time
    #[error("Event creation time is required.")]
    MissingCreated,

    /// Window rejected
    #[error(transparent)]
    Duration(#[from] DurationError),
}

/// Checks an event window against the policy.
///
/// # Errors
///
/// Returns the first failing rule, in this order: unset start, unset end,
/// `start > end`, `end < now`, window too long, start too far ahead.
pub fn check_duration(
    start: Option<DateTime<Utc>>,
    end: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
    policy: &EventPolicy,
) -> Result<(), DurationError> {
    let start = start.ok_or(DurationError::MissingStart)?;
    let end = end.ok_or(DurationError::MissingEnd)?;

    if start > end {
        return Err(DurationError::StartAfterEnd);
    }
    if end < now {
        return Err(DurationError::Ended);
    }
    if end - start > policy.max_length {
        return Err(DurationError::TooLong {
            max_hours: policy.max_length.num_hours(),
        });
    }
    if start - now > policy.max_lookahead {
        return Err(DurationError::TooFarAhead {
            max_hours: policy.max_lookahead.num_hours(),
        });
    }
    Ok(())
}

/// Boolean form of [`check_duration`].
#[must_use]
pub fn has_valid_duration(
    start: Option<DateTime<Utc>>,
    end: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
    policy: &EventPolicy,
) -> bool {
    check_duration(start, end, now, policy).is_ok()
}

/// Gate for client payloads.
///
/// # Errors
///
/// Returns the first failing rule: name, description (strict mode), window.
pub fn check_request(
    request: &EventRequest,
    now: DateTime<Utc>,
    policy: &EventPolicy,
) -> Result<(), EventRuleError> {
    if request.name.trim().is_empty() {
        return Err(EventRuleError::MissingName);
    }
    if policy.require_description && request.description.trim().is_empty() {
        return Err(EventRuleError::MissingDescription);
    }
    check_duration(request.start, request.end, now, policy)?;
    Ok(())
}

/// Boolean form of [`check_request`].
#[must_use]
pub fn is_valid_request(request: &EventRequest, now: DateTime<Utc>, policy: &EventPolicy) -> bool {
    check_request(request, now, policy).is_ok()
}

/// Final gate for a complete event record.
///
/// # Errors
///
/// Returns the first failing rule: identifier, name, description (strict
/// mode), creator, creation time, window.
pub fn check_record(
    event: &Event,
    now: DateTime<Utc>,
    policy: &EventPolicy,
) -> Result<(), EventRuleError> {
    if event.id.is_empty() {
        return Err(EventRuleError::MissingId);
    }
    if event.name.trim().is_empty() {
        return Err(EventRuleError::MissingName);
    }
    if policy.require_description && event.description.trim().is_empty() {
        return Err(EventRuleError::MissingDescription);
    }
    if event.creator.is_empty() {
        return Err(EventRuleError::MissingCreator);
    }
    if event.created == DateTime::<Utc>::default() {
        return Err(EventRuleError::MissingCreated);
    }
    check_duration(event.start, event.end, now, policy)?;
    Ok(())
}

/// Boolean form of [`check_record`].
#[must_use]
pub fn is_valid(event: &Event, now: DateTime<Utc>, policy: &EventPolicy) -> bool {
    check_record(event, now, policy).is_ok()
}

/// An event is active when its window is valid and strictly contains `now`.
#[must_use]
pub fn is_active(event: &Event, now: DateTime<Utc>, policy: &EventPolicy) -> bool {
    match (event.start, event.end) {
        (Some(start), Some(end)) => {
            has_valid_duration(event.start, event.end, now, policy) && end > now && start < now
        },
        _ => false,
    }
}

/// Moves a start in the past forward to `now`.
#[must_use]
pub fn clamp_start(start: Option<DateTime<Utc>>, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    start.map(|start| start.max(now))
}

/// Why a post cannot be written against an event.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ineligible {
    /// The referenced event does not exist
    #[error("Post does not match an existing event.")]
    NoSuchEvent,

    /// The referenced event exists but is not active
    #[error("This event is not currently active.")]
    Inactive,
}

/// Posts may only be created or edited while their event is active.
///
/// # Errors
///
/// [`Ineligible::NoSuchEvent`] when `event` is `None`,
/// [`Ineligible::Inactive`] when it is outside its window.
pub fn check_post_eligibility(
    event: Option<&Event>,
    now: DateTime<Utc>,
    policy: &EventPolicy,
) -> Result<(), Ineligible> {
    let event = event.ok_or(Ineligible::NoSuchEvent)?;
    if is_active(event, now, policy) {
        Ok(())
    } else {
        Err(Ineligible::Inactive)
    }
}

/// Boolean form of [`check_post_eligibility`].
#[must_use]
pub fn can_create_or_update_post(
    event: Option<&Event>,
    now: DateTime<Utc>,
    policy: &EventPolicy,
) -> bool {
    check_post_eligibility(event, now, policy).is_ok()
}

/// Why a post record is not complete.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum PostRuleError {
    /// No owning user
    #[error("Post owner is required.")]
    MissingUser,

    /// No identifier
    #[error("Post identifier is required.")]
    MissingId,

    /// No event reference
    #[error("Post must reference an event.")]
    MissingEvent,

    /// No creation time
    #[error("Post creation time is required.")]
    MissingPosted,
}

/// Final gate for a post record.
///
/// # Errors
///
/// Returns the first missing field: user, id, event, posted.
pub fn check_post(post: &Post) -> Result<(), PostRuleError> {
    if post.user.is_empty() {
        return Err(PostRuleError::MissingUser);
    }
    if post.id.is_empty() {
        return Err(PostRuleError::MissingId);
    }
    if post.event.is_empty() {
        return Err(PostRuleError::MissingEvent);
    }
    if post.posted == DateTime::<Utc>::default() {
        return Err(PostRuleError::MissingPosted);
    }
    Ok(())
}
