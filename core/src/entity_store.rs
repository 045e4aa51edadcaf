//! Entity store trait and related types.
//!
//! The entity store is a keyed, schema-less persistence service. Records are
//! JSON documents addressed by an [`EntityKey`] of the form `"<kind>:<id>"`.
//! Each mutation touches a single record; nothing here assumes multi-record
//! transactions.
//!
//! # Example
//!
//! ```no_run
//! use eventgram_core::entity_store::{Direction, EntityKey, EntityStore, EntityStoreError, Query};
//!
//! async fn example(store: &dyn EntityStore) -> Result<(), EntityStoreError> {
//!     let key = EntityKey::new("event", "5a1f0c2d");
//!     store.put(key.clone(), serde_json::json!({ "name": "Launch party" })).await?;
//!
//!     let recent = store
//!         .query(
//!             Query::new("post")
//!                 .filter("event", "5a1f0c2d")
//!                 .order_by("posted", Direction::Descending)
//!                 .limit(20),
//!         )
//!         .await?;
//!     assert!(recent.len() <= 20);
//!     Ok(())
//! }
//! ```

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// A stored record.
pub type Record = serde_json::Value;

/// Deterministic key of a stored entity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityKey {
    kind: String,
    id: String,
}

impl EntityKey {
    /// Creates a key for the entity `id` of the given `kind`.
    #[must_use]
    pub fn new(kind: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            id: id.into(),
        }
    }

    /// The entity kind (`event`, `post`, `user`).
    #[must_use]
    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// The entity identifier within its kind.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }
}

impl fmt::Display for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.id)
    }
}

/// Sort direction of a query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    /// Smallest values first
    Ascending,
    /// Largest values first
    Descending,
}

/// Sort order of a query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortOrder {
    /// Record field to sort by
    pub field: String,
    /// Sort direction
    pub direction: Direction,
}

/// Equality filter on a record field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Filter {
    /// Record field to compare
    pub field: String,
    /// Value the field must equal
    pub value: Record,
}

/// A filtered, ordered, paged query over one entity kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Query {
    /// Entity kind to scan
    pub kind: String,
    /// All filters must match
    pub filters: Vec<Filter>,
    /// Optional sort order
    pub order: Option<SortOrder>,
    /// Maximum number of records returned
    pub limit: Option<usize>,
    /// Number of matching records skipped
    pub offset: usize,
}

impl Query {
    /// Starts a query over the given entity kind.
    #[must_use]
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            filters: Vec::new(),
            order: None,
            limit: None,
            offset: 0,
        }
    }

    /// Adds an equality filter.
    #[must_use]
    pub fn filter(mut self, field: impl Into<String>, value: impl Into<Record>) -> Self {
        self.filters.push(Filter {
            field: field.into(),
            value: value.into(),
        });
        self
    }

    /// Sets the sort order.
    #[must_use]
    pub fn order_by(mut self, field: impl Into<String>, direction: Direction) -> Self {
        self.order = Some(SortOrder {
            field: field.into(),
            direction,
        });
        self
    }

    /// Limits the number of records returned.
    #[must_use]
    pub const fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Skips the first `offset` matching records.
    #[must_use]
    pub const fn offset(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }

    /// Returns `true` if `record` satisfies every filter.
    #[must_use]
    pub fn matches(&self, record: &Record) -> bool {
        self.filters
            .iter()
            .all(|filter| record.get(&filter.field) == Some(&filter.value))
    }
}

/// Errors that can occur during entity store operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EntityStoreError {
    /// No record exists under the key.
    #[error("Entity not found: {0}")]
    NotFound(EntityKey),

    /// A conditional insert found an existing record.
    #[error("Entity already exists: {0}")]
    AlreadyExists(EntityKey),

    /// A record could not be converted to or from its typed form.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// The storage backend failed.
    #[error("Storage backend error: {0}")]
    Backend(String),
}

/// Entity store abstraction.
///
/// # Dyn Compatibility
///
/// This trait uses explicit `Pin<Box<dyn Future>>` returns instead of `async fn`
/// so it can be shared as `Arc<dyn EntityStore>` and captured by effects.
pub trait EntityStore: Send + Sync {
    /// Loads the record stored under `key`.
    ///
    /// # Errors
    ///
    /// Returns [`EntityStoreError::NotFound`] if there is no such record.
    fn get(
        &self,
        key: EntityKey,
    ) -> Pin<Box<dyn Future<Output = Result<Record, EntityStoreError>> + Send + '_>>;

    /// Stores `record` under `key`, replacing any previous record.
    ///
    /// # Errors
    ///
    /// Returns [`EntityStoreError::Backend`] if the write fails.
    fn put(
        &self,
        key: EntityKey,
        record: Record,
    ) -> Pin<Box<dyn Future<Output = Result<EntityKey, EntityStoreError>> + Send + '_>>;

    /// Stores `record` under `key` only if no record exists yet.
    ///
    /// # Errors
    ///
    /// Returns [`EntityStoreError::AlreadyExists`] if the key is taken.
    fn insert(
        &self,
        key: EntityKey,
        record: Record,
    ) -> Pin<Box<dyn Future<Output = Result<EntityKey, EntityStoreError>> + Send + '_>>;

    /// Deletes the record stored under `key`.
    ///
    /// # Errors
    ///
    /// Returns [`EntityStoreError::NotFound`] if there is no such record.
    fn delete(
        &self,
        key: EntityKey,
    ) -> Pin<Box<dyn Future<Output = Result<(), EntityStoreError>> + Send + '_>>;

    /// Runs a filtered, ordered, paged query.
    ///
    /// # Errors
    ///
    /// Returns [`EntityStoreError::Backend`] if the scan fails.
    fn query(
        &self,
        query: Query,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<Record>, EntityStoreError>> + Send + '_>>;
}

/// A typed record persisted in an [`EntityStore`].
pub trait Entity: Serialize + DeserializeOwned + Send + Sync {
    /// Kind segment of the entity key.
    const KIND: &'static str;

    /// Identifier segment of the entity key.
    fn entity_id(&self) -> &str;

    /// Key of this entity.
    fn key(&self) -> EntityKey {
        EntityKey::new(Self::KIND, self.entity_id())
    }

    /// Key of the entity of this kind with the given identifier.
    fn key_for(id: &str) -> EntityKey {
        EntityKey::new(Self::KIND, id)
    }

    /// Converts the entity to a record.
    ///
    /// # Errors
    ///
    /// Returns [`EntityStoreError::Serialization`] if serialization fails.
    fn to_record(&self) -> Result<Record, EntityStoreError> {
        serde_json::to_value(self).map_err(|e| EntityStoreError::Serialization(e.to_string()))
    }

    /// Builds an entity from a record.
    ///
    /// # Errors
    ///
    /// Returns [`EntityStoreError::Serialization`] if the record does not match the type.
    fn from_record(record: Record) -> Result<Self, EntityStoreError> {
        serde_json::from_value(record).map_err(|e| EntityStoreError::Serialization(e.to_string()))
    }
}
