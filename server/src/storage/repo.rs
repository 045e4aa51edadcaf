//! Typed access to the entity store.
//!
//! Thin wrappers that translate between [`Entity`] values and JSON records.

use eventgram_core::entity_store::{Entity, EntityStore, EntityStoreError, Query};

/// Loads `T` by id; `None` when absent.
///
/// # Errors
///
/// Backend or deserialization failures.
pub async fn fetch<T: Entity>(
    store: &dyn EntityStore,
    id: &str,
) -> Result<Option<T>, EntityStoreError> {
    match store.get(T::key_for(id)).await {
        Ok(record) => T::from_record(record).map(Some),
        Err(EntityStoreError::NotFound(_)) => Ok(None),
        Err(error) => Err(error),
    }
}

/// Writes `entity`, replacing any existing record.
///
/// # Errors
///
/// Backend or serialization failures.
pub async fn save<T: Entity>(store: &dyn EntityStore, entity: &T) -> Result<(), EntityStoreError> {
    store.put(entity.key(), entity.to_record()?).await.map(|_| ())
}

/// Writes `entity` only if no record exists under its key.
///
/// # Errors
///
/// [`EntityStoreError::AlreadyExists`] when the key is taken, plus backend
/// or serialization failures.
pub async fn create<T: Entity>(
    store: &dyn EntityStore,
    entity: &T,
) -> Result<(), EntityStoreError> {
    store.insert(entity.key(), entity.to_record()?).await.map(|_| ())
}

/// Deletes `T` by id; `false` when it was already gone.
///
/// # Errors
///
/// Backend failures.
pub async fn remove<T: Entity>(store: &dyn EntityStore, id: &str) -> Result<bool, EntityStoreError> {
    match store.delete(T::key_for(id)).await {
        Ok(()) => Ok(true),
        Err(EntityStoreError::NotFound(_)) => Ok(false),
        Err(error) => Err(error),
    }
}

/// Runs `query` and decodes every record as `T`.
///
/// # Errors
///
/// Backend or deserialization failures.
pub async fn find<T: Entity>(
    store: &dyn EntityStore,
    query: Query,
) -> Result<Vec<T>, EntityStoreError> {
    store
        .query(query)
        .await?
        .into_iter()
        .map(T::from_record)
        .collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)] // Test code can use unwrap/expect
mod tests {
    use super::*;
    use crate::storage::InMemoryEntityStore;
    use crate::types::{Event, EventId, UserId};

    fn event(id: &str) -> Event {
        Event {
            id: EventId::new(id),
            name: "Launch".to_string(),
            creator: UserId::new("u1"),
            ..Event::default()
        }
    }

    #[tokio::test]
    async fn typed_round_trip_through_the_store() {
        let store = InMemoryEntityStore::new();
        assert_eq!(fetch::<Event>(&store, "e1").await.unwrap(), None);

        create(&store, &event("e1")).await.unwrap();
        assert!(matches!(
            create(&store, &event("e1")).await,
            Err(EntityStoreError::AlreadyExists(_))
        ));

        let mut renamed = event("e1");
        renamed.name = "Relaunch".to_string();
        save(&store, &renamed).await.unwrap();
        assert_eq!(fetch::<Event>(&store, "e1").await.unwrap(), Some(renamed));

        let all: Vec<Event> = find(&store, Query::new(Event::KIND)).await.unwrap();
        assert_eq!(all.len(), 1);

        assert!(remove::<Event>(&store, "e1").await.unwrap());
        assert!(!remove::<Event>(&store, "e1").await.unwrap());
    }
}
