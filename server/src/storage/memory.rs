//! In-memory entity store.
//!
//! Records live in a `BTreeMap` keyed by [`EntityKey`], so every scan visits
//! them in key order and ties in a sorted query break deterministically.
//! Each operation holds the lock for a single record mutation or scan and
//! releases it before the returned future is polled.

use chrono::DateTime;
use eventgram_core::entity_store::{
    Direction, EntityKey, EntityStore, EntityStoreError, Query, Record,
};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::collections::btree_map::Entry;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, RwLock};

type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, EntityStoreError>> + Send + 'a>>;

/// Entity store backed by process memory.
#[derive(Debug, Clone, Default)]
pub struct InMemoryEntityStore {
    records: Arc<RwLock<BTreeMap<EntityKey, Record>>>,
}

impl InMemoryEntityStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of records of `kind`.
    #[must_use]
    pub fn count(&self, kind: &str) -> usize {
        self.records
            .read()
            .map(|records| records.keys().filter(|key| key.kind() == kind).count())
            .unwrap_or(0)
    }

    fn run_query(&self, query: &Query) -> Result<Vec<Record>, EntityStoreError> {
        let records = self.records.read().map_err(|_| poisoned())?;

        let mut matched: Vec<(&EntityKey, &Record)> = records
            .iter()
            .filter(|(key, record)| key.kind() == query.kind && query.matches(record))
            .collect();

        if let Some(order) = &query.order {
            matched.sort_by(|(key_a, a), (key_b, b)| {
                let ordering = compare_fields(a.get(&order.field), b.get(&order.field));
                let ordering = match order.direction {
                    Direction::Ascending => ordering,
                    Direction::Descending => ordering.reverse(),
                };
                ordering.then_with(|| key_a.cmp(key_b))
            });
        }

        Ok(matched
            .into_iter()
            .skip(query.offset)
            .take(query.limit.unwrap_or(usize::MAX))
            .map(|(_, record)| record.clone())
            .collect())
    }
}

fn poisoned() -> EntityStoreError {
    EntityStoreError::Backend("entity store lock poisoned".to_string())
}

// Timestamps are stored as RFC 3339 strings; compare them as instants.
fn compare_fields(a: Option<&Record>, b: Option<&Record>) -> Ordering {
    match (a, b) {
        (Some(Record::String(a)), Some(Record::String(b))) => {
            match (DateTime::parse_from_rfc3339(a), DateTime::parse_from_rfc3339(b)) {
                (Ok(a), Ok(b)) => a.cmp(&b),
                _ => a.cmp(b),
            }
        },
        (Some(Record::Number(a)), Some(Record::Number(b))) => a
            .as_f64()
            .partial_cmp(&b.as_f64())
            .unwrap_or(Ordering::Equal),
        (Some(Record::Bool(a)), Some(Record::Bool(b))) => a.cmp(b),
        (None | Some(Record::Null), None | Some(Record::Null)) => Ordering::Equal,
        (None | Some(Record::Null), _) => Ordering::Less,
        (_, None | Some(Record::Null)) => Ordering::Greater,
        _ => Ordering::Equal,
    }
}

impl EntityStore for InMemoryEntityStore {
    fn get(&self, key: EntityKey) -> StoreFuture<'_, Record> {
        let result = self.records.read().map_err(|_| poisoned()).and_then(|records| {
            match records.get(&key) {
                Some(record) => Ok(record.clone()),
                None => Err(EntityStoreError::NotFound(key)),
            }
        });
        Box::pin(async move { result })
    }

    fn put(&self, key: EntityKey, record: Record) -> StoreFuture<'_, EntityKey> {
        let result = self.records.write().map_err(|_| poisoned()).map(|mut records| {
            records.insert(key.clone(), record);
            key
        });
        Box::pin(async move { result })
    }

    fn insert(&self, key: EntityKey, record: Record) -> StoreFuture<'_, EntityKey> {
        let result = self.records.write().map_err(|_| poisoned()).and_then(|mut records| {
            match records.entry(key) {
                Entry::Occupied(entry) => Err(EntityStoreError::AlreadyExists(entry.key().clone())),
                Entry::Vacant(entry) => {
                    let key = entry.key().clone();
                    entry.insert(record);
                    Ok(key)
                },
            }
        });
        Box::pin(async move { result })
    }

    fn delete(&self, key: EntityKey) -> StoreFuture<'_, ()> {
        let result = self.records.write().map_err(|_| poisoned()).and_then(|mut records| {
            match records.remove(&key) {
                Some(_) => Ok(()),
                None => Err(EntityStoreError::NotFound(key)),
            }
        });
        Box::pin(async move { result })
    }

    fn query(&self, query: Query) -> StoreFuture<'_, Vec<Record>> {
        let result = self.run_query(&query);
        Box::pin(async move { result })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)] // Test code can use unwrap/expect
mod tests {
    use super::*;
    use serde_json::json;

    fn key(id: &str) -> EntityKey {
        EntityKey::new("event", id)
    }

    async fn seeded() -> InMemoryEntityStore {
        let store = InMemoryEntityStore::new();
        for (id, created, private) in [
            ("a", "2025-01-01T03:00:00Z", false),
            ("b", "2025-01-01T01:00:00Z", false),
            ("c", "2025-01-01T02:00:00Z", true),
            ("d", "2025-01-01T01:00:00Z", false),
        ] {
            store
                .put(key(id), json!({ "id": id, "created": created, "private": private }))
                .await
                .unwrap();
        }
        store
            .put(EntityKey::new("post", "p1"), json!({ "id": "p1", "event": "a" }))
            .await
            .unwrap();
        store
    }

    fn ids(records: &[Record]) -> Vec<&str> {
        records.iter().map(|r| r["id"].as_str().unwrap()).collect()
    }

    #[tokio::test]
    async fn get_put_delete() {
        let store = InMemoryEntityStore::new();
        assert_eq!(
            store.get(key("x")).await,
            Err(EntityStoreError::NotFound(key("x")))
        );

        store.put(key("x"), json!({ "v": 1 })).await.unwrap();
        store.put(key("x"), json!({ "v": 2 })).await.unwrap();
        assert_eq!(store.get(key("x")).await.unwrap(), json!({ "v": 2 }));

        store.delete(key("x")).await.unwrap();
        assert!(matches!(
            store.delete(key("x")).await,
            Err(EntityStoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn insert_refuses_existing_keys() {
        let store = InMemoryEntityStore::new();
        store.insert(key("x"), json!({ "v": 1 })).await.unwrap();

        assert_eq!(
            store.insert(key("x"), json!({ "v": 2 })).await,
            Err(EntityStoreError::AlreadyExists(key("x")))
        );
        assert_eq!(store.get(key("x")).await.unwrap(), json!({ "v": 1 }));
    }

    #[tokio::test]
    async fn query_filters_by_kind_and_field() {
        let store = seeded().await;

        let public = store
            .query(Query::new("event").filter("private", false))
            .await
            .unwrap();
        assert_eq!(ids(&public), ["a", "b", "d"]);
        assert_eq!(store.count("post"), 1);
    }

    #[tokio::test]
    async fn query_orders_timestamps_and_breaks_ties_by_key() {
        let store = seeded().await;

        let newest_first = store
            .query(Query::new("event").order_by("created", Direction::Descending))
            .await
            .unwrap();
        assert_eq!(ids(&newest_first), ["a", "c", "b", "d"]);

        let oldest_first = store
            .query(Query::new("event").order_by("created", Direction::Ascending))
            .await
            .unwrap();
        assert_eq!(ids(&oldest_first), ["b", "d", "c", "a"]);
    }

    #[tokio::test]
    async fn query_applies_offset_then_limit() {
        let store = seeded().await;

        let page = store
            .query(
                Query::new("event")
                    .order_by("created", Direction::Ascending)
                    .offset(1)
                    .limit(2),
            )
            .await
            .unwrap();
        assert_eq!(ids(&page), ["d", "c"]);

        let beyond = store
            .query(Query::new("event").offset(10).limit(2))
            .await
            .unwrap();
        assert!(beyond.is_empty());
    }
}
