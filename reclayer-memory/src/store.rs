//! In-memory storage implementation for the record layer.
//!
//! Documents live in per-collection maps behind an async-aware read-write
//! lock; filters are evaluated by the [`crate::evaluator`] module.

use async_trait::async_trait;
use bson::oid::ObjectId;
use bson::{Bson, Document};
use mea::rwlock::RwLock;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use reclayer_core::backend::{FindRequest, StoreBackend, StoreBackendBuilder};
use reclayer_core::error::{RecordStoreError, RecordStoreResult};

use crate::evaluator::{Comparable, matches};

type CollectionMap = BTreeMap<String, Document>;
type StoreMap = HashMap<String, CollectionMap>;

/// Thread-safe in-memory storage backend.
///
/// Documents are indexed by the hex form of their generated `_id`. The
/// store is cloneable and `Arc`-backed: clones share the same data, which
/// makes it easy to hand the same dataset to several queries in tests.
///
/// Queries scan the whole collection (no indexing); fine for the test and
/// development datasets this backend is meant for.
#[derive(Default, Clone, Debug)]
pub struct MemoryBackend {
    store: Arc<RwLock<StoreMap>>,
}

impl MemoryBackend {
    /// Creates a new empty in-memory backend.
    pub fn new() -> Self {
        Self {
            store: Arc::new(RwLock::new(StoreMap::new())),
        }
    }

    pub fn builder() -> MemoryBackendBuilder {
        MemoryBackendBuilder::default()
    }

    fn apply(request: &FindRequest, collection: &CollectionMap) -> Vec<Document> {
        let mut selected: Vec<&Document> = collection
            .values()
            .filter(|doc| matches(&request.filter, doc))
            .collect();

        if let Some(sort) = &request.sort {
            selected.sort_by(|a, b| {
                for (field, direction) in sort.iter() {
                    let left = a.get(field).map(Comparable::from).unwrap_or(Comparable::Null);
                    let right = b.get(field).map(Comparable::from).unwrap_or(Comparable::Null);

                    let ordering = left
                        .partial_cmp(&right)
                        .unwrap_or(std::cmp::Ordering::Equal);
                    let ordering = match direction {
                        Bson::Int32(d) if *d < 0 => ordering.reverse(),
                        Bson::Int64(d) if *d < 0 => ordering.reverse(),
                        _ => ordering,
                    };
                    if ordering != std::cmp::Ordering::Equal {
                        return ordering;
                    }
                }
                std::cmp::Ordering::Equal
            });
        }

        let skip = request.skip.unwrap_or(0) as usize;
        let take = request
            .limit
            .filter(|l| *l >= 0)
            .map(|l| l as usize)
            .unwrap_or(usize::MAX);

        selected
            .into_iter()
            .skip(skip)
            .take(take)
            .map(|doc| Self::project(doc, request.projection.as_ref()))
            .collect()
    }

    fn project(document: &Document, projection: Option<&Document>) -> Document {
        match projection {
            None => document.clone(),
            Some(projection) => document
                .iter()
                .filter(|(key, _)| {
                    matches!(
                        projection.get(key.as_str()),
                        Some(Bson::Int32(1) | Bson::Int64(1) | Bson::Boolean(true))
                    )
                })
                .map(|(key, value)| (key.clone(), value.clone()))
                .collect(),
        }
    }
}

#[async_trait]
impl StoreBackend for MemoryBackend {
    async fn insert(&self, collection: &str, document: Document) -> RecordStoreResult<String> {
        let mut store = self.store.write().await;
        let collection_map = store.entry(collection.to_string()).or_default();

        let id = ObjectId::new();
        let mut document = document;
        document.insert("_id", Bson::ObjectId(id));

        let hex = id.to_hex();
        collection_map.insert(hex.clone(), document);
        Ok(hex)
    }

    async fn update_by_id(
        &self,
        collection: &str,
        id: &str,
        patch: Document,
    ) -> RecordStoreResult<()> {
        let mut store = self.store.write().await;
        let collection_map = store.get_mut(collection).ok_or_else(|| {
            RecordStoreError::Backend(format!("collection `{collection}` not found"))
        })?;

        let document = collection_map.get_mut(id).ok_or_else(|| {
            RecordStoreError::Backend(format!(
                "document `{id}` not found in collection `{collection}`"
            ))
        })?;

        for (key, value) in patch {
            document.insert(key, value);
        }
        Ok(())
    }

    async fn find(
        &self,
        collection: &str,
        request: FindRequest,
    ) -> RecordStoreResult<Vec<Document>> {
        let store = self.store.read().await;
        Ok(store
            .get(collection)
            .map(|col| Self::apply(&request, col))
            .unwrap_or_default())
    }

    async fn find_one(
        &self,
        collection: &str,
        request: FindRequest,
    ) -> RecordStoreResult<Option<Document>> {
        let mut request = request;
        request.limit = Some(1);
        Ok(self.find(collection, request).await?.pop())
    }

    async fn count(&self, collection: &str, filter: Document) -> RecordStoreResult<u64> {
        let store = self.store.read().await;
        Ok(store
            .get(collection)
            .map(|col| col.values().filter(|doc| matches(&filter, doc)).count() as u64)
            .unwrap_or(0))
    }
}

/// Builder for [`MemoryBackend`] instances. Construction never fails; the
/// builder exists so both backends are stood up through the same trait.
#[derive(Default)]
pub struct MemoryBackendBuilder;

#[async_trait]
impl StoreBackendBuilder for MemoryBackendBuilder {
    type Backend = MemoryBackend;

    async fn build(self) -> RecordStoreResult<Self::Backend> {
        Ok(MemoryBackend::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    #[tokio::test]
    async fn insert_assigns_an_object_id() {
        let backend = MemoryBackend::new();
        let hex = backend
            .insert("users", doc! { "name": "alice" })
            .await
            .unwrap();

        assert!(ObjectId::parse_str(&hex).is_ok());

        let rows = backend
            .find("users", FindRequest::default())
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get("_id"), Some(&Bson::ObjectId(ObjectId::parse_str(&hex).unwrap())));
    }

    #[tokio::test]
    async fn update_merges_the_patch() {
        let backend = MemoryBackend::new();
        let hex = backend
            .insert("users", doc! { "name": "alice", "age": 30i64 })
            .await
            .unwrap();

        backend
            .update_by_id("users", &hex, doc! { "age": 31i64 })
            .await
            .unwrap();

        let rows = backend.find("users", FindRequest::default()).await.unwrap();
        assert_eq!(rows[0].get("age"), Some(&Bson::Int64(31)));
        assert_eq!(rows[0].get("name"), Some(&Bson::String("alice".into())));
    }

    #[tokio::test]
    async fn update_of_a_missing_document_fails() {
        let backend = MemoryBackend::new();
        backend.insert("users", doc! { "name": "a" }).await.unwrap();

        let err = backend
            .update_by_id("users", "507f1f77bcf86cd799439011", doc! { "name": "b" })
            .await
            .unwrap_err();
        assert!(matches!(err, RecordStoreError::Backend(_)), "{err}");
    }

    #[tokio::test]
    async fn find_filters_sorts_and_paginates() {
        let backend = MemoryBackend::new();
        for (name, age) in [("carol", 41i64), ("alice", 30), ("bob", 25), ("dave", 17)] {
            backend
                .insert("users", doc! { "name": name, "age": age })
                .await
                .unwrap();
        }

        let request = FindRequest {
            filter: doc! { "age": { "$gte": 18 } },
            sort: Some(doc! { "age": 1 }),
            skip: Some(1),
            limit: Some(2),
            ..FindRequest::default()
        };
        let rows = backend.find("users", request).await.unwrap();

        let names: Vec<_> = rows
            .iter()
            .map(|d| d.get_str("name").unwrap().to_string())
            .collect();
        assert_eq!(names, vec!["alice", "carol"]);
    }

    #[tokio::test]
    async fn descending_sort_direction() {
        let backend = MemoryBackend::new();
        for age in [30i64, 25, 41] {
            backend.insert("users", doc! { "age": age }).await.unwrap();
        }

        let request = FindRequest {
            sort: Some(doc! { "age": -1 }),
            ..FindRequest::default()
        };
        let rows = backend.find("users", request).await.unwrap();
        let ages: Vec<_> = rows.iter().map(|d| d.get_i64("age").unwrap()).collect();
        assert_eq!(ages, vec![41, 30, 25]);
    }

    #[tokio::test]
    async fn projection_keeps_requested_keys() {
        let backend = MemoryBackend::new();
        backend
            .insert("users", doc! { "name": "alice", "age": 30i64 })
            .await
            .unwrap();

        let request = FindRequest {
            projection: Some(doc! { "_id": 1, "name": 1 }),
            ..FindRequest::default()
        };
        let rows = backend.find("users", request).await.unwrap();

        assert!(rows[0].contains_key("_id"));
        assert!(rows[0].contains_key("name"));
        assert!(!rows[0].contains_key("age"));
    }

    #[tokio::test]
    async fn find_one_respects_skip() {
        let backend = MemoryBackend::new();
        for age in [25i64, 30, 41] {
            backend.insert("users", doc! { "age": age }).await.unwrap();
        }

        let request = FindRequest {
            sort: Some(doc! { "age": 1 }),
            skip: Some(1),
            ..FindRequest::default()
        };
        let row = backend.find_one("users", request).await.unwrap().unwrap();
        assert_eq!(row.get_i64("age").unwrap(), 30);
    }

    #[tokio::test]
    async fn count_ignores_pagination() {
        let backend = MemoryBackend::new();
        for age in [25i64, 30, 41] {
            backend.insert("users", doc! { "age": age }).await.unwrap();
        }

        let n = backend
            .count("users", doc! { "age": { "$gt": 26 } })
            .await
            .unwrap();
        assert_eq!(n, 2);
        assert_eq!(backend.count("empty", doc! {}).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn clones_share_data() {
        let backend = MemoryBackend::new();
        let clone = backend.clone();
        backend.insert("users", doc! { "name": "a" }).await.unwrap();

        assert_eq!(clone.count("users", doc! {}).await.unwrap(), 1);
    }
}
