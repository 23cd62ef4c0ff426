//! Storage backend abstraction for the record layer.
//!
//! The record and query layers never talk to a database directly; they
//! prepare BSON documents and filter fragments and hand them to a
//! [`StoreBackend`]. Implementations are expected to be thread-safe and
//! stateless per call — the core performs no retries and no background work,
//! so every operation is a single awaited round trip.
//!
//! Identifiers cross this boundary as ObjectId-hex strings; documents are
//! flat string-keyed BSON documents.

use async_trait::async_trait;
use bson::Document;
use std::fmt::Debug;

use crate::error::RecordStoreResult;

/// A prepared find/find-one request.
///
/// An empty `filter` means "no constraint". `projection` and `sort` are
/// backend-native documents prepared by the query builder; `sort` values are
/// `1`/`-1` direction markers.
#[derive(Debug, Clone, Default)]
pub struct FindRequest {
    /// Combined filter fragment, empty for an unconstrained scan.
    pub filter: Document,
    /// Optional field projection; the identifier is always included.
    pub projection: Option<Document>,
    /// Optional sort specification.
    pub sort: Option<Document>,
    /// Maximum number of documents to return.
    pub limit: Option<i64>,
    /// Number of documents to skip before returning results.
    pub skip: Option<u64>,
}

/// Abstract interface for document storage backends.
///
/// Implementers provide named-collection-scoped insert, partial update,
/// find, find-one and count operations. Errors should be returned as
/// [`RecordStoreError::Backend`](crate::error::RecordStoreError::Backend);
/// the record and query layers attach operation/collection context before
/// surfacing them.
#[async_trait]
pub trait StoreBackend: Send + Sync + Debug {
    /// Inserts a new document and returns the backend-assigned identifier as
    /// an ObjectId-hex string.
    async fn insert(&self, collection: &str, document: Document) -> RecordStoreResult<String>;

    /// Applies a partial (merge) update to the document with the given
    /// identifier. Fields absent from `patch` are left untouched.
    async fn update_by_id(
        &self,
        collection: &str,
        id: &str,
        patch: Document,
    ) -> RecordStoreResult<()>;

    /// Returns every document matching the request, honoring projection,
    /// sort, limit and skip.
    async fn find(
        &self,
        collection: &str,
        request: FindRequest,
    ) -> RecordStoreResult<Vec<Document>>;

    /// Returns the first document matching the request, or `None`. `skip`
    /// applies before the first match is taken.
    async fn find_one(
        &self,
        collection: &str,
        request: FindRequest,
    ) -> RecordStoreResult<Option<Document>>;

    /// Counts documents matching the filter.
    async fn count(&self, collection: &str, filter: Document) -> RecordStoreResult<u64>;
}

/// Factory trait for creating backend instances.
#[async_trait]
pub trait StoreBackendBuilder {
    /// The backend type this builder produces.
    type Backend: StoreBackend;

    /// Builds and returns the backend, or an
    /// [`Initialization`](crate::error::RecordStoreError::Initialization)
    /// error if construction fails.
    async fn build(self) -> RecordStoreResult<Self::Backend>;
}
