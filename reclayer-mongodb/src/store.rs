use async_trait::async_trait;
use bson::oid::ObjectId;
use bson::{Document, doc};
use futures::TryStreamExt;
use mongodb::{
    Client, Collection as MongoCollection,
    options::{ClientOptions, FindOneOptions, FindOptions},
};

use reclayer_core::backend::{FindRequest, StoreBackend, StoreBackendBuilder};
use reclayer_core::error::{RecordStoreError, RecordStoreResult};

/// MongoDB-backed storage.
///
/// A thin translation of the backend contract onto the async driver:
/// generated `ObjectId`s travel as hex strings on the trait surface and as
/// real object ids on the wire.
#[derive(Debug)]
pub struct MongoBackend {
    client: Client,
    database: String,
}

impl MongoBackend {
    pub fn new(client: Client, database: String) -> Self {
        Self { client, database }
    }

    pub fn builder(dsn: &str, database: &str) -> MongoBackendBuilder {
        MongoBackendBuilder::new(dsn, database)
    }

    fn get_collection(&self, collection_name: &str) -> MongoCollection<Document> {
        self.client
            .database(&self.database)
            .collection(collection_name)
    }

    fn parse_id(id: &str) -> RecordStoreResult<ObjectId> {
        ObjectId::parse_str(id)
            .map_err(|_| RecordStoreError::Backend(format!("malformed document id `{id}`")))
    }
}

#[async_trait]
impl StoreBackend for MongoBackend {
    async fn insert(&self, collection: &str, document: Document) -> RecordStoreResult<String> {
        let result = self
            .get_collection(collection)
            .insert_one(document)
            .await
            .map_err(|e| RecordStoreError::Backend(e.to_string()))?;

        match result.inserted_id {
            bson::Bson::ObjectId(oid) => Ok(oid.to_hex()),
            other => Err(RecordStoreError::Backend(format!(
                "unexpected inserted id shape: {other:?}"
            ))),
        }
    }

    async fn update_by_id(
        &self,
        collection: &str,
        id: &str,
        patch: Document,
    ) -> RecordStoreResult<()> {
        let result = self
            .get_collection(collection)
            .update_one(
                doc! { "_id": Self::parse_id(id)? },
                doc! { "$set": patch },
            )
            .await
            .map_err(|e| RecordStoreError::Backend(e.to_string()))?;

        if result.matched_count == 0 {
            return Err(RecordStoreError::Backend(format!(
                "document `{id}` not found in collection `{collection}`"
            )));
        }
        Ok(())
    }

    async fn find(
        &self,
        collection: &str,
        request: FindRequest,
    ) -> RecordStoreResult<Vec<Document>> {
        let mut options = FindOptions::default();
        options.projection = request.projection;
        options.sort = request.sort;
        options.limit = request.limit;
        options.skip = request.skip;

        self.get_collection(collection)
            .find(request.filter)
            .with_options(options)
            .await
            .map_err(|e| RecordStoreError::Backend(e.to_string()))?
            .try_collect::<Vec<Document>>()
            .await
            .map_err(|e| RecordStoreError::Backend(e.to_string()))
    }

    async fn find_one(
        &self,
        collection: &str,
        request: FindRequest,
    ) -> RecordStoreResult<Option<Document>> {
        let mut options = FindOneOptions::default();
        options.projection = request.projection;
        options.sort = request.sort;
        options.skip = request.skip;

        self.get_collection(collection)
            .find_one(request.filter)
            .with_options(options)
            .await
            .map_err(|e| RecordStoreError::Backend(e.to_string()))
    }

    async fn count(&self, collection: &str, filter: Document) -> RecordStoreResult<u64> {
        self.get_collection(collection)
            .count_documents(filter)
            .await
            .map_err(|e| RecordStoreError::Backend(e.to_string()))
    }
}

/// Builder for [`MongoBackend`] instances.
///
/// Parses the DSN and stands up the driver client; any connection-string or
/// driver setup failure surfaces as an `Initialization` error.
pub struct MongoBackendBuilder {
    dsn: String,
    database: String,
}

impl MongoBackendBuilder {
    pub fn new(dsn: &str, database: &str) -> Self {
        Self {
            dsn: dsn.to_string(),
            database: database.to_string(),
        }
    }
}

#[async_trait]
impl StoreBackendBuilder for MongoBackendBuilder {
    type Backend = MongoBackend;

    async fn build(self) -> RecordStoreResult<Self::Backend> {
        Ok(MongoBackend::new(
            Client::with_options(
                ClientOptions::parse(&self.dsn)
                    .await
                    .map_err(|e| RecordStoreError::Initialization(e.to_string()))?,
            )
            .map_err(|e| RecordStoreError::Initialization(e.to_string()))?,
            self.database,
        ))
    }
}
