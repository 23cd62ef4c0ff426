//! Schema-aware query building and execution.
//!
//! [`Query`] is a consuming fluent builder over one schema and one backend
//! handle. Filters are resolved into backend fragments the moment they are
//! attached; execution combines the fragments, runs a single backend find
//! and decodes the rows into clean [`Record`]s. Reference fields named via
//! [`Query::with`] are eagerly loaded in one batched sub-query per field.

use bson::oid::ObjectId;
use bson::{Bson, Document, doc};
use std::collections::HashMap;
use std::sync::Arc;

use crate::backend::{FindRequest, StoreBackend};
use crate::error::{RecordStoreError, RecordStoreResult};
use crate::filter::{Filter, ResolverRegistry};
use crate::record::Record;
use crate::schema::{Field, Schema};
use crate::value::{Reference, Value};

type EagerCustomizer<'a, B> =
    Box<dyn Fn(&Schema, Query<'a, B>) -> Query<'a, B> + Send + Sync + 'a>;

/// A fluent query over one schema.
pub struct Query<'a, B: StoreBackend + ?Sized> {
    schema: Schema,
    backend: &'a B,
    registry: Arc<ResolverRegistry>,
    projection: Document,
    fragments: Vec<Document>,
    sort: Document,
    limit: Option<i64>,
    offset: Option<u64>,
    eager: Vec<(String, EagerCustomizer<'a, B>)>,
}

impl<'a, B: StoreBackend + ?Sized> Query<'a, B> {
    /// A query over the schema's collection with the built-in operator set.
    pub fn new(schema: Schema, backend: &'a B) -> Self {
        Self::with_registry(schema, backend, Arc::new(ResolverRegistry::with_defaults()))
    }

    /// A query carrying a caller-supplied operator registry.
    pub fn with_registry(schema: Schema, backend: &'a B, registry: Arc<ResolverRegistry>) -> Self {
        Self {
            schema,
            backend,
            registry,
            projection: Document::new(),
            fragments: Vec::new(),
            sort: Document::new(),
            limit: None,
            offset: None,
            eager: Vec::new(),
        }
    }

    /// Sets the result projection to the given fields, replacing any prior
    /// selection. The identifier is always included. Fields of other
    /// schemas are ignored.
    pub fn select<'f>(mut self, fields: impl IntoIterator<Item = &'f Field>) -> Self {
        self.projection = Document::new();
        for field in fields {
            if field.schema_name() != self.schema.name() {
                continue;
            }
            if self.projection.is_empty() {
                self.projection.insert("_id", 1);
            }
            self.projection.insert(field.name(), 1);
        }
        self
    }

    /// Attaches a filter. The tree is resolved immediately; all attached
    /// fragments are ANDed at execution. A filter that resolves to nothing
    /// (every operator unregistered) is dropped with a warning.
    pub fn filter(mut self, filter: Filter) -> Self {
        match self.registry.resolve(&filter) {
            Some(fragment) => self.fragments.push(fragment),
            None => {
                tracing::warn!(
                    collection = %self.schema.name(),
                    ?filter,
                    "filter resolved to no backend fragment and was dropped"
                );
            }
        }
        self
    }

    /// Sets the sort to ascending by the given fields, in order, replacing
    /// any prior ordering. Fields of other schemas are ignored.
    pub fn order_by<'f>(mut self, fields: impl IntoIterator<Item = &'f Field>) -> Self {
        self.sort = Document::new();
        for field in fields {
            if field.schema_name() == self.schema.name() {
                self.sort.insert(field.name(), 1);
            }
        }
        self
    }

    pub fn limit(mut self, limit: i64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: u64) -> Self {
        self.offset = Some(offset);
        self
    }

    /// Eagerly loads the records behind a reference field.
    ///
    /// The customizer receives the related schema and a fresh sub-query
    /// (same backend, same registry) and may narrow or order it; the
    /// key-membership constraint is applied on top of whatever it returns.
    /// Non-reference fields and fields of other schemas are ignored.
    pub fn with(
        mut self,
        field: &Field,
        customizer: impl Fn(&Schema, Query<'a, B>) -> Query<'a, B> + Send + Sync + 'a,
    ) -> Self {
        if field.schema_name() != self.schema.name() || field.related_schema().is_none() {
            tracing::warn!(
                collection = %self.schema.name(),
                field = %field.name(),
                "ignoring eager load of a non-reference field"
            );
            return self;
        }

        let name = field.name().to_string();
        let customizer: EagerCustomizer<'a, B> = Box::new(customizer);
        match self.eager.iter_mut().find(|(n, _)| *n == name) {
            Some(entry) => entry.1 = customizer,
            None => self.eager.push((name, customizer)),
        }
        self
    }

    fn combined_filter(&self) -> Document {
        if self.fragments.is_empty() {
            Document::new()
        } else {
            doc! { "$and": self.fragments.clone() }
        }
    }

    fn find_request(&self) -> FindRequest {
        FindRequest {
            filter: self.combined_filter(),
            projection: (!self.projection.is_empty()).then(|| self.projection.clone()),
            sort: (!self.sort.is_empty()).then(|| self.sort.clone()),
            limit: self.limit,
            skip: self.offset,
        }
    }

    /// Runs the query and decodes every row.
    pub async fn execute(self) -> RecordStoreResult<Vec<Record>> {
        let collection = self.schema.name().to_string();
        let rows = self
            .backend
            .find(&collection, self.find_request())
            .await
            .map_err(|e| e.into_persistence("find", &collection))?;

        let mut records = rows
            .iter()
            .map(|row| Record::from_document(&self.schema, row))
            .collect::<RecordStoreResult<Vec<_>>>()?;

        self.load_references(&mut records).await?;
        Ok(records)
    }

    /// Runs the query and decodes the first row, if any. The configured
    /// offset still applies, so skip-N-take-first is one call.
    pub async fn first(self) -> RecordStoreResult<Option<Record>> {
        let collection = self.schema.name().to_string();
        let row = self
            .backend
            .find_one(&collection, self.find_request())
            .await
            .map_err(|e| e.into_persistence("find", &collection))?;

        let Some(row) = row else {
            return Ok(None);
        };

        let mut records = vec![Record::from_document(&self.schema, &row)?];
        self.load_references(&mut records).await?;
        Ok(records.pop())
    }

    /// Counts matching rows; projection, sort and pagination do not apply.
    pub async fn count(self) -> RecordStoreResult<u64> {
        let collection = self.schema.name().to_string();
        self.backend
            .count(&collection, self.combined_filter())
            .await
            .map_err(|e| e.into_persistence("count", &collection))
    }

    /// Hydrates every requested reference field across the result set with
    /// one batched sub-query per field. Matching keys are swapped for their
    /// records in place; hydrated parents and children both stay clean.
    async fn load_references(&self, records: &mut [Record]) -> RecordStoreResult<()> {
        for (field_name, customizer) in &self.eager {
            let Some(field) = self.schema.field(field_name) else {
                continue;
            };
            let Some(related) = field.related_schema() else {
                continue;
            };

            let mut keys: Vec<Bson> = Vec::new();
            for record in records.iter() {
                if let Some(Value::Reference(Reference::Key(key))) = record.value(field) {
                    let oid = ObjectId::parse_str(key).map_err(|_| {
                        RecordStoreError::ReferenceResolution(format!(
                            "field `{field_name}` holds a malformed key `{key}`"
                        ))
                    })?;
                    let oid = Bson::ObjectId(oid);
                    if !keys.contains(&oid) {
                        keys.push(oid);
                    }
                }
            }
            if keys.is_empty() {
                continue;
            }

            let sub = Query::with_registry(related.clone(), self.backend, self.registry.clone());
            let mut sub = customizer(related, sub);
            sub.fragments.push(doc! { "_id": { "$in": keys } });

            let loaded = Box::pin(sub.execute()).await?;

            let pk = related.primary_key().ok_or_else(|| {
                RecordStoreError::ReferenceResolution(format!(
                    "related schema `{}` has no primary key",
                    related.name()
                ))
            })?;
            let by_key: HashMap<String, Record> = loaded
                .into_iter()
                .filter_map(|rec| match rec.value(pk) {
                    Some(Value::String(key)) => Some((key.clone(), rec)),
                    _ => None,
                })
                .collect();

            for record in records.iter_mut() {
                let Some(Value::Reference(Reference::Key(key))) = record.value(field) else {
                    continue;
                };
                if let Some(related_record) = by_key.get(key.as_str()) {
                    record.attach(
                        field_name,
                        Value::Reference(Reference::Record(Box::new(related_record.clone()))),
                    );
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{NumberType, StringType};
    use async_trait::async_trait;
    use std::sync::Mutex;

    fn users() -> Schema {
        Schema::builder("users")
            .field("id", StringType)
            .field("name", StringType)
            .field("age", NumberType)
            .build()
    }

    /// Backend that records the request it was handed.
    #[derive(Debug, Default)]
    struct RequestSpy {
        finds: Mutex<Vec<(String, FindRequest)>>,
        counts: Mutex<Vec<(String, Document)>>,
        rows: Vec<Document>,
    }

    #[async_trait]
    impl StoreBackend for RequestSpy {
        async fn insert(&self, _c: &str, _d: Document) -> RecordStoreResult<String> {
            unreachable!("queries never insert")
        }

        async fn update_by_id(&self, _c: &str, _id: &str, _p: Document) -> RecordStoreResult<()> {
            unreachable!("queries never update")
        }

        async fn find(&self, collection: &str, request: FindRequest) -> RecordStoreResult<Vec<Document>> {
            self.finds
                .lock()
                .unwrap()
                .push((collection.to_string(), request));
            Ok(self.rows.clone())
        }

        async fn find_one(
            &self,
            collection: &str,
            request: FindRequest,
        ) -> RecordStoreResult<Option<Document>> {
            self.finds
                .lock()
                .unwrap()
                .push((collection.to_string(), request));
            Ok(self.rows.first().cloned())
        }

        async fn count(&self, collection: &str, filter: Document) -> RecordStoreResult<u64> {
            self.counts
                .lock()
                .unwrap()
                .push((collection.to_string(), filter));
            Ok(self.rows.len() as u64)
        }
    }

    #[tokio::test]
    async fn fragments_are_anded_at_execution() {
        let backend = RequestSpy::default();
        Query::new(users(), &backend)
            .filter(Filter::eq("name", "alice"))
            .filter(Filter::gt("age", 18))
            .execute()
            .await
            .unwrap();

        let finds = backend.finds.lock().unwrap();
        let (collection, request) = &finds[0];
        assert_eq!(collection, "users");
        assert_eq!(
            request.filter,
            doc! { "$and": [{ "name": "alice" }, { "age": { "$gt": 18 } }] }
        );
    }

    #[tokio::test]
    async fn no_filters_means_an_empty_document() {
        let backend = RequestSpy::default();
        Query::new(users(), &backend).execute().await.unwrap();

        let finds = backend.finds.lock().unwrap();
        assert_eq!(finds[0].1.filter, Document::new());
    }

    #[tokio::test]
    async fn unresolvable_filters_are_dropped() {
        let backend = RequestSpy::default();
        Query::new(users(), &backend)
            .filter(Filter::compare("name", "FUZZY", "x"))
            .execute()
            .await
            .unwrap();

        let finds = backend.finds.lock().unwrap();
        assert_eq!(finds[0].1.filter, Document::new());
    }

    #[tokio::test]
    async fn select_always_projects_the_identifier() {
        let schema = users();
        let backend = RequestSpy::default();
        Query::new(schema.clone(), &backend)
            .select([schema.field("name").unwrap()])
            .execute()
            .await
            .unwrap();

        let finds = backend.finds.lock().unwrap();
        assert_eq!(
            finds[0].1.projection,
            Some(doc! { "_id": 1, "name": 1 })
        );
    }

    #[tokio::test]
    async fn foreign_fields_are_ignored_in_select_and_order() {
        let schema = users();
        let other = Schema::builder("groups").field("name", StringType).build();
        let foreign = other.field("name").unwrap().clone();

        let backend = RequestSpy::default();
        Query::new(schema.clone(), &backend)
            .select([&foreign])
            .order_by([&foreign, schema.field("age").unwrap()])
            .execute()
            .await
            .unwrap();

        let finds = backend.finds.lock().unwrap();
        assert_eq!(finds[0].1.projection, None);
        assert_eq!(finds[0].1.sort, Some(doc! { "age": 1 }));
    }

    #[tokio::test]
    async fn repeated_select_and_order_replace_the_previous_call() {
        let schema = users();
        let backend = RequestSpy::default();
        Query::new(schema.clone(), &backend)
            .select([schema.field("name").unwrap()])
            .select([schema.field("age").unwrap()])
            .order_by([schema.field("name").unwrap()])
            .order_by([schema.field("age").unwrap()])
            .execute()
            .await
            .unwrap();

        let finds = backend.finds.lock().unwrap();
        assert_eq!(finds[0].1.projection, Some(doc! { "_id": 1, "age": 1 }));
        assert_eq!(finds[0].1.sort, Some(doc! { "age": 1 }));
    }

    #[tokio::test]
    async fn pagination_is_forwarded() {
        let backend = RequestSpy::default();
        Query::new(users(), &backend)
            .limit(10)
            .offset(20)
            .execute()
            .await
            .unwrap();

        let finds = backend.finds.lock().unwrap();
        assert_eq!(finds[0].1.limit, Some(10));
        assert_eq!(finds[0].1.skip, Some(20));
    }

    #[tokio::test]
    async fn first_keeps_the_offset() {
        let backend = RequestSpy::default();
        let result = Query::new(users(), &backend)
            .offset(3)
            .first()
            .await
            .unwrap();
        assert!(result.is_none());

        let finds = backend.finds.lock().unwrap();
        assert_eq!(finds[0].1.skip, Some(3));
    }

    #[tokio::test]
    async fn count_uses_the_combined_filter_only() {
        let backend = RequestSpy::default();
        let n = Query::new(users(), &backend)
            .filter(Filter::eq("name", "alice"))
            .limit(1)
            .count()
            .await
            .unwrap();
        assert_eq!(n, 0);

        let counts = backend.counts.lock().unwrap();
        assert_eq!(counts[0].1, doc! { "$and": [{ "name": "alice" }] });
    }

    #[tokio::test]
    async fn rows_decode_into_clean_records() {
        let oid = ObjectId::parse_str("507f1f77bcf86cd799439011").unwrap();
        let backend = RequestSpy {
            rows: vec![doc! { "_id": oid, "name": "alice", "age": 30i64 }],
            ..RequestSpy::default()
        };

        let schema = users();
        let records = Query::new(schema.clone(), &backend).execute().await.unwrap();
        assert_eq!(records.len(), 1);

        let rec = &records[0];
        assert!(!rec.is_new());
        assert!(!rec.is_modified());
        assert_eq!(
            rec.value(schema.field("age").unwrap()),
            Some(&Value::Int(30))
        );
    }

    #[tokio::test]
    async fn custom_registry_operators_reach_the_backend() {
        let mut registry = ResolverRegistry::with_defaults();
        registry.register("CASE_INSENSITIVE", |f| {
            let field = f.field()?;
            let Bson::String(s) = f.value()? else {
                return None;
            };
            Some(doc! { field: { "$regex": format!("^{s}$"), "$options": "i" } })
        });

        let backend = RequestSpy::default();
        Query::with_registry(users(), &backend, Arc::new(registry))
            .filter(Filter::compare("name", "CASE_INSENSITIVE", "John"))
            .execute()
            .await
            .unwrap();

        let finds = backend.finds.lock().unwrap();
        assert_eq!(
            finds[0].1.filter,
            doc! { "$and": [{ "name": { "$regex": "^John$", "$options": "i" } }] }
        );
    }
}
