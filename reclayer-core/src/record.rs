//! Mutable record state with dirty tracking.
//!
//! A [`Record`] keeps two maps: `original` mirrors what the backend holds
//! and `pending` accumulates unsaved writes. `save` encodes pending through
//! each field's type, performs an insert or a partial update, and promotes
//! pending into original only after the backend call succeeds.

use bson::{Bson, Document};
use std::collections::BTreeMap;

use crate::backend::StoreBackend;
use crate::error::{RecordStoreError, RecordStoreResult};
use crate::schema::{Field, PRIMARY_KEY, Schema};
use crate::value::{Reference, Value};

const MONGO_PK: &str = "_id";

/// One row of a schema's collection.
///
/// States: a record starts *new* (`original` empty), becomes *clean* after
/// a successful save or when materialized by a query, and *dirty* whenever
/// pending holds a value differing from original.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    schema: Schema,
    original: BTreeMap<String, Value>,
    pending: BTreeMap<String, Value>,
}

impl Record {
    /// Creates an empty, unsaved record.
    pub fn new(schema: Schema) -> Self {
        Self {
            schema,
            original: BTreeMap::new(),
            pending: BTreeMap::new(),
        }
    }

    /// Stages every declared field default that the record does not already
    /// hold a value for. Opt-in; a freshly constructed record is unmodified.
    pub fn apply_defaults(&mut self) {
        for field in self.schema.fields().to_vec() {
            if self.value(&field).is_none()
                && let Some(default) = field.default_value().cloned()
            {
                self.pending.insert(field.name().to_string(), default);
            }
        }
    }

    /// Builds a clean record from a decoded backend row. Values land in
    /// `original` only.
    pub(crate) fn from_original(schema: Schema, original: BTreeMap<String, Value>) -> Self {
        Self {
            schema,
            original,
            pending: BTreeMap::new(),
        }
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// The current value of a field: an unsaved write shadows the persisted
    /// value.
    pub fn value(&self, field: &Field) -> Option<&Value> {
        self.pending
            .get(field.name())
            .or_else(|| self.original.get(field.name()))
    }

    /// Stages a new value for a field.
    ///
    /// The field must belong to this record's schema and the value must pass
    /// the field type's validation; on any failure pending is left untouched.
    /// The value is stored verbatim — backend encoding happens at save time.
    pub fn set_value(&mut self, field: &Field, value: impl Into<Value>) -> RecordStoreResult<()> {
        if field.schema_name() != self.schema.name() {
            return Err(RecordStoreError::SchemaMismatch {
                field: field.name().to_string(),
                field_schema: field.schema_name().to_string(),
                schema: self.schema.name().to_string(),
            });
        }

        let value = value.into();
        field
            .field_type()
            .validate(&value)
            .map_err(|e| RecordStoreError::Validation {
                field: field.name().to_string(),
                reason: e.to_string(),
            })?;

        self.pending.insert(field.name().to_string(), value);
        Ok(())
    }

    /// True until the record has been saved or loaded.
    pub fn is_new(&self) -> bool {
        self.original.is_empty()
    }

    /// Field names staged with a value that differs from the persisted one.
    pub fn dirty_keys(&self) -> Vec<&str> {
        self.pending
            .iter()
            .filter(|(name, value)| self.original.get(*name) != Some(value))
            .map(|(name, _)| name.as_str())
            .collect()
    }

    pub fn is_modified(&self) -> bool {
        self.pending
            .iter()
            .any(|(name, value)| self.original.get(name) != Some(value))
    }

    /// Schema fields that currently hold a persisted value. Unsaved writes
    /// do not show up here.
    pub fn fields(&self) -> Vec<&Field> {
        self.schema
            .fields()
            .iter()
            .filter(|f| self.original.contains_key(f.name()))
            .collect()
    }

    /// Runs the schema's record policy, if any.
    pub fn validate(&self) -> RecordStoreResult<()> {
        self.schema.validate(self)
    }

    /// Persists pending values and promotes them on success.
    ///
    /// A new record inserts its full pending set and adopts the backend's
    /// generated identifier as its primary key. An existing record issues a
    /// partial update of the pending set with the identifier stripped; a
    /// record never rewrites its own identifier. An existing record with
    /// nothing to write still promotes without a backend round trip.
    pub async fn save<B: StoreBackend + ?Sized>(&mut self, backend: &B) -> RecordStoreResult<()> {
        let collection = self.schema.name().to_string();
        let mut payload = self.encode_pending()?;

        if self.is_new() {
            let id = backend
                .insert(&collection, payload)
                .await
                .map_err(|e| e.into_persistence("insert", &collection))?;
            tracing::debug!(collection = %collection, id = %id, "inserted record");
            self.pending.insert(PRIMARY_KEY.to_string(), Value::String(id));
        } else {
            payload.remove(PRIMARY_KEY);
            payload.remove(MONGO_PK);

            if !payload.is_empty() {
                let id = self.identifier()?;
                backend
                    .update_by_id(&collection, &id, payload)
                    .await
                    .map_err(|e| e.into_persistence("update", &collection))?;
            }
        }

        self.promote();
        Ok(())
    }

    /// Overwrites a persisted value in place without dirtying the record.
    /// Used by eager loading to swap a reference key for its record.
    pub(crate) fn attach(&mut self, field_name: &str, value: Value) {
        self.original.insert(field_name.to_string(), value);
    }

    fn encode_pending(&self) -> RecordStoreResult<Document> {
        let mut payload = Document::new();
        for (name, value) in &self.pending {
            let Some(field) = self.schema.field(name) else {
                continue;
            };
            if let Err(e) = field.field_type().encode(field, value, &mut payload) {
                tracing::error!(
                    collection = %self.schema.name(),
                    field = %name,
                    error = %e,
                    "failed to encode record field"
                );
                return Err(RecordStoreError::Validation {
                    field: name.clone(),
                    reason: e.to_string(),
                });
            }
        }
        Ok(payload)
    }

    fn identifier(&self) -> RecordStoreResult<String> {
        let stored = self
            .pending
            .get(PRIMARY_KEY)
            .or_else(|| self.original.get(PRIMARY_KEY));

        match stored {
            Some(Value::String(s)) => Ok(s.clone()),
            Some(Value::Reference(Reference::Key(s))) => Ok(s.clone()),
            _ => Err(RecordStoreError::MissingIdentifier(
                self.schema.name().to_string(),
            )),
        }
    }

    fn promote(&mut self) {
        let pending = std::mem::take(&mut self.pending);
        self.original.extend(pending);
    }

    /// Decodes a backend row into a clean record. The backend's `_id` is
    /// surfaced as the primary-key field in hex form.
    pub(crate) fn from_document(schema: &Schema, row: &Document) -> RecordStoreResult<Record> {
        let mut row = row.clone();
        if let Some(raw) = row.remove(MONGO_PK) {
            let hex = match raw {
                Bson::ObjectId(oid) => oid.to_hex(),
                Bson::String(s) => s,
                other => {
                    return Err(RecordStoreError::InvalidValue(format!(
                        "unexpected identifier representation: {other:?}"
                    )));
                }
            };
            row.insert(PRIMARY_KEY, Bson::String(hex));
        }

        let mut original = BTreeMap::new();
        for field in schema.fields() {
            if let Some(value) = field.field_type().decode(field, &row)? {
                original.insert(field.name().to_string(), value);
            }
        }

        Ok(Record::from_original(schema.clone(), original))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::FindRequest;
    use crate::types::{NumberType, StringType};
    use async_trait::async_trait;
    use bson::doc;
    use std::sync::Mutex;

    fn users() -> Schema {
        Schema::builder("users")
            .field("id", StringType)
            .field("name", StringType)
            .field("age", NumberType)
            .build()
    }

    /// Scripted backend that records the calls it receives.
    #[derive(Debug, Default)]
    struct SpyBackend {
        inserts: Mutex<Vec<(String, Document)>>,
        updates: Mutex<Vec<(String, String, Document)>>,
        fail: bool,
    }

    #[async_trait]
    impl StoreBackend for SpyBackend {
        async fn insert(&self, collection: &str, document: Document) -> RecordStoreResult<String> {
            if self.fail {
                return Err(RecordStoreError::Backend("write refused".into()));
            }
            self.inserts
                .lock()
                .unwrap()
                .push((collection.to_string(), document));
            Ok("507f1f77bcf86cd799439011".to_string())
        }

        async fn update_by_id(
            &self,
            collection: &str,
            id: &str,
            patch: Document,
        ) -> RecordStoreResult<()> {
            if self.fail {
                return Err(RecordStoreError::Backend("write refused".into()));
            }
            self.updates
                .lock()
                .unwrap()
                .push((collection.to_string(), id.to_string(), patch));
            Ok(())
        }

        async fn find(
            &self,
            _collection: &str,
            _request: FindRequest,
        ) -> RecordStoreResult<Vec<Document>> {
            Ok(vec![])
        }

        async fn find_one(
            &self,
            _collection: &str,
            _request: FindRequest,
        ) -> RecordStoreResult<Option<Document>> {
            Ok(None)
        }

        async fn count(&self, _collection: &str, _filter: Document) -> RecordStoreResult<u64> {
            Ok(0)
        }
    }

    #[test]
    fn set_value_validates_and_stages() {
        let schema = users();
        let mut rec = Record::new(schema.clone());
        let age = schema.field("age").unwrap().clone();

        rec.set_value(&age, "30").unwrap();
        assert_eq!(rec.value(&age), Some(&Value::String("30".into())));
        assert!(rec.is_modified());
        assert_eq!(rec.dirty_keys(), vec!["age"]);

        let err = rec.set_value(&age, "thirty").unwrap_err();
        assert!(matches!(err, RecordStoreError::Validation { .. }), "{err}");
        // Failed write leaves the staged value intact.
        assert_eq!(rec.value(&age), Some(&Value::String("30".into())));
    }

    #[test]
    fn rejects_fields_of_another_schema() {
        let schema = users();
        let other = Schema::builder("groups").field("name", StringType).build();
        let foreign = other.field("name").unwrap().clone();

        let mut rec = Record::new(schema);
        let err = rec.set_value(&foreign, "x").unwrap_err();
        assert!(matches!(err, RecordStoreError::SchemaMismatch { .. }), "{err}");
    }

    #[test]
    fn fresh_records_are_new_and_unmodified() {
        let rec = Record::new(users());
        assert!(rec.is_new());
        assert!(!rec.is_modified());
        assert!(rec.dirty_keys().is_empty());
    }

    #[test]
    fn defaults_apply_only_on_request() {
        let schema = Schema::builder("tasks")
            .field("id", StringType)
            .field_with_default("priority", NumberType, Value::Int(3))
            .build();
        let priority = schema.field("priority").unwrap().clone();

        let mut rec = Record::new(schema.clone());
        assert!(!rec.is_modified());

        rec.apply_defaults();
        assert_eq!(rec.value(&priority), Some(&Value::Int(3)));

        // An already-staged value is not overwritten.
        rec.set_value(&priority, 9).unwrap();
        rec.apply_defaults();
        assert_eq!(rec.value(&priority), Some(&Value::Int(9)));
    }

    #[test]
    fn record_policy_gates_validation() {
        use crate::schema::RecordPolicy;

        struct AdultsOnly;

        impl RecordPolicy for AdultsOnly {
            fn check(&self, record: &Record) -> RecordStoreResult<()> {
                let Some(age) = record.schema().field("age") else {
                    return Ok(());
                };
                match record.value(age) {
                    Some(Value::Int(n)) if *n >= 18 => Ok(()),
                    _ => Err(RecordStoreError::Validation {
                        field: "age".into(),
                        reason: "must be 18 or older".into(),
                    }),
                }
            }
        }

        let schema = Schema::builder("users")
            .field("id", StringType)
            .field("age", NumberType)
            .policy(AdultsOnly)
            .build();
        let age = schema.field("age").unwrap().clone();

        let mut rec = Record::new(schema.clone());
        rec.set_value(&age, 30).unwrap();
        assert!(rec.validate().is_ok());

        rec.set_value(&age, 7).unwrap();
        let err = rec.validate().unwrap_err();
        assert!(matches!(err, RecordStoreError::Validation { .. }), "{err}");
    }

    #[test]
    fn schemas_without_a_policy_validate_trivially() {
        let rec = Record::new(users());
        assert!(rec.validate().is_ok());
    }

    #[tokio::test]
    async fn insert_adopts_the_generated_identifier() {
        let schema = users();
        let backend = SpyBackend::default();
        let mut rec = Record::new(schema.clone());
        let name = schema.field("name").unwrap().clone();
        let age = schema.field("age").unwrap().clone();

        rec.set_value(&name, "alice").unwrap();
        rec.set_value(&age, "30").unwrap();
        rec.save(&backend).await.unwrap();

        let inserts = backend.inserts.lock().unwrap();
        assert_eq!(inserts.len(), 1);
        assert_eq!(inserts[0].0, "users");
        // Encoding canonicalizes the string-staged number.
        assert_eq!(inserts[0].1.get("age"), Some(&Bson::Int64(30)));

        let pk = schema.primary_key().unwrap();
        assert_eq!(
            rec.value(pk),
            Some(&Value::String("507f1f77bcf86cd799439011".into()))
        );
        assert!(!rec.is_new());
        assert!(!rec.is_modified());
        assert!(rec.dirty_keys().is_empty());
    }

    #[tokio::test]
    async fn update_strips_the_identifier_from_the_patch() {
        let schema = users();
        let backend = SpyBackend::default();
        let mut rec = Record::new(schema.clone());
        let name = schema.field("name").unwrap().clone();

        rec.set_value(&name, "alice").unwrap();
        rec.save(&backend).await.unwrap();

        rec.set_value(&name, "alicia").unwrap();
        rec.save(&backend).await.unwrap();

        let updates = backend.updates.lock().unwrap();
        assert_eq!(updates.len(), 1);
        let (collection, id, patch) = &updates[0];
        assert_eq!(collection, "users");
        assert_eq!(id, "507f1f77bcf86cd799439011");
        assert!(!patch.contains_key("id"));
        assert!(!patch.contains_key("_id"));
        assert_eq!(patch.get("name"), Some(&Bson::String("alicia".into())));
    }

    #[tokio::test]
    async fn clean_update_skips_the_backend() {
        let schema = users();
        let backend = SpyBackend::default();
        let mut rec = Record::new(schema.clone());
        let name = schema.field("name").unwrap().clone();

        rec.set_value(&name, "alice").unwrap();
        rec.save(&backend).await.unwrap();
        rec.save(&backend).await.unwrap();

        assert!(backend.updates.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn failed_save_promotes_nothing() {
        let schema = users();
        let backend = SpyBackend {
            fail: true,
            ..SpyBackend::default()
        };
        let mut rec = Record::new(schema.clone());
        let name = schema.field("name").unwrap().clone();

        rec.set_value(&name, "alice").unwrap();
        let err = rec.save(&backend).await.unwrap_err();
        assert!(matches!(err, RecordStoreError::Persistence { .. }), "{err}");
        assert!(rec.is_new());
        assert!(rec.is_modified());
    }

    #[tokio::test]
    async fn update_without_identifier_is_an_error() {
        let schema = users();
        let backend = SpyBackend::default();
        let name = schema.field("name").unwrap().clone();

        let mut rec =
            Record::from_original(schema.clone(), BTreeMap::from([("name".into(), "a".into())]));
        rec.set_value(&name, "b").unwrap();

        let err = rec.save(&backend).await.unwrap_err();
        assert!(matches!(err, RecordStoreError::MissingIdentifier(_)), "{err}");
    }

    #[test]
    fn fields_reflects_persisted_values_only() {
        let schema = users();
        let mut rec = Record::from_original(
            schema.clone(),
            BTreeMap::from([
                ("id".into(), Value::String("507f1f77bcf86cd799439011".into())),
                ("name".into(), "a".into()),
            ]),
        );

        let names: Vec<_> = rec.fields().iter().map(|f| f.name().to_string()).collect();
        assert_eq!(names, vec!["id", "name"]);

        let age = schema.field("age").unwrap().clone();
        rec.set_value(&age, 7).unwrap();
        assert_eq!(rec.fields().len(), 2);
    }

    #[test]
    fn from_document_maps_the_backend_identifier() {
        let schema = users();
        let oid = bson::oid::ObjectId::parse_str("507f1f77bcf86cd799439011").unwrap();
        let rec = Record::from_document(&schema, &doc! { "_id": oid, "name": "a", "age": 30i64 })
            .unwrap();

        let pk = schema.primary_key().unwrap();
        assert_eq!(
            rec.value(pk),
            Some(&Value::String("507f1f77bcf86cd799439011".into()))
        );
        assert!(!rec.is_new());
        assert!(!rec.is_modified());
    }
}
