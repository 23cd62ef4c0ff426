//! Schema model: named, ordered field collections with relationship edges.
//!
//! A [`Schema`] is built once through [`SchemaBuilder`] and is immutable
//! afterwards — it is an `Arc`-shared value safe for unlimited concurrent
//! reads. Fields carry their owning schema by name only (a weak
//! back-reference; a field never keeps its schema alive).
//!
//! Duplicate field or edge names are silently ignored: the first
//! registration wins. This is a deliberate idempotent-add policy, not an
//! error, and callers must not rely on it to override a field's type.

use std::fmt;
use std::sync::Arc;

use crate::error::RecordStoreResult;
use crate::record::Record;
use crate::types::{FieldType, RefType};
use crate::value::Value;

/// Name of the field treated as a schema's primary key.
pub const PRIMARY_KEY: &str = "id";

/// Cross-field validation hook a schema may carry.
///
/// This is record-level business validation, distinct from the per-field
/// checks a [`FieldType`] performs.
pub trait RecordPolicy: Send + Sync {
    /// Checks the record as a whole.
    fn check(&self, record: &Record) -> RecordStoreResult<()>;
}

struct SchemaInner {
    name: String,
    fields: Vec<Field>,
    edges: Vec<Edge>,
    policy: Option<Arc<dyn RecordPolicy>>,
}

/// An immutable, named, ordered collection of fields and relationship edges.
///
/// Cheap to clone; clones share the same underlying definition.
#[derive(Clone)]
pub struct Schema {
    inner: Arc<SchemaInner>,
}

impl Schema {
    /// Starts building a new schema with the given name.
    pub fn builder(name: impl Into<String>) -> SchemaBuilder {
        SchemaBuilder::new(name)
    }

    /// The schema name, also used as the backend collection name.
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// All fields, in registration order.
    pub fn fields(&self) -> &[Field] {
        &self.inner.fields
    }

    /// Looks a field up by name.
    pub fn field(&self, name: &str) -> Option<&Field> {
        self.inner
            .fields
            .iter()
            .find(|f| f.name() == name)
    }

    /// All relationship edges, in registration order.
    pub fn edges(&self) -> &[Edge] {
        &self.inner.edges
    }

    /// Looks an edge up by name.
    pub fn edge(&self, name: &str) -> Option<&Edge> {
        self.inner
            .edges
            .iter()
            .find(|e| e.name() == name)
    }

    /// The primary-key field, i.e. the field named `id`, if declared.
    pub fn primary_key(&self) -> Option<&Field> {
        self.field(PRIMARY_KEY)
    }

    /// Runs the schema's record-level policy, if one is attached.
    ///
    /// A schema without a policy validates every record trivially.
    pub fn validate(&self, record: &Record) -> RecordStoreResult<()> {
        match &self.inner.policy {
            Some(policy) => policy.check(record),
            None => Ok(()),
        }
    }
}

impl fmt::Debug for Schema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Schema")
            .field("name", &self.inner.name)
            .field("fields", &self.inner.fields)
            .field("edges", &self.inner.edges)
            .finish()
    }
}

impl PartialEq for Schema {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner) || self.name() == other.name()
    }
}

#[derive(Debug)]
struct FieldInner {
    name: String,
    ftype: Arc<dyn FieldType>,
    schema_name: String,
    default: Option<Value>,
    related: Option<Schema>,
}

/// A single typed column of a schema.
///
/// A field whose `related_schema` is set is a reference field: a
/// foreign-schema pointer stored as an opaque primary-key string.
#[derive(Debug, Clone)]
pub struct Field {
    inner: Arc<FieldInner>,
}

impl Field {
    /// The field name.
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// The field's type capability.
    pub fn field_type(&self) -> &dyn FieldType {
        self.inner.ftype.as_ref()
    }

    /// The name of the schema this field was declared on.
    pub fn schema_name(&self) -> &str {
        &self.inner.schema_name
    }

    /// The default value, if one was declared.
    pub fn default_value(&self) -> Option<&Value> {
        self.inner.default.as_ref()
    }

    /// The related schema for reference fields.
    pub fn related_schema(&self) -> Option<&Schema> {
        self.inner.related.as_ref()
    }

    /// Whether this is a reference field.
    pub fn is_reference(&self) -> bool {
        self.inner.related.is_some()
    }
}

impl PartialEq for Field {
    fn eq(&self, other: &Self) -> bool {
        self.name() == other.name() && self.schema_name() == other.schema_name()
    }
}

/// A named relationship usable for eager loading.
///
/// An edge names a traversal path; the reference field is the actual typed
/// column holding the foreign key.
#[derive(Debug, Clone)]
pub struct Edge {
    name: String,
    target: Schema,
    field: Field,
}

impl Edge {
    /// The edge name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The schema the edge points at.
    pub fn target(&self) -> &Schema {
        &self.target
    }

    /// The reference field backing the edge.
    pub fn field(&self) -> &Field {
        &self.field
    }
}

/// Fluent builder for [`Schema`].
///
/// Not safe for concurrent use; confine it to the task that builds the
/// schema.
pub struct SchemaBuilder {
    name: String,
    fields: Vec<Field>,
    edges: Vec<Edge>,
    policy: Option<Arc<dyn RecordPolicy>>,
}

impl SchemaBuilder {
    fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: Vec::new(),
            edges: Vec::new(),
            policy: None,
        }
    }

    fn push_field(
        mut self,
        name: String,
        ftype: Arc<dyn FieldType>,
        default: Option<Value>,
        related: Option<Schema>,
    ) -> Self {
        // First registration wins; a colliding name is ignored.
        if self.fields.iter().any(|f| f.name() == name) {
            return self;
        }

        self.fields.push(Field {
            inner: Arc::new(FieldInner {
                name,
                ftype,
                schema_name: self.name.clone(),
                default,
                related,
            }),
        });
        self
    }

    /// Adds a field with the given type.
    pub fn field(self, name: impl Into<String>, ftype: impl FieldType + 'static) -> Self {
        self.push_field(name.into(), Arc::new(ftype), None, None)
    }

    /// Adds a field with the given type and a default value.
    pub fn field_with_default(
        self,
        name: impl Into<String>,
        ftype: impl FieldType + 'static,
        default: impl Into<Value>,
    ) -> Self {
        self.push_field(name.into(), Arc::new(ftype), Some(default.into()), None)
    }

    /// Adds a reference field pointing at the given related schema.
    pub fn reference(self, name: impl Into<String>, related: &Schema) -> Self {
        self.push_field(
            name.into(),
            Arc::new(RefType),
            None,
            Some(related.clone()),
        )
    }

    /// Adds a named relationship edge; duplicate edge names are ignored.
    pub fn edge(mut self, name: impl Into<String>, target: &Schema, field: &Field) -> Self {
        let name = name.into();
        if self.edges.iter().any(|e| e.name() == name) {
            return self;
        }

        self.edges.push(Edge {
            name,
            target: target.clone(),
            field: field.clone(),
        });
        self
    }

    /// Attaches a record-level validation policy.
    pub fn policy(mut self, policy: impl RecordPolicy + 'static) -> Self {
        self.policy = Some(Arc::new(policy));
        self
    }

    /// Finalizes the schema.
    pub fn build(self) -> Schema {
        Schema {
            inner: Arc::new(SchemaInner {
                name: self.name,
                fields: self.fields,
                edges: self.edges,
                policy: self.policy,
            }),
        }
    }
}
