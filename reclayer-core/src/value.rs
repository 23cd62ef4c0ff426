//! The canonical in-memory value model for record fields.
//!
//! Field types validate and encode [`Value`]s; records store them in their
//! original/pending maps. Reference fields hold a [`Reference`], which keeps
//! the unresolved-key and hydrated-record states apart by type instead of by
//! runtime inspection.

use bson::Bson;
use chrono::{DateTime, Utc};

use crate::record::Record;

/// A value held by a record field.
///
/// `Null` is a first-class value: every built-in field type is nullable by
/// default, and an explicit null is stored as such in the backend.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Absent / explicit null.
    Null,
    /// Boolean value.
    Bool(bool),
    /// Canonical integer value.
    Int(i64),
    /// Floating value; number fields round it to the nearest integer on
    /// encode, half away from zero.
    Double(f64),
    /// String value.
    String(String),
    /// Timestamp; always UTC once it has been through a datetime field.
    DateTime(DateTime<Utc>),
    /// Ordered sequence of values.
    Array(Vec<Value>),
    /// Reference-field slot, either a raw key or a hydrated record.
    Reference(Reference),
}

/// The two states of a reference-field value slot.
///
/// Freshly decoded reference fields hold a [`Reference::Key`]; eager loading
/// replaces matching keys with [`Reference::Record`].
#[derive(Debug, Clone, PartialEq)]
pub enum Reference {
    /// An unresolved ObjectId-hex key into the related collection.
    Key(String),
    /// A fully materialized related record.
    Record(Box<Record>),
}

impl Value {
    /// Returns the string content for `String` values.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the integer content for `Int` values.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(*n),
            _ => None,
        }
    }

    /// Returns the boolean content for `Bool` values.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Returns the reference slot for `Reference` values.
    pub fn as_reference(&self) -> Option<&Reference> {
        match self {
            Value::Reference(r) => Some(r),
            _ => None,
        }
    }

    /// True for `Null`.
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v as i64)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Double(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(v: DateTime<Utc>) -> Self {
        Value::DateTime(v)
    }
}

impl From<Record> for Value {
    fn from(v: Record) -> Self {
        Value::Reference(Reference::Record(Box::new(v)))
    }
}

impl From<Reference> for Value {
    fn from(v: Reference) -> Self {
        Value::Reference(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        match v {
            Some(inner) => inner.into(),
            None => Value::Null,
        }
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(v: Vec<T>) -> Self {
        Value::Array(v.into_iter().map(Into::into).collect())
    }
}

impl From<&Value> for Bson {
    fn from(value: &Value) -> Self {
        match value {
            Value::Null => Bson::Null,
            Value::Bool(b) => Bson::Boolean(*b),
            Value::Int(n) => Bson::Int64(*n),
            Value::Double(f) => Bson::Double(*f),
            Value::String(s) => Bson::String(s.clone()),
            Value::DateTime(dt) => Bson::DateTime(bson::DateTime::from_chrono(*dt)),
            Value::Array(items) => Bson::Array(items.iter().map(Bson::from).collect()),
            Value::Reference(Reference::Key(key)) => Bson::String(key.clone()),
            // A hydrated record is never sent to the backend as-is; only its
            // key survives encoding, which the reference field type handles.
            Value::Reference(Reference::Record(_)) => Bson::Null,
        }
    }
}
