//! Built-in field type capabilities.
//!
//! A [`FieldType`] governs how one logical data kind is validated, decoded
//! from a backend row and encoded into one. The built-ins cover numbers,
//! strings, booleans, datetimes, enumerated options and references; custom
//! types only need to implement the trait.
//!
//! All built-ins are nullable by default: `Value::Null` validates, encodes
//! to an explicit `Bson::Null`, and a missing or null stored value decodes
//! to `Ok(None)` — absent and explicitly-null are indistinguishable on the
//! way out.

use bson::oid::ObjectId;
use bson::{Bson, Document};
use chrono::{DateTime, NaiveDateTime, Utc};
use std::fmt::Debug;
use std::sync::Arc;

use crate::error::{RecordStoreError, RecordStoreResult};
use crate::options::{OptionService, SelectOption};
use crate::schema::Field;
use crate::value::{Reference, Value};

/// Capability contract for one logical data kind.
///
/// Implementations are stateless (except where they hold a collaborator,
/// like [`OptionsType`]) and shared behind `Arc` by every field using them.
pub trait FieldType: Send + Sync + Debug {
    /// Pure value check. Must accept `Value::Null` and the common alternate
    /// representations of the canonical type (e.g. string-encoded numbers).
    fn validate(&self, value: &Value) -> RecordStoreResult<()>;

    /// Extracts and converts this field's stored representation from a
    /// backend row. A missing key or stored null yields `Ok(None)`.
    fn decode(&self, field: &Field, row: &Document) -> RecordStoreResult<Option<Value>>;

    /// Validates, then writes the canonical backend representation of
    /// `value` into the row. `Value::Null` writes an explicit null marker.
    fn encode(&self, field: &Field, value: &Value, row: &mut Document) -> RecordStoreResult<()>;
}

fn invalid(reason: impl Into<String>) -> RecordStoreError {
    RecordStoreError::InvalidValue(reason.into())
}

/// Integer field. Canonical storage is a signed 64-bit integer.
///
/// Accepts integers, numeric strings (base 10) and floating values, which
/// are rounded half away from zero.
#[derive(Debug, Clone, Copy, Default)]
pub struct NumberType;

fn coerce_int(value: &Value) -> RecordStoreResult<i64> {
    match value {
        Value::Int(n) => Ok(*n),
        Value::Double(f) => Ok(f.round() as i64),
        Value::String(s) => s
            .parse::<i64>()
            .map_err(|_| invalid("value is not a valid integer string")),
        _ => Err(invalid("value is not an integer type")),
    }
}

impl FieldType for NumberType {
    fn validate(&self, value: &Value) -> RecordStoreResult<()> {
        match value {
            Value::Null | Value::Int(_) | Value::Double(_) => Ok(()),
            Value::String(s) => s
                .parse::<i64>()
                .map(|_| ())
                .map_err(|e| invalid(format!("value is not a valid integer: {e}"))),
            _ => Err(invalid("value is not an integer, expected an integer")),
        }
    }

    fn decode(&self, field: &Field, row: &Document) -> RecordStoreResult<Option<Value>> {
        match row.get(field.name()) {
            None | Some(Bson::Null) => Ok(None),
            Some(Bson::Int32(n)) => Ok(Some(Value::Int(*n as i64))),
            Some(Bson::Int64(n)) => Ok(Some(Value::Int(*n))),
            Some(Bson::Double(f)) => Ok(Some(Value::Int(f.round() as i64))),
            Some(Bson::String(s)) => Ok(Some(Value::Int(
                s.parse::<i64>()
                    .map_err(|_| invalid("value is not a valid integer string"))?,
            ))),
            Some(_) => Err(invalid("value is not an integer type")),
        }
    }

    fn encode(&self, field: &Field, value: &Value, row: &mut Document) -> RecordStoreResult<()> {
        if value.is_null() {
            row.insert(field.name(), Bson::Null);
            return Ok(());
        }

        row.insert(field.name(), Bson::Int64(coerce_int(value)?));
        Ok(())
    }
}

/// Plain string field.
///
/// Validation rejects only composite values; encoding is strict and
/// requires an actual string.
#[derive(Debug, Clone, Copy, Default)]
pub struct StringType;

impl FieldType for StringType {
    fn validate(&self, value: &Value) -> RecordStoreResult<()> {
        match value {
            Value::Array(_) | Value::Reference(Reference::Record(_)) => {
                Err(invalid("value is a composite, expected a string"))
            }
            _ => Ok(()),
        }
    }

    fn decode(&self, field: &Field, row: &Document) -> RecordStoreResult<Option<Value>> {
        match row.get(field.name()) {
            None | Some(Bson::Null) => Ok(None),
            Some(Bson::String(s)) => Ok(Some(Value::String(s.clone()))),
            Some(_) => Err(invalid("value is not a string")),
        }
    }

    fn encode(&self, field: &Field, value: &Value, row: &mut Document) -> RecordStoreResult<()> {
        match value {
            Value::Null => {
                row.insert(field.name(), Bson::Null);
                Ok(())
            }
            Value::String(s) => {
                row.insert(field.name(), Bson::String(s.clone()));
                Ok(())
            }
            _ => Err(invalid("value is not a string")),
        }
    }
}

/// Boolean field with permissive coercion.
///
/// Truthy strings: `true`, `1`, `yes`, `on`, `enabled`. Falsy strings:
/// `false`, `0`, `no`, `off`, `disabled` and the empty string. Matching is
/// case-insensitive after trimming whitespace. Any numeric value coerces
/// with nonzero meaning true.
#[derive(Debug, Clone, Copy, Default)]
pub struct BooleanType;

fn coerce_bool(value: &Value) -> RecordStoreResult<bool> {
    match value {
        Value::Bool(b) => Ok(*b),
        Value::String(s) => match s.trim().to_lowercase().as_str() {
            "true" | "1" | "yes" | "on" | "enabled" => Ok(true),
            "false" | "0" | "no" | "off" | "disabled" | "" => Ok(false),
            _ => Err(invalid("invalid boolean string value")),
        },
        Value::Int(n) => Ok(*n != 0),
        Value::Double(f) => Ok(*f != 0.0),
        _ => Err(invalid("value cannot be converted to boolean")),
    }
}

fn coerce_bool_bson(value: &Bson) -> RecordStoreResult<bool> {
    match value {
        Bson::Boolean(b) => Ok(*b),
        Bson::String(s) => coerce_bool(&Value::String(s.clone())),
        Bson::Int32(n) => Ok(*n != 0),
        Bson::Int64(n) => Ok(*n != 0),
        Bson::Double(f) => Ok(*f != 0.0),
        _ => Err(invalid("value cannot be converted to boolean")),
    }
}

impl FieldType for BooleanType {
    fn validate(&self, value: &Value) -> RecordStoreResult<()> {
        if value.is_null() {
            return Ok(());
        }
        coerce_bool(value).map(|_| ())
    }

    fn decode(&self, field: &Field, row: &Document) -> RecordStoreResult<Option<Value>> {
        match row.get(field.name()) {
            None | Some(Bson::Null) => Ok(None),
            Some(raw) => Ok(Some(Value::Bool(coerce_bool_bson(raw)?))),
        }
    }

    fn encode(&self, field: &Field, value: &Value, row: &mut Document) -> RecordStoreResult<()> {
        if value.is_null() {
            row.insert(field.name(), Bson::Null);
            return Ok(());
        }

        row.insert(field.name(), Bson::Boolean(coerce_bool(value)?));
        Ok(())
    }
}

/// Timestamp field.
///
/// Accepts datetime values and RFC 3339 strings (an offset-less string is
/// taken as UTC). Every stored value is normalized to UTC — decoding never
/// reintroduces a non-UTC zone.
#[derive(Debug, Clone, Copy, Default)]
pub struct DateTimeType;

fn parse_datetime(s: &str) -> RecordStoreResult<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }
    // No offset: interpret as UTC.
    NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f")
        .map(|naive| naive.and_utc())
        .map_err(|_| invalid("value is not a valid RFC 3339 datetime string"))
}

impl FieldType for DateTimeType {
    fn validate(&self, value: &Value) -> RecordStoreResult<()> {
        match value {
            Value::Null | Value::DateTime(_) => Ok(()),
            Value::String(s) => parse_datetime(s).map(|_| ()),
            _ => Err(invalid(
                "value is not a valid datetime type (expected a timestamp or RFC 3339 string)",
            )),
        }
    }

    fn decode(&self, field: &Field, row: &Document) -> RecordStoreResult<Option<Value>> {
        match row.get(field.name()) {
            None | Some(Bson::Null) => Ok(None),
            Some(Bson::DateTime(dt)) => Ok(Some(Value::DateTime(dt.to_chrono()))),
            Some(Bson::String(s)) => Ok(Some(Value::DateTime(parse_datetime(s)?))),
            Some(_) => Err(invalid("value is not a valid datetime type")),
        }
    }

    fn encode(&self, field: &Field, value: &Value, row: &mut Document) -> RecordStoreResult<()> {
        let utc = match value {
            Value::Null => {
                row.insert(field.name(), Bson::Null);
                return Ok(());
            }
            Value::DateTime(dt) => dt.with_timezone(&Utc),
            Value::String(s) => parse_datetime(s)?,
            _ => {
                return Err(invalid(
                    "value is not a valid datetime type (expected a timestamp or RFC 3339 string)",
                ));
            }
        };

        row.insert(field.name(), Bson::DateTime(bson::DateTime::from_chrono(utc)));
        Ok(())
    }
}

/// Enumerated field whose allowed values come from an [`OptionService`].
///
/// The service is consulted on every validate/encode call — the option set
/// is dynamic and never cached here. Only exact, case-sensitive unique-name
/// matches are valid.
#[derive(Debug, Clone)]
pub struct OptionsType {
    service: Arc<dyn OptionService>,
}

impl OptionsType {
    /// Creates an options type backed by the given service.
    pub fn new(service: Arc<dyn OptionService>) -> Self {
        Self { service }
    }

    fn available(&self) -> RecordStoreResult<Vec<SelectOption>> {
        self.service
            .options()
            .map_err(|e| RecordStoreError::Options(format!("failed to get available options: {e}")))
    }

    /// The display name for a unique name.
    pub fn display_name(&self, unique_name: &str) -> RecordStoreResult<String> {
        self.available()?
            .into_iter()
            .find(|o| o.unique_name == unique_name)
            .map(|o| o.display_name)
            .ok_or_else(|| RecordStoreError::Options(format!("option `{unique_name}` not found")))
    }

    /// The unique name for a display name.
    pub fn unique_name(&self, display_name: &str) -> RecordStoreResult<String> {
        self.available()?
            .into_iter()
            .find(|o| o.display_name == display_name)
            .map(|o| o.unique_name)
            .ok_or_else(|| RecordStoreError::Options(format!("option `{display_name}` not found")))
    }

    /// The full current option set.
    pub fn all_options(&self) -> RecordStoreResult<Vec<SelectOption>> {
        self.available()
    }
}

impl FieldType for OptionsType {
    fn validate(&self, value: &Value) -> RecordStoreResult<()> {
        let unique_name = match value {
            Value::Null => return Ok(()),
            Value::String(s) => s,
            _ => return Err(invalid("options field must be a string")),
        };

        if self
            .available()?
            .iter()
            .any(|o| o.unique_name == *unique_name)
        {
            Ok(())
        } else {
            Err(invalid("value is not in the list of available options"))
        }
    }

    fn decode(&self, field: &Field, row: &Document) -> RecordStoreResult<Option<Value>> {
        match row.get(field.name()) {
            None | Some(Bson::Null) => Ok(None),
            Some(Bson::String(s)) => Ok(Some(Value::String(s.clone()))),
            Some(_) => Err(invalid("options field must be a string")),
        }
    }

    fn encode(&self, field: &Field, value: &Value, row: &mut Document) -> RecordStoreResult<()> {
        if value.is_null() {
            row.insert(field.name(), Bson::Null);
            return Ok(());
        }

        self.validate(value)?;
        match value {
            Value::String(s) => {
                row.insert(field.name(), Bson::String(s.clone()));
                Ok(())
            }
            _ => Err(invalid("options field must be a string")),
        }
    }
}

/// Foreign-schema pointer stored as an opaque ObjectId-hex string.
///
/// Accepts a raw primary-key string or a fully materialized record of the
/// related schema; encoding always stores the plain key. Decoding returns
/// an unresolved [`Reference::Key`] — rehydration is the query layer's
/// eager-loading job, never this type's.
#[derive(Debug, Clone, Copy, Default)]
pub struct RefType;

fn validate_object_id(hex: &str) -> RecordStoreResult<()> {
    ObjectId::parse_str(hex)
        .map(|_| ())
        .map_err(|_| invalid("value is not a valid ObjectId hex string"))
}

fn record_key(record: &crate::record::Record) -> RecordStoreResult<String> {
    let pk = record
        .schema()
        .primary_key()
        .ok_or_else(|| {
            RecordStoreError::ReferenceResolution(format!(
                "no primary key found in referenced schema `{}`",
                record.schema().name()
            ))
        })?
        .clone();

    match record.value(&pk) {
        Some(Value::String(s)) => Ok(s.clone()),
        Some(Value::Reference(Reference::Key(s))) => Ok(s.clone()),
        _ => Err(RecordStoreError::ReferenceResolution(format!(
            "referenced record in schema `{}` has no primary key value",
            record.schema().name()
        ))),
    }
}

impl FieldType for RefType {
    fn validate(&self, value: &Value) -> RecordStoreResult<()> {
        match value {
            Value::Null => Ok(()),
            Value::String(s) | Value::Reference(Reference::Key(s)) => validate_object_id(s),
            Value::Reference(Reference::Record(_)) => Ok(()),
            _ => Err(invalid("value is not a valid reference key or record")),
        }
    }

    fn decode(&self, field: &Field, row: &Document) -> RecordStoreResult<Option<Value>> {
        match row.get(field.name()) {
            None | Some(Bson::Null) => Ok(None),
            Some(Bson::String(s)) => Ok(Some(Value::Reference(Reference::Key(s.clone())))),
            Some(Bson::ObjectId(oid)) => {
                Ok(Some(Value::Reference(Reference::Key(oid.to_hex()))))
            }
            Some(_) => Err(invalid("value is not an object id")),
        }
    }

    fn encode(&self, field: &Field, value: &Value, row: &mut Document) -> RecordStoreResult<()> {
        let key = match value {
            Value::Null => {
                row.insert(field.name(), Bson::Null);
                return Ok(());
            }
            Value::String(s) | Value::Reference(Reference::Key(s)) => s.clone(),
            Value::Reference(Reference::Record(record)) => record_key(record)?,
            _ => return Err(invalid("value is not a valid reference key or record")),
        };

        validate_object_id(&key)?;
        row.insert(field.name(), Bson::String(key));
        Ok(())
    }
}
