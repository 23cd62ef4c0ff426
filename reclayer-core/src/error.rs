//! Error types and result types for record store operations.
//!
//! This module provides error handling for schema definition, record
//! persistence and query execution. Use [`RecordStoreResult<T>`] as the
//! return type for fallible operations.

use thiserror::Error;

/// Represents all possible errors that can occur when working with the
/// record layer.
///
/// Field-level failures (`InvalidValue`, `Validation`) never mutate record
/// state; backend failures (`Backend`, `Persistence`) are propagated to the
/// caller unchanged apart from added operation/collection context.
#[derive(Error, Debug)]
pub enum RecordStoreError {
    /// A value failed a field type's validate/encode step. Carries no field
    /// name; [`RecordStoreError::Validation`] wraps it with one where the
    /// field is known.
    #[error("invalid value: {0}")]
    InvalidValue(String),
    /// A value failed validation for a specific named field.
    #[error("validation failed for field `{field}`: {reason}")]
    Validation {
        /// The name of the field that rejected the value.
        field: String,
        /// Human-readable cause.
        reason: String,
    },
    /// `set_value` was called with a field belonging to a different schema.
    #[error("field `{field}` belongs to schema `{field_schema}`, not `{schema}`")]
    SchemaMismatch {
        /// The name of the offending field.
        field: String,
        /// The schema the field belongs to.
        field_schema: String,
        /// The schema of the record it was applied to.
        schema: String,
    },
    /// A related schema has no discoverable primary-key field, or a
    /// referenced record's primary key is unset at encode time.
    #[error("reference resolution failed: {0}")]
    ReferenceResolution(String),
    /// A record update was attempted without a usable identifier.
    #[error("record in schema `{0}` has no identifier")]
    MissingIdentifier(String),
    /// A backend operation failed; carries the operation and collection for
    /// diagnosis.
    #[error("{operation} on collection `{collection}` failed: {message}")]
    Persistence {
        /// The backend operation that failed (`insert`, `find`, ...).
        operation: &'static str,
        /// The collection (schema) the operation targeted.
        collection: String,
        /// The underlying backend failure.
        message: String,
    },
    /// A raw backend failure without operation context.
    #[error("backend error: {0}")]
    Backend(String),
    /// Error during backend construction or connection setup.
    #[error("initialization error: {0}")]
    Initialization(String),
    /// An option service lookup failed.
    #[error("option lookup failed: {0}")]
    Options(String),
}

impl RecordStoreError {
    /// Attaches operation and collection context to a bare backend error.
    ///
    /// Non-backend errors pass through unchanged.
    pub fn into_persistence(self, operation: &'static str, collection: &str) -> Self {
        match self {
            RecordStoreError::Backend(message) => RecordStoreError::Persistence {
                operation,
                collection: collection.to_string(),
                message,
            },
            other => other,
        }
    }
}

/// A specialized `Result` type for record store operations.
pub type RecordStoreResult<T> = Result<T, RecordStoreError>;
