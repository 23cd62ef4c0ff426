//! Convenient re-exports of commonly used types from reclayer.
//!
//! Import this prelude module to quickly access the most frequently used
//! types and traits without needing to import from multiple sub-modules:
//!
//! ```ignore
//! use reclayer::prelude::*;
//! ```
//!
//! This provides access to:
//! - Schema and field construction
//! - The built-in field types
//! - Record, filter and query surfaces
//! - Store backends and builders
//! - Error types

pub use reclayer_core::{
    backend::{FindRequest, StoreBackend, StoreBackendBuilder},
    error::{RecordStoreError, RecordStoreResult},
    filter::{Filter, FilterResolver, ResolverRegistry},
    options::{InMemoryOptionService, OptionService, SelectOption},
    query::Query,
    record::Record,
    schema::{Edge, Field, PRIMARY_KEY, RecordPolicy, Schema, SchemaBuilder},
    types::{
        BooleanType, DateTimeType, FieldType, NumberType, OptionsType, RefType, StringType,
    },
    value::{Reference, Value},
};
