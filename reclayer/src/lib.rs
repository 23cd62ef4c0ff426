//! Main reclayer crate providing a schema-driven record layer over document
//! databases.
//!
//! This crate is the primary entry point for users of the reclayer
//! framework. It re-exports the core types from the sub-crates and provides
//! convenient access to the storage backends.
//!
//! # Features
//!
//! - **Schema-driven records** - Fields declare a type that validates,
//!   decodes and encodes every value crossing the storage boundary
//! - **Dirty tracking** - Records know whether they are new or modified and
//!   persist only what changed
//! - **Composable filters** - Predicate trees resolved through a
//!   replaceable operator registry
//! - **Eager reference loading** - Related records hydrated in one batched
//!   sub-query per reference field
//! - **Multiple backends** - In-memory storage for tests and development,
//!   MongoDB for persistence (behind the `mongodb` feature)
//!
//! # Quick Start
//!
//! ```ignore
//! use reclayer::memory::MemoryBackend;
//! use reclayer::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> RecordStoreResult<()> {
//!     let backend = MemoryBackend::new();
//!
//!     let users = Schema::builder("users")
//!         .field("id", StringType)
//!         .field("name", StringType)
//!         .field("age", NumberType)
//!         .build();
//!
//!     let mut alice = Record::new(users.clone());
//!     alice.set_value(users.field("name").unwrap(), "Alice")?;
//!     alice.set_value(users.field("age").unwrap(), "30")?; // stored as the integer 30
//!     alice.save(&backend).await?;
//!
//!     let adults = Query::new(users.clone(), &backend)
//!         .filter(Filter::gte("age", 18))
//!         .order_by([users.field("name").unwrap()])
//!         .execute()
//!         .await?;
//!
//!     println!("found {} adult(s)", adults.len());
//!     Ok(())
//! }
//! ```
//!
//! # Backends
//!
//! - [`memory`] - Fast in-memory storage for development and testing
//! - [`mongodb`] - Persistent MongoDB backend (requires the `mongodb` feature)

pub mod prelude;

pub use reclayer_core::{backend, error, filter, options, query, record, schema, types, value};

pub use reclayer_core::{
    filter::{Filter, ResolverRegistry},
    query::Query,
    record::Record,
    schema::{Field, Schema},
    value::{Reference, Value},
};

// Re-export BSON types for convenience
pub use bson;

/// In-memory storage backend implementations.
pub mod memory {
    pub use reclayer_memory::{MemoryBackend, MemoryBackendBuilder};
}

/// MongoDB storage backend implementations.
///
/// This module is only available when the `mongodb` feature is enabled.
#[cfg(feature = "mongodb")]
pub mod mongodb {
    pub use reclayer_mongodb::{MongoBackend, MongoBackendBuilder};
}
