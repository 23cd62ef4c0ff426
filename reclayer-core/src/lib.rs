//! A schema-driven record and query layer over document databases.
//!
//! This crate is the core of the reclayer project and provides:
//!
//! - **Schema definition** ([`schema`]) - Named field/edge collections built once and shared
//! - **Field type system** ([`types`]) - Validate/decode/encode capabilities per data kind
//! - **Record state machine** ([`record`]) - Dirty tracking and insert-vs-update persistence
//! - **Filter expressions** ([`filter`]) - Predicate trees and the operator resolver registry
//! - **Query building** ([`query`]) - Fluent find/count execution with eager reference loading
//! - **Store backend abstraction** ([`backend`]) - The trait storage implementations fulfil
//! - **Option services** ([`options`]) - Dynamic allowed-value sets for enumerated fields
//! - **Error handling** ([`error`]) - Error and result types shared by every layer
//!
//! # Example
//!
//! ```ignore
//! use reclayer_core::filter::Filter;
//! use reclayer_core::query::Query;
//! use reclayer_core::record::Record;
//! use reclayer_core::schema::Schema;
//! use reclayer_core::types::{NumberType, StringType};
//!
//! let users = Schema::builder("users")
//!     .field("id", StringType)
//!     .field("name", StringType)
//!     .field("age", NumberType)
//!     .build();
//!
//! let mut alice = Record::new(users.clone());
//! alice.set_value(users.field("name").unwrap(), "Alice")?;
//! alice.set_value(users.field("age").unwrap(), "30")?; // stored as 30
//! alice.save(&backend).await?;
//!
//! let adults = Query::new(users.clone(), &backend)
//!     .filter(Filter::gte("age", 18))
//!     .order_by([users.field("name").unwrap()])
//!     .execute()
//!     .await?;
//! ```

#[allow(unused_extern_crates)]
extern crate self as reclayer_core;

pub mod backend;
pub mod error;
pub mod filter;
pub mod options;
pub mod query;
pub mod record;
pub mod schema;
pub mod types;
pub mod value;
