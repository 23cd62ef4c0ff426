//! In-memory storage backend for reclayer.
//!
//! This crate provides a thread-safe, in-memory implementation of the
//! `StoreBackend` trait. It uses async-aware read-write locks for concurrent
//! access and is ideal for development and testing.
//!
//! # Quick Start
//!
//! ```ignore
//! use reclayer::memory::MemoryBackend;
//! use reclayer::{Record, Schema, StringType};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let backend = MemoryBackend::new();
//!
//!     let users = Schema::builder("users")
//!         .field("id", StringType)
//!         .field("name", StringType)
//!         .build();
//!
//!     let mut user = Record::new(users.clone());
//!     user.set_value(users.field("name").unwrap(), "Alice")?;
//!     user.save(&backend).await?;
//!
//!     Ok(())
//! }
//! ```

#[allow(unused_extern_crates)]
extern crate self as reclayer_memory;

pub mod evaluator;
pub mod store;

pub use store::{MemoryBackend, MemoryBackendBuilder};
