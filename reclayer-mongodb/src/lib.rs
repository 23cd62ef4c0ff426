//! MongoDB backend implementation for reclayer.
//!
//! This crate provides a MongoDB-based implementation of the `StoreBackend`
//! trait, persisting records with the official async driver.
//!
//! To use this backend, include the `mongodb` feature in your `Cargo.toml`:
//!
//! ```toml
//! [dependencies]
//! reclayer = { version = "x.y.z", features = ["mongodb"] }
//! ```
//!
//! # Connection
//!
//! The backend is stood up from a MongoDB connection string through the
//! builder pattern:
//!
//! ```ignore
//! use reclayer::backend::StoreBackendBuilder;
//! use reclayer::mongodb::MongoBackend;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let backend = MongoBackend::builder("mongodb://localhost:27017", "my_database")
//!         .build()
//!         .await?;
//!
//!     Ok(())
//! }
//! ```

#[allow(unused_extern_crates)]
extern crate self as reclayer_mongodb;

pub mod store;

pub use store::{MongoBackend, MongoBackendBuilder};
