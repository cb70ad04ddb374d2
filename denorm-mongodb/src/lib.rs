//! MongoDB backend implementation for denorm.
//!
//! This crate provides a MongoDB-based implementation of the `StoreBackend` trait.
//! Cascade updates are translated to native `$set`, `$unset`, `$pull` and `$push`
//! update-many calls, so every directive is a single server-side operation.
//!
//! To use this backend, include the `mongodb` feature in your `Cargo.toml`:
//!
//! ```toml
//! [dependencies]
//! denorm = { version = "x.y.z", features = ["mongodb"] }
//! ```
//!
//! # Example
//!
//! ```ignore
//! use denorm::{backend::StoreBackendBuilder, mongodb::MongoDbStore, DocumentStore};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let backend = MongoDbStore::builder("mongodb://localhost:27017", "my_database")
//!         .build()
//!         .await?;
//!     let store = DocumentStore::new(backend);
//!
//!     Ok(())
//! }
//! ```

#[allow(unused_extern_crates)]
extern crate self as denorm_mongodb;

pub mod store;
pub mod query;
pub mod sanitizer;

pub use store::{MongoDbStore, MongoDbStoreBuilder};
