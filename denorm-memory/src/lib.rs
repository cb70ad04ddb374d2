//! In-memory document storage backend for denorm.
//!
//! This crate provides a thread-safe, in-memory implementation of the `StoreBackend`
//! trait, including filtered partial updates, so the whole cascade engine can run
//! without a database. It is what the test suites use.
//!
//! # Quick Start
//!
//! ```ignore
//! use denorm::{DocumentStore, memory::InMemoryStore};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let backend = InMemoryStore::builder().build().await?;
//!     let store = DocumentStore::new(backend);
//!
//!     store.typed_collection::<Child>().save(&child).await?;
//!
//!     Ok(())
//! }
//! ```

#[allow(unused_extern_crates)]
extern crate self as denorm_memory;

pub mod store;
pub mod evaluator;

pub use store::{InMemoryStore, InMemoryStoreBuilder, apply_update};
