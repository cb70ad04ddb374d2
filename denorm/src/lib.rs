//! Cascading denormalization for document stores.
//!
//! This crate is the primary entry point of the denorm project. It re-exports the core
//! types from the sub-crates, the `Trackable` derive, and the storage backends.
//!
//! # Features
//!
//! - **Change tracking** - Snapshot a record after it is persisted and ask which field paths changed
//! - **Cascading copies** - Records describe where copies of them live; saves and deletes keep those copies in sync
//! - **Multiple backends** - In-memory and MongoDB storage behind one narrow trait
//! - **Background propagation** - Optionally run cascades on a worker queue
//!
//! # Quick Start
//!
//! ```ignore
//! use denorm::{prelude::*, memory::InMemoryStore};
//! use serde::{Serialize, Deserialize};
//!
//! #[derive(Debug, Clone, Serialize, Deserialize, Trackable)]
//! pub struct Child {
//!     pub id: Uuid,
//!     pub name: String,
//!     pub parent_id: Option<Uuid>,
//!     #[serde(skip)]
//!     #[track(tracker)]
//!     tracker: ChangeTracker<Child>,
//! }
//!
//! impl Document for Child {
//!     fn id(&self) -> &Uuid { &self.id }
//!     fn collection_name() -> &'static str { "children" }
//!     fn as_cascading(&self) -> Option<&dyn Cascading> { Some(self) }
//! }
//!
//! impl Cascading for Child {
//!     fn cascade_directives(&self, _: &bson::Document) -> DocumentStoreResult<Vec<CascadeDirective>> {
//!         let mut directive = CascadeDirective::many("parents", Filter::eq("id", self.parent_id))
//!             .through("children")
//!             .properties(["id", "name"]);
//!
//!         if self.modified("parent_id")? {
//!             // A record that had no parent has nothing to clean up.
//!             if let Some(old) = self.original_value("parent_id").filter(|old| !matches!(old, Bson::Null)) {
//!                 directive = directive.prior_selector(Filter::eq("id", old.clone()));
//!             }
//!         }
//!
//!         Ok(vec![directive])
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> DocumentStoreResult<()> {
//!     let store = DocumentStore::new(InMemoryStore::builder().build().await?);
//!     let children = store.typed_collection::<Child>();
//!
//!     let mut child = Child { id: Uuid::new(), name: "c".into(), parent_id: Some(parent), tracker: Default::default() };
//!     children.save(&child).await?;
//!     child.reset_changes()?;
//!
//!     child.parent_id = Some(other_parent);
//!     children.save(&child).await?;
//!     child.reset_changes()?;
//!
//!     store.shutdown().await
//! }
//! ```
//!
//! # Backends
//!
//! - [`memory`] - In-memory storage for development and testing
//! - [`mongodb`] - MongoDB backend (requires the `mongodb` feature)

#[allow(unused_extern_crates)]
extern crate self as denorm;

pub mod prelude;

pub use denorm_core::{
    backend, cascade, collection, config, document, error, path, query, queue, store, tracking, update,
};
pub use denorm_macros::Trackable;

// Re-export BSON types for convenience
pub use bson;

/// In-memory storage backend implementations.
pub mod memory {
    pub use denorm_memory::{InMemoryStore, InMemoryStoreBuilder, apply_update};
}

/// MongoDB storage backend implementations.
///
/// This module is only available when the `mongodb` feature is enabled.
#[cfg(feature = "mongodb")]
pub mod mongodb {
    pub use denorm_mongodb::{MongoDbStore, MongoDbStoreBuilder};
}
