//! Storage backend abstraction for the document store.
//!
//! The [`StoreBackend`] trait is the narrow collection accessor the rest of the crate
//! is written against: whole-document writes keyed by id, id lookups, filtered reads,
//! and filtered partial updates. The cascade engine only needs the last two.
//!
//! # Examples
//!
//! ```ignore
//! use denorm::backend::StoreBackend;
//! use denorm::query::Filter;
//! use denorm::update::Update;
//! use bson::{Uuid, Bson, doc};
//!
//! let uuid = Uuid::new();
//! backend.insert_documents(vec![(uuid, Bson::Document(doc! { "name": "Alice" }))], "users").await?;
//!
//! let result = backend
//!     .update_many(&Filter::eq("name", "Alice"), &Update::new().set("active", true), "users")
//!     .await?;
//! ```

use async_trait::async_trait;
use bson::{Bson, Uuid};
use std::fmt::Debug;

use crate::{
    error::DocumentStoreResult,
    query::Expr,
    update::{Update, UpdateResult},
};

/// Abstract interface for document storage backends.
///
/// # Thread Safety
///
/// Implementations are shared between the store, its collections and the background
/// cascade worker, so they must support concurrent access from multiple tasks.
///
/// # Atomicity
///
/// [`StoreBackend::update_many`] must apply all operations of an [`Update`] to a single
/// document atomically. Nothing is required across documents or across calls.
#[async_trait]
pub trait StoreBackend: Send + Sync + Debug {
    /// Inserts new documents into a collection.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentStoreError::DocumentAlreadyExists`](crate::error::DocumentStoreError::DocumentAlreadyExists)
    /// if a document with one of the ids is already stored.
    async fn insert_documents(
        &self,
        documents: Vec<(Uuid, Bson)>,
        collection: &str,
    ) -> DocumentStoreResult<()>;

    /// Replaces documents by id, inserting the ones that do not exist yet.
    async fn upsert_documents(
        &self,
        documents: Vec<(Uuid, Bson)>,
        collection: &str,
    ) -> DocumentStoreResult<()>;

    /// Deletes documents by id. Missing ids are skipped.
    async fn delete_documents(&self, ids: Vec<Uuid>, collection: &str) -> DocumentStoreResult<()>;

    /// Retrieves documents by id. Missing ids are omitted from the result.
    async fn get_documents(
        &self,
        ids: Vec<Uuid>,
        collection: &str,
    ) -> DocumentStoreResult<Vec<Bson>>;

    /// Returns every document of the collection matching `filter`.
    async fn find_documents(&self, filter: &Expr, collection: &str) -> DocumentStoreResult<Vec<Bson>>;

    /// Applies `update` to every document of the collection matching `filter`.
    ///
    /// Matching nothing is not an error.
    async fn update_many(
        &self,
        filter: &Expr,
        update: &Update,
        collection: &str,
    ) -> DocumentStoreResult<UpdateResult>;

    /// Releases backend resources.
    ///
    /// The default implementation is a no-op; backends holding connections override it.
    async fn shutdown(&self) -> DocumentStoreResult<()> {
        Ok(())
    }
}

#[async_trait]
pub trait StoreBackendBuilder {
    type Backend: StoreBackend;

    async fn build(self) -> DocumentStoreResult<Self::Backend>;
}
