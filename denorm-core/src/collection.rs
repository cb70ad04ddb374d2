//! Collection types for document store operations.
//!
//! - [`Collection`] - Untyped collection with explicit BSON documents
//! - [`TypedCollection`] - Type-safe collection for a specific record type; its writes
//!   trigger cascades
//!
//! # Example
//!
//! ```ignore
//! let children = store.typed_collection::<Child>();
//!
//! children.save(&child).await?;
//! child.reset_changes()?;
//!
//! let parents = store.collection("parents").find(&Filter::exists("child")).await?;
//! ```

use bson::{Bson, Uuid};
use std::marker::PhantomData;

use crate::{
    backend::StoreBackend,
    document::{Document, DocumentExt},
    error::DocumentStoreResult,
    query::Expr,
    store::DocumentStore,
    update::{Update, UpdateResult},
};

/// An untyped collection with a reference to a storage backend.
///
/// Writes made through an untyped collection never cascade; there is no record to ask
/// for directives.
#[derive(Debug)]
pub struct Collection<'a, B: StoreBackend> {
    name: String,
    backend: &'a B,
}

impl<'a, B: StoreBackend> Collection<'a, B> {
    pub(crate) fn new(name: String, backend: &'a B) -> Self {
        Self { name, backend }
    }

    /// Returns the name of this collection.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Inserts new documents into the collection.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentStoreError::DocumentAlreadyExists`](crate::error::DocumentStoreError::DocumentAlreadyExists)
    /// if an id is already taken.
    pub async fn insert(&self, documents: Vec<(Uuid, Bson)>) -> DocumentStoreResult<()> {
        self.backend
            .insert_documents(documents, self.name())
            .await
    }

    /// Retrieves documents by id. Missing ids are omitted.
    pub async fn get<U>(&self, ids: Vec<U>) -> DocumentStoreResult<Vec<Bson>>
    where
        U: Into<Uuid> + Send + Sync + 'static,
    {
        self.backend
            .get_documents(
                ids.into_iter()
                    .map(Into::into)
                    .collect(),
                self.name(),
            )
            .await
    }

    /// Returns every document matching `filter`.
    pub async fn find(&self, filter: &Expr) -> DocumentStoreResult<Vec<Bson>> {
        self.backend
            .find_documents(filter, self.name())
            .await
    }

    /// Applies a partial update to every document matching `filter`.
    pub async fn update_many(&self, filter: &Expr, update: &Update) -> DocumentStoreResult<UpdateResult> {
        self.backend
            .update_many(filter, update, self.name())
            .await
    }
}

/// A collection of records of type `D`.
///
/// `insert`, `save` and `delete` write the record first and cascade afterwards, so a
/// cascade never runs for a write the backend rejected. Cascades run inline or on the
/// background queue depending on the store's [`CascadeConfig`](crate::config::CascadeConfig).
///
/// Change trackers are left alone: call `reset_changes` on the record after a
/// successful save.
#[derive(Debug)]
pub struct TypedCollection<'a, B: StoreBackend + 'static, D: Document> {
    name: String,
    store: &'a DocumentStore<B>,
    _marker: PhantomData<D>,
}

impl<'a, B: StoreBackend + 'static, D: Document> TypedCollection<'a, B, D> {
    pub(crate) fn new(name: String, store: &'a DocumentStore<B>) -> Self {
        Self { name, store, _marker: PhantomData }
    }

    /// Returns the name of this collection.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Inserts new records, then cascades each of them.
    ///
    /// # Errors
    ///
    /// Fails without cascading if serialization or the insert fails.
    pub async fn insert(&self, records: Vec<D>) -> DocumentStoreResult<()> {
        let persisted = records
            .iter()
            .map(|record| record.to_document())
            .collect::<DocumentStoreResult<Vec<_>>>()?;

        self.store
            .backend()
            .insert_documents(
                records
                    .iter()
                    .zip(&persisted)
                    .map(|(record, doc)| (*record.id(), Bson::Document(doc.clone())))
                    .collect(),
                self.name(),
            )
            .await?;

        for (record, doc) in records.iter().zip(persisted) {
            self.store.cascade_save(record, doc).await?;
        }

        Ok(())
    }

    /// Writes the record, replacing any stored version, then cascades it.
    pub async fn save(&self, record: &D) -> DocumentStoreResult<()> {
        let persisted = record.to_document()?;

        self.store
            .backend()
            .upsert_documents(vec![(*record.id(), Bson::Document(persisted.clone()))], self.name())
            .await?;

        self.store.cascade_save(record, persisted).await
    }

    /// Deletes the record, then removes its copies from related documents.
    pub async fn delete(&self, record: &D) -> DocumentStoreResult<()> {
        self.store
            .backend()
            .delete_documents(vec![*record.id()], self.name())
            .await?;

        self.store.cascade_delete(record).await
    }

    /// Retrieves records by id. Missing ids are omitted.
    pub async fn get<U>(&self, ids: Vec<U>) -> DocumentStoreResult<Vec<D>>
    where
        U: Into<Uuid> + Send + Sync + 'static,
    {
        self.store
            .backend()
            .get_documents(
                ids.into_iter()
                    .map(Into::into)
                    .collect(),
                self.name(),
            )
            .await?
            .into_iter()
            .map(D::from_bson)
            .collect()
    }

    /// Retrieves a single record by id.
    pub async fn get_one(&self, id: impl Into<Uuid>) -> DocumentStoreResult<Option<D>> {
        Ok(self.get(vec![id.into()]).await?.into_iter().next())
    }

    /// Returns every record matching `filter`.
    pub async fn find(&self, filter: &Expr) -> DocumentStoreResult<Vec<D>> {
        self.store
            .backend()
            .find_documents(filter, self.name())
            .await?
            .into_iter()
            .map(D::from_bson)
            .collect()
    }

    /// Returns the first record matching `filter`.
    pub async fn find_one(&self, filter: &Expr) -> DocumentStoreResult<Option<D>> {
        Ok(self.find(filter).await?.into_iter().next())
    }
}
