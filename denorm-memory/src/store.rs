//! In-memory storage implementation for document stores.
//!
//! Documents are kept as BSON values in HashMaps behind an async-safe read-write lock.
//! Partial updates are applied to a copy of each matching document and swapped in
//! only when every operation succeeded, so a document is never left half-updated.

use std::{collections::HashMap, sync::Arc};
use async_trait::async_trait;
use mea::rwlock::RwLock;
use bson::{Uuid, Bson, Document as BsonDocument};
use tracing::trace;

use denorm_core::{
    backend::{StoreBackend, StoreBackendBuilder},
    error::{DocumentStoreError, DocumentStoreResult},
    path::{get_path_mut, remove_path, set_path},
    query::Expr,
    update::{Update, UpdateOp, UpdateResult},
};

use crate::evaluator::{DocumentEvaluator, matches_keys};

type CollectionMap = HashMap<String, Bson>;
type StoreMap = HashMap<String, CollectionMap>;


/// Thread-safe in-memory document storage backend.
///
/// `InMemoryStore` is cloneable and uses an `Arc`-wrapped internal state. Clones share
/// the same underlying data, which lets tests keep a handle to the backend after
/// handing it to a [`DocumentStore`](denorm_core::store::DocumentStore).
///
/// Filters and updates scan every document of the collection; there are no indexes.
///
/// # Example
///
/// ```ignore
/// use denorm_memory::InMemoryStore;
/// use denorm::backend::StoreBackend;
/// use bson::{Uuid, Bson, doc};
///
/// let store = InMemoryStore::new();
/// let id = Uuid::new();
/// store.insert_documents(vec![(id, Bson::Document(doc! { "name": "Alice" }))], "users").await?;
///
/// let docs = store.get_documents(vec![id], "users").await?;
/// assert_eq!(docs.len(), 1);
/// ```
#[derive(Default, Clone, Debug)]
pub struct InMemoryStore {
    /// collection name -> (document id -> document)
    store: Arc<RwLock<StoreMap>>,
}

impl InMemoryStore {
    /// Creates a new empty in-memory document store.
    pub fn new() -> Self {
        Self {
            store: Arc::new(RwLock::new(StoreMap::new())),
        }
    }

    /// Creates a builder for constructing an `InMemoryStore`.
    pub fn builder() -> InMemoryStoreBuilder {
        InMemoryStoreBuilder::default()
    }

    /// Returns every document of a collection, in no particular order.
    pub async fn dump(&self, collection: &str) -> Vec<Bson> {
        self.store
            .read()
            .await
            .get(collection)
            .map(|docs| docs.values().cloned().collect())
            .unwrap_or_default()
    }
}

/// Applies every operation of `update` to `doc`, in order.
///
/// Null array fields are treated as absent by pull and push.
///
/// # Errors
///
/// Returns [`DocumentStoreError::InvalidDocument`] if a path crosses a scalar, or if
/// pull or push targets a field that holds something other than an array.
pub fn apply_update(doc: &mut BsonDocument, update: &Update) -> DocumentStoreResult<()> {
    for op in update.ops() {
        match op {
            UpdateOp::Set { field, value } => set_path(doc, field, value.clone())?,
            UpdateOp::Unset { field } => {
                remove_path(doc, field);
            }
            UpdateOp::Pull { field, matching } => match get_path_mut(doc, field) {
                Some(Bson::Array(items)) => items.retain(|item| !matches_keys(item, matching)),
                None | Some(Bson::Null) => {}
                Some(other) => return Err(not_an_array("pull", field, other)),
            },
            UpdateOp::Push { field, value } => match get_path_mut(doc, field) {
                Some(Bson::Array(items)) => items.push(value.clone()),
                None | Some(Bson::Null) => set_path(doc, field, Bson::Array(vec![value.clone()]))?,
                Some(other) => return Err(not_an_array("push", field, other)),
            },
        }
    }

    Ok(())
}

fn not_an_array(op: &str, field: &str, value: &Bson) -> DocumentStoreError {
    DocumentStoreError::InvalidDocument(format!(
        "cannot {} on '{}': expected an array, found {:?}",
        op,
        field,
        value.element_type()
    ))
}


#[async_trait]
impl StoreBackend for InMemoryStore {
    async fn insert_documents(&self, documents: Vec<(Uuid, Bson)>, collection: &str) -> DocumentStoreResult<()> {
        let mut store = self.store.write().await;
        let collection_map = store
            .entry(collection.to_string())
            .or_default();

        if let Some((id, _)) = documents
            .iter()
            .find(|(id, _)| collection_map.contains_key(&id.to_string()))
        {
            return Err(DocumentStoreError::DocumentAlreadyExists(id.to_string(), collection.to_string()));
        }

        for (id, doc) in documents {
            collection_map.insert(id.to_string(), doc);
        }

        Ok(())
    }

    async fn upsert_documents(&self, documents: Vec<(Uuid, Bson)>, collection: &str) -> DocumentStoreResult<()> {
        let mut store = self.store.write().await;
        let collection_map = store
            .entry(collection.to_string())
            .or_default();

        for (id, doc) in documents {
            collection_map.insert(id.to_string(), doc);
        }

        Ok(())
    }

    async fn delete_documents(&self, ids: Vec<Uuid>, collection: &str) -> DocumentStoreResult<()> {
        let mut store = self.store.write().await;

        if let Some(collection_map) = store.get_mut(collection) {
            for id in ids {
                collection_map.remove(&id.to_string());
            }
        }

        Ok(())
    }

    async fn get_documents(&self, ids: Vec<Uuid>, collection: &str) -> DocumentStoreResult<Vec<Bson>> {
        let store = self.store.read().await;
        let collection_map = match store.get(collection) {
            Some(col) => col,
            None => return Ok(vec![]),
        };

        Ok(
            ids
                .into_iter()
                .filter_map(|id| collection_map.get(&id.to_string()).cloned())
                .collect()
        )
    }

    async fn find_documents(&self, filter: &Expr, collection: &str) -> DocumentStoreResult<Vec<Bson>> {
        let store = self.store.read().await;

        match store.get(collection) {
            Some(col) => DocumentEvaluator::filter_documents(col.values(), filter),
            None => Ok(vec![]),
        }
    }

    async fn update_many(&self, filter: &Expr, update: &Update, collection: &str) -> DocumentStoreResult<UpdateResult> {
        let mut store = self.store.write().await;
        let collection_map = match store.get_mut(collection) {
            Some(col) => col,
            None => return Ok(UpdateResult::default()),
        };

        let mut result = UpdateResult::default();

        for doc in collection_map.values_mut() {
            let Bson::Document(fields) = doc else {
                continue;
            };

            if !DocumentEvaluator::new(fields).evaluate(filter)? {
                continue;
            }

            result.matched += 1;

            let mut updated = fields.clone();
            apply_update(&mut updated, update)?;

            if updated != *fields {
                *fields = updated;
                result.modified += 1;
            }
        }

        trace!(collection, matched = result.matched, modified = result.modified, "update_many");

        Ok(result)
    }
}


/// Builder for constructing [`InMemoryStore`] instances.
#[derive(Default)]
pub struct InMemoryStoreBuilder {
    seed: Vec<(String, Uuid, Bson)>,
}

impl InMemoryStoreBuilder {
    /// Adds a document the store starts out with.
    pub fn with_document(mut self, collection: &str, id: Uuid, document: Bson) -> Self {
        self.seed.push((collection.to_string(), id, document));
        self
    }
}

#[async_trait]
impl StoreBackendBuilder for InMemoryStoreBuilder {
    type Backend = InMemoryStore;

    async fn build(self) -> DocumentStoreResult<Self::Backend> {
        let store = InMemoryStore::new();

        for (collection, id, document) in self.seed {
            store.upsert_documents(vec![(id, document)], &collection).await?;
        }

        Ok(store)
    }
}
