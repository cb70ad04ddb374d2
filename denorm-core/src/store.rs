//! Main document store interface.
//!
//! A [`DocumentStore`] owns a backend, the [`CascadeEngine`] running against it and,
//! in background mode, the [`CascadeQueue`] feeding that engine.
//!
//! # Example
//!
//! ```ignore
//! use denorm::store::DocumentStore;
//! use denorm::config::{CascadeConfig, CascadeMode};
//!
//! let store = DocumentStore::with_config(
//!     backend,
//!     CascadeConfig::default().with_mode(CascadeMode::Background),
//! )?;
//! store.typed_collection::<Child>().save(&child).await?;
//!
//! // Waits for queued cascades before releasing the backend.
//! store.shutdown().await?;
//! ```

use bson::Document as BsonDocument;
use std::sync::Arc;

use crate::{
    backend::StoreBackend,
    cascade::CascadeEngine,
    collection::{Collection, TypedCollection},
    config::CascadeConfig,
    document::{Document, IntoAnyDocument},
    error::DocumentStoreResult,
    queue::{CascadeJob, CascadeQueue},
};

/// A document store bound to a specific backend implementation.
#[derive(Debug)]
pub struct DocumentStore<B: StoreBackend + 'static> {
    backend: Arc<B>,
    engine: CascadeEngine<B>,
    queue: Option<CascadeQueue>,
    config: CascadeConfig,
}

impl<B: StoreBackend + 'static> DocumentStore<B> {
    /// Creates a store that cascades synchronously.
    pub fn new(backend: B) -> Self {
        let backend = Arc::new(backend);
        let engine = CascadeEngine::new(Arc::clone(&backend));

        Self { backend, engine, queue: None, config: CascadeConfig::default() }
    }

    /// Creates a store with explicit cascade settings.
    ///
    /// # Errors
    ///
    /// In background mode the cascade worker is spawned here, so this returns
    /// [`DocumentStoreError::Initialization`](crate::error::DocumentStoreError::Initialization)
    /// when called outside a tokio runtime.
    pub fn with_config(backend: B, config: CascadeConfig) -> DocumentStoreResult<Self> {
        let mut store = Self::new(backend);

        if config.is_background() {
            store.queue = Some(CascadeQueue::start(store.engine.clone(), config.queue_capacity)?);
        }
        store.config = config;

        Ok(store)
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn config(&self) -> &CascadeConfig {
        &self.config
    }

    /// Returns the engine, for running cascades outside of a collection write.
    pub fn cascade_engine(&self) -> &CascadeEngine<B> {
        &self.engine
    }

    /// Gets a typed collection for the record type `D`, named by
    /// [`Document::collection_name`].
    pub fn typed_collection<D: Document>(&self) -> TypedCollection<'_, B, D> {
        TypedCollection::new(D::collection_name().to_string(), self)
    }

    /// Gets an untyped collection with the given name.
    pub fn collection(&self, name: &str) -> Collection<'_, B> {
        Collection::new(name.to_string(), &*self.backend)
    }

    pub(crate) async fn cascade_save<D: Document>(
        &self,
        record: &D,
        persisted: BsonDocument,
    ) -> DocumentStoreResult<()> {
        match &self.queue {
            Some(queue) => {
                queue
                    .submit(CascadeJob::Save {
                        record: record.clone().into_any_document(),
                        persisted,
                    })
                    .await
            }
            None => self.engine.cascade_save(record, &persisted).await,
        }
    }

    pub(crate) async fn cascade_delete<D: Document>(&self, record: &D) -> DocumentStoreResult<()> {
        match &self.queue {
            Some(queue) => {
                queue
                    .submit(CascadeJob::Delete {
                        record: record.clone().into_any_document(),
                    })
                    .await
            }
            None => self.engine.cascade_delete(record).await,
        }
    }

    /// Drains pending background cascades, then shuts the backend down.
    pub async fn shutdown(self) -> DocumentStoreResult<()> {
        if let Some(queue) = self.queue {
            queue.shutdown().await?;
        }

        self.backend.shutdown().await
    }
}
