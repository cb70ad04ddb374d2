//! Background cascade propagation.
//!
//! In [`CascadeMode::Background`](crate::config::CascadeMode::Background) the store hands
//! every cascade to a [`CascadeQueue`] instead of running it inline. A single worker task
//! drains the queue in submission order, so two cascades of the same record never
//! overtake each other. Propagation is best-effort: a failed job is logged and dropped,
//! never retried.
//!
//! [`CascadeQueue::shutdown`] closes the queue and waits until every submitted job has
//! been applied, which makes it the synchronization point for callers (and tests) that
//! need to observe the cascaded state.

use bson::Document as BsonDocument;
use tokio::{runtime::Handle, sync::mpsc, task::JoinHandle};
use tracing::{debug, error, info, warn};

use crate::{
    backend::StoreBackend,
    cascade::CascadeEngine,
    document::AnyDocument,
    error::{DocumentStoreError, DocumentStoreResult},
};

/// A unit of background work. Jobs own their records so they can outlive the caller.
pub enum CascadeJob {
    Save {
        record: Box<dyn AnyDocument>,
        persisted: BsonDocument,
    },
    Delete {
        record: Box<dyn AnyDocument>,
    },
}

impl CascadeJob {
    fn kind(&self) -> &'static str {
        match self {
            CascadeJob::Save { .. } => "save",
            CascadeJob::Delete { .. } => "delete",
        }
    }

    fn record(&self) -> &dyn AnyDocument {
        match self {
            CascadeJob::Save { record, .. } | CascadeJob::Delete { record } => record.as_ref(),
        }
    }
}

/// Handle to the background cascade worker.
#[derive(Debug)]
pub struct CascadeQueue {
    tx: mpsc::Sender<CascadeJob>,
    worker: JoinHandle<()>,
}

impl CascadeQueue {
    /// Spawns the worker on the current tokio runtime.
    ///
    /// A capacity of zero is raised to one.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentStoreError::Initialization`] when called outside a tokio runtime.
    pub fn start<B: StoreBackend + 'static>(engine: CascadeEngine<B>, capacity: usize) -> DocumentStoreResult<Self> {
        let runtime = Handle::try_current()
            .map_err(|e| DocumentStoreError::Initialization(format!("cascade worker needs a tokio runtime: {}", e)))?;

        let (tx, rx) = mpsc::channel(capacity.max(1));
        let worker = runtime.spawn(run(engine, rx));

        info!(capacity, "cascade worker started");

        Ok(Self { tx, worker })
    }

    /// Queues a job, waiting for room if the queue is full.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentStoreError::Queue`] if the worker is no longer running.
    pub async fn submit(&self, job: CascadeJob) -> DocumentStoreResult<()> {
        let kind = job.kind();

        self.tx.send(job).await.map_err(|rejected| {
            let record = rejected.0.record();
            warn!(
                kind,
                collection = record.document_collection(),
                id = %record.document_id(),
                "cascade worker stopped, job dropped"
            );
            DocumentStoreError::Queue("cascade worker is not running".into())
        })
    }

    /// Closes the queue and waits for the worker to apply every queued job.
    pub async fn shutdown(self) -> DocumentStoreResult<()> {
        drop(self.tx);

        self.worker
            .await
            .map_err(|e| DocumentStoreError::Queue(format!("cascade worker failed: {}", e)))
    }
}

async fn run<B: StoreBackend + 'static>(engine: CascadeEngine<B>, mut rx: mpsc::Receiver<CascadeJob>) {
    while let Some(job) = rx.recv().await {
        let result = match &job {
            CascadeJob::Save { record, persisted } => engine.cascade_save(record.as_ref(), persisted).await,
            CascadeJob::Delete { record } => engine.cascade_delete(record.as_ref()).await,
        };

        let record = job.record();
        match result {
            Ok(()) => debug!(
                kind = job.kind(),
                collection = record.document_collection(),
                id = %record.document_id(),
                "background cascade applied"
            ),
            Err(e) => error!(
                kind = job.kind(),
                collection = record.document_collection(),
                id = %record.document_id(),
                error = %e,
                "background cascade failed"
            ),
        }
    }

    info!("cascade worker stopped");
}
