//! Error types and result types for document store and cascade operations.
//!
//! Use [`DocumentStoreResult<T>`] as the return type for fallible operations.

use bson::error::Error as BsonError;
use serde_json::Error as SerdeJsonError;
use thiserror::Error;

/// Represents all possible errors raised by the store layer, the change tracker,
/// and the cascade engine.
#[derive(Error, Debug)]
pub enum DocumentStoreError {
    /// Serialization/deserialization error when converting between document formats (BSON, JSON).
    #[error("Serialization error: {0}")]
    Serialization(String),
    /// Error during store initialization or connection setup.
    #[error("Initialization error: {0}")]
    Initialization(String),
    /// A document with the given ID already exists in the collection.
    /// The first argument is the document ID, the second is the collection name.
    #[error("Document {0} already exists in collection {1}")]
    DocumentAlreadyExists(String, String),
    /// The requested document was not found in the collection.
    /// The first argument is the document ID, the second is the collection name.
    #[error("Document not found {0} in collection {1}")]
    DocumentNotFound(String, String),
    /// The document has an invalid structure for the requested operation.
    #[error("Invalid document: {0}")]
    InvalidDocument(String),
    /// An error occurred in the underlying storage backend.
    #[error("Backend error: {0}")]
    Backend(String),
    /// A cascade directive uses a relation type, or a relation shape, the engine cannot execute.
    #[error("Invalid relation type: {0}")]
    InvalidRelationType(String),
    /// The change tracker compared a snapshot and a record whose shapes differ.
    #[error("Structural mismatch at '{path}': {detail}")]
    StructuralMismatch {
        /// Field path at which the shapes diverged.
        path: String,
        /// Description of the two incompatible values.
        detail: String,
    },
    /// A store operation issued on behalf of a cascade directive failed.
    #[error("Cascade to collection {collection} failed: {source}")]
    TargetOperation {
        /// The target collection of the failing directive.
        collection: String,
        /// The underlying store error.
        #[source]
        source: Box<DocumentStoreError>,
    },
    /// The background cascade queue is closed or its worker has stopped.
    #[error("Cascade queue error: {0}")]
    Queue(String),
}

/// A specialized `Result` type for document store operations.
pub type DocumentStoreResult<T> = Result<T, DocumentStoreError>;

impl DocumentStoreError {
    /// Wraps a store error raised while applying a directive to `collection`.
    pub fn target(collection: impl Into<String>, source: DocumentStoreError) -> Self {
        DocumentStoreError::TargetOperation {
            collection: collection.into(),
            source: Box::new(source),
        }
    }
}

impl From<BsonError> for DocumentStoreError {
    fn from(err: BsonError) -> Self {
        DocumentStoreError::Serialization(err.to_string())
    }
}

impl From<SerdeJsonError> for DocumentStoreError {
    fn from(err: SerdeJsonError) -> Self {
        DocumentStoreError::Serialization(err.to_string())
    }
}
