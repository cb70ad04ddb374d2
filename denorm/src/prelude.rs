//! Convenient re-exports of commonly used types from denorm.
//!
//! ```ignore
//! use denorm::prelude::*;
//! ```

pub use bson::Uuid;

pub use denorm_core::{
    backend::{StoreBackend, StoreBackendBuilder},
    cascade::{Cardinality, CascadeDirective, CascadeEngine, Cascading},
    collection::{Collection, TypedCollection},
    config::{CascadeConfig, CascadeMode},
    document::{AnyDocument, Document, DocumentExt, IntoAnyDocument},
    error::{DocumentStoreError, DocumentStoreResult},
    query::{Expr, FieldOp, Filter, QueryVisitor},
    store::DocumentStore,
    tracking::{ChangeSet, ChangeTracker, Trackable, Tracked},
    update::{Update, UpdateResult},
};
pub use denorm_macros::Trackable;
