//! Partial update expressions.
//!
//! An [`Update`] is an ordered list of field-level operations applied to every
//! document matching a filter. The cascade engine builds updates out of four
//! primitives: set a field, unset a field, pull matching elements out of an array,
//! and push an element onto an array. Field names are dot-delimited paths.
//!
//! ```ignore
//! use denorm::update::Update;
//!
//! let update = Update::new()
//!     .pull("children", doc! { "id": child_id })
//!     .push("children", doc! { "id": child_id, "name": "Foo" });
//! ```

use bson::{Bson, Document as BsonDocument};

/// A single field-level operation.
#[derive(Debug, Clone, PartialEq)]
pub enum UpdateOp {
    /// Sets the field to the value, creating intermediate documents as needed.
    Set { field: String, value: Bson },
    /// Removes the field.
    Unset { field: String },
    /// Removes every element of the array field whose fields equal all the entries
    /// of `matching`.
    Pull { field: String, matching: BsonDocument },
    /// Appends the value to the array field, creating the array if it is absent.
    Push { field: String, value: Bson },
}

impl UpdateOp {
    /// Returns the field path this operation targets.
    pub fn field(&self) -> &str {
        match self {
            UpdateOp::Set { field, .. }
            | UpdateOp::Unset { field }
            | UpdateOp::Pull { field, .. }
            | UpdateOp::Push { field, .. } => field,
        }
    }
}

/// An ordered list of operations applied atomically to each matching document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Update {
    ops: Vec<UpdateOp>,
}

impl Update {
    /// Creates an empty update.
    pub fn new() -> Self {
        Self { ops: Vec::new() }
    }

    /// Adds a set operation.
    pub fn set(mut self, field: impl Into<String>, value: impl Into<Bson>) -> Self {
        self.ops.push(UpdateOp::Set { field: field.into(), value: value.into() });
        self
    }

    /// Adds an unset operation.
    pub fn unset(mut self, field: impl Into<String>) -> Self {
        self.ops.push(UpdateOp::Unset { field: field.into() });
        self
    }

    /// Adds a pull operation.
    pub fn pull(mut self, field: impl Into<String>, matching: BsonDocument) -> Self {
        self.ops.push(UpdateOp::Pull { field: field.into(), matching });
        self
    }

    /// Adds a push operation.
    pub fn push(mut self, field: impl Into<String>, value: impl Into<Bson>) -> Self {
        self.ops.push(UpdateOp::Push { field: field.into(), value: value.into() });
        self
    }

    /// Adds one set operation per top-level entry of `fields`.
    pub fn merge(self, fields: BsonDocument) -> Self {
        fields
            .into_iter()
            .fold(self, |update, (field, value)| update.set(field, value))
    }

    /// Returns the operations in application order.
    pub fn ops(&self) -> &[UpdateOp] {
        &self.ops
    }

    /// Returns true if the update contains no operations.
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}

/// Outcome of an update-many operation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpdateResult {
    /// Number of documents matched by the filter.
    pub matched: u64,
    /// Number of matched documents whose content changed.
    pub modified: u64,
}
