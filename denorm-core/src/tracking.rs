//! Change tracking for records.
//!
//! A [`ChangeTracker`] keeps a [`Snapshot`] of a record's serialized fields, taken
//! after the record was last persisted, and reports which field paths differ from it.
//! The comparison is driven by a static schema of [`FieldDescriptor`]s instead of
//! runtime reflection; `#[derive(Trackable)]` generates the schema from the struct
//! definition.
//!
//! ```ignore
//! #[derive(Debug, Clone, Serialize, Deserialize, Trackable)]
//! struct Child {
//!     id: Uuid,
//!     parent_id: Option<Uuid>,
//!     #[serde(skip)]
//!     #[track(tracker)]
//!     tracker: ChangeTracker<Child>,
//! }
//!
//! child.reset_changes()?;
//! child.parent_id = Some(other);
//! assert!(child.modified("parent_id")?);
//! ```
//!
//! Comparison rules:
//!
//! - leaf fields differ when their values differ; arrays are compared as a whole by
//!   their textual form, never element by element;
//! - nested fields recurse, and child paths are prefixed with the parent key;
//! - a nested structure that is absent on one side and present on the other reports
//!   every one of its fields as changed;
//! - a nested field holding something other than a document on either side is a
//!   [`DocumentStoreError::StructuralMismatch`].

use bson::{Bson, Document as BsonDocument, ser::serialize_to_bson};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::{fmt, marker::PhantomData};
use tracing::{error, trace};

use crate::{
    document::into_document,
    error::{DocumentStoreError, DocumentStoreResult},
    path::get_path,
};

/// How a field takes part in change detection.
#[derive(Clone, Copy)]
pub enum FieldKind {
    /// Compared by value.
    Leaf,
    /// An embedded structure compared field by field under the field's key.
    Nested(fn() -> &'static [FieldDescriptor]),
    /// An embedded structure serialized inline into its parent; its fields are
    /// compared at the parent's level and reported without a prefix.
    Flatten(fn() -> &'static [FieldDescriptor]),
}

impl fmt::Debug for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldKind::Leaf => f.write_str("Leaf"),
            FieldKind::Nested(schema) => f.debug_tuple("Nested").field(&schema()).finish(),
            FieldKind::Flatten(schema) => f.debug_tuple("Flatten").field(&schema()).finish(),
        }
    }
}

/// Compile-time description of one serialized field.
#[derive(Debug, Clone, Copy)]
pub struct FieldDescriptor {
    /// The serialized key of the field.
    pub key: &'static str,
    /// How the field is compared.
    pub kind: FieldKind,
}

impl FieldDescriptor {
    pub const fn leaf(key: &'static str) -> Self {
        Self { key, kind: FieldKind::Leaf }
    }

    pub const fn nested(key: &'static str, schema: fn() -> &'static [FieldDescriptor]) -> Self {
        Self { key, kind: FieldKind::Nested(schema) }
    }

    pub const fn flatten(key: &'static str, schema: fn() -> &'static [FieldDescriptor]) -> Self {
        Self { key, kind: FieldKind::Flatten(schema) }
    }
}

/// Types with a static field schema.
///
/// Usually derived with `#[derive(Trackable)]`.
pub trait Trackable: Serialize {
    /// Returns the descriptors of every tracked field, in declaration order.
    fn schema() -> &'static [FieldDescriptor];
}

/// A deep copy of a record's serialized fields at a point in time.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    fields: BsonDocument,
    captured_at: DateTime<Utc>,
}

impl Snapshot {
    /// Serializes `record` into a new snapshot.
    pub fn capture<T: Serialize>(record: &T) -> DocumentStoreResult<Self> {
        Ok(Self {
            fields: into_document(serialize_to_bson(record)?, "snapshot")?,
            captured_at: Utc::now(),
        })
    }

    /// Returns the captured field map.
    pub fn fields(&self) -> &BsonDocument {
        &self.fields
    }

    /// Returns when the snapshot was captured.
    pub fn captured_at(&self) -> DateTime<Utc> {
        self.captured_at
    }
}

/// Result of comparing a record with its snapshot.
///
/// Computing a change set once and querying it repeatedly avoids re-diffing the
/// record for every field of interest.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeSet {
    is_new: bool,
    changed: Vec<String>,
}

impl ChangeSet {
    /// A change set for a record that has never been snapshotted.
    pub fn new_record() -> Self {
        Self { is_new: true, changed: Vec::new() }
    }

    /// A change set listing the changed paths of a known record.
    pub fn with_changes(changed: Vec<String>) -> Self {
        Self { is_new: false, changed }
    }

    /// True if there was no snapshot to compare against.
    pub fn is_new(&self) -> bool {
        self.is_new
    }

    /// The changed field paths, in schema order.
    pub fn changed(&self) -> &[String] {
        &self.changed
    }

    /// True if the record is new, or `path` or any path below it changed.
    pub fn modified(&self, path: &str) -> bool {
        self.is_new
            || self.changed.iter().any(|changed| {
                changed == path
                    || changed
                        .strip_prefix(path)
                        .is_some_and(|rest| rest.starts_with('.'))
            })
    }
}

/// Holds the snapshot for one record instance.
///
/// The tracker is valueless until [`ChangeTracker::reset`] is first called. Resetting
/// is the record owner's job, once per successful persist; nothing in the store or
/// the cascade engine resets a tracker implicitly.
pub struct ChangeTracker<D> {
    snapshot: Option<Snapshot>,
    _marker: PhantomData<fn() -> D>,
}

impl<D> ChangeTracker<D> {
    pub fn new() -> Self {
        Self { snapshot: None, _marker: PhantomData }
    }

    /// Replaces the snapshot.
    pub fn store(&mut self, snapshot: Snapshot) {
        self.snapshot = Some(snapshot);
    }

    /// Drops the snapshot, making the record look new again.
    pub fn clear(&mut self) {
        self.snapshot = None;
    }

    pub fn snapshot(&self) -> Option<&Snapshot> {
        self.snapshot.as_ref()
    }

    pub fn captured_at(&self) -> Option<DateTime<Utc>> {
        self.snapshot.as_ref().map(Snapshot::captured_at)
    }

    /// Looks `path` up in the snapshot. `None` when no snapshot exists or the path
    /// does not resolve.
    pub fn original_value(&self, path: &str) -> Option<&Bson> {
        self.snapshot
            .as_ref()
            .and_then(|snapshot| get_path(&snapshot.fields, path))
    }
}

impl<D: Trackable> ChangeTracker<D> {
    /// Captures a fresh snapshot of `record`, overwriting any previous one.
    pub fn reset(&mut self, record: &D) -> DocumentStoreResult<()> {
        self.store(Snapshot::capture(record)?);
        Ok(())
    }

    /// Compares `record` with the snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentStoreError::StructuralMismatch`] if a nested field changed
    /// shape between the snapshot and `record`.
    pub fn compare(&self, record: &D) -> DocumentStoreResult<ChangeSet> {
        let Some(snapshot) = &self.snapshot else {
            return Ok(ChangeSet::new_record());
        };

        let current = into_document(serialize_to_bson(record)?, "change comparison")?;
        let changed = changed_fields(D::schema(), &snapshot.fields, &current)
            .inspect_err(|e| error!(error = %e, "change comparison failed"))?;

        trace!(changed = ?changed, "compared record with snapshot");

        Ok(ChangeSet::with_changes(changed))
    }

    /// True if the record is new or `path` (or a path below it) changed.
    pub fn modified(&self, record: &D, path: &str) -> DocumentStoreResult<bool> {
        Ok(self.compare(record)?.modified(path))
    }
}

impl<D> Default for ChangeTracker<D> {
    fn default() -> Self {
        Self::new()
    }
}

impl<D> Clone for ChangeTracker<D> {
    fn clone(&self) -> Self {
        Self { snapshot: self.snapshot.clone(), _marker: PhantomData }
    }
}

impl<D> fmt::Debug for ChangeTracker<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChangeTracker")
            .field("captured_at", &self.captured_at())
            .finish()
    }
}

/// Records that own their [`ChangeTracker`].
///
/// `#[derive(Trackable)]` implements this when a field is marked `#[track(tracker)]`.
pub trait Tracked: Trackable + Sized {
    fn tracker(&self) -> &ChangeTracker<Self>;

    fn tracker_mut(&mut self) -> &mut ChangeTracker<Self>;

    /// Snapshots the record's current state.
    fn reset_changes(&mut self) -> DocumentStoreResult<()> {
        let snapshot = Snapshot::capture(self)?;
        self.tracker_mut().store(snapshot);
        Ok(())
    }

    fn changes(&self) -> DocumentStoreResult<ChangeSet> {
        self.tracker().compare(self)
    }

    fn modified(&self, path: &str) -> DocumentStoreResult<bool> {
        self.tracker().modified(self, path)
    }

    fn original_value(&self, path: &str) -> Option<&Bson> {
        self.tracker().original_value(path)
    }
}

/// Lists the paths of `schema` whose values differ between `before` and `after`.
pub fn changed_fields(
    schema: &[FieldDescriptor],
    before: &BsonDocument,
    after: &BsonDocument,
) -> DocumentStoreResult<Vec<String>> {
    let mut changed = Vec::new();
    diff_into(schema, before, after, None, &mut changed)?;
    Ok(changed)
}

fn diff_into(
    schema: &[FieldDescriptor],
    before: &BsonDocument,
    after: &BsonDocument,
    prefix: Option<&str>,
    changed: &mut Vec<String>,
) -> DocumentStoreResult<()> {
    for field in schema {
        let path = join(prefix, field.key);

        match field.kind {
            FieldKind::Leaf => {
                if leaf_differs(present(before, field.key), present(after, field.key)) {
                    changed.push(path);
                }
            }
            FieldKind::Flatten(child) => diff_into(child(), before, after, prefix, changed)?,
            FieldKind::Nested(child) => {
                match (present(before, field.key), present(after, field.key)) {
                    (None, None) => {}
                    (Some(Bson::Document(old)), Some(Bson::Document(new))) => {
                        diff_into(child(), old, new, Some(&path), changed)?
                    }
                    (None, Some(Bson::Document(_))) | (Some(Bson::Document(_)), None) => {
                        changed.extend(
                            field_keys(child())
                                .into_iter()
                                .map(|key| join(Some(&path), key)),
                        );
                    }
                    (old, new) => {
                        return Err(DocumentStoreError::StructuralMismatch {
                            path,
                            detail: format!(
                                "expected embedded documents, found {:?} and {:?}",
                                old.map(Bson::element_type),
                                new.map(Bson::element_type),
                            ),
                        });
                    }
                }
            }
        }
    }

    Ok(())
}

/// Null and absent are the same for comparison purposes.
fn present<'a>(doc: &'a BsonDocument, key: &str) -> Option<&'a Bson> {
    doc.get(key).filter(|value| !matches!(value, Bson::Null))
}

fn leaf_differs(old: Option<&Bson>, new: Option<&Bson>) -> bool {
    match (old, new) {
        (None, None) => false,
        (Some(Bson::Array(_)), Some(Bson::Array(_))) => old.map(ToString::to_string) != new.map(ToString::to_string),
        (Some(old), Some(new)) => old != new,
        _ => true,
    }
}

fn field_keys(schema: &[FieldDescriptor]) -> Vec<&'static str> {
    schema
        .iter()
        .flat_map(|field| match field.kind {
            FieldKind::Flatten(child) => field_keys(child()),
            _ => vec![field.key],
        })
        .collect()
}

fn join(prefix: Option<&str>, key: &str) -> String {
    match prefix {
        Some(prefix) => format!("{}.{}", prefix, key),
        None => key.to_string(),
    }
}
