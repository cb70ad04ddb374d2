//! Core traits for document representation and serialization.
//!
//! This module provides the traits every stored record implements, the opt-in hook
//! through which a record exposes cascade directives, and a type-erased view used by
//! the cascade engine when it walks relationships across record types.

use bson::{Bson, Document as BsonDocument, Uuid, de::deserialize_from_bson, ser::serialize_to_bson};
use serde::{Deserialize, Serialize};
use std::any::Any;

use crate::{
    cascade::Cascading,
    error::{DocumentStoreError, DocumentStoreResult},
};

/// Core trait that all records stored in a document store must implement.
///
/// Every record has a stable unique identifier and belongs to one collection. The
/// identifier is also serialized into the record under [`Document::id_field`], which
/// is what selectors and cascade match keys address.
///
/// # Example
///
/// ```ignore
/// use denorm::document::Document;
/// use bson::Uuid;
/// use serde::{Serialize, Deserialize};
///
/// #[derive(Debug, Clone, Serialize, Deserialize)]
/// pub struct Parent {
///     pub id: Uuid,
///     pub name: String,
/// }
///
/// impl Document for Parent {
///     fn id(&self) -> &Uuid {
///         &self.id
///     }
///
///     fn collection_name() -> &'static str {
///         "parents"
///     }
/// }
/// ```
pub trait Document: Serialize + for<'de> Deserialize<'de> + Send + Sync + Clone + 'static {
    /// Returns a reference to this record's unique identifier.
    fn id(&self) -> &Uuid;

    /// Returns the name of the collection this record belongs to.
    fn collection_name() -> &'static str;

    /// Returns the serialized name of the identifier field.
    fn id_field() -> &'static str {
        "id"
    }

    /// Capability query for cascading.
    ///
    /// Records that propagate copies of themselves into other collections implement
    /// [`Cascading`] and override this to return `Some(self)`. The default reports no
    /// capability, which makes every cascade call for the type a no-op.
    fn as_cascading(&self) -> Option<&dyn Cascading> {
        None
    }
}

/// Extension trait providing BSON conversion for records.
///
/// Automatically implemented for all types that implement [`Document`].
pub trait DocumentExt: Document {
    /// Converts this record to a BSON value.
    fn to_bson(&self) -> DocumentStoreResult<Bson>;

    /// Converts this record to a BSON document (its field map).
    ///
    /// # Errors
    ///
    /// Returns [`DocumentStoreError::InvalidDocument`] if the record does not serialize
    /// to a map.
    fn to_document(&self) -> DocumentStoreResult<BsonDocument>;

    /// Creates a record from a BSON value.
    fn from_bson(bson: Bson) -> DocumentStoreResult<Self>;
}

impl<D: Document> DocumentExt for D {
    fn to_bson(&self) -> DocumentStoreResult<Bson> {
        Ok(serialize_to_bson(self)?)
    }

    fn to_document(&self) -> DocumentStoreResult<BsonDocument> {
        into_document(self.to_bson()?, D::collection_name())
    }

    fn from_bson(bson: Bson) -> DocumentStoreResult<Self> {
        Ok(deserialize_from_bson(bson)?)
    }
}

/// Unwraps a BSON value that must hold a document.
pub(crate) fn into_document(bson: Bson, context: &str) -> DocumentStoreResult<BsonDocument> {
    match bson {
        Bson::Document(doc) => Ok(doc),
        other => Err(DocumentStoreError::InvalidDocument(format!(
            "expected a document for {}, found {:?}",
            context,
            other.element_type()
        ))),
    }
}

/// Type-erased record trait.
///
/// The cascade engine works on `dyn AnyDocument` so that a nested directive can hand it
/// a record of a different concrete type than the one that started the cascade, and so
/// that background jobs can own records of any type.
pub trait AnyDocument: Send + Sync {
    /// Returns a reference to this record's unique identifier.
    fn document_id(&self) -> &Uuid;

    /// Returns the serialized name of the identifier field.
    fn document_id_field(&self) -> &'static str;

    /// Returns the name of the collection this record belongs to.
    fn document_collection(&self) -> &'static str;

    /// Returns a reference to the record as a generic `Any` type.
    fn as_any(&self) -> &dyn Any;

    /// Capability query for cascading, forwarded to [`Document::as_cascading`].
    fn as_any_cascading(&self) -> Option<&dyn Cascading>;

    /// Clones the record into a new boxed `AnyDocument`.
    fn clone_box(&self) -> Box<dyn AnyDocument>;

    /// Converts this record to its BSON field map.
    fn to_any_document(&self) -> DocumentStoreResult<BsonDocument>;
}

impl dyn AnyDocument {
    /// Attempts to downcast a reference to a specific record type.
    pub fn downcast_ref<D: Document>(&self) -> Option<&D> {
        self.as_any().downcast_ref::<D>()
    }
}

impl<D: Document> AnyDocument for D {
    fn document_id(&self) -> &Uuid {
        self.id()
    }

    fn document_id_field(&self) -> &'static str {
        D::id_field()
    }

    fn document_collection(&self) -> &'static str {
        D::collection_name()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_cascading(&self) -> Option<&dyn Cascading> {
        self.as_cascading()
    }

    fn clone_box(&self) -> Box<dyn AnyDocument> {
        Box::new(self.clone())
    }

    fn to_any_document(&self) -> DocumentStoreResult<BsonDocument> {
        DocumentExt::to_document(self)
    }
}

impl Clone for Box<dyn AnyDocument> {
    fn clone(&self) -> Box<dyn AnyDocument> {
        self.clone_box()
    }
}

/// Conversion trait for converting a record into a boxed `AnyDocument`.
pub trait IntoAnyDocument {
    /// Converts this value into a boxed `AnyDocument`.
    fn into_any_document(self) -> Box<dyn AnyDocument>;
}

impl<D: Document> IntoAnyDocument for D {
    fn into_any_document(self) -> Box<dyn AnyDocument> {
        Box::new(self) as Box<dyn AnyDocument>
    }
}

impl IntoAnyDocument for Box<dyn AnyDocument> {
    fn into_any_document(self) -> Box<dyn AnyDocument> {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, Serialize, Deserialize)]
    struct Note {
        id: Uuid,
        body: String,
    }

    impl Document for Note {
        fn id(&self) -> &Uuid {
            &self.id
        }

        fn collection_name() -> &'static str {
            "notes"
        }
    }

    #[test]
    fn to_document_exposes_id_field() {
        let note = Note { id: Uuid::new(), body: "hello".into() };
        let doc = note.to_document().unwrap();

        assert_eq!(doc.get(Note::id_field()), Some(&Bson::from(note.id)));
        assert_eq!(doc.get_str("body").unwrap(), "hello");
    }

    #[test]
    fn any_document_reports_no_capability_by_default() {
        let note = Note { id: Uuid::new(), body: "hello".into() }.into_any_document();

        assert!(note.as_any_cascading().is_none());
        assert_eq!(note.document_collection(), "notes");
        assert!(note.downcast_ref::<Note>().is_some());
    }
}
