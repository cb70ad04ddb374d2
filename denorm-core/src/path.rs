//! Dot-delimited path addressing into nested BSON documents.
//!
//! Paths such as `address.city` walk through embedded documents one segment at a
//! time. Arrays are leaves: a path never indexes into an array element.

use bson::{Bson, Document as BsonDocument};

use crate::error::{DocumentStoreError, DocumentStoreResult};

/// Returns the value stored at `path`, if every segment resolves.
pub fn get_path<'a>(doc: &'a BsonDocument, path: &str) -> Option<&'a Bson> {
    match path.split_once('.') {
        None => doc.get(path),
        Some((head, rest)) => match doc.get(head)? {
            Bson::Document(child) => get_path(child, rest),
            _ => None,
        },
    }
}

/// Returns a mutable reference to the value stored at `path`.
pub fn get_path_mut<'a>(doc: &'a mut BsonDocument, path: &str) -> Option<&'a mut Bson> {
    match path.split_once('.') {
        None => doc.get_mut(path),
        Some((head, rest)) => match doc.get_mut(head)? {
            Bson::Document(child) => get_path_mut(child, rest),
            _ => None,
        },
    }
}

/// Stores `value` at `path`, creating intermediate documents as needed.
///
/// Absent or null intermediates are replaced by empty documents.
///
/// # Errors
///
/// Returns [`DocumentStoreError::InvalidDocument`] if an intermediate segment holds a
/// value that is neither a document nor null.
pub fn set_path(doc: &mut BsonDocument, path: &str, value: Bson) -> DocumentStoreResult<()> {
    match path.split_once('.') {
        None => {
            doc.insert(path, value);
            Ok(())
        }
        Some((head, rest)) => {
            let slot = doc
                .entry(head.to_string())
                .or_insert_with(|| Bson::Document(BsonDocument::new()));

            if let Bson::Null = slot {
                *slot = Bson::Document(BsonDocument::new());
            }

            match slot {
                Bson::Document(child) => set_path(child, rest, value),
                other => Err(DocumentStoreError::InvalidDocument(format!(
                    "cannot address '{}' through non-document value of type {:?}",
                    path,
                    other.element_type()
                ))),
            }
        }
    }
}

/// Removes and returns the value stored at `path`.
pub fn remove_path(doc: &mut BsonDocument, path: &str) -> Option<Bson> {
    match path.split_once('.') {
        None => doc.remove(path),
        Some((head, rest)) => match doc.get_mut(head)? {
            Bson::Document(child) => remove_path(child, rest),
            _ => None,
        },
    }
}

/// Builds a nested field map holding only `properties`, read from `source`.
///
/// Each property is a path; its value is copied to the same path in the result.
/// Missing source values become null, so a projected copy always carries every
/// requested key.
///
/// ```ignore
/// let payload = project_properties(&["name", "subChild.foo"], &persisted)?;
/// // { "name": ..., "subChild": { "foo": ... } }
/// ```
///
/// # Errors
///
/// Returns [`DocumentStoreError::InvalidDocument`] if two properties conflict, such as
/// `a` and `a.b` where `a` is a scalar.
pub fn project_properties<S: AsRef<str>>(
    properties: &[S],
    source: &BsonDocument,
) -> DocumentStoreResult<BsonDocument> {
    properties
        .iter()
        .try_fold(BsonDocument::new(), |mut projected, property| {
            let property = property.as_ref();
            let value = get_path(source, property)
                .cloned()
                .unwrap_or(Bson::Null);

            match property.rsplit_once('.') {
                Some((parent, _)) if !matches!(get_path(&projected, parent), None | Some(Bson::Document(_))) => {
                    Err(DocumentStoreError::InvalidDocument(format!(
                        "cannot project '{}' through non-document property '{}'",
                        property, parent
                    )))
                }
                _ => {
                    set_path(&mut projected, property, value)?;
                    Ok(projected)
                }
            }
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    #[test]
    fn get_walks_nested_documents() {
        let doc = doc! { "address": { "city": "Oslo" }, "tags": ["a"] };

        assert_eq!(get_path(&doc, "address.city"), Some(&Bson::String("Oslo".into())));
        assert_eq!(get_path(&doc, "address.zip"), None);
        assert_eq!(get_path(&doc, "tags.0"), None);
    }

    #[test]
    fn set_creates_intermediates_and_replaces_null() {
        let mut doc = doc! { "child": null };

        set_path(&mut doc, "child.sub.foo", Bson::from("x")).unwrap();

        assert_eq!(doc, doc! { "child": { "sub": { "foo": "x" } } });
    }

    #[test]
    fn set_through_scalar_fails() {
        let mut doc = doc! { "child": 5 };

        assert!(matches!(
            set_path(&mut doc, "child.name", Bson::from("x")),
            Err(DocumentStoreError::InvalidDocument(_))
        ));
    }

    #[test]
    fn remove_returns_previous_value() {
        let mut doc = doc! { "child": { "name": "a", "age": 3 } };

        assert_eq!(remove_path(&mut doc, "child.name"), Some(Bson::from("a")));
        assert_eq!(doc, doc! { "child": { "age": 3 } });
        assert_eq!(remove_path(&mut doc, "missing.name"), None);
    }

    #[test]
    fn projection_builds_nested_map() {
        let source = doc! {
            "bar": "bar",
            "number": 5,
            "child": { "name": "child", "subChild": { "foo": "foo" } },
        };

        let projected = project_properties(&["bar", "child.name", "child.missing"], &source).unwrap();

        assert_eq!(
            projected,
            doc! { "bar": "bar", "child": { "name": "child", "missing": null } }
        );
    }

    #[test]
    fn projection_rejects_conflicting_paths() {
        let source = doc! { "a": 1 };

        assert!(project_properties(&["a", "a.b"], &source).is_err());
    }
}
