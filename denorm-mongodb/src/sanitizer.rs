//! Key escaping for MongoDB field names.
//!
//! MongoDB reserves dots and a leading dollar sign in field names, and rejects null
//! bytes. Keys of stored documents are escaped on the way in and restored on the way
//! out. Values are stored untouched, so filter values need no escaping, and field
//! paths in filters and updates are passed through as-is because their dots are path
//! separators.

use bson::{Bson, Document};


pub(crate) struct KeySanitizer;

impl KeySanitizer {
    const REPLACEMENTS: [(&'static str, &'static str); 3] = [
        (".", "__dot__"),
        ("$", "__dollar__"),
        ("\0", "__null__"),
    ];

    /// Escapes every key of `value`, recursing into documents and arrays.
    pub(crate) fn sanitize_value(value: &Bson) -> Bson {
        match value {
            Bson::Array(arr) => Bson::Array(arr.iter().map(Self::sanitize_value).collect()),
            Bson::Document(doc) => Bson::Document(Self::sanitize_document(doc)),
            _ => value.clone(),
        }
    }

    pub(crate) fn sanitize_document(doc: &Document) -> Document {
        doc.iter()
            .map(|(k, v)| (Self::sanitize_string(k), Self::sanitize_value(v)))
            .collect()
    }

    pub(crate) fn sanitize_string(input: &str) -> String {
        Self::REPLACEMENTS
            .iter()
            .fold(input.to_string(), |acc, (target, replacement)| acc.replace(target, replacement))
    }

    /// Inverse of [`KeySanitizer::sanitize_value`].
    pub(crate) fn restore_value(value: &Bson) -> Bson {
        match value {
            Bson::Array(arr) => Bson::Array(arr.iter().map(Self::restore_value).collect()),
            Bson::Document(doc) => Bson::Document(Self::restore_document(doc)),
            _ => value.clone(),
        }
    }

    pub(crate) fn restore_document(doc: &Document) -> Document {
        doc.iter()
            .map(|(k, v)| (Self::restore_string(k), Self::restore_value(v)))
            .collect()
    }

    pub(crate) fn restore_string(input: &str) -> String {
        Self::REPLACEMENTS
            .iter()
            .rev()
            .fold(input.to_string(), |acc, (target, replacement)| acc.replace(replacement, target))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    #[test]
    fn keys_are_escaped_and_values_kept() {
        let original = doc! { "a.b": "x.y", "list": [{ "$k": 1 }] };
        let sanitized = KeySanitizer::sanitize_document(&original);

        assert_eq!(sanitized, doc! { "a__dot__b": "x.y", "list": [{ "__dollar__k": 1 }] });
        assert_eq!(KeySanitizer::restore_document(&sanitized), original);
    }
}
