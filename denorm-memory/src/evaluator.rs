//! Filter evaluation for in-memory documents.
//!
//! Field names in filters are dotted paths resolved with
//! [`get_path`](denorm_core::path::get_path), so `owner.id` reaches into embedded
//! documents.

use std::collections::HashMap;
use bson::{Bson, Document as BsonDocument, datetime::DateTime};

use denorm_core::{
    query::{QueryVisitor, Expr, FieldOp},
    error::{DocumentStoreError, DocumentStoreResult},
    path::get_path,
};


/// Comparable view of a BSON value.
///
/// Numbers are normalized to `f64` so that an `Int32` filter value matches an `Int64`
/// field. Values without a dedicated variant compare by BSON equality.
#[derive(Debug)]
pub(crate) enum Comparable<'a> {
    Null,
    Bool(bool),
    Number(f64),
    DateTime(DateTime),
    String(&'a str),
    Array(Vec<Comparable<'a>>),
    Map(HashMap<&'a str, Comparable<'a>>),
    /// Binary (including UUIDs), object ids and the remaining BSON types.
    Raw(&'a Bson),
}

impl<'a> From<&'a Bson> for Comparable<'a> {
    fn from(bson: &'a Bson) -> Self {
        match bson {
            Bson::Null => Comparable::Null,
            Bson::Boolean(value) => Comparable::Bool(*value),
            Bson::Int32(value) => Comparable::Number(*value as f64),
            Bson::Int64(value) => Comparable::Number(*value as f64),
            Bson::Double(value) => Comparable::Number(*value),
            Bson::DateTime(value) => Comparable::DateTime(*value),
            Bson::String(value) => Comparable::String(value),
            Bson::Array(arr) => Comparable::Array(
                arr
                    .iter()
                    .map(Comparable::from)
                    .collect::<Vec<_>>()
            ),
            Bson::Document(doc) => Comparable::Map(
                doc
                    .iter()
                    .map(|(k, v)| (k.as_str(), Comparable::from(v)))
                    .collect::<HashMap<_, _>>()
            ),
            other => Comparable::Raw(other),
        }
    }
}

impl<'a> PartialEq for Comparable<'a> {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Comparable::Null, Comparable::Null) => true,
            (Comparable::Bool(a), Comparable::Bool(b)) => a == b,
            (Comparable::Number(a), Comparable::Number(b)) => a == b,
            (Comparable::DateTime(a), Comparable::DateTime(b)) => a == b,
            (Comparable::String(a), Comparable::String(b)) => a == b,
            (Comparable::Array(a), Comparable::Array(b)) => a == b,
            (Comparable::Map(a), Comparable::Map(b)) => a == b,
            (Comparable::Raw(a), Comparable::Raw(b)) => a == b,
            _ => false,
        }
    }
}

/// True if `element` is a document holding every entry of `keys`.
///
/// This is the element test of a pull operation.
pub(crate) fn matches_keys(element: &Bson, keys: &BsonDocument) -> bool {
    match element {
        Bson::Document(doc) => keys.iter().all(|(field, expected)| {
            get_path(doc, field)
                .is_some_and(|actual| Comparable::from(actual) == Comparable::from(expected))
        }),
        _ => false,
    }
}


pub(crate) struct DocumentEvaluator<'a> {
    document: &'a BsonDocument,
}

impl<'a> DocumentEvaluator<'a> {
    pub fn new(document: &'a BsonDocument) -> Self {
        Self { document }
    }

    pub fn evaluate(&mut self, expr: &Expr) -> DocumentStoreResult<bool> {
        self.visit_expr(expr)
    }

    pub fn filter_documents(
        documents: impl IntoIterator<Item = &'a Bson>,
        expr: &Expr,
    ) -> DocumentStoreResult<Vec<Bson>> {
        let mut matched = Vec::new();

        for doc in documents {
            if let Bson::Document(fields) = doc {
                if DocumentEvaluator::new(fields).evaluate(expr)? {
                    matched.push(doc.clone());
                }
            }
        }

        Ok(matched)
    }
}

impl<'a> QueryVisitor for DocumentEvaluator<'a> {
    type Output = bool;
    type Error = DocumentStoreError;

    fn visit_and(&mut self, exprs: &[Expr]) -> Result<Self::Output, Self::Error> {
        for expr in exprs {
            if !self.visit_expr(expr)? {
                return Ok(false);
            }
        }

        Ok(true)
    }

    fn visit_or(&mut self, exprs: &[Expr]) -> Result<Self::Output, Self::Error> {
        for expr in exprs {
            if self.visit_expr(expr)? {
                return Ok(true);
            }
        }

        Ok(false)
    }

    fn visit_not(&mut self, expr: &Expr) -> Result<Self::Output, Self::Error> {
        Ok(!self.visit_expr(expr)?)
    }

    fn visit_exists(&mut self, field: &str, should_exist: bool) -> Result<Self::Output, Self::Error> {
        Ok(get_path(self.document, field).is_some() == should_exist)
    }

    fn visit_field(&mut self, field: &str, op: &FieldOp, value: &Bson) -> Result<Self::Output, Self::Error> {
        // A missing field compares as null.
        let null = Bson::Null;
        let field_value = get_path(self.document, field).unwrap_or(&null);

        match op {
            FieldOp::Eq => Ok(Comparable::from(field_value) == Comparable::from(value)),
            FieldOp::Ne => Ok(Comparable::from(field_value) != Comparable::from(value)),
            FieldOp::AnyOf => Ok(any_of(field_value, value)),
            FieldOp::NoneOf => Ok(!any_of(field_value, value)),
        }
    }
}

/// True if the field value, or any element of it when it is an array, equals one of
/// `candidates`.
fn any_of(field_value: &Bson, candidates: &Bson) -> bool {
    let candidates = match Comparable::from(candidates) {
        Comparable::Array(values) => values,
        single => vec![single],
    };

    match Comparable::from(field_value) {
        Comparable::Array(items) => items.iter().any(|item| candidates.contains(item)),
        single => candidates.contains(&single),
    }
}
