//! Translation of filters and updates into MongoDB syntax.

use bson::{Document, Bson, doc};

use denorm_core::{
    query::{QueryVisitor, Expr, FieldOp},
    error::DocumentStoreError,
    update::{Update, UpdateOp},
};

use crate::sanitizer::KeySanitizer;


/// Translates filter expressions into MongoDB query documents.
pub(crate) struct MongoQueryTranslator;

impl QueryVisitor for MongoQueryTranslator {
    type Output = Document;
    type Error = DocumentStoreError;

    fn visit_and(&mut self, exprs: &[Expr]) -> Result<Self::Output, Self::Error> {
        Ok(doc! {
            "$and": exprs
                .iter()
                .map(|expr| self.visit_expr(expr))
                .collect::<Result<Vec<_>, _>>()?,
        })
    }

    fn visit_or(&mut self, exprs: &[Expr]) -> Result<Self::Output, Self::Error> {
        Ok(doc! {
            "$or": exprs
                .iter()
                .map(|expr| self.visit_expr(expr))
                .collect::<Result<Vec<_>, _>>()?,
        })
    }

    fn visit_not(&mut self, expr: &Expr) -> Result<Self::Output, Self::Error> {
        Ok(doc! {
            "$nor": [self.visit_expr(expr)?],
        })
    }

    fn visit_exists(&mut self, field: &str, should_exist: bool) -> Result<Self::Output, Self::Error> {
        Ok(doc! {
            field: { "$exists": should_exist },
        })
    }

    fn visit_field(&mut self, field: &str, op: &FieldOp, value: &Bson) -> Result<Self::Output, Self::Error> {
        let value = KeySanitizer::sanitize_value(value);

        Ok(doc! {
            field: match op {
                FieldOp::Eq => doc! { "$eq": value },
                FieldOp::Ne => doc! { "$ne": value },
                FieldOp::AnyOf => doc! { "$in": value },
                FieldOp::NoneOf => doc! { "$nin": value },
            }
        })
    }
}

/// Translates an [`Update`] into a MongoDB update document.
///
/// Operations are grouped by operator. A later operation on the same field and
/// operator replaces an earlier one, so the cascade engine sends pulls and pushes of
/// the same array as separate updates.
pub(crate) fn translate_update(update: &Update) -> Document {
    let mut groups = [
        ("$set", Document::new()),
        ("$unset", Document::new()),
        ("$pull", Document::new()),
        ("$push", Document::new()),
    ];

    for op in update.ops() {
        let (group, value) = match op {
            UpdateOp::Set { value, .. } => (0, KeySanitizer::sanitize_value(value)),
            UpdateOp::Unset { .. } => (1, Bson::String(String::new())),
            UpdateOp::Pull { matching, .. } => (2, Bson::Document(matching.clone())),
            UpdateOp::Push { value, .. } => (3, KeySanitizer::sanitize_value(value)),
        };

        groups[group].1.insert(op.field(), value);
    }

    groups
        .into_iter()
        .filter(|(_, fields)| !fields.is_empty())
        .map(|(operator, fields)| (operator.to_string(), Bson::Document(fields)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use denorm_core::query::Filter;

    #[test]
    fn filters_translate_to_operators() {
        let expr = Filter::eq("owner.id", 1).and(Filter::any_of("tag", ["a"])).and(Filter::exists("x").not());

        assert_eq!(
            MongoQueryTranslator.visit_expr(&expr).unwrap(),
            doc! {
                "$and": [
                    { "owner.id": { "$eq": 1 } },
                    { "tag": { "$in": ["a"] } },
                    { "$nor": [{ "x": { "$exists": true } }] },
                ]
            }
        );
    }

    #[test]
    fn updates_group_by_operator() {
        let update = Update::new()
            .set("child", doc! { "a.b": 1 })
            .set("name", "n")
            .unset("old")
            .pull("children", doc! { "id": 7 });

        assert_eq!(
            translate_update(&update),
            doc! {
                "$set": { "child": { "a__dot__b": 1 }, "name": "n" },
                "$unset": { "old": "" },
                "$pull": { "children": { "id": 7 } },
            }
        );
    }
}
