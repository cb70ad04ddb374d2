//! Cascading denormalization.
//!
//! A record that keeps copies of itself inside documents of other collections
//! implements [`Cascading`] and describes each relationship as a [`CascadeDirective`].
//! After the record is persisted, the [`CascadeEngine`] turns every directive into one
//! or more update-many operations against the target collection.
//!
//! Two relation shapes are supported:
//!
//! - [`Cardinality::One`]: the target embeds a single copy under `through`, or has the
//!   copied fields merged onto its top level when there is no through field.
//! - [`Cardinality::Many`]: the target holds an array under `through` with at most one
//!   copy per source record, identified by the directive's match keys.
//!
//! When a relation key changes, the record supplies a prior selector. The engine removes
//! the stale copies from the documents it matches before writing the new copies, so no
//! target holds the record under both the old and the new relation once the save is
//! done.
//!
//! ```ignore
//! impl Cascading for Child {
//!     fn cascade_directives(&self, persisted: &bson::Document) -> DocumentStoreResult<Vec<CascadeDirective>> {
//!         let mut children = CascadeDirective::many("parents", Filter::eq("id", self.parent_id))
//!             .through("children")
//!             .properties(["id", "name"]);
//!
//!         if self.modified("parent_id")? {
//!             // A record that had no parent has nothing to clean up.
//!             if let Some(old) = self.original_value("parent_id").filter(|old| !matches!(old, Bson::Null)) {
//!                 children = children.prior_selector(Filter::eq("id", old.clone()));
//!             }
//!         }
//!
//!         Ok(vec![children])
//!     }
//! }
//! ```
//!
//! Directives are applied one at a time in the order the record returns them, each as
//! its own partial update. Nothing is rolled back: the first failing store operation
//! stops the cascade and is returned wrapped in
//! [`DocumentStoreError::TargetOperation`], with every earlier directive already applied.

use bson::{Bson, Document as BsonDocument};
use futures::future::{BoxFuture, FutureExt};
use std::{any::type_name, fmt, sync::Arc};
use tracing::{debug, trace};

use crate::{
    backend::StoreBackend,
    document::{AnyDocument, Document, DocumentExt, into_document},
    error::{DocumentStoreError, DocumentStoreResult},
    path::project_properties,
    query::Expr,
    update::{Update, UpdateResult},
};

/// Whether the target embeds one copy or an array of copies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Cardinality {
    One,
    Many,
}

impl Cardinality {
    /// Numeric code for a one-to-many relation.
    pub const MANY_CODE: i32 = 0;
    /// Numeric code for a one-to-one relation.
    pub const ONE_CODE: i32 = 1;
}

impl TryFrom<i32> for Cardinality {
    type Error = DocumentStoreError;

    fn try_from(code: i32) -> Result<Self, Self::Error> {
        match code {
            Self::MANY_CODE => Ok(Cardinality::Many),
            Self::ONE_CODE => Ok(Cardinality::One),
            other => Err(DocumentStoreError::InvalidRelationType(format!(
                "unknown relation code {}",
                other
            ))),
        }
    }
}

impl fmt::Display for Cardinality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cardinality::One => f.write_str("one"),
            Cardinality::Many => f.write_str("many"),
        }
    }
}

/// Decodes documents touched by a directive into records that cascade further.
#[derive(Clone, Copy)]
pub struct NestedCascade {
    decode: fn(Bson) -> DocumentStoreResult<Box<dyn AnyDocument>>,
    type_name: &'static str,
}

impl NestedCascade {
    /// Decodes target documents as `D`.
    pub fn of<D: Document>() -> Self {
        Self {
            decode: decode_as::<D>,
            type_name: type_name::<D>(),
        }
    }

    pub fn decode(&self, document: BsonDocument) -> DocumentStoreResult<Box<dyn AnyDocument>> {
        (self.decode)(Bson::Document(document))
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }
}

impl fmt::Debug for NestedCascade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("NestedCascade").field(&self.type_name).finish()
    }
}

fn decode_as<D: Document>(bson: Bson) -> DocumentStoreResult<Box<dyn AnyDocument>> {
    Ok(Box::new(D::from_bson(bson)?))
}

/// One denormalization relationship between a record and a target collection.
///
/// Built fresh for every save or delete; never stored.
#[derive(Debug, Clone)]
pub struct CascadeDirective {
    /// The target collection.
    pub collection: String,
    pub cardinality: Cardinality,
    /// Field path on the target holding the copy or the array of copies. `None` merges
    /// the copied fields onto the target's top level, which only a one-to-one relation
    /// can do.
    pub through: Option<String>,
    /// Matches the targets that should hold the copy now.
    pub selector: Expr,
    /// Matches the targets that held the copy before the relation key changed.
    pub prior_selector: Option<Expr>,
    /// Field paths of the persisted record to copy. Ignored when `payload` is set.
    pub properties: Vec<String>,
    /// Explicit field map to copy.
    pub payload: Option<BsonDocument>,
    /// Fields identifying this record's copy inside a target array. Defaults to the
    /// record's id field and value.
    pub match_keys: Option<BsonDocument>,
    /// Cascade again for every document matched by `selector`.
    pub nested: Option<NestedCascade>,
    /// Only run the removal half of the directive.
    pub remove_only: bool,
}

impl CascadeDirective {
    pub fn new(collection: impl Into<String>, cardinality: Cardinality, selector: Expr) -> Self {
        Self {
            collection: collection.into(),
            cardinality,
            through: None,
            selector,
            prior_selector: None,
            properties: Vec::new(),
            payload: None,
            match_keys: None,
            nested: None,
            remove_only: false,
        }
    }

    /// A one-to-one directive.
    pub fn one(collection: impl Into<String>, selector: Expr) -> Self {
        Self::new(collection, Cardinality::One, selector)
    }

    /// A one-to-many directive.
    pub fn many(collection: impl Into<String>, selector: Expr) -> Self {
        Self::new(collection, Cardinality::Many, selector)
    }

    pub fn through(mut self, field: impl Into<String>) -> Self {
        self.through = Some(field.into());
        self
    }

    pub fn prior_selector(mut self, selector: Expr) -> Self {
        self.prior_selector = Some(selector);
        self
    }

    pub fn properties<I, S>(mut self, properties: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.properties = properties.into_iter().map(Into::into).collect();
        self
    }

    pub fn payload(mut self, payload: BsonDocument) -> Self {
        self.payload = Some(payload);
        self
    }

    /// Adds a field identifying this record's copy inside a target array.
    pub fn match_key(mut self, field: impl Into<String>, value: impl Into<Bson>) -> Self {
        self.match_keys
            .get_or_insert_with(BsonDocument::new)
            .insert(field.into(), value.into());
        self
    }

    /// Cascades further, decoding every matched target as `D`.
    pub fn nest_as<D: Document>(mut self) -> Self {
        self.nested = Some(NestedCascade::of::<D>());
        self
    }

    pub fn remove_only(mut self, remove_only: bool) -> Self {
        self.remove_only = remove_only;
        self
    }

    /// The through field, with an empty path treated as absent.
    fn through_field(&self) -> Option<&str> {
        self.through.as_deref().filter(|field| !field.is_empty())
    }

    /// The through field of an array relation, which cannot merge at top level.
    fn array_field(&self) -> DocumentStoreResult<&str> {
        self.through_field().ok_or_else(|| {
            DocumentStoreError::InvalidRelationType(format!(
                "one-to-many cascade to {} needs a through field",
                self.collection
            ))
        })
    }

    fn identity(&self) -> BsonDocument {
        self.match_keys.clone().unwrap_or_default()
    }

    /// Builds the field map written to targets.
    ///
    /// An explicit payload wins, then a projection of `properties`, then the whole
    /// persisted record.
    pub fn resolve_payload(&self, persisted: &BsonDocument) -> DocumentStoreResult<BsonDocument> {
        match &self.payload {
            Some(payload) => Ok(payload.clone()),
            None if !self.properties.is_empty() => project_properties(&self.properties, persisted),
            None => Ok(persisted.clone()),
        }
    }

    /// The update that removes this record's copy from a target.
    fn removal(&self) -> DocumentStoreResult<Update> {
        match self.cardinality {
            Cardinality::One => Ok(match self.through_field() {
                Some(through) => Update::new().unset(through),
                None => self
                    .properties
                    .iter()
                    .fold(Update::new(), |update, property| update.set(property.as_str(), Bson::Null)),
            }),
            Cardinality::Many => Ok(Update::new().pull(self.array_field()?, self.identity())),
        }
    }
}

/// Capability implemented by records that propagate copies of themselves.
///
/// Records expose it through [`Document::as_cascading`].
pub trait Cascading: Send + Sync {
    /// Returns the ordered directives for the record in its current state.
    ///
    /// `persisted` is the field map that was just written for the record (or, on
    /// delete, its serialized form). Implementations usually consult their change
    /// tracker to decide whether a prior selector is needed.
    fn cascade_directives(&self, persisted: &BsonDocument) -> DocumentStoreResult<Vec<CascadeDirective>>;
}

/// Executes cascade directives against a backend.
#[derive(Debug)]
pub struct CascadeEngine<B: StoreBackend> {
    backend: Arc<B>,
}

impl<B: StoreBackend> Clone for CascadeEngine<B> {
    fn clone(&self) -> Self {
        Self { backend: Arc::clone(&self.backend) }
    }
}

impl<B: StoreBackend + 'static> CascadeEngine<B> {
    pub fn new(backend: Arc<B>) -> Self {
        Self { backend }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Propagates `record` after it was persisted as `persisted`.
    ///
    /// A record without the cascading capability is a no-op.
    pub fn cascade_save<'a>(
        &'a self,
        record: &'a dyn AnyDocument,
        persisted: &'a BsonDocument,
    ) -> BoxFuture<'a, DocumentStoreResult<()>> {
        async move {
            let directives = match record.as_any_cascading() {
                Some(cascading) => cascading.cascade_directives(persisted)?,
                None => {
                    trace!(collection = record.document_collection(), "record does not cascade");
                    return Ok(());
                }
            };

            for directive in directives {
                let directive = with_default_match_keys(directive, record);

                self.apply_save(&directive, persisted).await?;

                if let Some(nested) = directive.nested {
                    self.cascade_nested(&directive, nested).await?;
                }
            }

            Ok(())
        }
        .boxed()
    }

    /// Removes every copy of `record` from the targets of its directives.
    ///
    /// Only the removal half of each directive runs, against its selector. Nested
    /// directives do not recurse on delete.
    pub async fn cascade_delete(&self, record: &dyn AnyDocument) -> DocumentStoreResult<()> {
        let Some(cascading) = record.as_any_cascading() else {
            trace!(collection = record.document_collection(), "record does not cascade");
            return Ok(());
        };

        let persisted = record.to_any_document()?;
        let directives = cascading.cascade_directives(&persisted)?;

        for directive in directives {
            let directive = with_default_match_keys(directive, record);
            let selector = directive.selector.clone();
            self.apply_removal(&directive, &selector).await?;
        }

        Ok(())
    }

    /// Typed convenience over [`CascadeEngine::cascade_save`].
    pub async fn save<D: Document>(&self, record: &D) -> DocumentStoreResult<()> {
        let persisted = record.to_document()?;
        self.cascade_save(record, &persisted).await
    }

    /// Applies the save half of one directive.
    pub async fn apply_save(
        &self,
        directive: &CascadeDirective,
        persisted: &BsonDocument,
    ) -> DocumentStoreResult<()> {
        if let Some(prior) = &directive.prior_selector {
            self.apply_removal(directive, prior).await?;

            if directive.remove_only {
                return Ok(());
            }
        }

        match directive.cardinality {
            Cardinality::One => {
                let payload = directive.resolve_payload(persisted)?;
                let update = match directive.through_field() {
                    Some(through) => Update::new().set(through, payload),
                    None => Update::new().merge(payload),
                };

                self.run(directive, &directive.selector, &update).await?;
            }
            Cardinality::Many => {
                let through = directive.array_field()?;

                self.apply_removal(directive, &directive.selector).await?;

                let payload = directive.resolve_payload(persisted)?;
                self.run(directive, &directive.selector, &Update::new().push(through, payload))
                    .await?;
            }
        }

        Ok(())
    }

    /// Removes this record's copy from every document matching `selector`.
    pub async fn apply_removal(&self, directive: &CascadeDirective, selector: &Expr) -> DocumentStoreResult<()> {
        let update = directive.removal()?;
        self.run(directive, selector, &update).await?;
        Ok(())
    }

    async fn cascade_nested(&self, directive: &CascadeDirective, nested: NestedCascade) -> DocumentStoreResult<()> {
        let targets = self
            .backend
            .find_documents(&directive.selector, &directive.collection)
            .await
            .map_err(|e| DocumentStoreError::target(directive.collection.as_str(), e))?;

        debug!(
            collection = %directive.collection,
            record_type = nested.type_name(),
            count = targets.len(),
            "cascading further"
        );

        for target in targets {
            let persisted = into_document(target, &directive.collection)?;
            let record = nested.decode(persisted.clone())?;

            self.cascade_save(record.as_ref(), &persisted).await?;
        }

        Ok(())
    }

    async fn run(
        &self,
        directive: &CascadeDirective,
        selector: &Expr,
        update: &Update,
    ) -> DocumentStoreResult<UpdateResult> {
        if update.is_empty() {
            return Ok(UpdateResult::default());
        }

        let result = self
            .backend
            .update_many(selector, update, &directive.collection)
            .await
            .map_err(|e| DocumentStoreError::target(directive.collection.as_str(), e))?;

        debug!(
            collection = %directive.collection,
            cardinality = %directive.cardinality,
            ops = update.ops().len(),
            matched = result.matched,
            modified = result.modified,
            "applied cascade update"
        );

        Ok(result)
    }
}

fn with_default_match_keys(mut directive: CascadeDirective, record: &dyn AnyDocument) -> CascadeDirective {
    if directive.match_keys.as_ref().is_none_or(BsonDocument::is_empty) {
        let mut identity = BsonDocument::new();
        identity.insert(record.document_id_field(), *record.document_id());
        directive.match_keys = Some(identity);
    }
    directive
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{query::Filter, update::UpdateOp};
    use async_trait::async_trait;
    use bson::{Uuid, doc};
    use mea::mutex::Mutex;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Clone, PartialEq)]
    struct Call {
        collection: String,
        selector: Expr,
        update: Update,
    }

    /// Records update calls and serves canned find results.
    #[derive(Debug, Default)]
    struct RecordingBackend {
        calls: Mutex<Vec<Call>>,
        found: Vec<Bson>,
        fail_on: Option<&'static str>,
        /// Fails the update call with this index, counting from zero.
        fail_at: Option<usize>,
    }

    impl RecordingBackend {
        async fn calls(&self) -> Vec<Call> {
            self.calls.lock().await.clone()
        }
    }

    #[async_trait]
    impl StoreBackend for RecordingBackend {
        async fn insert_documents(&self, _: Vec<(Uuid, Bson)>, _: &str) -> DocumentStoreResult<()> {
            Ok(())
        }

        async fn upsert_documents(&self, _: Vec<(Uuid, Bson)>, _: &str) -> DocumentStoreResult<()> {
            Ok(())
        }

        async fn delete_documents(&self, _: Vec<Uuid>, _: &str) -> DocumentStoreResult<()> {
            Ok(())
        }

        async fn get_documents(&self, _: Vec<Uuid>, _: &str) -> DocumentStoreResult<Vec<Bson>> {
            Ok(vec![])
        }

        async fn find_documents(&self, _: &Expr, _: &str) -> DocumentStoreResult<Vec<Bson>> {
            Ok(self.found.clone())
        }

        async fn update_many(&self, filter: &Expr, update: &Update, collection: &str) -> DocumentStoreResult<UpdateResult> {
            let mut calls = self.calls.lock().await;

            if self.fail_on == Some(collection) || self.fail_at == Some(calls.len()) {
                return Err(DocumentStoreError::Backend("connection reset".into()));
            }

            calls.push(Call {
                collection: collection.to_string(),
                selector: filter.clone(),
                update: update.clone(),
            });

            Ok(UpdateResult { matched: 1, modified: 1 })
        }
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    struct Plain {
        id: Uuid,
    }

    impl Document for Plain {
        fn id(&self) -> &Uuid {
            &self.id
        }

        fn collection_name() -> &'static str {
            "plain"
        }
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    struct Group {
        id: Uuid,
        name: String,
        organization_id: Uuid,
    }

    impl Document for Group {
        fn id(&self) -> &Uuid {
            &self.id
        }

        fn collection_name() -> &'static str {
            "groups"
        }

        fn as_cascading(&self) -> Option<&dyn Cascading> {
            Some(self)
        }
    }

    impl Cascading for Group {
        fn cascade_directives(&self, _: &BsonDocument) -> DocumentStoreResult<Vec<CascadeDirective>> {
            Ok(vec![
                CascadeDirective::one("organizations", Filter::eq("id", self.organization_id))
                    .through("group")
                    .properties(["name"]),
            ])
        }
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    struct Member {
        id: Uuid,
        name: String,
        group_id: Uuid,
        #[serde(skip)]
        previous_group_id: Option<Uuid>,
        #[serde(skip)]
        directives: Vec<(Cardinality, Option<&'static str>)>,
        #[serde(skip)]
        nest: bool,
    }

    impl Document for Member {
        fn id(&self) -> &Uuid {
            &self.id
        }

        fn collection_name() -> &'static str {
            "members"
        }

        fn as_cascading(&self) -> Option<&dyn Cascading> {
            Some(self)
        }
    }

    impl Cascading for Member {
        fn cascade_directives(&self, _: &BsonDocument) -> DocumentStoreResult<Vec<CascadeDirective>> {
            Ok(self
                .directives
                .iter()
                .map(|(cardinality, through)| {
                    let mut directive = CascadeDirective::new("groups", *cardinality, Filter::eq("id", self.group_id))
                        .properties(["id", "name"]);

                    if let Some(through) = through {
                        directive = directive.through(*through);
                    }
                    if let Some(previous) = self.previous_group_id {
                        directive = directive.prior_selector(Filter::eq("id", previous));
                    }
                    if self.nest {
                        directive = directive.nest_as::<Group>();
                    }

                    directive
                })
                .collect())
        }
    }

    fn member(directives: Vec<(Cardinality, Option<&'static str>)>) -> Member {
        Member {
            id: Uuid::new(),
            name: "m".into(),
            group_id: Uuid::new(),
            previous_group_id: None,
            directives,
            nest: false,
        }
    }

    fn engine(backend: RecordingBackend) -> CascadeEngine<RecordingBackend> {
        CascadeEngine::new(Arc::new(backend))
    }

    #[test]
    fn relation_codes_convert() {
        assert_eq!(Cardinality::try_from(0).unwrap(), Cardinality::Many);
        assert_eq!(Cardinality::try_from(1).unwrap(), Cardinality::One);
        assert!(matches!(
            Cardinality::try_from(7),
            Err(DocumentStoreError::InvalidRelationType(_))
        ));
    }

    #[test]
    fn payload_prefers_explicit_map_then_properties() {
        let persisted = doc! { "id": 1, "name": "a", "secret": "s" };
        let directive = CascadeDirective::one("t", Filter::eq("id", 1));

        assert_eq!(directive.resolve_payload(&persisted).unwrap(), persisted);

        let directive = directive.properties(["name"]);
        assert_eq!(directive.resolve_payload(&persisted).unwrap(), doc! { "name": "a" });

        let directive = directive.payload(doc! { "custom": true });
        assert_eq!(directive.resolve_payload(&persisted).unwrap(), doc! { "custom": true });
    }

    #[tokio::test]
    async fn records_without_capability_are_skipped() {
        let engine = engine(RecordingBackend::default());
        let record = Plain { id: Uuid::new() };

        engine.save(&record).await.unwrap();
        engine.cascade_delete(&record).await.unwrap();

        assert!(engine.backend().calls().await.is_empty());
    }

    #[tokio::test]
    async fn one_sets_through_field() {
        let engine = engine(RecordingBackend::default());
        let record = member(vec![(Cardinality::One, Some("member"))]);

        engine.save(&record).await.unwrap();

        let calls = engine.backend().calls().await;
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].selector, Filter::eq("id", record.group_id));
        assert_eq!(
            calls[0].update.ops(),
            &[UpdateOp::Set {
                field: "member".into(),
                value: Bson::Document(doc! { "id": record.id, "name": "m" }),
            }]
        );
    }

    #[tokio::test]
    async fn one_without_through_clears_properties_on_prior_targets() {
        let engine = engine(RecordingBackend::default());
        let mut record = member(vec![(Cardinality::One, None)]);
        let previous = Uuid::new();
        record.previous_group_id = Some(previous);

        engine.save(&record).await.unwrap();

        let calls = engine.backend().calls().await;
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].selector, Filter::eq("id", previous));
        assert_eq!(calls[0].update, Update::new().set("id", Bson::Null).set("name", Bson::Null));
        assert_eq!(calls[1].update, Update::new().merge(doc! { "id": record.id, "name": "m" }));
    }

    #[tokio::test]
    async fn many_cleans_prior_then_pulls_and_pushes() {
        let engine = engine(RecordingBackend::default());
        let mut record = member(vec![(Cardinality::Many, Some("members"))]);
        let previous = Uuid::new();
        record.previous_group_id = Some(previous);

        engine.save(&record).await.unwrap();

        let identity = doc! { "id": record.id };
        let calls = engine.backend().calls().await;
        let shapes: Vec<_> = calls.iter().map(|c| (c.selector.clone(), c.update.clone())).collect();

        assert_eq!(
            shapes,
            vec![
                (Filter::eq("id", previous), Update::new().pull("members", identity.clone())),
                (Filter::eq("id", record.group_id), Update::new().pull("members", identity)),
                (
                    Filter::eq("id", record.group_id),
                    Update::new().push("members", doc! { "id": record.id, "name": "m" })
                ),
            ]
        );
    }

    #[tokio::test]
    async fn remove_only_stops_after_prior_cleanup() {
        let engine = engine(RecordingBackend::default());
        let directive = CascadeDirective::many("groups", Filter::eq("id", 2))
            .through("members")
            .prior_selector(Filter::eq("id", 1))
            .match_key("id", 9)
            .remove_only(true);

        engine.apply_save(&directive, &doc! {}).await.unwrap();

        let calls = engine.backend().calls().await;
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].selector, Filter::eq("id", 1));
    }

    #[tokio::test]
    async fn many_without_through_is_invalid() {
        let engine = engine(RecordingBackend::default());
        let record = member(vec![(Cardinality::Many, None)]);

        assert!(matches!(
            engine.save(&record).await,
            Err(DocumentStoreError::InvalidRelationType(_))
        ));
        assert!(engine.backend().calls().await.is_empty());
    }

    #[tokio::test]
    async fn delete_runs_only_removals_against_selector() {
        let engine = engine(RecordingBackend::default());
        let mut record = member(vec![(Cardinality::One, Some("member")), (Cardinality::Many, Some("members"))]);
        record.previous_group_id = Some(Uuid::new());

        engine.cascade_delete(&record).await.unwrap();

        let calls = engine.backend().calls().await;
        assert_eq!(calls.len(), 2);
        assert!(calls.iter().all(|c| c.selector == Filter::eq("id", record.group_id)));
        assert_eq!(calls[0].update, Update::new().unset("member"));
        assert_eq!(calls[1].update, Update::new().pull("members", doc! { "id": record.id }));
    }

    #[tokio::test]
    async fn store_failures_name_target_and_stop() {
        let engine = engine(RecordingBackend { fail_on: Some("groups"), ..Default::default() });
        let record = member(vec![(Cardinality::One, Some("member")), (Cardinality::One, Some("again"))]);

        let err = engine.save(&record).await.unwrap_err();

        assert!(matches!(
            err,
            DocumentStoreError::TargetOperation { ref collection, .. } if collection == "groups"
        ));
        assert!(engine.backend().calls().await.is_empty());
    }

    #[tokio::test]
    async fn failure_keeps_earlier_directives_and_skips_later_ones() {
        let engine = engine(RecordingBackend { fail_at: Some(1), ..Default::default() });
        let record = member(vec![
            (Cardinality::One, Some("first")),
            (Cardinality::One, Some("second")),
            (Cardinality::One, Some("third")),
        ]);

        let err = engine.save(&record).await.unwrap_err();

        assert!(matches!(
            err,
            DocumentStoreError::TargetOperation { ref collection, ref source }
                if collection == "groups" && matches!(**source, DocumentStoreError::Backend(_))
        ));

        let calls = engine.backend().calls().await;
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].update.ops()[0].field(), "first");
        assert!(calls.iter().all(|c| c.update.ops().iter().all(|op| op.field() != "third")));
    }

    #[tokio::test]
    async fn nested_directive_decodes_and_recurses() {
        let mut record = member(vec![(Cardinality::One, Some("member"))]);
        record.nest = true;
        let organization_id = Uuid::new();
        let group = doc! { "id": record.group_id, "name": "g", "organization_id": organization_id };

        let engine = engine(RecordingBackend { found: vec![Bson::Document(group)], ..Default::default() });

        engine.save(&record).await.unwrap();

        let calls = engine.backend().calls().await;
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].collection, "groups");
        assert_eq!(calls[1].collection, "organizations");
        assert_eq!(calls[1].selector, Filter::eq("id", organization_id));
        assert_eq!(calls[1].update, Update::new().set("group", doc! { "name": "g" }));
    }
}
