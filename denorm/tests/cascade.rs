use bson::{Bson, Document as BsonDocument, doc};
use denorm::{memory::InMemoryStore, prelude::*};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct ChildRef {
    id: Uuid,
    name: String,
    sub_child: Option<SubChildRef>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Trackable)]
struct SubChildRef {
    id: Uuid,
    label: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Parent {
    id: Uuid,
    name: String,
    child: Option<ChildRef>,
    #[serde(default)]
    children: Vec<ChildRef>,
}

impl Parent {
    fn new(name: &str) -> Self {
        Self { id: Uuid::new(), name: name.into(), child: None, children: Vec::new() }
    }
}

impl Document for Parent {
    fn id(&self) -> &Uuid {
        &self.id
    }

    fn collection_name() -> &'static str {
        "parents"
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Trackable)]
struct Child {
    id: Uuid,
    name: String,
    parent_id: Option<Uuid>,
    #[track(nested)]
    sub_child: Option<SubChildRef>,
    #[serde(skip)]
    #[track(tracker)]
    tracker: ChangeTracker<Child>,
}

impl Child {
    fn new(name: &str, parent: &Parent) -> Self {
        Self {
            id: Uuid::new(),
            name: name.into(),
            parent_id: Some(parent.id),
            sub_child: None,
            tracker: ChangeTracker::new(),
        }
    }
}

impl Document for Child {
    fn id(&self) -> &Uuid {
        &self.id
    }

    fn collection_name() -> &'static str {
        "children"
    }

    fn as_cascading(&self) -> Option<&dyn Cascading> {
        Some(self)
    }
}

impl Cascading for Child {
    fn cascade_directives(&self, _persisted: &BsonDocument) -> DocumentStoreResult<Vec<CascadeDirective>> {
        let prior = match self.modified("parent_id")? {
            true => self
                .original_value("parent_id")
                .filter(|old| !matches!(old, Bson::Null))
                .map(|old| Filter::eq("id", old.clone())),
            false => None,
        };

        let selector = Filter::eq("id", self.parent_id);
        let properties = ["id", "name", "sub_child"];

        Ok([
            CascadeDirective::one("parents", selector.clone()).through("child"),
            CascadeDirective::many("parents", selector).through("children"),
        ]
        .into_iter()
        .map(|directive| {
            let directive = directive.properties(properties);
            match &prior {
                Some(prior) => directive.prior_selector(prior.clone()),
                None => directive,
            }
        })
        .collect())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct SubChild {
    id: Uuid,
    child_id: Uuid,
    label: String,
}

impl Document for SubChild {
    fn id(&self) -> &Uuid {
        &self.id
    }

    fn collection_name() -> &'static str {
        "sub_children"
    }

    fn as_cascading(&self) -> Option<&dyn Cascading> {
        Some(self)
    }
}

impl Cascading for SubChild {
    fn cascade_directives(&self, _persisted: &BsonDocument) -> DocumentStoreResult<Vec<CascadeDirective>> {
        Ok(vec![
            CascadeDirective::one("children", Filter::eq("id", self.child_id))
                .through("sub_child")
                .properties(["id", "label"])
                .nest_as::<Child>(),
        ])
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Note {
    id: Uuid,
    parent_id: Uuid,
}

impl Document for Note {
    fn id(&self) -> &Uuid {
        &self.id
    }

    fn collection_name() -> &'static str {
        "notes"
    }
}

async fn setup() -> (InMemoryStore, DocumentStore<InMemoryStore>, Parent, Parent) {
    let backend = InMemoryStore::new();
    let store = DocumentStore::new(backend.clone());

    let p1 = Parent::new("p1");
    let p2 = Parent::new("p2");
    store.typed_collection::<Parent>().insert(vec![p1.clone(), p2.clone()]).await.unwrap();

    (backend, store, p1, p2)
}

async fn load(store: &DocumentStore<InMemoryStore>, id: Uuid) -> Parent {
    store.typed_collection::<Parent>().get_one(id).await.unwrap().unwrap()
}

fn child_ref(child: &Child) -> ChildRef {
    ChildRef { id: child.id, name: child.name.clone(), sub_child: child.sub_child.clone() }
}

#[tokio::test]
async fn reparenting_moves_copies_and_delete_removes_them() {
    let (_, store, p1, p2) = setup().await;
    let children = store.typed_collection::<Child>();

    let mut child = Child::new("c", &p1);
    children.save(&child).await.unwrap();
    child.reset_changes().unwrap();

    let parent = load(&store, p1.id).await;
    assert_eq!(parent.child, Some(child_ref(&child)));
    assert_eq!(parent.children, vec![child_ref(&child)]);

    child.parent_id = Some(p2.id);
    children.save(&child).await.unwrap();
    child.reset_changes().unwrap();

    let old = load(&store, p1.id).await;
    let new = load(&store, p2.id).await;
    assert_eq!(old.child, None);
    assert!(old.children.is_empty());
    assert_eq!(new.child, Some(child_ref(&child)));
    assert_eq!(new.children, vec![child_ref(&child)]);

    children.delete(&child).await.unwrap();

    let new = load(&store, p2.id).await;
    assert_eq!(new.child, None);
    assert!(new.children.is_empty());
    assert!(children.get_one(child.id).await.unwrap().is_none());
}

#[tokio::test]
async fn repeated_saves_are_idempotent() {
    let (backend, store, p1, _) = setup().await;
    let children = store.typed_collection::<Child>();

    let mut child = Child::new("c", &p1);
    children.save(&child).await.unwrap();
    child.reset_changes().unwrap();

    let after_first = load(&store, p1.id).await;

    for _ in 0..3 {
        children.save(&child).await.unwrap();
        child.reset_changes().unwrap();
    }

    let after_repeat = load(&store, p1.id).await;
    assert_eq!(after_repeat.child, after_first.child);
    assert_eq!(after_repeat.children.len(), 1);
    assert_eq!(backend.dump("parents").await.len(), 2);
}

#[tokio::test]
async fn renamed_child_replaces_its_array_entry() {
    let (_, store, p1, _) = setup().await;
    let children = store.typed_collection::<Child>();

    let mut first = Child::new("first", &p1);
    let second = Child::new("second", &p1);
    children.insert(vec![first.clone(), second.clone()]).await.unwrap();
    first.reset_changes().unwrap();

    first.name = "renamed".into();
    children.save(&first).await.unwrap();

    let parent = load(&store, p1.id).await;
    assert_eq!(parent.children.len(), 2);
    assert_eq!(parent.children.iter().filter(|c| c.id == first.id).count(), 1);
    assert!(parent.children.contains(&child_ref(&first)));
    assert!(parent.children.contains(&child_ref(&second)));
}

#[tokio::test]
async fn nested_cascade_reaches_the_grandparent() {
    let (_, store, p1, _) = setup().await;

    let mut child = Child::new("c", &p1);
    store.typed_collection::<Child>().save(&child).await.unwrap();
    child.reset_changes().unwrap();

    let sub_child = SubChild { id: Uuid::new(), child_id: child.id, label: "x".into() };
    store.typed_collection::<SubChild>().save(&sub_child).await.unwrap();

    let expected = Some(SubChildRef { id: sub_child.id, label: "x".into() });

    let stored = store.typed_collection::<Child>().get_one(child.id).await.unwrap().unwrap();
    assert_eq!(stored.sub_child, expected);

    let parent = load(&store, p1.id).await;
    assert_eq!(parent.child.and_then(|c| c.sub_child), expected);
    assert_eq!(parent.children.len(), 1);
    assert_eq!(parent.children[0].sub_child, expected);
}

#[tokio::test]
async fn records_without_capability_do_not_cascade() {
    let (backend, store, p1, _) = setup().await;
    let before = backend.dump("parents").await;

    let note = Note { id: Uuid::new(), parent_id: p1.id };
    store.typed_collection::<Note>().save(&note).await.unwrap();
    store.cascade_engine().save(&note).await.unwrap();
    store.typed_collection::<Note>().delete(&note).await.unwrap();

    let after = backend.dump("parents").await;
    assert_eq!(before.len(), after.len());
    for doc in before {
        assert!(after.contains(&doc));
    }
}

#[tokio::test]
async fn one_without_through_merges_onto_target() {
    let (backend, store, p1, _) = setup().await;

    let directive = CascadeDirective::one("parents", Filter::eq("id", p1.id)).properties(["nickname"]);
    let persisted = doc! { "nickname": "nick" };

    let engine = store.cascade_engine();
    engine.apply_save(&directive, &persisted).await.unwrap();

    let found = store
        .collection("parents")
        .find(&Filter::eq("nickname", "nick"))
        .await
        .unwrap();
    assert_eq!(found.len(), 1);

    engine.apply_removal(&directive, &directive.selector).await.unwrap();

    assert!(
        store
            .collection("parents")
            .find(&Filter::eq("nickname", "nick"))
            .await
            .unwrap()
            .is_empty()
    );
    assert_eq!(backend.dump("parents").await.len(), 2);
}

#[tokio::test]
async fn many_without_through_is_rejected() {
    let (_, store, p1, _) = setup().await;

    let directive = CascadeDirective::many("parents", Filter::eq("id", p1.id)).properties(["id"]);
    let result = store.cascade_engine().apply_save(&directive, &doc! { "id": 1 }).await;

    assert!(matches!(result, Err(DocumentStoreError::InvalidRelationType(_))));
}

#[tokio::test]
async fn background_mode_drains_on_shutdown() {
    let backend = InMemoryStore::new();
    let store = DocumentStore::with_config(
        backend.clone(),
        CascadeConfig::default().with_mode(CascadeMode::Background),
    )
    .unwrap();

    let p1 = Parent::new("p1");
    store.typed_collection::<Parent>().save(&p1).await.unwrap();

    let children: Vec<Child> = (0..5).map(|i| Child::new(&format!("c{}", i), &p1)).collect();
    for child in &children {
        store.typed_collection::<Child>().save(child).await.unwrap();
    }

    store.shutdown().await.unwrap();

    let parent = DocumentStore::new(backend)
        .typed_collection::<Parent>()
        .get_one(p1.id)
        .await
        .unwrap()
        .unwrap();

    assert_eq!(parent.children.len(), 5);
    assert_eq!(parent.child.map(|c| c.id), children.last().map(|c| c.id));
}

#[test]
fn background_mode_needs_a_runtime() {
    let result = DocumentStore::with_config(
        InMemoryStore::new(),
        CascadeConfig::default().with_mode(CascadeMode::Background),
    );

    assert!(matches!(result, Err(DocumentStoreError::Initialization(_))));
}

#[test]
fn synchronous_mode_needs_no_runtime() {
    let store = DocumentStore::with_config(InMemoryStore::new(), CascadeConfig::default()).unwrap();

    assert!(!store.config().is_background());
}
