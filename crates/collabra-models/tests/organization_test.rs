//! Integration tests for the organization tree and membership
//! operations.

use std::sync::Arc;

use collabra_core::access::StaticCaller;
use collabra_core::error::CollabError;
use collabra_core::value::{Value, record};
use collabra_models::{Organization, Person, ROLE_SYSTEM_ADMIN};
use collabra_store::MemoryStore;
use uuid::Uuid;

fn admin() -> StaticCaller {
    StaticCaller::with_roles([ROLE_SYSTEM_ADMIN])
}

async fn create_org(
    store: &Arc<MemoryStore>,
    handle: &str,
    name: &str,
) -> Organization<MemoryStore> {
    Organization::create(
        Arc::clone(store),
        &admin(),
        record([("accountName", handle.into()), ("name", name.into())]),
    )
    .await
    .unwrap()
}

async fn create_person(
    store: &Arc<MemoryStore>,
    handle: &str,
    first_name: &str,
) -> Person<MemoryStore> {
    Person::create(
        Arc::clone(store),
        &admin(),
        record([
            ("accountName", handle.into()),
            ("firstName", first_name.into()),
        ]),
    )
    .await
    .unwrap()
}

/// Re-fetch an organization's parentId through a fresh load, bypassing
/// any in-memory instance state.
async fn stored_parent(store: &Arc<MemoryStore>, id: Uuid) -> Value {
    Organization::construct(Arc::clone(store), &admin(), id)
        .await
        .unwrap()
        .get_attribute(&admin(), "parentId")
        .unwrap()
}

async fn member_ids(store: &Arc<MemoryStore>, org: &Organization<MemoryStore>) -> Vec<Uuid> {
    let mut ids: Vec<Uuid> = org
        .get_people(&admin())
        .await
        .unwrap()
        .iter()
        .map(|person| person.id())
        .collect();
    ids.sort();
    ids
}

#[tokio::test]
async fn create_and_load_organization() {
    let store = Arc::new(MemoryStore::new());
    let org = Organization::create(
        Arc::clone(&store),
        &admin(),
        record([
            ("accountName", "myOrg1".into()),
            ("name", "My Org 1".into()),
            ("type", "private".into()),
        ]),
    )
    .await
    .unwrap();

    assert_eq!(
        org.get_attribute(&admin(), "name").unwrap(),
        Value::from("My Org 1")
    );
    assert_eq!(
        org.get_attribute(&admin(), "accountName").unwrap(),
        Value::from("myOrg1")
    );
    assert_eq!(org.get_attribute(&admin(), "parentId").unwrap(), Value::Null);

    let by_id = Organization::construct(Arc::clone(&store), &admin(), org.id())
        .await
        .unwrap();
    assert_eq!(
        by_id.get_attribute(&admin(), "name").unwrap(),
        Value::from("My Org 1")
    );
    assert_eq!(
        by_id.get_attribute(&admin(), "accountName").unwrap(),
        Value::from("myOrg1")
    );

    let by_handle =
        Organization::construct_by_account_name(Arc::clone(&store), &admin(), "myOrg1")
            .await
            .unwrap();
    assert_eq!(by_handle.id(), org.id());

    let bulk = org.get_attributes(&admin(), &["name", "type"]).unwrap();
    assert_eq!(bulk["name"], Value::from("My Org 1"));
    assert_eq!(bulk["type"], Value::from("private"));
}

#[tokio::test]
async fn duplicate_account_name_is_rejected_and_rolled_back() {
    let store = Arc::new(MemoryStore::new());
    create_org(&store, "myOrg1", "My Org 1").await;

    let err = Organization::create(
        Arc::clone(&store),
        &admin(),
        record([("accountName", "myOrg1".into()), ("name", "Other".into())]),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, CollabError::BadInput { .. }));

    // The first organization is still loadable under its handle.
    let org = Organization::construct_by_account_name(Arc::clone(&store), &admin(), "myOrg1")
        .await
        .unwrap();
    assert_eq!(
        org.get_attribute(&admin(), "name").unwrap(),
        Value::from("My Org 1")
    );
}

#[tokio::test]
async fn missing_required_name_is_bad_input() {
    let store = Arc::new(MemoryStore::new());
    let err = Organization::create(
        Arc::clone(&store),
        &admin(),
        record([("accountName", "myOrg1".into())]),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, CollabError::BadInput { .. }));
}

#[tokio::test]
async fn add_then_remove_children_restores_null_parent() {
    let store = Arc::new(MemoryStore::new());
    let parent = create_org(&store, "parent", "Parent").await;
    let mut child = create_org(&store, "child", "Child").await;

    parent
        .add_children(&admin(), std::slice::from_mut(&mut child))
        .await
        .unwrap();
    assert_eq!(stored_parent(&store, child.id()).await, Value::Id(parent.id()));

    parent
        .remove_children(&admin(), std::slice::from_mut(&mut child))
        .await
        .unwrap();
    assert_eq!(stored_parent(&store, child.id()).await, Value::Null);
}

#[tokio::test]
async fn add_children_fails_whole_batch_when_a_child_is_parented_elsewhere() {
    let store = Arc::new(MemoryStore::new());
    let org = create_org(&store, "o", "O").await;
    let other = create_org(&store, "o2", "O2").await;
    let mut taken = create_org(&store, "c1", "C1").await;
    let free = create_org(&store, "c2", "C2").await;

    other
        .add_children(&admin(), std::slice::from_mut(&mut taken))
        .await
        .unwrap();

    // The already-parented child fails the batch before the free one
    // is reached.
    let err = org
        .add_children(&admin(), &mut [taken.clone(), free.clone()])
        .await
        .unwrap_err();
    assert!(matches!(err, CollabError::BadInput { .. }));
    assert_eq!(stored_parent(&store, free.id()).await, Value::Null);
    assert_eq!(stored_parent(&store, taken.id()).await, Value::Id(other.id()));

    // Reversed order: the free child is written first inside the
    // transaction, then rolled back when the parented one fails.
    let err = org
        .add_children(&admin(), &mut [free.clone(), taken.clone()])
        .await
        .unwrap_err();
    assert!(matches!(err, CollabError::BadInput { .. }));
    assert_eq!(stored_parent(&store, free.id()).await, Value::Null);
    assert_eq!(stored_parent(&store, taken.id()).await, Value::Id(other.id()));
}

#[tokio::test]
async fn remove_children_rejects_non_children_and_rolls_back() {
    let store = Arc::new(MemoryStore::new());
    let parent = create_org(&store, "parent", "Parent").await;
    let mut child = create_org(&store, "child", "Child").await;
    let stranger = create_org(&store, "stranger", "Stranger").await;

    parent
        .add_children(&admin(), std::slice::from_mut(&mut child))
        .await
        .unwrap();

    let err = parent
        .remove_children(&admin(), &mut [child.clone(), stranger.clone()])
        .await
        .unwrap_err();
    assert!(matches!(err, CollabError::BadInput { .. }));

    // The valid child's detachment was rolled back with the batch.
    assert_eq!(stored_parent(&store, child.id()).await, Value::Id(parent.id()));
}

#[tokio::test]
async fn re_adding_an_attached_child_is_a_no_op() {
    let store = Arc::new(MemoryStore::new());
    let parent = create_org(&store, "parent", "Parent").await;
    let mut child = create_org(&store, "child", "Child").await;

    parent
        .add_children(&admin(), std::slice::from_mut(&mut child))
        .await
        .unwrap();
    parent
        .add_children(&admin(), std::slice::from_mut(&mut child))
        .await
        .unwrap();
    assert_eq!(stored_parent(&store, child.id()).await, Value::Id(parent.id()));
}

#[tokio::test]
async fn get_all_parents_returns_root_first() {
    let store = Arc::new(MemoryStore::new());
    let root = create_org(&store, "z", "Z").await;
    let mut middle = create_org(&store, "y", "Y").await;
    let mut leaf = create_org(&store, "x", "X").await;

    root.add_children(&admin(), std::slice::from_mut(&mut middle))
        .await
        .unwrap();
    middle
        .add_children(&admin(), std::slice::from_mut(&mut leaf))
        .await
        .unwrap();

    let parents = leaf.get_all_parents(&admin()).await.unwrap();
    assert_eq!(
        parents.iter().map(|org| org.id()).collect::<Vec<_>>(),
        vec![root.id(), middle.id()]
    );

    assert!(root.get_all_parents(&admin()).await.unwrap().is_empty());

    let children = root.get_children(&admin()).await.unwrap();
    assert_eq!(
        children.iter().map(|org| org.id()).collect::<Vec<_>>(),
        vec![middle.id()]
    );
}

#[tokio::test]
async fn attaching_an_ancestor_would_create_a_cycle() {
    let store = Arc::new(MemoryStore::new());
    let top = create_org(&store, "top", "Top").await;
    let mut bottom = create_org(&store, "bottom", "Bottom").await;

    top.add_children(&admin(), std::slice::from_mut(&mut bottom))
        .await
        .unwrap();

    // Re-load so the instance sees its parentId.
    let bottom = Organization::construct(Arc::clone(&store), &admin(), bottom.id())
        .await
        .unwrap();

    let err = bottom
        .add_children(&admin(), &mut [top.clone()])
        .await
        .unwrap_err();
    assert!(matches!(err, CollabError::BadInput { .. }));
    assert_eq!(stored_parent(&store, top.id()).await, Value::Null);

    // An organization cannot be its own parent either.
    let err = top
        .add_children(&admin(), &mut [top.clone()])
        .await
        .unwrap_err();
    assert!(matches!(err, CollabError::BadInput { .. }));
}

#[tokio::test]
async fn parent_id_is_not_writable_through_generic_setters() {
    let store = Arc::new(MemoryStore::new());
    let other = create_org(&store, "other", "Other").await;
    let mut org = create_org(&store, "org", "Org").await;

    let err = org
        .set_attribute(&admin(), "parentId", Value::Id(other.id()))
        .await
        .unwrap_err();
    assert!(matches!(err, CollabError::BadInput { .. }));

    // The bulk setter rejects the protected key loudly instead of
    // silently stripping it.
    let err = org
        .set_attributes(
            &admin(),
            record([
                ("name", "Renamed".into()),
                ("parentId", Value::Id(other.id())),
            ]),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, CollabError::BadInput { .. }));

    // Nothing was written, not even the legal key.
    assert_eq!(
        org.get_attribute(&admin(), "name").unwrap(),
        Value::from("Org")
    );
    assert_eq!(stored_parent(&store, org.id()).await, Value::Null);
}

#[tokio::test]
async fn delete_detaches_children_and_frees_the_handle() {
    let store = Arc::new(MemoryStore::new());
    let parent = create_org(&store, "parent", "Parent").await;
    let mut child = create_org(&store, "child", "Child").await;
    let person = create_person(&store, "member1", "Member").await;

    parent
        .add_children(&admin(), std::slice::from_mut(&mut child))
        .await
        .unwrap();
    parent
        .add_people(&admin(), std::slice::from_ref(&person))
        .await
        .unwrap();

    let parent_id = parent.id();
    parent.delete(&admin()).await.unwrap();

    let err = Organization::construct(Arc::clone(&store), &admin(), parent_id)
        .await
        .unwrap_err();
    assert!(matches!(err, CollabError::NotFound { .. }));

    // Children are orphaned, not deleted.
    assert_eq!(stored_parent(&store, child.id()).await, Value::Null);

    // The account handle is reusable once the account row is gone.
    create_org(&store, "parent", "Parent Again").await;
}

#[tokio::test]
async fn membership_roundtrip_has_no_duplicates() {
    let store = Arc::new(MemoryStore::new());
    let org = create_org(&store, "org", "Org").await;
    let alice = create_person(&store, "alice", "Alice").await;
    let bob = create_person(&store, "bob", "Bob").await;

    org.add_people(&admin(), &[alice.clone(), bob.clone()])
        .await
        .unwrap();

    let mut expected = vec![alice.id(), bob.id()];
    expected.sort();
    assert_eq!(member_ids(&store, &org).await, expected);
    // Repeated reads return the same set.
    assert_eq!(member_ids(&store, &org).await, expected);

    org.remove_people(&admin(), std::slice::from_ref(&alice))
        .await
        .unwrap();
    assert_eq!(member_ids(&store, &org).await, vec![bob.id()]);
}

#[tokio::test]
async fn duplicate_membership_fails_the_whole_batch() {
    let store = Arc::new(MemoryStore::new());
    let org = create_org(&store, "org", "Org").await;
    let alice = create_person(&store, "alice", "Alice").await;
    let bob = create_person(&store, "bob", "Bob").await;

    org.add_people(&admin(), std::slice::from_ref(&alice))
        .await
        .unwrap();

    // Bob would be linked first, then the duplicate aborts the batch.
    let err = org
        .add_people(&admin(), &[bob.clone(), alice.clone()])
        .await
        .unwrap_err();
    assert!(matches!(err, CollabError::BadInput { .. }));

    assert_eq!(member_ids(&store, &org).await, vec![alice.id()]);
}

#[tokio::test]
async fn removing_a_non_member_aborts_the_batch() {
    let store = Arc::new(MemoryStore::new());
    let org = create_org(&store, "org", "Org").await;
    let alice = create_person(&store, "alice", "Alice").await;
    let bob = create_person(&store, "bob", "Bob").await;

    org.add_people(&admin(), std::slice::from_ref(&alice))
        .await
        .unwrap();

    let err = org
        .remove_people(&admin(), &[alice.clone(), bob.clone()])
        .await
        .unwrap_err();
    assert!(matches!(err, CollabError::BadInput { .. }));

    // Alice's removal was rolled back with the failing batch.
    assert_eq!(member_ids(&store, &org).await, vec![alice.id()]);
}

#[tokio::test]
async fn detached_references_fail_with_object_state() {
    let store = Arc::new(MemoryStore::new());
    let org = create_org(&store, "org", "Org").await;

    let detached = Organization::reference(Arc::clone(&store), org.id());
    let err = detached.get_people(&admin()).await.unwrap_err();
    assert!(matches!(err, CollabError::ObjectState { .. }));

    let detached = Organization::reference(Arc::clone(&store), org.id());
    let err = detached.delete(&admin()).await.unwrap_err();
    assert!(matches!(err, CollabError::ObjectState { .. }));

    let detached = Organization::reference(Arc::clone(&store), org.id());
    let err = detached.get_attribute(&admin(), "name").unwrap_err();
    assert!(matches!(err, CollabError::ObjectState { .. }));
}
