//! Integration tests for the in-memory store and its transactions.

use collabra_core::error::CollabError;
use collabra_core::store::{EntityStore, Filter, Pagination, SortKey};
use collabra_core::txn::TransactionCoordinator;
use collabra_core::value::{Value, record};
use collabra_store::MemoryStore;
use uuid::Uuid;

/// Helper: store with three named rows in one table.
async fn setup() -> (
    MemoryStore,
    Uuid, // ada
    Uuid, // grace
    Uuid, // edsger
) {
    let store = MemoryStore::new();
    let ada = store
        .insert("person", record([("name", "Ada".into()), ("age", 36.into())]))
        .await
        .unwrap();
    let grace = store
        .insert(
            "person",
            record([("name", "Grace".into()), ("age", 85.into())]),
        )
        .await
        .unwrap();
    let edsger = store
        .insert(
            "person",
            record([("name", "Edsger".into()), ("age", 72.into())]),
        )
        .await
        .unwrap();
    (store, ada, grace, edsger)
}

async fn names(store: &MemoryStore, filter: &Filter) -> Vec<String> {
    store
        .find_by("person", filter, &[], None, None)
        .await
        .unwrap()
        .iter()
        .map(|row| row.attrs["name"].as_text().unwrap().to_string())
        .collect()
}

#[tokio::test]
async fn insert_assigns_id_and_preserves_order() {
    let (store, ada, _, _) = setup().await;

    let rows = store
        .find_by("person", &Filter::new(), &[], None, None)
        .await
        .unwrap();
    assert_eq!(rows.len(), 3);
    // Insertion order is the default order.
    assert_eq!(rows[0].id, ada);
    assert_eq!(rows[0].attrs["id"], Value::Id(ada));
}

#[tokio::test]
async fn equal_like_and_in_filters() {
    let (store, ada, grace, _) = setup().await;

    assert_eq!(
        names(&store, &Filter::new().eq("name", "Ada")).await,
        vec!["Ada"]
    );
    // Like is a case-insensitive substring match.
    assert_eq!(
        names(&store, &Filter::new().like("name", "GRA")).await,
        vec!["Grace"]
    );
    assert_eq!(
        names(
            &store,
            &Filter::new().in_set("id", vec![Value::Id(ada), Value::Id(grace)])
        )
        .await,
        vec!["Ada", "Grace"]
    );
    // Missing attributes match Equal(Null).
    assert_eq!(names(&store, &Filter::new().eq("email", Value::Null)).await.len(), 3);
}

#[tokio::test]
async fn sort_and_pagination() {
    let (store, _, _, _) = setup().await;

    let rows = store
        .find_by(
            "person",
            &Filter::new(),
            &[SortKey::desc("age")],
            Some(Pagination {
                offset: 1,
                limit: 1,
            }),
            None,
        )
        .await
        .unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].attrs["name"].as_text(), Some("Edsger"));
}

#[tokio::test]
async fn raw_predicate_filters_rows() {
    let (store, _, _, _) = setup().await;

    let rows = store
        .find_by(
            "person",
            &Filter::new(),
            &[],
            None,
            Some(|attrs| matches!(attrs.get("age"), Some(Value::Int(age)) if *age > 70)),
        )
        .await
        .unwrap();
    assert_eq!(rows.len(), 2);
}

#[tokio::test]
async fn update_merges_and_null_is_explicit() {
    let (store, ada, _, _) = setup().await;

    store
        .update("person", ada, record([("age", Value::Null)]))
        .await
        .unwrap();

    let rows = store
        .find_by("person", &Filter::new().eq("id", Value::Id(ada)), &[], None, None)
        .await
        .unwrap();
    assert_eq!(rows[0].attrs["age"], Value::Null);
    // Untouched attributes survive the merge.
    assert_eq!(rows[0].attrs["name"].as_text(), Some("Ada"));
}

#[tokio::test]
async fn update_missing_row_is_not_found() {
    let (store, _, _, _) = setup().await;

    let err = store
        .update("person", Uuid::new_v4(), record([("age", 1.into())]))
        .await
        .unwrap_err();
    assert!(matches!(err, CollabError::NotFound { .. }));
}

#[tokio::test]
async fn abort_restores_exact_prior_state() {
    let (store, ada, grace, edsger) = setup().await;

    store.begin(false).await.unwrap();
    store
        .update("person", ada, record([("age", 37.into())]))
        .await
        .unwrap();
    store.delete_row("person", grace).await.unwrap();
    store
        .insert("person", record([("name", "Alan".into())]))
        .await
        .unwrap();
    store.abort().await.unwrap();

    let rows = store
        .find_by("person", &Filter::new(), &[], None, None)
        .await
        .unwrap();
    // Row set, attribute values, and row order are all restored.
    assert_eq!(
        rows.iter().map(|row| row.id).collect::<Vec<_>>(),
        vec![ada, grace, edsger]
    );
    assert_eq!(rows[0].attrs["age"], Value::Int(36));
}

#[tokio::test]
async fn nested_begin_joins_the_outer_transaction() {
    let (store, ada, _, _) = setup().await;

    store.begin(false).await.unwrap();
    store
        .update("person", ada, record([("age", 1.into())]))
        .await
        .unwrap();

    // Inner begin/commit pair; nothing is durable yet.
    store.begin(false).await.unwrap();
    store
        .update("person", ada, record([("age", 2.into())]))
        .await
        .unwrap();
    store.commit().await.unwrap();

    store.abort().await.unwrap();

    let rows = store
        .find_by("person", &Filter::new().eq("id", Value::Id(ada)), &[], None, None)
        .await
        .unwrap();
    assert_eq!(rows[0].attrs["age"], Value::Int(36));
}

#[tokio::test]
async fn outermost_commit_makes_writes_durable() {
    let (store, ada, _, _) = setup().await;

    store.begin(false).await.unwrap();
    store.begin(false).await.unwrap();
    store
        .update("person", ada, record([("age", 2.into())]))
        .await
        .unwrap();
    store.commit().await.unwrap();
    store.commit().await.unwrap();

    // A later abort has nothing to roll back.
    store.abort().await.unwrap();

    let rows = store
        .find_by("person", &Filter::new().eq("id", Value::Id(ada)), &[], None, None)
        .await
        .unwrap();
    assert_eq!(rows[0].attrs["age"], Value::Int(2));
}

#[tokio::test]
async fn commit_without_begin_is_an_error() {
    let store = MemoryStore::new();
    let err = store.commit().await.unwrap_err();
    assert!(matches!(err, CollabError::Storage(_)));
}

#[tokio::test]
async fn writes_are_rejected_in_read_only_transactions() {
    let (store, ada, _, _) = setup().await;

    store.begin(true).await.unwrap();
    let err = store
        .update("person", ada, record([("age", 1.into())]))
        .await
        .unwrap_err();
    assert!(matches!(err, CollabError::Storage(_)));

    // Reads still work.
    let rows = store
        .find_by("person", &Filter::new(), &[], None, None)
        .await
        .unwrap();
    assert_eq!(rows.len(), 3);
    store.commit().await.unwrap();
}
