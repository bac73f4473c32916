use persistence_core::driver::Query;
use persistence_core::PersistenceError;

use crate::support::{bootstrap, document, posts_schema, user_schema};

#[tokio::test]
async fn create_then_list_test() {
    let facade = bootstrap().await;

    facade.create(posts_schema()).await.expect("create posts collection");
    assert!(facade.collections().contains(&"posts".to_string()));

    facade.delete("posts").await.expect("delete posts collection");
    assert!(!facade.collections().contains(&"posts".to_string()));
}

#[tokio::test]
async fn create_rejects_duplicate_logical_name_test() {
    let facade = bootstrap().await;

    facade.create(posts_schema()).await.expect("first create succeeds");
    let err = facade.create(posts_schema()).await.unwrap_err();
    assert!(matches!(err, PersistenceError::Conflict(name) if name == "posts"));
}

#[tokio::test]
async fn delete_then_create_leaves_meta_collection_unchanged_test() {
    let facade = bootstrap().await;

    let before = facade.metadata(Default::default(), false).await.unwrap().collection_count;
    facade.create(user_schema()).await.expect("create");
    facade.delete("user").await.expect("delete");
    let after = facade.metadata(Default::default(), false).await.unwrap().collection_count;

    assert_eq!(before, after);
}

#[tokio::test]
async fn document_crud_round_trip_test() {
    let facade = bootstrap().await;
    let collection = facade.create(user_schema()).await.expect("create user collection");

    let data = document(&[
        ("id", persistence_core::value::Value::String("u1".into())),
        ("age", persistence_core::value::Value::Number(33.into())),
    ]);
    let ids = collection.create(data).await.expect("insert succeeds");
    assert_eq!(ids.len(), 1);

    let read = collection.read(Query::default()).await.expect("read succeeds");
    assert_eq!(read.count, 1);

    let deleted = collection
        .delete(persistence_core::driver::Filter::default(), true)
        .await
        .expect("delete succeeds");
    assert_eq!(deleted, 1);
}

#[tokio::test]
async fn delete_refuses_empty_filter_without_allow_unsafe_test() {
    let facade = bootstrap().await;
    let collection = facade.create(user_schema()).await.expect("create user collection");

    let err = collection
        .delete(persistence_core::driver::Filter::default(), false)
        .await
        .unwrap_err();
    assert!(matches!(err, PersistenceError::UnsafeDelete));
}

#[tokio::test]
async fn migrate_then_rollback_restores_schema_version_test() {
    let facade = bootstrap().await;
    let collection = facade.create(user_schema()).await.expect("create user collection");

    let outcome = collection
        .migrate("widen age to string", "2", |_doc| Ok(()), false)
        .await
        .expect("migrate succeeds");
    assert_eq!(outcome.schema.version, "2");

    let rolled_back = facade.collection("user").await.expect("resolve migrated collection");
    assert_eq!(rolled_back.schema().version, "2");

    let rollback = rolled_back.rollback(None, false).await.expect("rollback succeeds");
    assert_eq!(rollback.schema.version, "1");
}

#[tokio::test]
async fn rollback_without_history_fails_test() {
    let facade = bootstrap().await;
    let collection = facade.create(user_schema()).await.expect("create user collection");

    let err = collection.rollback(None, false).await.unwrap_err();
    assert!(matches!(err, PersistenceError::NoMigrationHistory));
}
