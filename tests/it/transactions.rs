use persistence_core::PersistenceError;

use crate::support::{bootstrap, posts_schema};

#[tokio::test]
async fn transaction_rollback_discards_created_collection_test() {
    let facade = bootstrap().await;

    let result = facade
        .transact(|child| async move {
            child.create(posts_schema()).await?;
            Err::<(), PersistenceError>(PersistenceError::Transaction("boom".to_string()))
        })
        .await;

    assert!(result.is_err());
    assert!(!facade.collections().contains(&"posts".to_string()));
}

#[tokio::test]
async fn transaction_commit_persists_created_collection_test() {
    let facade = bootstrap().await;

    facade
        .transact(|child| async move {
            child.create(posts_schema()).await?;
            Ok(())
        })
        .await
        .expect("transaction commits");

    assert!(facade.collections().contains(&"posts".to_string()));
}

#[tokio::test]
async fn transaction_rolls_back_on_callback_panic_test() {
    let facade = bootstrap().await;

    let result = facade
        .transact(|child| async move {
            child.create(posts_schema()).await?;
            panic!("callback blew up");
            #[allow(unreachable_code)]
            Ok::<(), PersistenceError>(())
        })
        .await;

    assert!(result.is_err());
    assert!(!facade.collections().contains(&"posts".to_string()));
}
