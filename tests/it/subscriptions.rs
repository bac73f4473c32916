use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use persistence_core::bus::EventType;

use crate::support::{bootstrap, document, user_schema};

#[tokio::test]
async fn subscription_delivery_test() {
    let facade = bootstrap().await;
    let collection = facade.create(user_schema()).await.expect("create user collection");

    let count = Arc::new(AtomicUsize::new(0));
    let seen_collection = Arc::new(std::sync::Mutex::new(None));
    let c = Arc::clone(&count);
    let seen = Arc::clone(&seen_collection);
    let id = facade.register_subscription(
        EventType::DocumentCreateSuccess,
        Some("watcher".to_string()),
        None,
        Arc::new(move |event| {
            c.fetch_add(1, Ordering::SeqCst);
            *seen.lock().unwrap() = event.collection.clone();
        }),
    );

    assert!(facade.subscriptions().iter().any(|s| s.id == id));

    let data = document(&[
        ("id", persistence_core::value::Value::String("u1".into())),
        ("age", persistence_core::value::Value::Number(33.into())),
    ]);
    collection.create(data).await.expect("create succeeds");

    assert_eq!(count.load(Ordering::SeqCst), 1);
    assert_eq!(seen_collection.lock().unwrap().as_deref(), Some("user"));

    assert!(facade.unregister_subscription(id));
    assert!(!facade.subscriptions().iter().any(|s| s.id == id));

    let data = document(&[
        ("id", persistence_core::value::Value::String("u2".into())),
        ("age", persistence_core::value::Value::Number(40.into())),
    ]);
    collection.create(data).await.expect("create succeeds");
    assert_eq!(count.load(Ordering::SeqCst), 1, "no further delivery after unregister");
}
