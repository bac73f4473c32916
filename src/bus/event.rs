use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use uuid::Uuid;

use crate::driver::Query;
use crate::validator::Issue;
use crate::value::{Document, Value};

/// The closed event-type vocabulary (spec §4.4, GLOSSARY).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EventType {
    DocumentCreateStart,
    DocumentCreateSuccess,
    DocumentCreateFailed,
    DocumentReadStart,
    DocumentReadSuccess,
    DocumentReadFailed,
    DocumentUpdateStart,
    DocumentUpdateSuccess,
    DocumentUpdateFailed,
    DocumentDeleteStart,
    DocumentDeleteSuccess,
    DocumentDeleteFailed,
    CollectionCreateStart,
    CollectionCreateSuccess,
    CollectionCreateFailed,
    CollectionDeleteStart,
    CollectionDeleteSuccess,
    CollectionDeleteFailed,
    MigrateStart,
    MigrateSuccess,
    MigrateFailed,
    RollbackStart,
    RollbackSuccess,
    RollbackFailed,
    TransactionStart,
    TransactionSuccess,
    TransactionFailed,
    SubscriptionRegister,
    SubscriptionUnregister,
    MetadataCalled,
    Telemetry,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::DocumentCreateStart => "document:create:start",
            EventType::DocumentCreateSuccess => "document:create:success",
            EventType::DocumentCreateFailed => "document:create:failed",
            EventType::DocumentReadStart => "document:read:start",
            EventType::DocumentReadSuccess => "document:read:success",
            EventType::DocumentReadFailed => "document:read:failed",
            EventType::DocumentUpdateStart => "document:update:start",
            EventType::DocumentUpdateSuccess => "document:update:success",
            EventType::DocumentUpdateFailed => "document:update:failed",
            EventType::DocumentDeleteStart => "document:delete:start",
            EventType::DocumentDeleteSuccess => "document:delete:success",
            EventType::DocumentDeleteFailed => "document:delete:failed",
            EventType::CollectionCreateStart => "collection:create:start",
            EventType::CollectionCreateSuccess => "collection:create:success",
            EventType::CollectionCreateFailed => "collection:create:failed",
            EventType::CollectionDeleteStart => "collection:delete:start",
            EventType::CollectionDeleteSuccess => "collection:delete:success",
            EventType::CollectionDeleteFailed => "collection:delete:failed",
            EventType::MigrateStart => "migrate:start",
            EventType::MigrateSuccess => "migrate:success",
            EventType::MigrateFailed => "migrate:failed",
            EventType::RollbackStart => "rollback:start",
            EventType::RollbackSuccess => "rollback:success",
            EventType::RollbackFailed => "rollback:failed",
            EventType::TransactionStart => "transaction:start",
            EventType::TransactionSuccess => "transaction:success",
            EventType::TransactionFailed => "transaction:failed",
            EventType::SubscriptionRegister => "subscription:register",
            EventType::SubscriptionUnregister => "subscription:unregister",
            EventType::MetadataCalled => "metadata:called",
            EventType::Telemetry => "telemetry",
        }
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A lifecycle event published on the bus (spec §3 `PersistenceEvent`,
/// wire shape per §6). `collection` holds the logical name, never physical.
#[derive(Clone, Debug)]
pub struct PersistenceEvent {
    pub event_type: EventType,
    pub timestamp_ms: i64,
    pub operation: String,
    pub collection: Option<String>,
    pub input: Option<Value>,
    pub output: Option<Value>,
    pub error: Option<String>,
    pub issues: Option<Vec<Issue>>,
    pub query: Option<Query>,
    pub transaction_id: Option<Uuid>,
    pub duration_ms: Option<i64>,
    pub context: Document,
}

impl PersistenceEvent {
    pub fn new(event_type: EventType, operation: impl Into<String>) -> Self {
        Self {
            event_type,
            timestamp_ms: now_ms(),
            operation: operation.into(),
            collection: None,
            input: None,
            output: None,
            error: None,
            issues: None,
            query: None,
            transaction_id: None,
            duration_ms: None,
            context: Document::new(),
        }
    }

    pub fn with_collection(mut self, collection: impl Into<String>) -> Self {
        self.collection = Some(collection.into());
        self
    }

    pub fn with_input(mut self, input: Value) -> Self {
        self.input = Some(input);
        self
    }

    pub fn with_output(mut self, output: Value) -> Self {
        self.output = Some(output);
        self
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    pub fn with_issues(mut self, issues: Vec<Issue>) -> Self {
        self.issues = Some(issues);
        self
    }

    pub fn with_query(mut self, query: Query) -> Self {
        self.query = Some(query);
        self
    }

    pub fn with_transaction_id(mut self, id: Option<Uuid>) -> Self {
        self.transaction_id = id;
        self
    }

    pub fn with_duration_ms(mut self, duration_ms: i64) -> Self {
        self.duration_ms = Some(duration_ms);
        self
    }
}

pub(crate) fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// `(data, field, args) -> bool` is the predicate signature; a subscriber
/// callback is simpler — `Fn(&PersistenceEvent)`, never fallible. Errors a
/// callback wants to surface must be logged by the callback itself (spec
/// §4.4: "callback errors are logged but never abort publication").
pub type EventCallback = Arc<dyn Fn(&PersistenceEvent) + Send + Sync>;

/// A one-shot, callable-once unsubscribe handle (spec §3 `SubscriptionInfo.unsubscribe`).
pub struct Unsubscribe(Mutex<Option<Box<dyn FnOnce() + Send>>>);

impl Unsubscribe {
    fn new(f: impl FnOnce() + Send + 'static) -> Self {
        Self(Mutex::new(Some(Box::new(f))))
    }

    /// Idempotent: calling it again after the first call is a no-op.
    pub fn call(&self) {
        if let Some(f) = self.0.lock().take() {
            f();
        }
    }
}

impl std::fmt::Debug for Unsubscribe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Unsubscribe(..)")
    }
}

/// A typed publish/subscribe bus indexed by [`EventType`] (spec §4.4).
/// Publishing is synchronous on the publisher's thread (spec §5) — a
/// subscriber that blocks indefinitely blocks the publisher.
#[derive(Default)]
pub struct EventBus {
    subscribers: RwLock<HashMap<EventType, HashMap<Uuid, EventCallback>>>,
}

impl EventBus {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Registers `callback` for `event` and returns the id the bus stored it
    /// under plus a handle that removes it. The registry (component wrapping
    /// this bus) reuses the id as the subscription's public identity.
    pub fn subscribe(self: &Arc<Self>, event: EventType, callback: EventCallback) -> (Uuid, Unsubscribe) {
        let id = Uuid::new_v4();
        self.subscribers.write().entry(event).or_default().insert(id, callback);

        let bus = Arc::clone(self);
        let unsubscribe = Unsubscribe::new(move || {
            if let Some(table) = bus.subscribers.write().get_mut(&event) {
                table.remove(&id);
            }
        });
        (id, unsubscribe)
    }

    /// Invokes every live callback for `event.event_type`. A callback that
    /// panics is caught and logged rather than propagated — one bad
    /// subscriber must never prevent its siblings, or the publisher, from
    /// observing the event (spec §4.4/§7).
    pub fn publish(&self, event: &PersistenceEvent) {
        let callbacks: Vec<EventCallback> = self
            .subscribers
            .read()
            .get(&event.event_type)
            .map(|table| table.values().cloned().collect())
            .unwrap_or_default();

        for callback in callbacks {
            let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| callback(event)));
            if let Err(_panic) = outcome {
                tracing::error!(
                    event = event.event_type.as_str(),
                    "subscriber callback panicked; publication continues"
                );
            }
        }
    }

    pub fn subscriber_count(&self, event: EventType) -> usize {
        self.subscribers.read().get(&event).map(HashMap::len).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn publish_invokes_live_subscribers_in_order_of_registration() {
        let bus = EventBus::new();
        let count = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&count);
        let (_id, _unsub) = bus.subscribe(
            EventType::DocumentCreateSuccess,
            Arc::new(move |_evt| {
                c.fetch_add(1, Ordering::SeqCst);
            }),
        );

        bus.publish(&PersistenceEvent::new(EventType::DocumentCreateSuccess, "create"));
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn unsubscribe_stops_further_delivery() {
        let bus = EventBus::new();
        let count = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&count);
        let (_id, unsub) = bus.subscribe(
            EventType::DocumentCreateSuccess,
            Arc::new(move |_evt| {
                c.fetch_add(1, Ordering::SeqCst);
            }),
        );
        unsub.call();
        bus.publish(&PersistenceEvent::new(EventType::DocumentCreateSuccess, "create"));
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn a_panicking_subscriber_does_not_block_publication_to_others() {
        let bus = EventBus::new();
        let count = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&count);
        bus.subscribe(EventType::Telemetry, Arc::new(|_evt| panic!("boom")));
        bus.subscribe(
            EventType::Telemetry,
            Arc::new(move |_evt| {
                c.fetch_add(1, Ordering::SeqCst);
            }),
        );

        bus.publish(&PersistenceEvent::new(EventType::Telemetry, "telemetry"));
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }
}
