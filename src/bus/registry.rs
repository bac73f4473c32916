use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use uuid::Uuid;

use super::event::{now_ms, EventBus, EventCallback, EventType, PersistenceEvent, Unsubscribe};

/// `{id, event, label?, description?, unsubscribe}` (spec §3). Owned by the
/// facade; destroyed by `unregister` or facade teardown.
#[derive(Clone)]
pub struct SubscriptionInfo {
    pub id: Uuid,
    pub event: EventType,
    pub label: Option<String>,
    pub description: Option<String>,
    unsubscribe: Arc<Unsubscribe>,
}

impl std::fmt::Debug for SubscriptionInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriptionInfo")
            .field("id", &self.id)
            .field("event", &self.event.as_str())
            .field("label", &self.label)
            .field("description", &self.description)
            .finish()
    }
}

/// The facade's wrapper around [`EventBus`]: a mapping from generated UUID
/// to [`SubscriptionInfo`], protected by a read/write lock (spec §4.4/§5 —
/// read-heavy access pattern, `parking_lot` to match the rest of the crate's
/// shared-state locks).
pub struct SubscriptionRegistry {
    bus: Arc<EventBus>,
    subscriptions: RwLock<HashMap<Uuid, SubscriptionInfo>>,
}

impl SubscriptionRegistry {
    pub fn new(bus: Arc<EventBus>) -> Self {
        Self {
            bus,
            subscriptions: RwLock::new(HashMap::new()),
        }
    }

    pub fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    /// Assigns an id (reusing the bus's own subscriber key) and stores the
    /// record; publishes `subscription:register` on success.
    pub fn register(
        &self,
        event: EventType,
        label: Option<String>,
        description: Option<String>,
        callback: EventCallback,
    ) -> Uuid {
        let (id, unsubscribe) = self.bus.subscribe(event, callback);
        let info = SubscriptionInfo {
            id,
            event,
            label: label.clone(),
            description: description.clone(),
            unsubscribe: Arc::new(unsubscribe),
        };
        self.subscriptions.write().insert(id, info);

        let mut registered = PersistenceEvent::new(EventType::SubscriptionRegister, "subscribe");
        registered.timestamp_ms = now_ms();
        self.bus.publish(&registered);
        id
    }

    /// Calls the unsubscribe handle and removes the record; publishes
    /// `subscription:unregister`. Returns `false` if `id` was unknown (e.g.
    /// already unregistered).
    pub fn unregister(&self, id: Uuid) -> bool {
        let removed = self.subscriptions.write().remove(&id);
        match removed {
            Some(info) => {
                info.unsubscribe.call();
                self.bus
                    .publish(&PersistenceEvent::new(EventType::SubscriptionUnregister, "unsubscribe"));
                true
            }
            None => false,
        }
    }

    /// A snapshot of currently-registered subscriptions (spec §4.4
    /// `Subscriptions()`).
    pub fn snapshot(&self) -> Vec<SubscriptionInfo> {
        self.subscriptions.read().values().cloned().collect()
    }

    pub fn contains(&self, id: Uuid) -> bool {
        self.subscriptions.read().contains_key(&id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn register_then_unregister_stops_delivery() {
        let registry = SubscriptionRegistry::new(EventBus::new());
        let count = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&count);
        let id = registry.register(
            EventType::DocumentCreateSuccess,
            Some("watcher".into()),
            None,
            Arc::new(move |_evt| {
                c.fetch_add(1, Ordering::SeqCst);
            }),
        );

        assert!(registry.snapshot().iter().any(|s| s.id == id));

        registry
            .bus()
            .publish(&PersistenceEvent::new(EventType::DocumentCreateSuccess, "create"));
        assert_eq!(count.load(Ordering::SeqCst), 1);

        assert!(registry.unregister(id));
        assert!(!registry.snapshot().iter().any(|s| s.id == id));

        registry
            .bus()
            .publish(&PersistenceEvent::new(EventType::DocumentCreateSuccess, "create"));
        assert_eq!(count.load(Ordering::SeqCst), 1, "no further delivery after unregister");
    }

    #[test]
    fn unregister_of_unknown_id_is_a_no_op() {
        let registry = SubscriptionRegistry::new(EventBus::new());
        assert!(!registry.unregister(Uuid::new_v4()));
    }
}
