//! The typed event bus (component E) and the subscription registry the
//! facade wraps it with (spec §4.4). Novel relative to the teacher — `control`
//! has no pub/sub of its own — but structured like one of its service
//! modules: a small, focused type with `parking_lot` guarding the shared
//! table (the same choice `driver::memory` makes for its store, since
//! publishing must stay synchronous per spec §5 and never await while
//! holding the lock).

mod event;
mod registry;

pub use event::{now_ms, EventBus, EventCallback, EventType, PersistenceEvent, Unsubscribe};
pub use registry::{SubscriptionInfo, SubscriptionRegistry};
