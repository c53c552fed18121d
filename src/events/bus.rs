//! # Event bus.
//!
//! Every component publishes into one [`Bus`] per adapter; the adapter's listener task is
//! the only long-lived receiver and forwards each event to the subscriber set.
//!
//! ```text
//! LifecycleGuard ─┐
//! cascade        ─┤
//! Workflow       ─┼──► Bus (broadcast ring) ──► adapter listener ──► SubscriberSet
//! RetryHandler   ─┤
//! Connection     ─┘
//! ```
//!
//! Publishing never waits. A receiver that falls more than `capacity` events behind
//! skips the oldest ones; events published with no receiver attached are dropped.

use tokio::sync::broadcast;

use super::event::Event;

/// Shared handle to the adapter's event stream; clones publish into the same ring.
#[derive(Clone, Debug)]
pub struct Bus {
    tx: broadcast::Sender<Event>,
}

impl Bus {
    /// Ring buffer of `capacity` events (min 1).
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel::<Event>(capacity.max(1));
        Self { tx }
    }

    pub fn publish(&self, ev: Event) {
        // No receivers is not an error: nobody is listening yet.
        let _ = self.tx.send(ev);
    }

    /// Receiver for events published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }

    /// Number of attached receivers.
    pub fn receiver_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

/// Publishes to an optional bus; components built outside an adapter have none.
pub(crate) fn publish_to(bus: &Option<Bus>, ev: impl FnOnce() -> Event) {
    if let Some(bus) = bus {
        bus.publish(ev());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventKind;

    #[tokio::test]
    async fn late_receivers_miss_earlier_events() {
        let bus = Bus::new(0);
        bus.publish(Event::new(EventKind::ShutdownRequested));

        let mut rx = bus.subscribe();
        assert_eq!(bus.receiver_count(), 1);
        bus.publish(Event::new(EventKind::GraceExceeded));

        let ev = rx.recv().await.expect("event");
        assert_eq!(ev.kind, EventKind::GraceExceeded);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn optional_bus_skips_building_the_event() {
        let mut built = false;
        publish_to(&None, || {
            built = true;
            Event::new(EventKind::MessageFailed)
        });
        assert!(!built);
    }
}
