//! # Subscriber contract
//!
//! `Subscribe` is the extension point for observing the runtime. Each subscriber is
//! driven by its own worker task fed by a bounded queue owned by the
//! [`SubscriberSet`](crate::subscribers::SubscriberSet).
//!
//! ## Contract
//! - Implementations may be slow; they never block the publisher nor other subscribers.
//! - Each subscriber declares its queue capacity via [`Subscribe::queue_capacity`]; on
//!   overflow the event is dropped for that subscriber only.
//!
//! ## Example
//! ```rust
//! use async_trait::async_trait;
//! use flowvisor::{Event, EventKind, Subscribe};
//!
//! struct RetryAudit;
//!
//! #[async_trait]
//! impl Subscribe for RetryAudit {
//!     async fn on_event(&self, ev: &Event) {
//!         if ev.kind == EventKind::RetryExhausted {
//!             // write audit record...
//!         }
//!     }
//!
//!     fn name(&self) -> &'static str {
//!         "retry-audit"
//!     }
//! }
//! ```

use async_trait::async_trait;

use crate::events::Event;

/// Contract for event subscribers.
#[async_trait]
pub trait Subscribe: Send + Sync + 'static {
    /// Handles one event.
    async fn on_event(&self, event: &Event);

    /// Name used in overflow/panic reports.
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }

    /// Capacity of this subscriber's queue.
    fn queue_capacity(&self) -> usize {
        1024
    }
}
