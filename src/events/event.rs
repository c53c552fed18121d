//! # Runtime events emitted by components, handlers and the adapter.
//!
//! The [`EventKind`] enum classifies event types across four categories:
//! - **Lifecycle events**: component transitions and cascade failures
//! - **Message events**: failed messages, retries, recovery
//! - **Connection events**: connection failures and dependent recovery
//! - **Runtime events**: shutdown progress and subscriber health
//!
//! The [`Event`] struct carries additional metadata such as timestamps, component name,
//! message id, reasons and retry delays.
//!
//! ## Ordering guarantees
//! Each event has a globally unique sequence number (`seq`) that increases monotonically.
//! Use `seq` to restore the exact order when events are delivered out of order.
//!
//! ## Example
//! ```rust
//! use std::time::Duration;
//! use flowvisor::{Event, EventKind};
//!
//! let ev = Event::new(EventKind::RetryScheduled)
//!     .with_component("orders-workflow")
//!     .with_reason("broker unavailable")
//!     .with_attempt(3)
//!     .with_delay(Duration::from_secs(5));
//!
//! assert_eq!(ev.kind, EventKind::RetryScheduled);
//! assert_eq!(ev.component.as_deref(), Some("orders-workflow"));
//! assert_eq!(ev.reason.as_deref(), Some("broker unavailable"));
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::time::{Duration, SystemTime};

use crate::lifecycle::ComponentState;

/// Global sequence counter for event ordering.
static EVENT_SEQ: AtomicU64 = AtomicU64::new(1);

/// Classification of runtime events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    // === Subscriber events ===
    /// Subscriber panicked during event processing.
    ///
    /// Sets:
    /// - `component`: subscriber name
    /// - `reason`: panic info/message
    SubscriberPanicked,

    /// Subscriber dropped an event (queue full or worker closed).
    ///
    /// Sets:
    /// - `component`: subscriber name
    /// - `reason`: reason string (e.g., "full", "closed")
    SubscriberOverflow,

    // === Lifecycle events ===
    /// A component completed a lifecycle phase and recorded a new state.
    ///
    /// Sets:
    /// - `component`: component name
    /// - `state`: the state just recorded
    StateChanged,

    /// A lifecycle phase failed; the component keeps its previous state.
    ///
    /// Sets:
    /// - `component`: component name
    /// - `state`: the state the component remains in
    /// - `reason`: failure message
    LifecycleFailed,

    /// A child failed during a cascade that does not propagate the failure.
    ///
    /// Sets:
    /// - `component`: child name
    /// - `reason`: failure message
    CascadeChildFailed,

    // === Message events ===
    /// A message failed in a workflow and was routed to an exception handler.
    ///
    /// Sets:
    /// - `component`: workflow name
    /// - `message`: message id
    /// - `reason`: failure message
    MessageFailed,

    /// A handler ran its recovery chain for a message.
    ///
    /// Sets:
    /// - `component`: handler name
    /// - `message`: message id
    MessageRecovered,

    /// Next retry attempt scheduled.
    ///
    /// Sets:
    /// - `component`: workflow name
    /// - `message`: message id
    /// - `attempt`: attempts made so far
    /// - `delay_ms`: delay before the next attempt
    RetryScheduled,

    /// A retry attempt succeeded; the message left the retry loop.
    ///
    /// Sets:
    /// - `component`: workflow name
    /// - `message`: message id
    /// - `attempt`: the successful attempt number
    RetrySucceeded,

    /// Retry limit reached; the message goes to the recovery chain.
    ///
    /// Sets:
    /// - `component`: workflow name
    /// - `message`: message id
    /// - `attempt`: attempts made
    RetryExhausted,

    /// Retry was interrupted (handler stopped or operator fail).
    ///
    /// Sets:
    /// - `message`: message id
    /// - `reason`: why the retry stopped
    RetryInterrupted,

    /// A produce failure triggered a restart policy.
    ///
    /// Sets:
    /// - `component`: the component being restarted
    /// - `reason`: produce failure message
    RestartRequested,

    // === Connection events ===
    /// A connection reported a failure.
    ///
    /// Sets:
    /// - `component`: connection name
    /// - `reason`: handler kind
    ConnectionFailed,

    /// A dependent was recovered (restarted or closed) after a connection failure.
    ///
    /// Sets:
    /// - `component`: dependent name
    /// - `state`: state after recovery
    DependentRecovered,

    // === Shutdown events ===
    /// Shutdown requested (OS signal observed or explicit call).
    ShutdownRequested,

    /// Every component closed within the configured grace period.
    AllStoppedWithin,

    /// Grace period exceeded; some components did not close in time.
    GraceExceeded,
}

/// Runtime event with optional metadata.
///
/// - `seq`: monotonic global sequence for ordering
/// - `at`: wall-clock timestamp (for logs)
/// - other optional fields are set depending on the [`EventKind`]
#[derive(Clone, Debug)]
pub struct Event {
    /// Globally unique, monotonically increasing sequence number.
    pub seq: u64,
    /// Wall-clock timestamp.
    pub at: SystemTime,
    /// Event classification.
    pub kind: EventKind,

    /// Name of the component, if applicable.
    pub component: Option<Arc<str>>,
    /// Id of the message, if applicable.
    pub message: Option<Arc<str>>,
    /// Lifecycle state, if applicable.
    pub state: Option<ComponentState>,
    /// Human-readable reason (errors, overflow details, etc.).
    pub reason: Option<Arc<str>>,
    /// Attempt count (starting from 1).
    pub attempt: Option<u32>,
    /// Delay before next attempt in milliseconds (compact).
    pub delay_ms: Option<u32>,
}

impl Event {
    /// Creates a new event of the given kind with current timestamp and next sequence number.
    pub fn new(kind: EventKind) -> Self {
        Self {
            seq: EVENT_SEQ.fetch_add(1, AtomicOrdering::Relaxed),
            at: SystemTime::now(),
            kind,
            component: None,
            message: None,
            state: None,
            reason: None,
            attempt: None,
            delay_ms: None,
        }
    }

    /// Attaches a component name.
    #[inline]
    pub fn with_component(mut self, component: impl Into<Arc<str>>) -> Self {
        self.component = Some(component.into());
        self
    }

    /// Attaches a message id.
    #[inline]
    pub fn with_message(mut self, id: impl Into<Arc<str>>) -> Self {
        self.message = Some(id.into());
        self
    }

    /// Attaches a lifecycle state.
    #[inline]
    pub fn with_state(mut self, state: ComponentState) -> Self {
        self.state = Some(state);
        self
    }

    /// Attaches a human-readable reason.
    #[inline]
    pub fn with_reason(mut self, reason: impl Into<Arc<str>>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Attaches an attempt count.
    #[inline]
    pub fn with_attempt(mut self, n: u32) -> Self {
        self.attempt = Some(n);
        self
    }

    /// Attaches a delay (stored as milliseconds).
    #[inline]
    pub fn with_delay(mut self, d: Duration) -> Self {
        let ms = d.as_millis().min(u128::from(u32::MAX)) as u32;
        self.delay_ms = Some(ms);
        self
    }

    /// Creates a subscriber overflow event.
    #[inline]
    pub fn subscriber_overflow(subscriber: &'static str, reason: &'static str) -> Self {
        Event::new(EventKind::SubscriberOverflow)
            .with_component(subscriber)
            .with_reason(format!("subscriber={subscriber} reason={reason}"))
    }

    /// Creates a subscriber panic event.
    #[inline]
    pub fn subscriber_panicked(subscriber: &'static str, info: String) -> Self {
        Event::new(EventKind::SubscriberPanicked)
            .with_component(subscriber)
            .with_reason(info)
    }

    #[inline]
    pub fn is_subscriber_event(&self) -> bool {
        matches!(
            self.kind,
            EventKind::SubscriberOverflow | EventKind::SubscriberPanicked
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sequence_numbers_increase() {
        let a = Event::new(EventKind::StateChanged);
        let b = Event::new(EventKind::StateChanged);
        assert!(b.seq > a.seq);
    }

    #[test]
    fn delay_is_clamped_to_u32_millis() {
        let ev = Event::new(EventKind::RetryScheduled).with_delay(Duration::from_secs(u64::MAX));
        assert_eq!(ev.delay_ms, Some(u32::MAX));
    }
}
