//! Runtime events: types and broadcast bus.
//!
//! This module groups the event **data model** and the **bus** used to
//! publish/subscribe to runtime events emitted by lifecycle guards, cascades,
//! workflows, exception handlers, connections and subscriber workers.
//!
//! ## Contents
//! - [`EventKind`], [`Event`] event classification and payload metadata
//! - [`Bus`] thin wrapper over `tokio::sync::broadcast`
//!
//! ## Quick reference
//! - **Publishers**: `LifecycleGuard`, `cascade`, workflows, `RetryMessageErrorHandler`,
//!   `Connection`, `SubscriberSet` workers (overflow/panic).
//! - **Consumers**: the adapter's event listener, which fans out to `SubscriberSet`.

mod bus;
mod event;

pub use bus::Bus;
pub(crate) use bus::publish_to;
pub use event::{Event, EventKind};
