//! # Event subscribers.
//!
//! ```text
//! component ── publish(Event) ──► Bus ──► adapter listener ──► SubscriberSet::emit
//!                                                                  │
//!                                          ┌───────────────┬───────┴───────┐
//!                                          ▼               ▼               ▼
//!                                    StateTracker      LogWriter        custom ...
//! ```
//!
//! - [`Subscribe`] the extension trait
//! - [`SubscriberSet`] bounded per-subscriber fan-out
//! - [`StateTracker`] last-known state per component (always installed by the adapter)
//! - `LogWriter` `tracing` renderer (feature `logging`)

#[cfg(feature = "logging")]
mod log;
mod set;
mod subscribe;
mod tracker;

#[cfg(feature = "logging")]
pub use log::LogWriter;
pub use set::SubscriberSet;
pub use subscribe::Subscribe;
pub use tracker::StateTracker;
