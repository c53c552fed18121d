//! Component lifecycle: state machine, per-component guard and container cascade.
//!
//! ## Contents
//! - [`ComponentState`], [`Transition`], [`Phase`], [`Plan`] the pure transition table
//! - [`LifecycleGuard`] per-instance serialization and state recording
//! - [`Lifecycle`] side-effect hooks, [`Component`] request surface, [`Managed`] / [`Guarded`]
//! - [`cascade`] / [`LifecycleStrategy`] propagation into ordered children
//!
//! ## Quick wiring
//! ```text
//! request_start() ──► LifecycleGuard::lock() ──► state.plan(Start) ──► [init, start]
//!                                                        │
//!                     (containers only)                  ▼
//!                     cascade(children, Start)  ◄── own hooks succeeded
//! ```

mod cascade;
mod component;
mod guard;
mod state;

pub use cascade::{LifecycleStrategy, cascade};
pub(crate) use cascade::request_container;
pub use component::{Component, Guarded, Lifecycle, Managed};
pub use guard::{LifecycleGuard, LifecycleSession};
pub use state::{ComponentState, Phase, Plan, Transition};
