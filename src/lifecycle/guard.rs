//! # Per-component lifecycle guard.
//!
//! [`LifecycleGuard`] owns a component's recorded state and the async mutex that serializes
//! every request made to it. A request takes the lock, asks the state machine for a
//! [`Plan`](super::Plan) and runs each [`Phase`] in order.
//!
//! ## Rules
//! - One mutex **per instance**; siblings never contend.
//! - N concurrent identical requests → exactly one side-effect sequence; the others find
//!   their post-condition already satisfied and run nothing.
//! - State is recorded **after** each phase completes; a failing phase leaves the
//!   previously recorded state in place (a failing init stays `Closed`).
//! - Panics raised by hooks are caught and surfaced as [`LifecycleError::Panicked`].
//! - Containers hold a [`LifecycleSession`] across their own hooks **and** the cascade into
//!   children; locks are only ever taken top-down.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};

use futures::FutureExt;
use parking_lot::RwLock;
use tokio::sync::{Mutex, MutexGuard};

use super::component::Lifecycle;
use super::state::{ComponentState, Phase, Plan, Transition};
use crate::error::{ConfigError, LifecycleError, panic_message};
use crate::events::{Bus, Event, EventKind};

/// Recorded state plus request serialization for one component.
pub struct LifecycleGuard {
    name: RwLock<Arc<str>>,
    state: AtomicU8,
    gate: Mutex<()>,
    bus: RwLock<Option<Bus>>,
}

impl LifecycleGuard {
    /// Creates a guard in the `Closed` state.
    pub fn new(name: impl Into<Arc<str>>) -> Self {
        Self {
            name: RwLock::new(name.into()),
            state: AtomicU8::new(ComponentState::Closed as u8),
            gate: Mutex::new(()),
            bus: RwLock::new(None),
        }
    }

    /// Identity used in errors and events.
    pub fn name(&self) -> Arc<str> {
        self.name.read().clone()
    }

    /// Replaces the identity (composite workflow ids are only known after `prepare`).
    pub fn rename(&self, name: impl Into<Arc<str>>) {
        *self.name.write() = name.into();
    }

    /// Last recorded state (lock-free read).
    pub fn state(&self) -> ComponentState {
        ComponentState::from(self.state.load(Ordering::Acquire))
    }

    /// Routes lifecycle events of this component to `bus`.
    pub fn attach_bus(&self, bus: Bus) {
        *self.bus.write() = Some(bus);
    }

    pub(crate) fn bus(&self) -> Option<Bus> {
        self.bus.read().clone()
    }

    /// Takes the request lock.
    pub async fn lock(&self) -> LifecycleSession<'_> {
        LifecycleSession {
            guard: self,
            _permit: self.gate.lock().await,
        }
    }

    /// Runs `transition` against `hooks` under the request lock.
    pub async fn request<L: Lifecycle + ?Sized>(
        &self,
        hooks: &L,
        transition: Transition,
    ) -> Result<ComponentState, LifecycleError> {
        self.lock().await.apply(hooks, transition).await
    }

    fn record(&self, state: ComponentState) {
        self.state.store(state as u8, Ordering::Release);
        if let Some(bus) = self.bus() {
            bus.publish(
                Event::new(EventKind::StateChanged)
                    .with_component(self.name())
                    .with_state(state),
            );
        }
    }

    fn report_failure(&self, err: &LifecycleError) {
        tracing::warn!(
            component = %self.name(),
            state = %self.state(),
            error = %err,
            label = err.as_label(),
            "lifecycle phase failed"
        );
        if let Some(bus) = self.bus() {
            bus.publish(
                Event::new(EventKind::LifecycleFailed)
                    .with_component(self.name())
                    .with_state(self.state())
                    .with_reason(err.to_string()),
            );
        }
    }
}

/// Exclusive access to a component's lifecycle for the lifetime of the value.
pub struct LifecycleSession<'a> {
    guard: &'a LifecycleGuard,
    _permit: MutexGuard<'a, ()>,
}

impl LifecycleSession<'_> {
    /// Current recorded state.
    pub fn state(&self) -> ComponentState {
        self.guard.state()
    }

    pub(crate) fn bus(&self) -> Option<Bus> {
        self.guard.bus()
    }

    /// What `transition` would do from the current state.
    pub fn plan(&self, transition: Transition) -> Plan {
        self.state().plan(transition)
    }

    /// Runs every phase the state machine plans for `transition`.
    pub async fn apply<L: Lifecycle + ?Sized>(
        &mut self,
        hooks: &L,
        transition: Transition,
    ) -> Result<ComponentState, LifecycleError> {
        let plan = self.plan(transition);
        for phase in plan.phases {
            self.run(hooks, *phase).await?;
        }
        Ok(self.state())
    }

    /// Runs a single phase and records the resulting state on success.
    async fn run<L: Lifecycle + ?Sized>(
        &mut self,
        hooks: &L,
        phase: Phase,
    ) -> Result<(), LifecycleError> {
        let component = self.guard.name().to_string();

        if phase == Phase::Init && !hooks.is_enabled() {
            let err = LifecycleError::Disabled { component };
            self.guard.report_failure(&err);
            return Err(err);
        }

        let outcome = AssertUnwindSafe(invoke(hooks, phase)).catch_unwind().await;
        let err = match outcome {
            Ok(Ok(())) => {
                self.guard.record(phase.completes_to());
                return Ok(());
            }
            Ok(Err(source)) => match source.downcast::<ConfigError>() {
                Ok(source) => LifecycleError::Config { component, source },
                Err(source) => LifecycleError::Hook {
                    component,
                    phase,
                    source,
                },
            },
            Err(payload) => LifecycleError::Panicked {
                component,
                phase,
                message: panic_message(payload.as_ref()),
            },
        };
        self.guard.report_failure(&err);
        Err(err)
    }
}

async fn invoke<L: Lifecycle + ?Sized>(hooks: &L, phase: Phase) -> anyhow::Result<()> {
    match phase {
        Phase::Init => hooks.init().await,
        Phase::Start => hooks.start().await,
        Phase::Stop => hooks.stop().await,
        Phase::Close => hooks.close().await,
    }
}
