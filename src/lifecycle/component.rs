//! # Lifecycle hooks and the component contract.
//!
//! Two traits split "what a component does" from "how it is driven":
//!
//! - [`Lifecycle`] — the side-effect hooks (`init`, `start`, `stop`, `close`) implemented by
//!   user code (steps, producers, consumers, transports) and by containers internally.
//! - [`Component`] — the request surface (`request_init` … `request_restart`) that runs the
//!   hooks through a [`LifecycleGuard`](super::LifecycleGuard) and the state machine.
//!
//! [`Managed`] adapts any [`Lifecycle`] into a [`Component`] by pairing it with a guard;
//! types that embed their own guard implement [`Guarded`] instead.

use std::sync::Arc;

use async_trait::async_trait;

use super::guard::LifecycleGuard;
use super::state::{ComponentState, Transition};
use crate::error::LifecycleError;

/// Side-effect hooks of a lifecycle-managed unit.
///
/// Hooks are only ever called by a [`LifecycleGuard`]; never call them directly.
/// Every hook defaults to a no-op.
#[async_trait]
pub trait Lifecycle: Send + Sync {
    /// Acquire resources.
    async fn init(&self) -> anyhow::Result<()> {
        Ok(())
    }

    /// Begin processing.
    async fn start(&self) -> anyhow::Result<()> {
        Ok(())
    }

    /// Pause processing.
    async fn stop(&self) -> anyhow::Result<()> {
        Ok(())
    }

    /// Release resources.
    async fn close(&self) -> anyhow::Result<()> {
        Ok(())
    }

    /// Entitlement gate consulted before every `init`.
    ///
    /// Returning `false` makes initialisation fail with [`LifecycleError::Disabled`].
    fn is_enabled(&self) -> bool {
        true
    }
}

/// A unit with a lifecycle state that can be driven by requests.
///
/// Every request is idempotent: asking for a state the component is already in runs no
/// hooks. Concurrent requests on one component are serialized by its guard.
#[async_trait]
pub trait Component: Send + Sync {
    /// Human-readable identity (unique id when configured).
    fn name(&self) -> Arc<str>;

    /// Last recorded state.
    fn state(&self) -> ComponentState;

    /// Drives the component through `transition`, returning the state reached.
    async fn request(&self, transition: Transition) -> Result<ComponentState, LifecycleError>;

    async fn request_init(&self) -> Result<ComponentState, LifecycleError> {
        self.request(Transition::Init).await
    }

    async fn request_start(&self) -> Result<ComponentState, LifecycleError> {
        self.request(Transition::Start).await
    }

    async fn request_stop(&self) -> Result<ComponentState, LifecycleError> {
        self.request(Transition::Stop).await
    }

    async fn request_close(&self) -> Result<ComponentState, LifecycleError> {
        self.request(Transition::Close).await
    }

    async fn request_restart(&self) -> Result<ComponentState, LifecycleError> {
        self.request(Transition::Restart).await
    }
}

/// A [`Lifecycle`] that carries its own [`LifecycleGuard`].
///
/// Implementing `Guarded` is all a leaf component needs: the blanket impl below turns it
/// into a [`Component`] whose requests run the hooks under that guard.
pub trait Guarded: Lifecycle {
    fn guard(&self) -> &LifecycleGuard;
}

#[async_trait]
impl<T: Guarded + 'static> Component for T {
    fn name(&self) -> Arc<str> {
        self.guard().name()
    }

    fn state(&self) -> ComponentState {
        self.guard().state()
    }

    async fn request(&self, transition: Transition) -> Result<ComponentState, LifecycleError> {
        self.guard().request(self, transition).await
    }
}

/// Pairs a [`Lifecycle`] implementation with its own [`LifecycleGuard`].
///
/// Workflows wrap their consumer, producers and processing chain in `Managed` so each
/// element tracks its own state and is never initialised twice.
pub struct Managed<T: ?Sized> {
    guard: LifecycleGuard,
    inner: Arc<T>,
}

impl<T: ?Sized> Managed<T> {
    /// Wraps `inner` under a fresh guard named `name`.
    pub fn new(name: impl Into<Arc<str>>, inner: Arc<T>) -> Self {
        Self {
            guard: LifecycleGuard::new(name),
            inner,
        }
    }

    /// The wrapped implementation.
    pub fn get(&self) -> &Arc<T> {
        &self.inner
    }

    pub(crate) fn guard(&self) -> &LifecycleGuard {
        &self.guard
    }
}

#[async_trait]
impl<T: Lifecycle + ?Sized + 'static> Component for Managed<T> {
    fn name(&self) -> Arc<str> {
        self.guard.name()
    }

    fn state(&self) -> ComponentState {
        self.guard.state()
    }

    async fn request(&self, transition: Transition) -> Result<ComponentState, LifecycleError> {
        self.guard.request(self.inner.as_ref(), transition).await
    }
}
