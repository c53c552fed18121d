//! # Processing exception handlers.
//!
//! A workflow routes every failed message (the original, pre-processing copy) to its
//! resolved [`ProcessingExceptionHandler`]. Handlers are components: their recovery chain
//! follows the handler's lifecycle.
//!
//! - [`NullProcessingHandler`] discards the message (debug log only); the default when
//!   no scope configures a handler.
//! - [`StandardProcessingHandler`] runs its recovery chain once per failure.
//! - [`RetryMessageErrorHandler`](crate::RetryMessageErrorHandler) re-attempts the
//!   workflow before giving up.

use std::sync::Arc;

use async_trait::async_trait;

use crate::chain::ProcessingChain;
use crate::events::{Bus, Event, EventKind, publish_to};
use crate::lifecycle::{Component, Guarded, Lifecycle, LifecycleGuard};
use crate::message::Message;
use crate::workflow::Workflow;

/// Shared handle to a processing exception handler.
pub type HandlerRef = Arc<dyn ProcessingExceptionHandler>;

/// Recovery policy for failed messages.
#[async_trait]
pub trait ProcessingExceptionHandler: Component {
    /// Stable kind label (`"null"`, `"standard"`, `"retry"`, ...).
    fn kind(&self) -> &'static str;

    /// Takes ownership of a failed message.
    async fn handle_processing_failure(&self, msg: Message);

    /// When configured on an outer scope, handle failures even if an inner scope already
    /// resolved a different handler.
    fn always_handle(&self) -> bool {
        false
    }

    /// Called by every workflow that resolved this handler during `prepare`.
    fn register_workflow(&self, _workflow: &Arc<Workflow>) {}

    /// Called when a workflow stops resolving this handler.
    fn unregister_workflow(&self, _workflow_id: &str) {}

    /// Routes this handler's events to `bus`.
    fn attach_bus(&self, _bus: Bus) {}
}

/// Runs `chain` against `msg` on behalf of `handler`; failures are logged, never raised.
pub(crate) async fn run_recovery(
    handler: &str,
    chain: &ProcessingChain,
    mut msg: Message,
    bus: &Option<Bus>,
) {
    let id = msg.id();
    match chain.execute(&mut msg).await {
        Ok(()) => {
            tracing::info!(handler, message = %id, "message handed to recovery chain");
            publish_to(bus, || {
                Event::new(EventKind::MessageRecovered)
                    .with_component(handler)
                    .with_message(id.to_string())
            });
        }
        Err(e) => {
            tracing::error!(handler, message = %id, error = %e, "recovery chain failed; message lost");
        }
    }
}

/// Handler that does nothing.
pub struct NullProcessingHandler {
    guard: LifecycleGuard,
}

impl NullProcessingHandler {
    pub fn new() -> Self {
        Self {
            guard: LifecycleGuard::new("null-processing-handler"),
        }
    }

    pub fn arc() -> HandlerRef {
        Arc::new(Self::new())
    }
}

impl Default for NullProcessingHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl Lifecycle for NullProcessingHandler {}

impl Guarded for NullProcessingHandler {
    fn guard(&self) -> &LifecycleGuard {
        &self.guard
    }
}

#[async_trait]
impl ProcessingExceptionHandler for NullProcessingHandler {
    fn kind(&self) -> &'static str {
        "null"
    }

    async fn handle_processing_failure(&self, msg: Message) {
        tracing::debug!(message = %msg.id(), "no processing handler configured; message dropped");
    }
}

/// Handler that runs its recovery chain (e.g. a dead-letter route) once per failure.
pub struct StandardProcessingHandler {
    guard: LifecycleGuard,
    recovery: ProcessingChain,
    always_handle: bool,
}

impl StandardProcessingHandler {
    pub fn new(name: impl Into<Arc<str>>, recovery: ProcessingChain) -> Self {
        Self {
            guard: LifecycleGuard::new(name),
            recovery,
            always_handle: false,
        }
    }

    /// Also handle failures already resolved by an inner scope.
    pub fn with_always_handle(mut self, always: bool) -> Self {
        self.always_handle = always;
        self
    }
}

#[async_trait]
impl Lifecycle for StandardProcessingHandler {
    async fn init(&self) -> anyhow::Result<()> {
        self.recovery.init().await
    }

    async fn start(&self) -> anyhow::Result<()> {
        self.recovery.start().await
    }

    async fn stop(&self) -> anyhow::Result<()> {
        self.recovery.stop().await
    }

    async fn close(&self) -> anyhow::Result<()> {
        self.recovery.close().await
    }
}

impl Guarded for StandardProcessingHandler {
    fn guard(&self) -> &LifecycleGuard {
        &self.guard
    }
}

#[async_trait]
impl ProcessingExceptionHandler for StandardProcessingHandler {
    fn kind(&self) -> &'static str {
        "standard"
    }

    async fn handle_processing_failure(&self, msg: Message) {
        let name = self.guard.name();
        run_recovery(&name, &self.recovery, msg, &self.guard.bus()).await;
    }

    fn always_handle(&self) -> bool {
        self.always_handle
    }

    fn attach_bus(&self, bus: Bus) {
        self.guard.attach_bus(bus);
    }
}
