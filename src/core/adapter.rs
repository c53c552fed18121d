//! # Adapter: the root container.
//!
//! The [`Adapter`] owns the channels, the shared-connection [`Directory`], the root handler
//! scope and the event plumbing.
//!
//! ```text
//!   components ── publish(Event) ──► Bus ──► listener ──► SubscriberSet ──► StateTracker
//!                                                                       └─► user subscribers
//!
//!   Adapter ─┬─► Channel ─► Workflow ...        (cascade targets)
//!            ├─ Directory: shared connections   (initialised by proxies, stopped/closed here)
//!            └─ root processing / connection handlers
//! ```
//!
//! ## Shutdown
//! ```text
//! run():  request_start ─► wait_for_shutdown_signal ─► ShutdownRequested ─► shutdown()
//! shutdown(): request_close within shutdown_grace
//!               ├─ Ok      → AllStoppedWithin
//!               └─ timeout → GraceExceeded + RuntimeError::GraceExceeded { stuck }
//! ```

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use super::builder::AdapterBuilder;
use super::channel::{Channel, RootScope};
use super::shutdown;
use crate::config::AdapterConfig;
use crate::connection::Directory;
use crate::error::{ConfigError, LifecycleError, RuntimeError};
use crate::events::{Bus, Event, EventKind};
use crate::handlers::{ConnectionHandlerRef, HandlerRef};
use crate::lifecycle::{
    Component, ComponentState, Lifecycle, LifecycleGuard, Transition, request_container,
};
use crate::subscribers::{StateTracker, SubscriberSet};

/// Root container of an integration runtime.
pub struct Adapter {
    id: String,
    guard: LifecycleGuard,
    cfg: AdapterConfig,
    channels: RwLock<Vec<Arc<Channel>>>,
    directory: Directory,
    processing_handler: RwLock<Option<HandlerRef>>,
    connection_handler: RwLock<Option<ConnectionHandlerRef>>,
    bus: Bus,
    subs: Arc<SubscriberSet>,
    tracker: Arc<StateTracker>,
    listener: JoinHandle<()>,
}

pub(crate) struct AdapterParts {
    pub(crate) id: String,
    pub(crate) cfg: AdapterConfig,
    pub(crate) directory: Directory,
    pub(crate) processing_handler: Option<HandlerRef>,
    pub(crate) connection_handler: Option<ConnectionHandlerRef>,
    pub(crate) bus: Bus,
    pub(crate) subs: Arc<SubscriberSet>,
    pub(crate) tracker: Arc<StateTracker>,
}

impl Adapter {
    /// Starts building an adapter with unique id `id`.
    pub fn builder(id: impl Into<String>) -> AdapterBuilder {
        AdapterBuilder::new(id)
    }

    pub(crate) fn from_parts(parts: AdapterParts) -> Self {
        let listener = spawn_listener(&parts.bus, Arc::clone(&parts.subs));
        let guard = LifecycleGuard::new(parts.id.as_str());
        guard.attach_bus(parts.bus.clone());
        Self {
            id: parts.id,
            guard,
            cfg: parts.cfg,
            channels: RwLock::new(Vec::new()),
            directory: parts.directory,
            processing_handler: RwLock::new(parts.processing_handler),
            connection_handler: RwLock::new(parts.connection_handler),
            bus: parts.bus,
            subs: parts.subs,
            tracker: parts.tracker,
            listener,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn config(&self) -> &AdapterConfig {
        &self.cfg
    }

    /// Subscribes to runtime events.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.bus.subscribe()
    }

    /// Shared-connection registry of this adapter.
    pub fn directory(&self) -> &Directory {
        &self.directory
    }

    /// Last-known component states, fed from the event bus.
    pub fn state_tracker(&self) -> &Arc<StateTracker> {
        &self.tracker
    }

    /// Number of event subscribers, the state tracker included.
    pub fn subscriber_count(&self) -> usize {
        self.subs.len()
    }

    pub fn channels(&self) -> Vec<Arc<Channel>> {
        self.channels.read().clone()
    }

    pub fn channel(&self, id: &str) -> Option<Arc<Channel>> {
        self.channels.read().iter().find(|c| c.id() == id).cloned()
    }

    /// Adds a channel; duplicate ids are rejected.
    ///
    /// The channel is only initialised by the next adapter request.
    pub fn add_channel(&self, channel: Arc<Channel>) -> Result<(), ConfigError> {
        {
            let mut channels = self.channels.write();
            if channels.iter().any(|c| c.id() == channel.id()) {
                return Err(ConfigError::DuplicateId {
                    what: "channel",
                    id: channel.id().to_string(),
                });
            }
            channels.push(Arc::clone(&channel));
        }
        channel.bind_root(self.root_scope());
        Ok(())
    }

    /// Removes a channel without changing its state.
    pub fn remove_channel(&self, id: &str) -> Option<Arc<Channel>> {
        let mut channels = self.channels.write();
        let pos = channels.iter().position(|c| c.id() == id)?;
        Some(channels.remove(pos))
    }

    pub fn processing_handler(&self) -> Option<HandlerRef> {
        self.processing_handler.read().clone()
    }

    /// Replaces (or clears) the root handler and re-resolves every workflow.
    pub fn set_processing_handler(&self, handler: Option<HandlerRef>) {
        *self.processing_handler.write() = handler;
        self.prepare();
    }

    pub fn connection_handler(&self) -> Option<ConnectionHandlerRef> {
        self.connection_handler.read().clone()
    }

    pub fn set_connection_handler(&self, handler: Option<ConnectionHandlerRef>) {
        *self.connection_handler.write() = handler;
        self.prepare();
    }

    /// Starts everything, waits for a termination signal, then shuts down gracefully.
    pub async fn run(&self) -> Result<(), RuntimeError> {
        self.request_start().await?;
        tracing::info!(adapter = %self.id, channels = self.channels.read().len(), "adapter started");

        let signal = shutdown::wait_for_shutdown_signal().await?;
        tracing::info!(adapter = %self.id, signal = signal.as_str(), "shutdown signal received");
        self.bus
            .publish(Event::new(EventKind::ShutdownRequested).with_reason(signal.as_str()));
        self.shutdown().await
    }

    /// Closes everything within [`AdapterConfig::shutdown_grace`].
    ///
    /// When the grace runs out the close cascade is abandoned where it stands: components
    /// already closed stay closed, the rest keep their last recorded state (a parent whose
    /// children are half closed still reports `Started`). Each of them is logged with that
    /// state and named in [`RuntimeError::GraceExceeded`]. A later `request_close` resumes
    /// from there.
    pub async fn shutdown(&self) -> Result<(), RuntimeError> {
        let grace = self.cfg.shutdown_grace;
        match tokio::time::timeout(grace, self.request_close()).await {
            Ok(res) => {
                res?;
                self.bus.publish(Event::new(EventKind::AllStoppedWithin));
                Ok(())
            }
            Err(_) => {
                self.bus.publish(Event::new(EventKind::GraceExceeded));
                let stuck = self.stuck().await;
                tracing::error!(adapter = %self.id, ?grace, ?stuck, "shutdown grace exceeded");
                Err(RuntimeError::GraceExceeded { grace, stuck })
            }
        }
    }

    /// Components not yet closed: tracked via events, plus the tree itself.
    async fn stuck(&self) -> Vec<String> {
        let mut stuck = self.tracker.not_closed().await;
        let mut tree: Vec<(Arc<str>, ComponentState)> = vec![(self.name(), self.state())];
        for channel in self.channels() {
            tree.push((channel.name(), channel.state()));
            for workflow in channel.workflows() {
                tree.push((workflow.name(), workflow.state()));
            }
        }
        for conn in self.directory.connections() {
            tree.push((conn.name(), conn.state()));
        }
        for (name, state) in tree.iter().filter(|(_, s)| *s != ComponentState::Closed) {
            tracing::warn!(adapter = %self.id, component = %name, %state, "left unclosed by shutdown");
            stuck.push(name.to_string());
        }
        stuck.sort();
        stuck.dedup();
        stuck
    }

    fn root_scope(&self) -> RootScope {
        RootScope {
            processing: self.processing_handler(),
            connection: self.connection_handler(),
            bus: Some(self.bus.clone()),
        }
    }

    /// Pushes the root scope into every channel and the shared connections.
    ///
    /// Runs on every init; call it directly to re-resolve after reconfiguring.
    pub fn prepare(&self) {
        let root = self.root_scope();
        if let Some(handler) = &root.processing {
            handler.attach_bus(self.bus.clone());
        }
        for conn in self.directory.connections() {
            conn.attach_bus(self.bus.clone());
            conn.resolve_handler(None, root.connection.as_ref());
        }
        for channel in self.channels() {
            channel.bind_root(root.clone());
        }
    }

    async fn release_shared(&self, transition: Transition) {
        for conn in self.directory.connections() {
            if let Err(e) = conn.request(transition).await {
                tracing::warn!(adapter = %self.id, connection = conn.id(), error = %e, "shared connection failed to {transition}");
            }
        }
        if let Some(handler) = self.processing_handler() {
            if let Err(e) = handler.request(transition).await {
                tracing::warn!(adapter = %self.id, error = %e, "root handler failed to {transition}");
            }
        }
    }
}

impl Drop for Adapter {
    fn drop(&mut self) {
        self.listener.abort();
    }
}

/// Forwards bus events to the subscriber set.
fn spawn_listener(bus: &Bus, subs: Arc<SubscriberSet>) -> JoinHandle<()> {
    let mut rx = bus.subscribe();
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(ev) => subs.emit(&ev),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "event listener lagged; events dropped");
                }
                Err(broadcast::error::RecvError::Closed) => return,
            }
        }
    })
}

struct AdapterHooks<'a>(&'a Adapter);

#[async_trait]
impl<'a> Lifecycle for AdapterHooks<'a> {
    async fn init(&self) -> anyhow::Result<()> {
        self.0.prepare();
        if let Some(handler) = self.0.processing_handler() {
            handler.request_init().await?;
        }
        Ok(())
    }

    async fn start(&self) -> anyhow::Result<()> {
        if let Some(handler) = self.0.processing_handler() {
            handler.request_start().await?;
        }
        Ok(())
    }

    async fn stop(&self) -> anyhow::Result<()> {
        self.0.release_shared(Transition::Stop).await;
        Ok(())
    }

    async fn close(&self) -> anyhow::Result<()> {
        self.0.release_shared(Transition::Close).await;
        Ok(())
    }
}

#[async_trait]
impl Component for Adapter {
    fn name(&self) -> Arc<str> {
        self.guard.name()
    }

    fn state(&self) -> ComponentState {
        self.guard.state()
    }

    async fn request(&self, transition: Transition) -> Result<ComponentState, LifecycleError> {
        let channels = self.channels();
        request_container(&self.guard, &AdapterHooks(self), self.cfg.strategy, &channels, transition)
            .await
    }
}
