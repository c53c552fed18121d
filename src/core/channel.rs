//! # Channel: a container of workflows sharing connections and a handler scope.
//!
//! ```text
//! Adapter ─► Channel ─┬─► Workflow (cascade target)
//!                     ├─► Workflow
//!                     └─ connections: ConnectionRef (direct or shared), registered as dependent
//! ```
//!
//! ## Lifecycle
//! - **init**: prepare (handler compatibility, resolution, workflow binding), own handler,
//!   attach connections; then cascade into workflows.
//! - **start**: start connections and handler, mark available; then cascade.
//! - **stop/close**: cascade first; then mark unavailable, stop (direct) connections and
//!   the handler. Close also deregisters from every connection.
//!
//! Every request reaches every workflow, even when the channel itself is already at
//! target, so a workflow closed on its own is brought back by the next channel request.

use std::sync::{Arc, Weak};

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::connection::{Connection, ConnectionRef, DependentId};
use crate::error::{ConfigError, LifecycleError, validate_id};
use crate::events::Bus;
use crate::handlers::{ConnectionHandlerRef, HandlerRef, compatible};
use crate::lifecycle::{
    Component, ComponentState, Lifecycle, LifecycleGuard, LifecycleStrategy, Transition,
    request_container,
};
use crate::workflow::{Availability, Binding, Workflow};

/// Settings inherited from the adapter.
#[derive(Clone, Default)]
pub(crate) struct RootScope {
    pub(crate) processing: Option<HandlerRef>,
    pub(crate) connection: Option<ConnectionHandlerRef>,
    pub(crate) bus: Option<Bus>,
}

/// Container of workflows.
pub struct Channel {
    me: Weak<Channel>,
    id: String,
    guard: LifecycleGuard,
    dependent_id: DependentId,
    strategy: LifecycleStrategy,
    workflows: RwLock<Vec<Arc<Workflow>>>,
    connections: Vec<ConnectionRef>,
    processing_handler: RwLock<Option<HandlerRef>>,
    connection_handler: RwLock<Option<ConnectionHandlerRef>>,
    root: RwLock<RootScope>,
    availability: Arc<Availability>,
}

impl Channel {
    /// Starts building a channel with unique id `id`.
    pub fn builder(id: impl Into<String>) -> ChannelBuilder {
        ChannelBuilder::new(id)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Identity under which this channel registers with its connections.
    pub fn dependent_id(&self) -> DependentId {
        self.dependent_id
    }

    pub fn strategy(&self) -> LifecycleStrategy {
        self.strategy
    }

    /// True while started.
    pub fn is_available(&self) -> bool {
        self.availability.is_available()
    }

    pub fn workflows(&self) -> Vec<Arc<Workflow>> {
        self.workflows.read().clone()
    }

    /// Looks up a workflow by its id (unique or composite).
    pub fn workflow(&self, id: &str) -> Option<Arc<Workflow>> {
        self.workflows
            .read()
            .iter()
            .find(|w| w.workflow_id() == id)
            .cloned()
    }

    /// Adds a workflow; a workflow with the same unique id is rejected.
    ///
    /// The workflow is bound immediately but only initialised by the next channel request.
    pub fn add_workflow(&self, workflow: Arc<Workflow>) -> Result<(), ConfigError> {
        {
            let mut workflows = self.workflows.write();
            let duplicate = workflows.iter().any(|w| {
                Arc::ptr_eq(w, &workflow)
                    || matches!((w.unique_id(), workflow.unique_id()), (Some(a), Some(b)) if a == b)
            });
            if duplicate {
                return Err(ConfigError::DuplicateId {
                    what: "workflow",
                    id: workflow.workflow_id(),
                });
            }
            workflows.push(Arc::clone(&workflow));
        }
        self.bind_workflow(&workflow);
        Ok(())
    }

    /// Removes a workflow by id without changing its state.
    pub fn remove_workflow(&self, id: &str) -> Option<Arc<Workflow>> {
        let mut workflows = self.workflows.write();
        let pos = workflows.iter().position(|w| w.workflow_id() == id)?;
        Some(workflows.remove(pos))
    }

    pub fn connections(&self) -> &[ConnectionRef] {
        &self.connections
    }

    pub fn processing_handler(&self) -> Option<HandlerRef> {
        self.processing_handler.read().clone()
    }

    /// Replaces (or clears) the channel-scope handler and re-resolves every workflow.
    pub fn set_processing_handler(&self, handler: Option<HandlerRef>) {
        *self.processing_handler.write() = handler;
        self.bind_all();
    }

    pub fn connection_handler(&self) -> Option<ConnectionHandlerRef> {
        self.connection_handler.read().clone()
    }

    pub fn set_connection_handler(&self, handler: Option<ConnectionHandlerRef>) {
        *self.connection_handler.write() = handler;
    }

    pub(crate) fn bind_root(&self, root: RootScope) {
        if let Some(bus) = &root.bus {
            self.guard.attach_bus(bus.clone());
            if let Some(handler) = self.processing_handler.read().as_ref() {
                handler.attach_bus(bus.clone());
            }
            for conn in &self.connections {
                if let ConnectionRef::Direct(c) = conn {
                    c.attach_bus(bus.clone());
                }
            }
        }
        *self.root.write() = root;
        self.bind_all();
    }

    fn binding(&self) -> Binding {
        let root = self.root.read();
        Binding {
            channel_id: Some(self.id.clone()),
            channel: Some(self.me.clone() as Weak<dyn Component>),
            availability: Arc::clone(&self.availability),
            inherited: vec![self.processing_handler(), root.processing.clone()],
            bus: root.bus.clone(),
        }
    }

    fn bind_workflow(&self, workflow: &Workflow) {
        workflow.bind(self.binding());
        workflow.prepare();
    }

    fn bind_all(&self) {
        for workflow in self.workflows() {
            self.bind_workflow(&workflow);
        }
    }

    /// Validates connection handlers, resolves them, and binds every workflow.
    ///
    /// Fails when two equivalent connections carry incompatible error handlers.
    pub fn prepare(&self) -> Result<(), ConfigError> {
        let mut resolved = Vec::with_capacity(self.connections.len());
        for conn in &self.connections {
            resolved.push((conn.is_shared(), conn.connection()?));
        }
        check_compatibility(&resolved)?;

        let channel = self.connection_handler();
        let root = self.root.read().connection.clone();
        for (shared, conn) in &resolved {
            // Shared connections resolve against the adapter only.
            let scope = if *shared { None } else { channel.as_ref() };
            conn.resolve_handler(scope, root.as_ref());
        }
        self.bind_all();
        Ok(())
    }

    async fn release_handler(&self, transition: Transition) {
        let Some(handler) = self.processing_handler() else { return };
        if let Err(e) = handler.request(transition).await {
            tracing::warn!(channel = %self.id, error = %e, "channel handler failed to {transition}");
        }
    }
}

fn check_compatibility(conns: &[(bool, Arc<Connection>)]) -> Result<(), ConfigError> {
    for (i, (_, a)) in conns.iter().enumerate() {
        for (_, b) in &conns[i + 1..] {
            if Arc::ptr_eq(a, b) || !a.connection_equals(b) {
                continue;
            }
            let (Some(ha), Some(hb)) = (a.error_handler(), b.error_handler()) else {
                continue;
            };
            if !Arc::ptr_eq(&ha, &hb) && !compatible(ha.as_ref(), hb.as_ref()) {
                return Err(ConfigError::IncompatibleHandlers {
                    first: a.id().to_string(),
                    second: b.id().to_string(),
                    first_handler: ha.kind(),
                    second_handler: hb.kind(),
                });
            }
        }
    }
    Ok(())
}

/// The channel's own hooks, run by the container request under its guard.
struct ChannelHooks<'a>(&'a Channel);

#[async_trait]
impl<'a> Lifecycle for ChannelHooks<'a> {
    async fn init(&self) -> anyhow::Result<()> {
        let ch = self.0;
        ch.prepare()?;
        if let Some(handler) = ch.processing_handler() {
            handler.request_init().await?;
        }
        let owner: Weak<dyn Component> = ch.me.clone();
        for conn in &ch.connections {
            conn.attach(ch.dependent_id, owner.clone()).await?;
        }
        Ok(())
    }

    async fn start(&self) -> anyhow::Result<()> {
        let ch = self.0;
        for conn in &ch.connections {
            conn.start().await?;
        }
        if let Some(handler) = ch.processing_handler() {
            handler.request_start().await?;
        }
        ch.availability.set(true);
        Ok(())
    }

    async fn stop(&self) -> anyhow::Result<()> {
        let ch = self.0;
        ch.availability.set(false);
        for conn in &ch.connections {
            if let Err(e) = conn.stop().await {
                tracing::warn!(channel = %ch.id, error = %e, "connection failed to stop");
            }
        }
        ch.release_handler(Transition::Stop).await;
        Ok(())
    }

    async fn close(&self) -> anyhow::Result<()> {
        let ch = self.0;
        ch.availability.set(false);
        ch.release_handler(Transition::Close).await;
        for conn in &ch.connections {
            if let Err(e) = conn.detach(ch.dependent_id).await {
                tracing::warn!(channel = %ch.id, error = %e, "connection failed to close");
            }
        }
        Ok(())
    }
}

#[async_trait]
impl Component for Channel {
    fn name(&self) -> Arc<str> {
        self.guard.name()
    }

    fn state(&self) -> ComponentState {
        self.guard.state()
    }

    async fn request(&self, transition: Transition) -> Result<ComponentState, LifecycleError> {
        let workflows = self.workflows();
        request_container(&self.guard, &ChannelHooks(self), self.strategy, &workflows, transition).await
    }
}

/// Builder for [`Channel`].
pub struct ChannelBuilder {
    id: String,
    strategy: LifecycleStrategy,
    workflows: Vec<Arc<Workflow>>,
    connections: Vec<ConnectionRef>,
    processing_handler: Option<HandlerRef>,
    connection_handler: Option<ConnectionHandlerRef>,
}

impl ChannelBuilder {
    fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            strategy: LifecycleStrategy::Blocking,
            workflows: Vec::new(),
            connections: Vec::new(),
            processing_handler: None,
            connection_handler: None,
        }
    }

    /// How requests cascade into the workflows.
    pub fn strategy(mut self, strategy: LifecycleStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn workflow(mut self, workflow: Arc<Workflow>) -> Self {
        self.workflows.push(workflow);
        self
    }

    /// Adds a connection the channel depends on.
    pub fn connection(mut self, connection: impl Into<ConnectionRef>) -> Self {
        self.connections.push(connection.into());
        self
    }

    /// Handler for failed messages of workflows without their own.
    pub fn processing_handler(mut self, handler: HandlerRef) -> Self {
        self.processing_handler = Some(handler);
        self
    }

    /// Handler for direct connections without their own.
    pub fn connection_handler(mut self, handler: ConnectionHandlerRef) -> Self {
        self.connection_handler = Some(handler);
        self
    }

    pub fn build(self) -> Result<Arc<Channel>, ConfigError> {
        let id = validate_id("channel id", self.id)?;
        let channel = Arc::new_cyclic(|me| Channel {
            me: me.clone(),
            guard: LifecycleGuard::new(id.as_str()),
            id,
            dependent_id: DependentId::next(),
            strategy: self.strategy,
            workflows: RwLock::new(Vec::new()),
            connections: self.connections,
            processing_handler: RwLock::new(self.processing_handler),
            connection_handler: RwLock::new(self.connection_handler),
            root: RwLock::new(RootScope::default()),
            availability: Arc::new(Availability::new()),
        });
        for workflow in self.workflows {
            channel.add_workflow(workflow)?;
        }
        Ok(channel)
    }
}
