//! # Connections and their dependents.
//!
//! A [`Connection`] wraps a [`Transport`] under its own lifecycle guard and keeps a table of
//! dependents: components (channels) that must be recovered when the transport breaks.
//!
//! ```text
//! Connection
//!   ├─ transport: Arc<dyn Transport>
//!   ├─ dependents: DependentId → Weak<dyn Component>   (registered at init, removed at close)
//!   └─ effective ConnectionErrorHandler (own → channel → root → Null)
//! ```
//!
//! Dependents are held weakly and by opaque id; the connection never owns them.
//!
//! - [`Directory`] named registry of shared connections, scoped to one adapter
//! - [`SharedConnection`] non-owning proxy resolved by name
//! - [`ConnectionRef`] what a channel holds: a direct connection or a shared proxy

mod directory;
mod shared;

use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};

pub use directory::Directory;
pub use shared::{ConnectionRef, SharedConnection};

use crate::endpoints::Transport;
use crate::error::{ConfigError, ConnectionError, validate_id};
use crate::events::{Bus, Event, EventKind, publish_to};
use crate::handlers::{ConnectionHandlerRef, resolve_connection_handler};
use crate::lifecycle::{Component, Guarded, Lifecycle, LifecycleGuard};

static NEXT_DEPENDENT: AtomicU64 = AtomicU64::new(1);

/// Opaque identity under which a component registers with connections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DependentId(u64);

impl DependentId {
    /// Allocates a process-unique id.
    pub fn next() -> Self {
        Self(NEXT_DEPENDENT.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for DependentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "dependent-{}", self.0)
    }
}

/// A lifecycle-managed transport plus the components that depend on it.
pub struct Connection {
    me: Weak<Connection>,
    id: String,
    guard: LifecycleGuard,
    transport: Arc<dyn Transport>,
    handler: RwLock<Option<ConnectionHandlerRef>>,
    effective: RwLock<Option<ConnectionHandlerRef>>,
    dependents: Mutex<BTreeMap<DependentId, Weak<dyn Component>>>,
}

impl Connection {
    /// Creates a connection with unique id `id`.
    pub fn new(id: impl Into<String>, transport: Arc<dyn Transport>) -> Result<Arc<Self>, ConfigError> {
        let id = validate_id("connection id", id)?;
        Ok(Arc::new_cyclic(|me| Self {
            me: me.clone(),
            guard: LifecycleGuard::new(id.as_str()),
            id,
            transport,
            handler: RwLock::new(None),
            effective: RwLock::new(None),
            dependents: Mutex::new(BTreeMap::new()),
        }))
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Endpoint key of the transport, if it exposes one.
    pub fn endpoint(&self) -> Option<String> {
        self.transport.endpoint()
    }

    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    /// Sets (or clears) the connection's own error handler.
    pub fn set_error_handler(&self, handler: Option<ConnectionHandlerRef>) {
        *self.handler.write() = handler;
    }

    /// Builder-style [`set_error_handler`](Self::set_error_handler).
    pub fn with_error_handler(self: Arc<Self>, handler: ConnectionHandlerRef) -> Arc<Self> {
        self.set_error_handler(Some(handler));
        self
    }

    /// The connection's own handler, if configured.
    pub fn error_handler(&self) -> Option<ConnectionHandlerRef> {
        self.handler.read().clone()
    }

    /// The handler [`handle_connection_failure`](Self::handle_connection_failure) uses.
    pub fn effective_handler(&self) -> ConnectionHandlerRef {
        if let Some(h) = self.effective.read().clone() {
            return h;
        }
        resolve_connection_handler(self.handler.read().as_ref(), None, None)
    }

    /// Re-resolves the effective handler against the enclosing scopes.
    pub(crate) fn resolve_handler(
        &self,
        channel: Option<&ConnectionHandlerRef>,
        root: Option<&ConnectionHandlerRef>,
    ) -> ConnectionHandlerRef {
        let resolved = resolve_connection_handler(self.handler.read().as_ref(), channel, root);
        *self.effective.write() = Some(Arc::clone(&resolved));
        resolved
    }

    /// Same instance, or both transports report the same endpoint key.
    pub fn connection_equals(&self, other: &Connection) -> bool {
        if std::ptr::eq(self, other) {
            return true;
        }
        matches!((self.endpoint(), other.endpoint()), (Some(a), Some(b)) if a == b)
    }

    /// Registers `dependent` under `id`; re-registering replaces the handle.
    pub fn add_dependent(&self, id: DependentId, dependent: Weak<dyn Component>) {
        self.dependents.lock().insert(id, dependent);
    }

    pub fn remove_dependent(&self, id: DependentId) {
        self.dependents.lock().remove(&id);
    }

    /// Live dependents in registration-id order; dead handles are pruned.
    pub fn dependents(&self) -> Vec<Arc<dyn Component>> {
        let mut table = self.dependents.lock();
        table.retain(|_, weak| weak.strong_count() > 0);
        table.values().filter_map(Weak::upgrade).collect()
    }

    pub fn attach_bus(&self, bus: Bus) {
        self.guard.attach_bus(bus);
    }

    pub(crate) fn bus(&self) -> Option<Bus> {
        self.guard.bus()
    }

    /// Runs the effective handler against this connection.
    ///
    /// Never call this from inside a dependent's lifecycle hook; use
    /// [`notify_failure`](Self::notify_failure).
    pub async fn handle_connection_failure(&self) -> Result<(), ConnectionError> {
        let handler = self.effective_handler();
        tracing::warn!(connection = %self.id, handler = handler.kind(), "connection failure reported");
        publish_to(&self.bus(), || {
            Event::new(EventKind::ConnectionFailed)
                .with_component(self.id.as_str())
                .with_reason(handler.kind())
        });

        let res = handler.handle_connection_failure(self).await;
        if let Err(e) = &res {
            tracing::error!(connection = %self.id, error = %e, label = e.as_label(), "connection recovery failed");
        }
        res
    }

    /// Detached [`handle_connection_failure`](Self::handle_connection_failure) for transport
    /// callbacks.
    pub fn notify_failure(&self) {
        let Some(me) = self.me.upgrade() else {
            return;
        };
        tokio::spawn(async move {
            let _ = me.handle_connection_failure().await;
        });
    }
}

#[async_trait]
impl Lifecycle for Connection {
    async fn init(&self) -> anyhow::Result<()> {
        self.transport.init().await
    }

    async fn start(&self) -> anyhow::Result<()> {
        self.transport.start().await
    }

    async fn stop(&self) -> anyhow::Result<()> {
        self.transport.stop().await
    }

    async fn close(&self) -> anyhow::Result<()> {
        self.transport.close().await
    }

    fn is_enabled(&self) -> bool {
        self.transport.is_enabled()
    }
}

impl Guarded for Connection {
    fn guard(&self) -> &LifecycleGuard {
        &self.guard
    }
}
