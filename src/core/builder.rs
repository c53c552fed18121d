use std::sync::Arc;

use super::adapter::{Adapter, AdapterParts};
use super::channel::Channel;
use crate::config::AdapterConfig;
use crate::connection::{Connection, Directory};
use crate::error::{ConfigError, validate_id};
use crate::events::Bus;
use crate::handlers::{ConnectionHandlerRef, HandlerRef};
use crate::subscribers::{StateTracker, Subscribe, SubscriberSet};

/// Builder for [`Adapter`].
///
/// Shared connections are registered with [`shared_connection`](Self::shared_connection);
/// channels refer to them through proxies created from [`directory`](Self::directory):
///
/// ```rust
/// # use std::sync::Arc;
/// # use flowvisor::{Adapter, Channel, Connection, ConnectionRef, Lifecycle, Transport};
/// # struct Broker;
/// # impl Lifecycle for Broker {}
/// # impl Transport for Broker {}
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let builder = Adapter::builder("billing");
/// let broker = ConnectionRef::shared("broker", &builder.directory());
/// let channel = Channel::builder("invoices").connection(broker).build()?;
///
/// let adapter = builder
///     .shared_connection(Connection::new("broker", Arc::new(Broker))?)
///     .channel(channel)
///     .build()?;
/// assert_eq!(adapter.directory().names(), vec!["broker".to_string()]);
/// # Ok(())
/// # }
/// ```
pub struct AdapterBuilder {
    id: String,
    cfg: AdapterConfig,
    directory: Directory,
    subscribers: Vec<Arc<dyn Subscribe>>,
    channels: Vec<Arc<Channel>>,
    connections: Vec<Arc<Connection>>,
    processing_handler: Option<HandlerRef>,
    connection_handler: Option<ConnectionHandlerRef>,
}

impl AdapterBuilder {
    pub(super) fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            cfg: AdapterConfig::default(),
            directory: Directory::new(),
            subscribers: Vec::new(),
            channels: Vec::new(),
            connections: Vec::new(),
            processing_handler: None,
            connection_handler: None,
        }
    }

    pub fn config(mut self, cfg: AdapterConfig) -> Self {
        self.cfg = cfg;
        self
    }

    /// The directory shared connections will be registered in.
    pub fn directory(&self) -> Directory {
        self.directory.clone()
    }

    /// Adds an event subscriber.
    pub fn subscriber(mut self, subscriber: Arc<dyn Subscribe>) -> Self {
        self.subscribers.push(subscriber);
        self
    }

    pub fn channel(mut self, channel: Arc<Channel>) -> Self {
        self.channels.push(channel);
        self
    }

    /// Registers a connection in the directory under its id.
    pub fn shared_connection(mut self, connection: Arc<Connection>) -> Self {
        self.connections.push(connection);
        self
    }

    /// Handler of last resort for failed messages.
    pub fn processing_handler(mut self, handler: HandlerRef) -> Self {
        self.processing_handler = Some(handler);
        self
    }

    /// Handler of last resort for connection failures.
    pub fn connection_handler(mut self, handler: ConnectionHandlerRef) -> Self {
        self.connection_handler = Some(handler);
        self
    }

    /// Builds the adapter and starts its event plumbing.
    ///
    /// Must be called inside a tokio runtime.
    pub fn build(self) -> Result<Arc<Adapter>, ConfigError> {
        let id = validate_id("adapter id", self.id)?;
        for connection in self.connections {
            self.directory.add_connection(connection)?;
        }

        let bus = Bus::new(self.cfg.bus_capacity.max(1));
        let tracker = Arc::new(StateTracker::new());
        let mut subscribers = self.subscribers;
        subscribers.push(tracker.clone());
        let subs = Arc::new(SubscriberSet::new(subscribers, bus.clone()));

        let adapter = Arc::new(Adapter::from_parts(AdapterParts {
            id,
            cfg: self.cfg,
            directory: self.directory,
            processing_handler: self.processing_handler,
            connection_handler: self.connection_handler,
            bus,
            subs,
            tracker,
        }));
        for channel in self.channels {
            adapter.add_channel(channel)?;
        }
        adapter.prepare();
        Ok(adapter)
    }
}
