//! # Shared connection proxy.
//!
//! [`SharedConnection`] names a connection in a [`Directory`] and stands in for it inside
//! a channel. It never owns the connection:
//!
//! ```text
//! attach (owner init)   resolve by name ─► register owner as dependent ─► request_init
//! start                 request_start (idempotent on the real connection)
//! stop                  not forwarded
//! detach (owner close)  deregister owner; close not forwarded
//! ```
//!
//! Only the first init of the real connection acquires anything; later proxies find it
//! already initialised and merely register their owner.

use std::sync::{Arc, Weak};

use parking_lot::RwLock;

use super::{Connection, DependentId, Directory};
use crate::error::{ConfigError, LifecycleError};
use crate::lifecycle::Component;

/// Non-owning proxy for a named connection.
#[derive(Clone)]
pub struct SharedConnection {
    name: String,
    directory: Directory,
    resolved: Arc<RwLock<Option<Arc<Connection>>>>,
}

impl SharedConnection {
    pub fn new(name: impl Into<String>, directory: Directory) -> Self {
        Self {
            name: name.into(),
            directory,
            resolved: Arc::new(RwLock::new(None)),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The real connection, looked up once and cached.
    pub fn resolve(&self) -> Result<Arc<Connection>, ConfigError> {
        if let Some(conn) = self.resolved.read().clone() {
            return Ok(conn);
        }
        let conn = self
            .directory
            .resolve(&self.name)
            .map_err(|_| ConfigError::UnknownConnection {
                name: self.name.clone(),
            })?;
        *self.resolved.write() = Some(Arc::clone(&conn));
        Ok(conn)
    }
}

/// A channel's handle on a connection.
#[derive(Clone)]
pub enum ConnectionRef {
    /// Owned by the channel: every lifecycle step is forwarded.
    Direct(Arc<Connection>),
    /// Owned by the adapter's directory: only init/start are forwarded.
    Shared(SharedConnection),
}

impl ConnectionRef {
    /// Proxy for `name` in `directory`.
    pub fn shared(name: impl Into<String>, directory: &Directory) -> Self {
        ConnectionRef::Shared(SharedConnection::new(name, directory.clone()))
    }

    /// The underlying connection.
    pub fn connection(&self) -> Result<Arc<Connection>, ConfigError> {
        match self {
            ConnectionRef::Direct(c) => Ok(Arc::clone(c)),
            ConnectionRef::Shared(s) => s.resolve(),
        }
    }

    pub fn is_shared(&self) -> bool {
        matches!(self, ConnectionRef::Shared(_))
    }

    /// Initialises the connection, then registers `owner` as dependent.
    ///
    /// A connection that fails to initialise keeps no record of `owner`.
    pub(crate) async fn attach(
        &self,
        id: DependentId,
        owner: Weak<dyn Component>,
    ) -> anyhow::Result<()> {
        let conn = self.connection()?;
        conn.request_init().await?;
        conn.add_dependent(id, owner);
        Ok(())
    }

    pub(crate) async fn start(&self) -> Result<(), LifecycleError> {
        match self.connection() {
            Ok(conn) => conn.request_start().await.map(|_| ()),
            Err(e) => Err(LifecycleError::Config {
                component: self.label(),
                source: e,
            }),
        }
    }

    /// Stops a direct connection; shared connections keep running.
    pub(crate) async fn stop(&self) -> Result<(), LifecycleError> {
        match self {
            ConnectionRef::Direct(c) => c.request_stop().await.map(|_| ()),
            ConnectionRef::Shared(_) => Ok(()),
        }
    }

    /// Deregisters `owner`; closes a direct connection.
    pub(crate) async fn detach(&self, id: DependentId) -> Result<(), LifecycleError> {
        match self {
            ConnectionRef::Direct(c) => {
                c.remove_dependent(id);
                c.request_close().await.map(|_| ())
            }
            ConnectionRef::Shared(s) => {
                if let Ok(conn) = s.resolve() {
                    conn.remove_dependent(id);
                }
                Ok(())
            }
        }
    }

    fn label(&self) -> String {
        match self {
            ConnectionRef::Direct(c) => c.id().to_string(),
            ConnectionRef::Shared(s) => s.name().to_string(),
        }
    }
}

impl From<Arc<Connection>> for ConnectionRef {
    fn from(conn: Arc<Connection>) -> Self {
        ConnectionRef::Direct(conn)
    }
}

impl From<SharedConnection> for ConnectionRef {
    fn from(shared: SharedConnection) -> Self {
        ConnectionRef::Shared(shared)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use super::*;
    use crate::endpoints::Transport;
    use crate::lifecycle::{ComponentState, Lifecycle, Managed};

    #[derive(Default)]
    struct Counting {
        inits: AtomicUsize,
        closes: AtomicUsize,
    }

    #[async_trait]
    impl Lifecycle for Counting {
        async fn init(&self) -> anyhow::Result<()> {
            self.inits.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn close(&self) -> anyhow::Result<()> {
            self.closes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    impl Transport for Counting {}

    fn owner(name: &str) -> Arc<dyn Component> {
        Arc::new(Managed::new(name.to_string(), Arc::new(Counting::default())))
    }

    #[tokio::test]
    async fn proxies_init_once_and_never_close() {
        let transport = Arc::new(Counting::default());
        let directory = Directory::new();
        directory
            .add_connection(Connection::new("broker", transport.clone()).unwrap())
            .unwrap();

        let a = ConnectionRef::shared("broker", &directory);
        let b = ConnectionRef::shared("broker", &directory);
        let (owner_a, owner_b) = (owner("a"), owner("b"));
        let (id_a, id_b) = (DependentId::next(), DependentId::next());

        a.attach(id_a, Arc::downgrade(&owner_a)).await.unwrap();
        b.attach(id_b, Arc::downgrade(&owner_b)).await.unwrap();
        assert_eq!(transport.inits.load(Ordering::SeqCst), 1);

        let conn = directory.resolve("broker").unwrap();
        assert_eq!(conn.dependents().len(), 2);

        a.detach(id_a).await.unwrap();
        assert_eq!(conn.dependents().len(), 1);
        assert_eq!(transport.closes.load(Ordering::SeqCst), 0);
        assert_eq!(conn.state(), ComponentState::Initialised);
    }

    #[tokio::test]
    async fn unknown_name_is_a_config_error() {
        let proxy = ConnectionRef::shared("missing", &Directory::new());
        let err = proxy
            .attach(DependentId::next(), Arc::downgrade(&owner("x")))
            .await
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ConfigError>(),
            Some(ConfigError::UnknownConnection { .. })
        ));
    }

    struct Refusing;

    #[async_trait]
    impl Lifecycle for Refusing {
        async fn init(&self) -> anyhow::Result<()> {
            anyhow::bail!("connection refused")
        }
    }

    impl Transport for Refusing {}

    #[tokio::test]
    async fn failed_init_registers_no_dependent() {
        let conn = Connection::new("broker", Arc::new(Refusing)).unwrap();
        let direct = ConnectionRef::Direct(conn.clone());
        let owner = owner("orders");

        assert!(direct.attach(DependentId::next(), Arc::downgrade(&owner)).await.is_err());
        assert!(conn.dependents().is_empty());
        assert_eq!(conn.state(), ComponentState::Closed);
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let directory = Directory::new();
        let conn = || Connection::new("broker", Arc::new(Counting::default())).unwrap();
        directory.add_connection(conn()).unwrap();
        assert!(matches!(
            directory.add_connection(conn()),
            Err(ConfigError::DuplicateId { .. })
        ));
    }
}
