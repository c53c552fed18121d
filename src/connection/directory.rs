//! Named registry of shared connections.

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::RwLock;

use super::Connection;
use crate::error::{ConfigError, ConnectionError};

/// Shared-connection lookup scoped to one adapter.
///
/// Cloning yields another handle to the same registry.
#[derive(Clone, Default)]
pub struct Directory {
    entries: Arc<RwLock<BTreeMap<String, Arc<Connection>>>>,
}

impl Directory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `connection` under its id; duplicate ids are rejected.
    pub fn add_connection(&self, connection: Arc<Connection>) -> Result<(), ConfigError> {
        let mut entries = self.entries.write();
        if entries.contains_key(connection.id()) {
            return Err(ConfigError::DuplicateId {
                what: "shared connection",
                id: connection.id().to_string(),
            });
        }
        entries.insert(connection.id().to_string(), connection);
        Ok(())
    }

    pub fn remove_connection(&self, name: &str) -> Option<Arc<Connection>> {
        self.entries.write().remove(name)
    }

    /// Looks up a connection by name.
    pub fn resolve(&self, name: &str) -> Result<Arc<Connection>, ConnectionError> {
        self.entries
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| ConnectionError::NotFound {
                name: name.to_string(),
            })
    }

    /// Registered connections in name order.
    pub fn connections(&self) -> Vec<Arc<Connection>> {
        self.entries.read().values().cloned().collect()
    }

    pub fn names(&self) -> Vec<String> {
        self.entries.read().keys().cloned().collect()
    }
}
