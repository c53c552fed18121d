//! # Connection error handlers.
//!
//! Invoked through [`Connection::handle_connection_failure`] when a transport reports that
//! its connection broke.
//!
//! | handler | action | compatible with |
//! |---|---|---|
//! | [`RestartDependents`] | restart the connection if Started, then every Started dependent | restart, null |
//! | [`CloseDependents`] | force every dependent to Closed | close, null |
//! | [`NullConnectionHandler`] | nothing | everything |
//!
//! Custom handlers are incompatible with everything except `null` unless they override
//! [`ConnectionErrorHandler::allowed_in_conjunction_with`].

use std::sync::Arc;

use async_trait::async_trait;

use crate::connection::Connection;
use crate::error::ConnectionError;
use crate::events::{Event, EventKind, publish_to};
use crate::lifecycle::{Component, ComponentState};

/// Shared handle to a connection error handler.
pub type ConnectionHandlerRef = Arc<dyn ConnectionErrorHandler>;

/// Recovery policy for a failed connection.
#[async_trait]
pub trait ConnectionErrorHandler: Send + Sync {
    /// Stable kind label.
    fn kind(&self) -> &'static str;

    /// Reacts to a failure of `connection`.
    ///
    /// Must not be awaited from inside a dependent's own lifecycle hook: restarting that
    /// dependent needs its guard. Use [`Connection::notify_failure`] there instead.
    async fn handle_connection_failure(&self, connection: &Connection) -> Result<(), ConnectionError>;

    /// Whether this handler may sit on a connection equivalent to one carrying `other`.
    fn allowed_in_conjunction_with(&self, _other: &dyn ConnectionErrorHandler) -> bool {
        false
    }
}

/// True if either handler accepts the other.
pub(crate) fn compatible(a: &dyn ConnectionErrorHandler, b: &dyn ConnectionErrorHandler) -> bool {
    a.allowed_in_conjunction_with(b) || b.allowed_in_conjunction_with(a)
}

/// Restarts the connection and every dependent that was Started when the failure hit.
#[derive(Debug, Default, Clone, Copy)]
pub struct RestartDependents;

#[async_trait]
impl ConnectionErrorHandler for RestartDependents {
    fn kind(&self) -> &'static str {
        "restart"
    }

    async fn handle_connection_failure(&self, connection: &Connection) -> Result<(), ConnectionError> {
        // Which dependents come back is decided now, before any restart moves them.
        let running: Vec<_> = connection
            .dependents()
            .into_iter()
            .filter(|d| d.state() == ComponentState::Started)
            .collect();

        if connection.state() == ComponentState::Started {
            connection.request_restart().await?;
        }

        let mut failed = Vec::new();
        for dependent in running {
            match dependent.request_restart().await {
                Ok(state) => recovered(connection, dependent.as_ref(), state),
                Err(e) => failed.push(format!("{}: {e}", dependent.name())),
            }
        }
        into_result(connection, failed)
    }

    fn allowed_in_conjunction_with(&self, other: &dyn ConnectionErrorHandler) -> bool {
        matches!(other.kind(), "restart" | "null")
    }
}

/// Closes every dependent; someone else decides when to start them again.
#[derive(Debug, Default, Clone, Copy)]
pub struct CloseDependents;

#[async_trait]
impl ConnectionErrorHandler for CloseDependents {
    fn kind(&self) -> &'static str {
        "close"
    }

    async fn handle_connection_failure(&self, connection: &Connection) -> Result<(), ConnectionError> {
        let mut failed = Vec::new();
        for dependent in connection.dependents() {
            match dependent.request_close().await {
                Ok(state) => recovered(connection, dependent.as_ref(), state),
                Err(e) => failed.push(format!("{}: {e}", dependent.name())),
            }
        }
        into_result(connection, failed)
    }

    fn allowed_in_conjunction_with(&self, other: &dyn ConnectionErrorHandler) -> bool {
        matches!(other.kind(), "close" | "null")
    }
}

/// Ignores connection failures.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullConnectionHandler;

#[async_trait]
impl ConnectionErrorHandler for NullConnectionHandler {
    fn kind(&self) -> &'static str {
        "null"
    }

    async fn handle_connection_failure(&self, connection: &Connection) -> Result<(), ConnectionError> {
        tracing::debug!(connection = connection.id(), "connection failure ignored");
        Ok(())
    }

    fn allowed_in_conjunction_with(&self, _other: &dyn ConnectionErrorHandler) -> bool {
        true
    }
}

fn recovered(connection: &Connection, dependent: &dyn Component, state: ComponentState) {
    tracing::info!(
        connection = connection.id(),
        dependent = %dependent.name(),
        %state,
        "dependent recovered after connection failure"
    );
    publish_to(&connection.bus(), || {
        Event::new(EventKind::DependentRecovered)
            .with_component(dependent.name())
            .with_state(state)
    });
}

fn into_result(connection: &Connection, failed: Vec<String>) -> Result<(), ConnectionError> {
    if failed.is_empty() {
        return Ok(());
    }
    Err(ConnectionError::RestartFailed {
        connection: connection.id().to_string(),
        failed,
    })
}
