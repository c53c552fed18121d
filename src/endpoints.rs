//! # Transport-facing contracts.
//!
//! Transport implementations live outside this crate; only their contracts are modelled.
//!
//! - [`Consumer`] receives messages and pushes them into a [`MessageListener`].
//! - [`Producer`] delivers messages, optionally as request/reply.
//! - [`Transport`] is the connection-level resource a [`Connection`](crate::Connection) wraps.

use std::sync::{Arc, Weak};
use std::time::Duration;

use async_trait::async_trait;

use crate::error::ProduceError;
use crate::lifecycle::Lifecycle;
use crate::message::Message;

/// Receives inbound messages; implemented by workflows.
#[async_trait]
pub trait MessageListener: Send + Sync {
    /// Intake for one message. Processing and produce failures never escape this call.
    async fn on_message(&self, msg: Message);
}

/// Source of inbound messages.
///
/// The workflow registers itself as listener before `init`; consumers hold it weakly and
/// call [`MessageListener::on_message`] for every received message while started.
pub trait Consumer: Lifecycle {
    /// Destination name, used in the composite workflow id.
    fn name(&self) -> &str;

    /// Attaches the workflow that receives consumed messages.
    fn register_listener(&self, _listener: Weak<dyn MessageListener>) {}
}

/// Destination for processed messages.
#[async_trait]
pub trait Producer: Lifecycle {
    /// Destination name, used in the composite workflow id.
    fn name(&self) -> &str;

    /// Delivers `msg`.
    async fn produce(&self, msg: &Message) -> Result<(), ProduceError>;

    /// Sends `msg` and waits up to `timeout` for a reply.
    async fn request(&self, _msg: &Message, _timeout: Duration) -> Result<Message, ProduceError> {
        Err(ProduceError::Unsupported {
            producer: self.name().to_string(),
        })
    }
}

/// Underlying resource of a connection (broker session, socket pool, ...).
pub trait Transport: Lifecycle {
    /// Key identifying the remote endpoint; two connections with the same key are
    /// considered equivalent.
    fn endpoint(&self) -> Option<String> {
        None
    }
}

pub type ConsumerRef = Arc<dyn Consumer>;
pub type ProducerRef = Arc<dyn Producer>;
