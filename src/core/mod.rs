//! Runtime core: the containers above workflows.
//!
//! - [`Adapter`] root container: channels, shared-connection directory, root handlers,
//!   event plumbing and graceful shutdown
//! - [`Channel`] container of workflows and their connections
//! - `shutdown`: cross-platform termination signal handling

mod adapter;
mod builder;
mod channel;
mod shutdown;

pub use adapter::Adapter;
pub use builder::AdapterBuilder;
pub use channel::{Channel, ChannelBuilder};
