//! # Processing step contract.
//!
//! A [`Step`] transforms a message in place. Steps are lifecycle-managed through the chain
//! that holds them: the chain's `init`/`start` run every step's hooks in order, and its
//! `stop`/`close` run them in reverse.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::ProcessingError;
use crate::lifecycle::Lifecycle;
use crate::message::Message;

/// Shared handle to a step.
pub type StepRef = Arc<dyn Step>;

/// One unit of message processing.
///
/// # Example
/// ```rust
/// use async_trait::async_trait;
/// use flowvisor::{Lifecycle, Message, ProcessingError, Step};
///
/// struct Upper;
///
/// impl Lifecycle for Upper {}
///
/// #[async_trait]
/// impl Step for Upper {
///     fn name(&self) -> &str {
///         "upper"
///     }
///
///     async fn process(&self, msg: &mut Message) -> Result<(), ProcessingError> {
///         let text = msg
///             .payload_str()
///             .ok_or_else(|| ProcessingError::step("upper", "payload is not utf-8"))?
///             .to_uppercase();
///         msg.set_payload(text);
///         Ok(())
///     }
/// }
/// ```
#[async_trait]
pub trait Step: Lifecycle {
    /// Name recorded in step-event markers and errors.
    fn name(&self) -> &str;

    /// Processes `msg` in place.
    async fn process(&self, msg: &mut Message) -> Result<(), ProcessingError>;
}
