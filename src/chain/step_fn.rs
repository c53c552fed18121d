//! # Closure-backed step (`StepFn`).
//!
//! [`StepFn`] wraps `F: Fn(Message) -> Fut`. The closure receives an owned copy of the
//! message and returns the processed one; on error the caller's message is left untouched.
//! Lifecycle hooks are no-ops.
//!
//! ## Example
//! ```rust
//! use flowvisor::{Message, ProcessingError, StepFn, StepRef};
//!
//! let step: StepRef = StepFn::arc("tag", |mut msg: Message| async move {
//!     msg.set_metadata("tagged", "yes");
//!     Ok::<_, ProcessingError>(msg)
//! });
//! assert_eq!(step.name(), "tag");
//! ```

use std::borrow::Cow;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;

use super::step::Step;
use crate::error::ProcessingError;
use crate::lifecycle::Lifecycle;
use crate::message::Message;

/// Function-backed step.
pub struct StepFn<F> {
    name: Cow<'static, str>,
    f: F,
}

impl<F> StepFn<F> {
    pub fn new(name: impl Into<Cow<'static, str>>, f: F) -> Self {
        Self {
            name: name.into(),
            f,
        }
    }

    /// Creates the step as a shared handle.
    pub fn arc(name: impl Into<Cow<'static, str>>, f: F) -> Arc<Self> {
        Arc::new(Self::new(name, f))
    }
}

impl<F: Send + Sync> Lifecycle for StepFn<F> {}

#[async_trait]
impl<F, Fut> Step for StepFn<F>
where
    F: Fn(Message) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Message, ProcessingError>> + Send + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn process(&self, msg: &mut Message) -> Result<(), ProcessingError> {
        *msg = (self.f)(msg.clone()).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn failure_leaves_message_untouched() {
        let step = StepFn::new("reject", |_msg: Message| async {
            Err::<Message, _>(ProcessingError::step("reject", "nope"))
        });
        let mut msg = Message::new("body");
        msg.set_metadata("k", "v");

        assert!(step.process(&mut msg).await.is_err());
        assert_eq!(msg.payload(), b"body");
        assert_eq!(msg.metadata("k"), Some("v"));
    }

    #[tokio::test]
    async fn success_replaces_message() {
        let step = StepFn::new("rewrite", |mut msg: Message| async move {
            msg.set_payload("rewritten");
            Ok::<_, ProcessingError>(msg)
        });
        let mut msg = Message::new("body");
        step.process(&mut msg).await.unwrap();
        assert_eq!(msg.payload(), b"rewritten");
    }
}
