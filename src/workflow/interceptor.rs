//! Hooks around every message a workflow handles.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::WorkflowError;
use crate::lifecycle::Lifecycle;
use crate::message::Message;

/// Observes a workflow's messages; follows the workflow's lifecycle.
///
/// `workflow_end` runs after both success and failure, with the failure if any.
#[async_trait]
pub trait WorkflowInterceptor: Lifecycle {
    async fn workflow_start(&self, _msg: &Message) {}

    async fn workflow_end(&self, _msg: &Message, _error: Option<&WorkflowError>) {}
}

pub type InterceptorRef = Arc<dyn WorkflowInterceptor>;
