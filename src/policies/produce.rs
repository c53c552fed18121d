//! # Produce-failure policy.
//!
//! Decides what a workflow restarts when a producer fails. The message itself is always
//! routed to the processing exception handler first; the restart runs on a detached task
//! so it never waits on the in-flight message that triggered it.
//!
//! ```text
//! None             → nothing restarted (default)
//! RestartWorkflow  → request_restart on the failing workflow
//! RestartChannel   → request_restart on the owning channel
//! ```

/// Restart policy applied after a `ProduceError`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ProduceFailurePolicy {
    /// Leave components running.
    #[default]
    None,
    /// Restart the workflow whose producer failed.
    RestartWorkflow,
    /// Restart the channel owning that workflow.
    RestartChannel,
}

impl ProduceFailurePolicy {
    /// Stable label for logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            ProduceFailurePolicy::None => "none",
            ProduceFailurePolicy::RestartWorkflow => "restart_workflow",
            ProduceFailurePolicy::RestartChannel => "restart_channel",
        }
    }
}
