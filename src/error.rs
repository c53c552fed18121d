//! Error types used by the flowvisor runtime, its components and user code.
//!
//! The taxonomy mirrors the places a failure can surface:
//!
//! - [`ConfigError`] — invalid configuration, raised synchronously by setters, inserts and `prepare`.
//! - [`LifecycleError`] — a lifecycle side effect failed (hook error, panic, disabled component).
//! - [`ProcessingError`] — a processing step failed.
//! - [`ProduceError`] — a producer failed (including request/reply timeouts).
//! - [`ConnectionError`] — a connection could not be resolved or its dependents could not be recovered.
//! - [`WorkflowError`] — one failed attempt to push a message through a workflow.
//! - [`RuntimeError`] — the adapter runtime itself failed (shutdown grace exceeded).
//!
//! Every enum provides `as_label` (stable snake_case for logs/metrics).
//! [`ProcessingError`] and [`ProduceError`] never escape `on_message`: the workflow
//! intercepts them and routes the original message to its exception handler.

use std::time::Duration;

use thiserror::Error;

use crate::lifecycle::Phase;

/// # Invalid configuration.
///
/// Always surfaces synchronously to whoever is configuring the component.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// An identifier was empty or whitespace-only.
    #[error("{what} must not be empty")]
    EmptyId {
        /// What kind of id was rejected (e.g. "channel id").
        what: &'static str,
    },

    /// An id-indexed collection already contains this id.
    #[error("duplicate {what} '{id}'")]
    DuplicateId {
        /// Collection kind (e.g. "workflow").
        what: &'static str,
        /// The rejected id.
        id: String,
    },

    /// Two equivalent connections carry error handlers that may not be combined.
    #[error("connections '{first}' and '{second}' are equivalent but their error handlers ({first_handler}, {second_handler}) are incompatible")]
    IncompatibleHandlers {
        /// Identity of the first connection.
        first: String,
        /// Identity of the second connection.
        second: String,
        /// Handler kind of the first connection.
        first_handler: &'static str,
        /// Handler kind of the second connection.
        second_handler: &'static str,
    },

    /// A shared connection name could not be found in the directory.
    #[error("no shared connection named '{name}'")]
    UnknownConnection {
        /// The lookup name.
        name: String,
    },

    /// A numeric setting was outside its accepted range.
    #[error("invalid value for {field}: {reason}")]
    InvalidValue {
        /// Field name.
        field: &'static str,
        /// Why the value was rejected.
        reason: String,
    },
}

impl ConfigError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            ConfigError::EmptyId { .. } => "config_empty_id",
            ConfigError::DuplicateId { .. } => "config_duplicate_id",
            ConfigError::IncompatibleHandlers { .. } => "config_incompatible_handlers",
            ConfigError::UnknownConnection { .. } => "config_unknown_connection",
            ConfigError::InvalidValue { .. } => "config_invalid_value",
        }
    }
}

/// Rejects empty ids; shared by every builder that accepts a unique id.
pub(crate) fn validate_id(what: &'static str, id: impl Into<String>) -> Result<String, ConfigError> {
    let id = id.into();
    if id.trim().is_empty() {
        return Err(ConfigError::EmptyId { what });
    }
    Ok(id)
}

/// # A lifecycle transition failed.
///
/// The component's recorded state only advanced past the steps that completed.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum LifecycleError {
    /// A side-effect hook returned an error.
    #[error("{component}: {phase} failed: {source}")]
    Hook {
        /// Component identity.
        component: String,
        /// The hook that failed.
        phase: Phase,
        /// The underlying error raised by user code or a child component.
        #[source]
        source: anyhow::Error,
    },

    /// A side-effect hook panicked.
    #[error("{component}: {phase} panicked: {message}")]
    Panicked {
        /// Component identity.
        component: String,
        /// The hook that panicked.
        phase: Phase,
        /// Panic payload rendered as text.
        message: String,
    },

    /// The entitlement gate refused initialisation.
    #[error("{component}: component is not enabled")]
    Disabled {
        /// Component identity.
        component: String,
    },

    /// `prepare` failed while initialising.
    #[error("{component}: configuration rejected: {source}")]
    Config {
        /// Component identity.
        component: String,
        /// The configuration problem.
        #[source]
        source: ConfigError,
    },
}

impl LifecycleError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            LifecycleError::Hook { .. } => "lifecycle_hook_failed",
            LifecycleError::Panicked { .. } => "lifecycle_hook_panicked",
            LifecycleError::Disabled { .. } => "lifecycle_disabled",
            LifecycleError::Config { .. } => "lifecycle_config",
        }
    }

    /// Identity of the component whose transition failed.
    pub fn component(&self) -> &str {
        match self {
            LifecycleError::Hook { component, .. }
            | LifecycleError::Panicked { component, .. }
            | LifecycleError::Disabled { component }
            | LifecycleError::Config { component, .. } => component,
        }
    }
}

/// # A processing step failed.
#[non_exhaustive]
#[derive(Error, Debug, Clone)]
pub enum ProcessingError {
    /// The step rejected or could not handle the message.
    #[error("step '{step}' failed: {reason}")]
    Step {
        /// Step name.
        step: String,
        /// Failure description.
        reason: String,
    },

    /// The step panicked.
    #[error("step '{step}' panicked: {message}")]
    Panicked {
        /// Step name.
        step: String,
        /// Panic payload rendered as text.
        message: String,
    },
}

impl ProcessingError {
    /// Convenience constructor for step failures.
    pub fn step(step: impl Into<String>, reason: impl Into<String>) -> Self {
        ProcessingError::Step {
            step: step.into(),
            reason: reason.into(),
        }
    }

    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            ProcessingError::Step { .. } => "processing_step_failed",
            ProcessingError::Panicked { .. } => "processing_step_panicked",
        }
    }
}

/// # A producer failed.
#[non_exhaustive]
#[derive(Error, Debug, Clone)]
pub enum ProduceError {
    /// Delivery to the destination failed.
    #[error("produce to '{producer}' failed: {reason}")]
    Failed {
        /// Producer name.
        producer: String,
        /// Failure description.
        reason: String,
    },

    /// No reply arrived within the configured timeout.
    #[error("no reply from '{producer}' within {timeout:?}")]
    ReplyTimeout {
        /// Producer name.
        producer: String,
        /// The timeout that elapsed.
        timeout: Duration,
    },

    /// The producer does not implement request/reply.
    #[error("producer '{producer}' does not support request/reply")]
    Unsupported {
        /// Producer name.
        producer: String,
    },
}

impl ProduceError {
    /// Convenience constructor for delivery failures.
    pub fn failed(producer: impl Into<String>, reason: impl Into<String>) -> Self {
        ProduceError::Failed {
            producer: producer.into(),
            reason: reason.into(),
        }
    }

    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            ProduceError::Failed { .. } => "produce_failed",
            ProduceError::ReplyTimeout { .. } => "produce_reply_timeout",
            ProduceError::Unsupported { .. } => "produce_unsupported",
        }
    }
}

/// # A connection failed or could not be recovered.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum ConnectionError {
    /// No connection with this name exists in the directory.
    #[error("no shared connection named '{name}'")]
    NotFound {
        /// The lookup name.
        name: String,
    },

    /// Some dependents (or the connection itself) could not be restarted or closed.
    #[error("connection '{connection}': recovery failed for {failed:?}")]
    RestartFailed {
        /// Connection identity.
        connection: String,
        /// Identities of the dependents that failed, with the reason.
        failed: Vec<String>,
    },

    /// The connection itself failed to transition.
    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),
}

impl ConnectionError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            ConnectionError::NotFound { .. } => "connection_not_found",
            ConnectionError::RestartFailed { .. } => "connection_restart_failed",
            ConnectionError::Lifecycle(_) => "connection_lifecycle",
        }
    }
}

/// # One failed attempt to push a message through a workflow.
///
/// This is what exception handlers and retry loops observe; it is never returned from
/// `on_message`.
#[non_exhaustive]
#[derive(Error, Debug, Clone)]
pub enum WorkflowError {
    /// The owning channel stayed unavailable for the whole wait interval.
    #[error("channel unavailable after waiting {waited:?}")]
    ChannelUnavailable {
        /// How long the workflow waited.
        waited: Duration,
    },

    /// The workflow was stopped while the message was waiting.
    #[error("workflow stopped before the message could be processed")]
    Stopped,

    /// A processing step failed.
    #[error(transparent)]
    Processing(#[from] ProcessingError),

    /// A producer failed.
    #[error(transparent)]
    Produce(#[from] ProduceError),

    /// A pooled workflow could not obtain a worker.
    #[error("no worker available: {reason}")]
    WorkerUnavailable {
        /// Why the worker could not be created.
        reason: String,
    },

    /// User code panicked outside a step (interceptor, producer).
    #[error("workflow panicked: {message}")]
    Panicked {
        /// Panic payload rendered as text.
        message: String,
    },
}

impl WorkflowError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            WorkflowError::ChannelUnavailable { .. } => "workflow_channel_unavailable",
            WorkflowError::Stopped => "workflow_stopped",
            WorkflowError::Processing(e) => e.as_label(),
            WorkflowError::Produce(e) => e.as_label(),
            WorkflowError::WorkerUnavailable { .. } => "workflow_worker_unavailable",
            WorkflowError::Panicked { .. } => "workflow_panicked",
        }
    }

    /// True if the attempt failed while producing.
    pub fn is_produce(&self) -> bool {
        matches!(self, WorkflowError::Produce(_))
    }
}

/// # Errors produced by the adapter runtime.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// Shutdown grace period was exceeded; some components did not reach Closed in time.
    #[error("shutdown timeout {grace:?} exceeded; stuck: {stuck:?}")]
    GraceExceeded {
        /// The configured grace duration.
        grace: Duration,
        /// Components that had not closed.
        stuck: Vec<String>,
    },

    /// A lifecycle request issued by the runtime failed.
    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),

    /// OS signal registration failed.
    #[error("signal handling failed: {0}")]
    Signal(#[from] std::io::Error),
}

impl RuntimeError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// # Example
    /// ```
    /// use flowvisor::RuntimeError;
    /// use std::time::Duration;
    ///
    /// let err = RuntimeError::GraceExceeded { grace: Duration::from_secs(5), stuck: vec![] };
    /// assert_eq!(err.as_label(), "runtime_grace_exceeded");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            RuntimeError::GraceExceeded { .. } => "runtime_grace_exceeded",
            RuntimeError::Lifecycle(_) => "runtime_lifecycle",
            RuntimeError::Signal(_) => "runtime_signal",
        }
    }
}

/// Renders a caught panic payload as text.
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
