//! Retry and produce-failure policies.
//!
//! ## Contents
//! - [`BackoffPolicy`] how long a retry loop waits between attempts (constant by default)
//! - [`JitterPolicy`] randomization applied on top of the backoff
//! - [`ProduceFailurePolicy`] what a workflow restarts after a produce failure
//!
//! ## Wiring
//! ```text
//! RetryConfig { retry_limit, backoff: BackoffPolicy, lock_timeout }
//!      └─► handlers::RetryMessageErrorHandler sleeps backoff.next(attempt) per message
//!
//! WorkflowConfig { produce_policy: ProduceFailurePolicy, .. }
//!      └─► workflow pipeline restarts the workflow or channel (detached) on ProduceError
//! ```

mod backoff;
mod jitter;
mod produce;

pub use backoff::BackoffPolicy;
pub use jitter::JitterPolicy;
pub use produce::ProduceFailurePolicy;
