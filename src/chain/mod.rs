//! Processing steps and the chains that hold them.
//!
//! - [`Step`] the user-implemented processing contract
//! - [`StepFn`] closure-backed step
//! - [`ProcessingChain`] ordered steps, sequential or isolated
//! - [`ChainFactory`] builds a private chain per pooled worker

mod processing;
mod step;
mod step_fn;

use std::sync::Arc;

pub use processing::{ChainMode, ProcessingChain};
pub use step::{Step, StepRef};
pub use step_fn::StepFn;

/// Builds a fresh chain; pooled workflows call it once per worker.
pub type ChainFactory = Arc<dyn Fn() -> ProcessingChain + Send + Sync>;
