//! Fault handling: processing exception handlers, connection error handlers and the
//! scope walk that picks the effective one.
//!
//! ## Contents
//! - [`ProcessingExceptionHandler`] with [`NullProcessingHandler`],
//!   [`StandardProcessingHandler`] and [`RetryMessageErrorHandler`]
//! - [`ConnectionErrorHandler`] with [`RestartDependents`], [`CloseDependents`] and
//!   [`NullConnectionHandler`]
//! - [`resolve_processing_handler`] / [`resolve_connection_handler`]

mod connection;
mod processing;
mod resolver;
mod retry;

pub use connection::{
    CloseDependents, ConnectionErrorHandler, ConnectionHandlerRef, NullConnectionHandler,
    RestartDependents,
};
pub(crate) use connection::compatible;
pub use processing::{
    HandlerRef, NullProcessingHandler, ProcessingExceptionHandler, StandardProcessingHandler,
};
pub use resolver::{ResolvedHandler, resolve_connection_handler, resolve_processing_handler};
pub use retry::RetryMessageErrorHandler;
