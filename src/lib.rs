//! # flowvisor
//!
//! **Flowvisor** is a supervised runtime for integration adapters: consumers feed messages
//! through processing chains into producers, every part follows one lifecycle state
//! machine, and failures are routed to scoped exception handlers.
//!
//! ## Architecture
//! ### Overview
//! ```text
//!                        ┌──────────────────────────────────────────────────┐
//!                        │ Adapter (root container)                         │
//!                        │  - Bus ──► SubscriberSet (StateTracker, ...)     │
//!                        │  - Directory of shared Connections               │
//!                        │  - root processing / connection handlers         │
//!                        └────────┬─────────────────────────────┬───────────┘
//!                                 ▼                             ▼
//!                        ┌─────────────────┐           ┌─────────────────┐
//!                        │ Channel         │           │ Channel         │
//!                        │  - connections ─┼──────┐    │  - handlers     │
//!                        │  - handlers     │      │    └────────┬────────┘
//!                        └────────┬────────┘      │             ▼
//!                                 ▼               │        Workflow ...
//!                        ┌─────────────────┐      │
//!                        │ Workflow        │      └──► Connection (dependents: weak ids)
//!                        │ consumer ─► chain ─► producer(s)
//!                        │ failure ─► resolved ProcessingExceptionHandler
//!                        └─────────────────┘
//! ```
//!
//! ### Lifecycle
//! ```text
//!   Closed ──init──► Initialised ──start──► Started ──stop──► Stopped
//!     ▲                   │                    │                 │
//!     └───────close───────┴───────close────────┴──────close──────┘
//!
//!   Stopped ──start──► Started       (init + start)
//!   Stopped ──init───► Initialised   (close + init)
//! ```
//! Every request is idempotent and serialized per component. Containers (adapter,
//! channels) drive their children Blocking or NonBlocking; init/start run the container
//! first, stop/close run the children first.
//!
//! ### Failure routing
//! ```text
//! Workflow attempt fails ─► original message + workflow id ─► handler resolved
//!                           workflow ─► channel ─► root ─► Null
//!                              ├─ StandardProcessingHandler → recovery chain
//!                              └─ RetryMessageErrorHandler  → retry loop → recovery chain
//! Connection failure ─► ConnectionErrorHandler (connection ─► channel ─► root ─► Null)
//!                              └─ RestartDependents: restart only Started dependents
//! ```
//!
//! ## Features
//! | Area              | Description                                                 | Key types / traits                                  |
//! |-------------------|-------------------------------------------------------------|-----------------------------------------------------|
//! | **Lifecycle**     | State machine, guard, container cascade.                    | [`Lifecycle`], [`Component`], [`LifecycleGuard`]    |
//! | **Workflows**     | Consumer → chain → producer, inline or pooled.              | [`Workflow`], [`ProcessingChain`], [`Step`]         |
//! | **Handlers**      | Scoped recovery for messages and connections.               | [`ProcessingExceptionHandler`], [`ConnectionErrorHandler`] |
//! | **Connections**   | Dependents, shared connections by name.                     | [`Connection`], [`SharedConnection`], [`Directory`] |
//! | **Subscriber API**| Hook into runtime events.                                   | [`Subscribe`], [`StateTracker`]                     |
//! | **Errors**        | Typed errors per concern.                                   | [`ConfigError`], [`LifecycleError`], [`RuntimeError`] |
//!
//! ## Optional features
//! - `logging`: exports the [`LogWriter`] subscriber.
//!
//! ## Example
//! ```rust
//! use std::sync::Arc;
//! use flowvisor::{
//!     Adapter, Channel, Component, ComponentState, Consumer, Lifecycle, Message,
//!     ProcessingError, ProduceError, Producer, StepFn, Workflow,
//! };
//!
//! struct Orders;
//! impl Lifecycle for Orders {}
//! impl Consumer for Orders {
//!     fn name(&self) -> &str { "orders" }
//! }
//!
//! struct Billing;
//! impl Lifecycle for Billing {}
//! #[async_trait::async_trait]
//! impl Producer for Billing {
//!     fn name(&self) -> &str { "billing" }
//!     async fn produce(&self, msg: &Message) -> Result<(), ProduceError> {
//!         println!("billing {:?}", msg.payload_str());
//!         Ok(())
//!     }
//! }
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let workflow = Workflow::builder(Arc::new(Orders))
//!         .producer(Arc::new(Billing))
//!         .step(StepFn::arc("trim", |mut msg: Message| async move {
//!             let trimmed = msg.payload_str().unwrap_or_default().trim().to_string();
//!             msg.set_payload(trimmed);
//!             Ok::<_, ProcessingError>(msg)
//!         }))
//!         .build()?;
//!     let channel = Channel::builder("invoices").workflow(workflow.clone()).build()?;
//!     let adapter = Adapter::builder("billing-adapter").channel(channel).build()?;
//!
//!     adapter.request_start().await?;
//!     workflow.on_message(Message::new("  order-1  ")).await;
//!
//!     adapter.shutdown().await?;
//!     assert_eq!(adapter.state(), ComponentState::Closed);
//!     Ok(())
//! }
//! ```
mod chain;
mod config;
mod connection;
mod core;
mod endpoints;
mod error;
mod events;
mod handlers;
mod lifecycle;
mod message;
mod policies;
mod subscribers;
mod workflow;

// ---- Public re-exports ----

pub use chain::{ChainFactory, ChainMode, ProcessingChain, Step, StepFn, StepRef};
pub use config::{AdapterConfig, PoolConfig, RetryConfig, WorkflowConfig};
pub use connection::{Connection, ConnectionRef, DependentId, Directory, SharedConnection};
pub use core::{Adapter, AdapterBuilder, Channel, ChannelBuilder};
pub use endpoints::{Consumer, ConsumerRef, MessageListener, Producer, ProducerRef, Transport};
pub use error::{
    ConfigError, ConnectionError, LifecycleError, ProcessingError, ProduceError, RuntimeError,
    WorkflowError,
};
pub use events::{Bus, Event, EventKind};
pub use handlers::{
    CloseDependents, ConnectionErrorHandler, ConnectionHandlerRef, HandlerRef,
    NullConnectionHandler, NullProcessingHandler, ProcessingExceptionHandler, ResolvedHandler,
    RestartDependents, RetryMessageErrorHandler, StandardProcessingHandler,
    resolve_connection_handler, resolve_processing_handler,
};
pub use lifecycle::{
    Component, ComponentState, Guarded, Lifecycle, LifecycleGuard, LifecycleSession,
    LifecycleStrategy, Managed, Phase, Plan, Transition, cascade,
};
pub use message::{FAILURE_REASON_KEY, Message, MessageId, StepEvent, WORKFLOW_ID_KEY};
pub use policies::{BackoffPolicy, JitterPolicy, ProduceFailurePolicy};
pub use subscribers::{StateTracker, Subscribe, SubscriberSet};
pub use workflow::{Availability, InterceptorRef, Workflow, WorkflowBuilder, WorkflowInterceptor};

// Optional: expose a simple built-in logger subscriber.
// Enable with: `--features logging`
#[cfg(feature = "logging")]
pub use subscribers::LogWriter;
