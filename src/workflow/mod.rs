//! # Workflow execution engine.
//!
//! A [`Workflow`] connects one consumer to its delivery (single producer, fanout or
//! request/reply) through a processing chain, and routes every failed message to its
//! resolved [`ProcessingExceptionHandler`](crate::ProcessingExceptionHandler).
//!
//! ```text
//! consumer ─► on_message(msg)
//!               ├─ wait for channel (≤ channel_unavailable_wait, cancelled by stop)
//!               ├─ interceptors.workflow_start
//!               ├─ chain.execute(processed)
//!               ├─ deliver(processed | original)      unless skip-producer
//!               ├─ interceptors.workflow_end(error?)
//!               └─ on failure: original ─► resolved handler (+ produce policy)
//! ```
//!
//! ## Modes
//! - **Inline**: one message at a time, on the caller's task.
//! - **Pooled**: a semaphore of `pool_size` permits bounds concurrency; each message runs
//!   on a spawned task with a worker borrowed from the [`pool`].
//!
//! ## Rules
//! - Processing and produce failures never escape `on_message`; panics in user code are
//!   caught and routed like failures.
//! - The handler always receives the original message, tagged with the workflow id and
//!   the failure reason.
//! - Produce-policy restarts run detached so they cannot wait on the message that
//!   triggered them, and are skipped once the workflow is stopping or the target has
//!   left `Started`.
//! - Stop and close cancel pending availability waits before draining the pool.

mod availability;
mod builder;
mod delivery;
mod interceptor;
mod pool;

use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Weak};

use async_trait::async_trait;
use futures::FutureExt;
use parking_lot::RwLock;
use tokio_util::sync::CancellationToken;

pub use availability::Availability;
pub use builder::WorkflowBuilder;
pub use interceptor::{InterceptorRef, WorkflowInterceptor};

use self::availability::Wait;
use self::delivery::Delivery;
use self::pool::WorkerPool;
use crate::chain::ProcessingChain;
use crate::config::WorkflowConfig;
use crate::endpoints::{Consumer, ConsumerRef, MessageListener};
use crate::error::{WorkflowError, panic_message};
use crate::events::{Bus, Event, EventKind, publish_to};
use crate::handlers::{HandlerRef, ResolvedHandler, resolve_processing_handler};
use crate::lifecycle::{
    Component, ComponentState, Guarded, Lifecycle, LifecycleGuard, LifecycleStrategy, Managed,
    Transition, cascade,
};
use crate::message::{FAILURE_REASON_KEY, Message, WORKFLOW_ID_KEY};
use crate::policies::ProduceFailurePolicy;

/// What a channel hands its workflows during `prepare`.
#[derive(Clone)]
pub(crate) struct Binding {
    pub(crate) channel_id: Option<String>,
    pub(crate) channel: Option<Weak<dyn Component>>,
    pub(crate) availability: Arc<Availability>,
    /// Outer handler scopes, closest first (channel, root).
    pub(crate) inherited: Vec<Option<HandlerRef>>,
    pub(crate) bus: Option<Bus>,
}

impl Default for Binding {
    fn default() -> Self {
        Self {
            channel_id: None,
            channel: None,
            availability: Arc::new(Availability::always()),
            inherited: Vec::new(),
            bus: None,
        }
    }
}

enum Engine {
    Inline {
        chain: Arc<Managed<ProcessingChain>>,
        gate: tokio::sync::Mutex<()>,
    },
    Pooled(Arc<WorkerPool>),
}

/// Consumer → chain → producer pipeline with error routing.
pub struct Workflow {
    me: Weak<Workflow>,
    unique_id: Option<String>,
    guard: LifecycleGuard,
    consumer: Arc<Managed<dyn Consumer>>,
    engine: Engine,
    delivery: Delivery,
    interceptors: Vec<Arc<Managed<dyn WorkflowInterceptor>>>,
    cfg: WorkflowConfig,
    handler: RwLock<Option<HandlerRef>>,
    resolved: RwLock<Option<(String, ResolvedHandler)>>,
    binding: RwLock<Binding>,
    cancel: RwLock<CancellationToken>,
}

impl Workflow {
    /// Starts building a workflow fed by `consumer`.
    pub fn builder(consumer: ConsumerRef) -> WorkflowBuilder {
        WorkflowBuilder::new(consumer)
    }

    /// Configured unique id, if any.
    pub fn unique_id(&self) -> Option<&str> {
        self.unique_id.as_deref()
    }

    /// Unique id, or `"{consumer}->{producer}@{channel}"` when none is configured.
    ///
    /// The composite form is deterministic but not guaranteed to be unique.
    pub fn workflow_id(&self) -> String {
        if let Some(id) = &self.unique_id {
            return id.clone();
        }
        let binding = self.binding.read();
        format!(
            "{}->{}@{}",
            self.consumer.get().name(),
            self.delivery.primary_name(),
            binding.channel_id.as_deref().unwrap_or("unbound")
        )
    }

    pub fn config(&self) -> &WorkflowConfig {
        &self.cfg
    }

    /// Id of the owning channel once bound.
    pub fn channel_id(&self) -> Option<String> {
        self.binding.read().channel_id.clone()
    }

    pub fn is_pooled(&self) -> bool {
        matches!(self.engine, Engine::Pooled(_))
    }

    /// Handler configured on this workflow.
    pub fn processing_handler(&self) -> Option<HandlerRef> {
        self.handler.read().clone()
    }

    /// Replaces (or clears) this workflow's own handler and re-resolves immediately.
    pub fn set_processing_handler(&self, handler: Option<HandlerRef>) {
        *self.handler.write() = handler;
        self.refresh_handlers();
    }

    /// The handlers failed messages are routed to.
    pub fn resolved_handler(&self) -> ResolvedHandler {
        if let Some((_, resolved)) = self.resolved.read().as_ref() {
            return resolved.clone();
        }
        resolve_processing_handler(&self.scopes())
    }

    /// Idle pooled workers (always 0 for inline workflows).
    pub fn idle_workers(&self) -> usize {
        match &self.engine {
            Engine::Pooled(pool) => pool.idle_count(),
            Engine::Inline { .. } => 0,
        }
    }

    /// Pooled workers currently handling a message.
    pub fn active_workers(&self) -> usize {
        match &self.engine {
            Engine::Pooled(pool) => pool.active_count(),
            Engine::Inline { .. } => 0,
        }
    }

    /// Intake for one message; failures are routed, never returned.
    pub async fn on_message(&self, msg: Message) {
        match &self.engine {
            Engine::Inline { chain, gate } => {
                let res = {
                    let _one_at_a_time = gate.lock().await;
                    self.attempt(chain.get(), &msg).await
                };
                if let Err(e) = res {
                    self.route_failure(msg, e).await;
                }
            }
            Engine::Pooled(pool) => self.dispatch_pooled(pool, msg).await,
        }
    }

    /// Runs the pipeline once without routing a failure; used by retry handlers.
    pub async fn process_once(&self, msg: Message) -> Result<(), WorkflowError> {
        match &self.engine {
            Engine::Inline { chain, gate } => {
                let _one_at_a_time = gate.lock().await;
                self.attempt(chain.get(), &msg).await
            }
            Engine::Pooled(pool) => {
                let cancel = self.cancel.read().clone();
                let _permit = tokio::select! {
                    _ = cancel.cancelled() => return Err(WorkflowError::Stopped),
                    permit = pool.permits().acquire_owned() => {
                        permit.map_err(|_| WorkflowError::Stopped)?
                    }
                };
                let worker = pool.borrow().await?;
                let res = self.attempt(worker.chain(), &msg).await;
                pool.give_back(worker).await;
                res
            }
        }
    }

    pub(crate) fn bind(&self, binding: Binding) {
        *self.binding.write() = binding;
    }

    /// Settles identity and handler resolution; called on every init.
    pub fn prepare(&self) {
        let id = self.workflow_id();
        self.guard.rename(id.as_str());
        let bus = self.binding.read().bus.clone();
        if let Some(bus) = bus {
            self.guard.attach_bus(bus.clone());
            if let Some(handler) = self.handler.read().as_ref() {
                handler.attach_bus(bus);
            }
        }
        self.refresh_handlers();
    }

    fn scopes(&self) -> Vec<Option<HandlerRef>> {
        let mut scopes = vec![self.handler.read().clone()];
        scopes.extend(self.binding.read().inherited.iter().cloned());
        scopes
    }

    fn refresh_handlers(&self) {
        let Some(me) = self.me.upgrade() else { return };
        let id = self.workflow_id();
        let resolved = resolve_processing_handler(&self.scopes());
        let previous = self.resolved.write().replace((id, resolved.clone()));

        if let Some((old_id, old)) = previous {
            for handler in old.all() {
                handler.unregister_workflow(&old_id);
            }
        }
        for handler in resolved.all() {
            handler.register_workflow(&me);
        }
    }

    async fn attempt(&self, chain: &ProcessingChain, original: &Message) -> Result<(), WorkflowError> {
        let cancel = self.cancel.read().clone();
        if cancel.is_cancelled() {
            return Err(WorkflowError::Stopped);
        }
        let availability = Arc::clone(&self.binding.read().availability);
        let waited = self.cfg.channel_unavailable_wait;
        match availability.wait(waited, &cancel).await {
            Wait::Available => {}
            Wait::TimedOut => return Err(WorkflowError::ChannelUnavailable { waited }),
            Wait::Cancelled => return Err(WorkflowError::Stopped),
        }

        let res = match AssertUnwindSafe(self.pipeline(chain, original)).catch_unwind().await {
            Ok(res) => res,
            Err(payload) => Err(WorkflowError::Panicked {
                message: panic_message(payload.as_ref()),
            }),
        };

        for i in &self.interceptors {
            let end = AssertUnwindSafe(i.get().workflow_end(original, res.as_ref().err()));
            if end.catch_unwind().await.is_err() {
                tracing::warn!(interceptor = %i.name(), "interceptor panicked in workflow_end");
            }
        }
        res
    }

    async fn pipeline(&self, chain: &ProcessingChain, original: &Message) -> Result<(), WorkflowError> {
        for i in &self.interceptors {
            i.get().workflow_start(original).await;
        }
        let mut processed = original.clone();
        chain.execute(&mut processed).await?;
        if processed.is_producer_skipped() {
            tracing::debug!(message = %original.id(), "producer skipped by a step");
            return Ok(());
        }
        let out = if self.cfg.use_processed_message {
            &processed
        } else {
            original
        };
        self.delivery.deliver(out, &self.cfg).await
    }

    async fn dispatch_pooled(&self, pool: &Arc<WorkerPool>, msg: Message) {
        let cancel = self.cancel.read().clone();
        let permit = tokio::select! {
            _ = cancel.cancelled() => None,
            permit = pool.permits().acquire_owned() => permit.ok(),
        };
        let (Some(permit), Some(me)) = (permit, self.me.upgrade()) else {
            self.route_failure(msg, WorkflowError::Stopped).await;
            return;
        };
        let task_pool = Arc::clone(pool);
        pool.tracker().spawn(async move {
            let _permit = permit;
            me.run_pooled(&task_pool, msg).await;
        });
    }

    async fn run_pooled(&self, pool: &WorkerPool, msg: Message) {
        let abort = pool.abort_token();
        let worker = match pool.borrow().await {
            Ok(worker) => worker,
            Err(e) => {
                self.route_failure(msg, e).await;
                return;
            }
        };
        let res = tokio::select! {
            _ = abort.cancelled() => Err(WorkflowError::Stopped),
            res = self.attempt(worker.chain(), &msg) => res,
        };
        if let Err(e) = res {
            let routed = AssertUnwindSafe(self.route_failure(msg, e)).catch_unwind().await;
            if routed.is_err() {
                tracing::error!(workflow = %self.guard.name(), "exception handler panicked");
            }
        }
        pool.give_back(worker).await;
    }

    async fn route_failure(&self, mut msg: Message, err: WorkflowError) {
        let id = self.workflow_id();
        msg.set_metadata(WORKFLOW_ID_KEY, id.as_str());
        msg.set_metadata(FAILURE_REASON_KEY, err.to_string());
        tracing::warn!(
            workflow = %id,
            message = %msg.id(),
            error = %err,
            label = err.as_label(),
            "message failed; routing to exception handler"
        );
        publish_to(&self.guard.bus(), || {
            Event::new(EventKind::MessageFailed)
                .with_component(id.as_str())
                .with_message(msg.id().to_string())
                .with_reason(err.to_string())
        });

        if err.is_produce() {
            self.apply_produce_policy(&err);
        }
        self.resolved_handler().handle(msg).await;
    }

    fn apply_produce_policy(&self, err: &WorkflowError) {
        let cancel = self.cancel.read().clone();
        if cancel.is_cancelled() || matches!(err, WorkflowError::Stopped) {
            return;
        }
        let target: Option<Arc<dyn Component>> = match self.cfg.produce_policy {
            ProduceFailurePolicy::None => None,
            ProduceFailurePolicy::RestartWorkflow => {
                self.me.upgrade().map(|me| me as Arc<dyn Component>)
            }
            ProduceFailurePolicy::RestartChannel => self
                .binding
                .read()
                .channel
                .as_ref()
                .and_then(Weak::upgrade),
        };
        let Some(target) = target else { return };

        let bus = self.guard.bus();
        let reason = err.to_string();
        let policy = self.cfg.produce_policy.as_label();
        tokio::spawn(async move {
            let name = target.name();
            if cancel.is_cancelled() || target.state() != ComponentState::Started {
                tracing::debug!(component = %name, policy, "shutting down; produce-failure restart skipped");
                return;
            }
            tracing::info!(component = %name, policy, "restarting after produce failure");
            publish_to(&bus, || {
                Event::new(EventKind::RestartRequested)
                    .with_component(name.clone())
                    .with_reason(reason)
            });
            if let Err(e) = target.request_restart().await {
                tracing::error!(component = %name, error = %e, "restart after produce failure failed");
            }
        });
    }

    /// Everything except the consumer, in init order.
    fn parts(&self) -> Vec<Arc<dyn Component>> {
        let mut parts: Vec<Arc<dyn Component>> = self
            .interceptors
            .iter()
            .map(|i| i.clone() as Arc<dyn Component>)
            .collect();
        if let Engine::Inline { chain, .. } = &self.engine {
            parts.push(chain.clone());
        }
        parts.extend(self.delivery.parts());
        parts
    }

    fn consumer_part(&self) -> [Arc<dyn Component>; 1] {
        [self.consumer.clone()]
    }

    /// Stops or closes the own handler; outer scopes own theirs.
    async fn release_handler(&self, transition: Transition) {
        let Some(handler) = self.processing_handler() else { return };
        if let Err(e) = handler.request(transition).await {
            tracing::warn!(workflow = %self.guard.name(), error = %e, "processing handler failed to {transition}");
        }
    }
}

#[async_trait]
impl Lifecycle for Workflow {
    async fn init(&self) -> anyhow::Result<()> {
        self.prepare();
        let listener: Weak<dyn MessageListener> = self.me.clone();
        self.consumer.get().register_listener(listener);

        if let Some(handler) = self.processing_handler() {
            handler.request_init().await?;
        }
        let bus = self.guard.bus();
        cascade(LifecycleStrategy::Blocking, &self.parts(), Transition::Init, &bus).await?;
        cascade(LifecycleStrategy::Blocking, &self.consumer_part(), Transition::Init, &bus).await?;
        Ok(())
    }

    async fn start(&self) -> anyhow::Result<()> {
        {
            let mut cancel = self.cancel.write();
            if cancel.is_cancelled() {
                *cancel = CancellationToken::new();
            }
        }
        if let Some(handler) = self.processing_handler() {
            handler.request_start().await?;
        }
        let bus = self.guard.bus();
        cascade(LifecycleStrategy::Blocking, &self.parts(), Transition::Start, &bus).await?;
        if let Engine::Pooled(pool) = &self.engine {
            pool.warm_up().await?;
            pool.start_janitor();
        }
        cascade(LifecycleStrategy::Blocking, &self.consumer_part(), Transition::Start, &bus).await?;
        Ok(())
    }

    async fn stop(&self) -> anyhow::Result<()> {
        self.cancel.read().cancel();
        let bus = self.guard.bus();
        cascade(LifecycleStrategy::Blocking, &self.consumer_part(), Transition::Stop, &bus).await?;
        if let Engine::Pooled(pool) = &self.engine {
            pool.drain().await;
        }
        cascade(LifecycleStrategy::Blocking, &self.parts(), Transition::Stop, &bus).await?;
        self.release_handler(Transition::Stop).await;
        Ok(())
    }

    async fn close(&self) -> anyhow::Result<()> {
        self.cancel.read().cancel();
        let bus = self.guard.bus();
        cascade(LifecycleStrategy::Blocking, &self.consumer_part(), Transition::Close, &bus).await?;
        if let Engine::Pooled(pool) = &self.engine {
            pool.drain().await;
            pool.close_idle().await;
        }
        cascade(LifecycleStrategy::Blocking, &self.parts(), Transition::Close, &bus).await?;
        self.release_handler(Transition::Close).await;
        Ok(())
    }
}

impl Guarded for Workflow {
    fn guard(&self) -> &LifecycleGuard {
        &self.guard
    }
}

#[async_trait]
impl MessageListener for Workflow {
    async fn on_message(&self, msg: Message) {
        Workflow::on_message(self, msg).await;
    }
}
