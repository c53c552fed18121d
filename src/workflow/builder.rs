use std::sync::Arc;

use parking_lot::RwLock;
use tokio_util::sync::CancellationToken;

use super::delivery::{Delivery, managed};
use super::pool::WorkerPool;
use super::{Binding, Engine, InterceptorRef, Workflow};
use crate::chain::{ChainFactory, ProcessingChain, StepRef};
use crate::config::{PoolConfig, WorkflowConfig};
use crate::endpoints::{ConsumerRef, ProducerRef};
use crate::error::{ConfigError, validate_id};
use crate::handlers::HandlerRef;
use crate::lifecycle::{LifecycleGuard, Managed};

enum DeliverySpec {
    Single(ProducerRef),
    Fanout {
        secondaries: Vec<ProducerRef>,
        primary: Option<ProducerRef>,
    },
    RequestReply {
        producer: ProducerRef,
        reply_chain: ProcessingChain,
        reply_producer: Option<ProducerRef>,
    },
}

/// Builder for [`Workflow`].
///
/// ```rust
/// # use std::sync::Arc;
/// # use flowvisor::{Consumer, Lifecycle, Message, ProduceError, Producer, StepFn, Workflow, ProcessingError};
/// # struct Queue;
/// # impl Lifecycle for Queue {}
/// # impl Consumer for Queue { fn name(&self) -> &str { "orders" } }
/// # struct Sink;
/// # impl Lifecycle for Sink {}
/// # #[async_trait::async_trait]
/// # impl Producer for Sink {
/// #     fn name(&self) -> &str { "billing" }
/// #     async fn produce(&self, _m: &Message) -> Result<(), ProduceError> { Ok(()) }
/// # }
/// let workflow = Workflow::builder(Arc::new(Queue))
///     .producer(Arc::new(Sink))
///     .step(StepFn::arc("noop", |m: Message| async move { Ok::<_, ProcessingError>(m) }))
///     .build()
///     .unwrap();
/// assert_eq!(workflow.workflow_id(), "orders->billing@unbound");
/// ```
pub struct WorkflowBuilder {
    unique_id: Option<String>,
    consumer: ConsumerRef,
    delivery: Option<DeliverySpec>,
    chain: ProcessingChain,
    pool: Option<(PoolConfig, ChainFactory)>,
    interceptors: Vec<InterceptorRef>,
    cfg: WorkflowConfig,
    handler: Option<HandlerRef>,
}

impl WorkflowBuilder {
    pub(super) fn new(consumer: ConsumerRef) -> Self {
        Self {
            unique_id: None,
            consumer,
            delivery: None,
            chain: ProcessingChain::new(),
            pool: None,
            interceptors: Vec::new(),
            cfg: WorkflowConfig::default(),
            handler: None,
        }
    }

    /// Sets the unique id; without one the composite id is used.
    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.unique_id = Some(id.into());
        self
    }

    /// Produces to a single destination.
    pub fn producer(mut self, producer: ProducerRef) -> Self {
        self.delivery = Some(DeliverySpec::Single(producer));
        self
    }

    /// Produces to every secondary (failures logged) and then to `primary` (failure fatal).
    pub fn fanout(mut self, secondaries: Vec<ProducerRef>, primary: Option<ProducerRef>) -> Self {
        self.delivery = Some(DeliverySpec::Fanout { secondaries, primary });
        self
    }

    /// Sends a request through `producer` and hands the reply to `reply_chain` and then
    /// `reply_producer`.
    pub fn request_reply(
        mut self,
        producer: ProducerRef,
        reply_chain: ProcessingChain,
        reply_producer: Option<ProducerRef>,
    ) -> Self {
        self.delivery = Some(DeliverySpec::RequestReply {
            producer,
            reply_chain,
            reply_producer,
        });
        self
    }

    /// Appends a step to the processing chain.
    pub fn step(mut self, step: StepRef) -> Self {
        self.chain.push(step);
        self
    }

    /// Replaces the processing chain.
    pub fn chain(mut self, chain: ProcessingChain) -> Self {
        self.chain = chain;
        self
    }

    /// Runs messages concurrently on pooled workers, each with a chain built by `factory`.
    ///
    /// The chain set with [`chain`](Self::chain)/[`step`](Self::step) is ignored in this mode.
    pub fn pooled(mut self, cfg: PoolConfig, factory: ChainFactory) -> Self {
        self.pool = Some((cfg, factory));
        self
    }

    pub fn interceptor(mut self, interceptor: InterceptorRef) -> Self {
        self.interceptors.push(interceptor);
        self
    }

    pub fn config(mut self, cfg: WorkflowConfig) -> Self {
        self.cfg = cfg;
        self
    }

    /// Handler for this workflow's failed messages; overrides channel and root handlers.
    pub fn processing_handler(mut self, handler: HandlerRef) -> Self {
        self.handler = Some(handler);
        self
    }

    pub fn build(self) -> Result<Arc<Workflow>, ConfigError> {
        let unique_id = self
            .unique_id
            .map(|id| validate_id("workflow id", id))
            .transpose()?;
        let delivery = match self.delivery {
            Some(DeliverySpec::Single(p)) => Delivery::Single(managed(p)),
            Some(DeliverySpec::Fanout { secondaries, primary }) => {
                if secondaries.is_empty() && primary.is_none() {
                    return Err(ConfigError::InvalidValue {
                        field: "fanout",
                        reason: "at least one producer is required".into(),
                    });
                }
                Delivery::Fanout {
                    secondaries: secondaries.into_iter().map(managed).collect(),
                    primary: primary.map(managed),
                }
            }
            Some(DeliverySpec::RequestReply {
                producer,
                reply_chain,
                reply_producer,
            }) => Delivery::RequestReply {
                reply_chain: Arc::new(Managed::new(
                    format!("{}:reply", producer.name()),
                    Arc::new(reply_chain),
                )),
                producer: managed(producer),
                reply_producer: reply_producer.map(managed),
            },
            None => {
                return Err(ConfigError::InvalidValue {
                    field: "producer",
                    reason: "a workflow needs a producer".into(),
                });
            }
        };
        let engine = match self.pool {
            Some((cfg, factory)) => Engine::Pooled(Arc::new(WorkerPool::new(cfg, factory))),
            None => Engine::Inline {
                chain: Arc::new(Managed::new("chain", Arc::new(self.chain))),
                gate: tokio::sync::Mutex::new(()),
            },
        };
        let consumer = Arc::new(Managed::new(self.consumer.name().to_string(), self.consumer));
        let interceptors = self
            .interceptors
            .into_iter()
            .enumerate()
            .map(|(i, interceptor)| Arc::new(Managed::new(format!("interceptor-{i}"), interceptor)))
            .collect();

        // Starts cancelled: nothing is processed before the first start.
        let cancel = CancellationToken::new();
        cancel.cancel();

        let workflow = Arc::new_cyclic(|me| Workflow {
            me: me.clone(),
            guard: LifecycleGuard::new(unique_id.clone().unwrap_or_default()),
            unique_id,
            consumer,
            engine,
            delivery,
            interceptors,
            cfg: self.cfg,
            handler: RwLock::new(self.handler),
            resolved: RwLock::new(None),
            binding: RwLock::new(Binding::default()),
            cancel: RwLock::new(cancel),
        });
        workflow.guard.rename(workflow.workflow_id());
        Ok(workflow)
    }
}
