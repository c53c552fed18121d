//! # How a workflow hands a processed message on.
//!
//! ```text
//! Single        producer.produce(msg)
//! Fanout        each secondary.produce(msg)   failures logged, never fatal
//!               primary.produce(msg)          failure fails the attempt
//! RequestReply  producer.request(msg, reply_timeout) ─► reply
//!               out = msg with reply payload (+ reply metadata unless ignored)
//!               reply_chain(out) ─► reply_producer.produce(out)
//! ```

use std::sync::Arc;

use crate::chain::ProcessingChain;
use crate::config::WorkflowConfig;
use crate::endpoints::{Producer, ProducerRef};
use crate::error::{ProduceError, WorkflowError};
use crate::lifecycle::{Component, Managed};
use crate::message::Message;

type ManagedProducer = Arc<Managed<dyn Producer>>;

pub(crate) fn managed(producer: ProducerRef) -> ManagedProducer {
    Arc::new(Managed::new(producer.name().to_string(), producer))
}

pub(crate) enum Delivery {
    Single(ManagedProducer),
    Fanout {
        secondaries: Vec<ManagedProducer>,
        primary: Option<ManagedProducer>,
    },
    RequestReply {
        producer: ManagedProducer,
        reply_chain: Arc<Managed<ProcessingChain>>,
        reply_producer: Option<ManagedProducer>,
    },
}

impl Delivery {
    /// Name used in composite workflow ids.
    pub(crate) fn primary_name(&self) -> String {
        match self {
            Delivery::Single(p) | Delivery::RequestReply { producer: p, .. } => {
                p.get().name().to_string()
            }
            Delivery::Fanout { primary, secondaries } => primary
                .iter()
                .chain(secondaries.iter())
                .next()
                .map(|p| p.get().name().to_string())
                .unwrap_or_else(|| "fanout".to_string()),
        }
    }

    /// Every lifecycle-managed part, in init order.
    pub(crate) fn parts(&self) -> Vec<Arc<dyn Component>> {
        let mut parts: Vec<Arc<dyn Component>> = Vec::new();
        match self {
            Delivery::Single(p) => parts.push(p.clone()),
            Delivery::Fanout { secondaries, primary } => {
                parts.extend(secondaries.iter().map(|p| p.clone() as Arc<dyn Component>));
                if let Some(p) = primary {
                    parts.push(p.clone());
                }
            }
            Delivery::RequestReply {
                producer,
                reply_chain,
                reply_producer,
            } => {
                parts.push(producer.clone());
                parts.push(reply_chain.clone());
                if let Some(p) = reply_producer {
                    parts.push(p.clone());
                }
            }
        }
        parts
    }

    pub(crate) async fn deliver(&self, msg: &Message, cfg: &WorkflowConfig) -> Result<(), WorkflowError> {
        match self {
            Delivery::Single(p) => Ok(p.get().produce(msg).await?),
            Delivery::Fanout { secondaries, primary } => {
                for p in secondaries {
                    if let Err(e) = p.get().produce(msg).await {
                        tracing::warn!(
                            producer = p.get().name(),
                            message = %msg.id(),
                            error = %e,
                            "secondary producer failed; continuing"
                        );
                    }
                }
                if let Some(p) = primary {
                    p.get().produce(msg).await?;
                }
                Ok(())
            }
            Delivery::RequestReply {
                producer,
                reply_chain,
                reply_producer,
            } => {
                let name = producer.get().name();
                let timeout = cfg.reply_timeout;
                let reply = match tokio::time::timeout(timeout, producer.get().request(msg, timeout)).await {
                    Ok(reply) => reply?,
                    Err(_) => {
                        return Err(ProduceError::ReplyTimeout {
                            producer: name.to_string(),
                            timeout,
                        }
                        .into());
                    }
                };

                let mut out = msg.clone();
                out.set_payload(reply.payload().to_vec());
                if !cfg.ignore_reply_metadata {
                    out.merge_metadata(&reply);
                }
                reply_chain.get().execute(&mut out).await?;
                match reply_producer {
                    Some(p) if !out.is_producer_skipped() => Ok(p.get().produce(&out).await?),
                    _ => Ok(()),
                }
            }
        }
    }
}
