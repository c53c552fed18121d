//! # Processing chain.
//!
//! An ordered list of [`Step`]s executed against a message, in one of two modes:
//!
//! ```text
//! Sequential:  msg ─► step1 ─► step2 ─► step3        (in place, first failure stops)
//! Isolated:    msg ─┬► clone ─► step1
//!                   ├► clone ─► step2                (concurrently; original untouched)
//!                   └► clone ─► step3
//! ```
//!
//! Every executed step appends a [`StepEvent`](crate::StepEvent) marker to the message it
//! ran against. In isolated mode markers live on the clones and are discarded with them,
//! and a failing clone merges nothing back into the original.

use std::panic::AssertUnwindSafe;

use anyhow::Context;
use async_trait::async_trait;
use futures::FutureExt;
use futures::future::join_all;

use super::step::{Step, StepRef};
use crate::error::{ProcessingError, panic_message};
use crate::lifecycle::Lifecycle;
use crate::message::Message;

/// How a chain applies its steps.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ChainMode {
    /// Steps run one after another on the message itself.
    #[default]
    Sequential,
    /// Every step runs on its own clone of the message.
    Isolated,
}

/// Ordered, lifecycle-managed list of steps.
#[derive(Clone, Default)]
pub struct ProcessingChain {
    steps: Vec<StepRef>,
    mode: ChainMode,
}

impl ProcessingChain {
    /// Empty sequential chain.
    pub fn new() -> Self {
        Self::default()
    }

    /// Empty isolated chain.
    pub fn isolated() -> Self {
        Self {
            steps: Vec::new(),
            mode: ChainMode::Isolated,
        }
    }

    /// Appends a step.
    pub fn with_step(mut self, step: StepRef) -> Self {
        self.steps.push(step);
        self
    }

    pub fn push(&mut self, step: StepRef) {
        self.steps.push(step);
    }

    pub fn mode(&self) -> ChainMode {
        self.mode
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Runs the chain against `msg`.
    pub async fn execute(&self, msg: &mut Message) -> Result<(), ProcessingError> {
        match self.mode {
            ChainMode::Sequential => {
                for step in &self.steps {
                    run_step(step.as_ref(), msg).await?;
                }
                Ok(())
            }
            ChainMode::Isolated => {
                let runs = self.steps.iter().map(|step| {
                    let mut copy = msg.clone();
                    async move { run_step(step.as_ref(), &mut copy).await }
                });
                join_all(runs).await.into_iter().collect()
            }
        }
    }
}

async fn run_step(step: &dyn Step, msg: &mut Message) -> Result<(), ProcessingError> {
    let res = match AssertUnwindSafe(step.process(msg)).catch_unwind().await {
        Ok(res) => res,
        Err(payload) => Err(ProcessingError::Panicked {
            step: step.name().to_string(),
            message: panic_message(payload.as_ref()),
        }),
    };
    msg.record_event(step.name(), res.is_ok());
    res
}

#[async_trait]
impl Lifecycle for ProcessingChain {
    async fn init(&self) -> anyhow::Result<()> {
        for (i, step) in self.steps.iter().enumerate() {
            if let Err(e) = step.init().await {
                for done in self.steps[..i].iter().rev() {
                    if let Err(close) = done.close().await {
                        tracing::warn!(step = done.name(), error = %close, "step close after failed init failed");
                    }
                }
                return Err(e.context(format!("step '{}' init", step.name())));
            }
        }
        Ok(())
    }

    async fn start(&self) -> anyhow::Result<()> {
        for step in &self.steps {
            step.start()
                .await
                .with_context(|| format!("step '{}' start", step.name()))?;
        }
        Ok(())
    }

    async fn stop(&self) -> anyhow::Result<()> {
        let mut first = None;
        for step in self.steps.iter().rev() {
            if let Err(e) = step.stop().await {
                tracing::warn!(step = step.name(), error = %e, "step stop failed");
                first.get_or_insert(e);
            }
        }
        first.map_or(Ok(()), Err)
    }

    async fn close(&self) -> anyhow::Result<()> {
        let mut first = None;
        for step in self.steps.iter().rev() {
            if let Err(e) = step.close().await {
                tracing::warn!(step = step.name(), error = %e, "step close failed");
                first.get_or_insert(e);
            }
        }
        first.map_or(Ok(()), Err)
    }
}
