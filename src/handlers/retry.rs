//! # Retry handler: re-attempts a failed message before giving up.
//!
//! Every failed message gets its own retry loop, spawned on the handler's task tracker.
//!
//! ```text
//! handle_processing_failure(msg)
//!   └─► RetryState { attempts, lock, retrying, stop } registered under msg.id()
//!         └─► loop:
//!               ├─ limit reached?            → RetryExhausted  → recovery chain
//!               ├─ sleep(backoff.next(n))    ─┐ stop cancelled → RetryInterrupted → recovery chain
//!               ├─ lock (lock_timeout)        │ (busy → next interval)
//!               └─ workflow.process_once(msg)─┘ Ok → RetrySucceeded (no recovery)
//! ```
//!
//! ## Rules
//! - Attempts for one message are serialized by its lock; operator retries take the same lock.
//! - A message leaves the loop exactly once: success, exhaustion, interruption or operator
//!   fail. Every exit except success runs the recovery chain.
//! - `stop`/`close` cancel every loop (and any in-flight attempt) and wait for them to
//!   finish their recovery before the recovery chain itself is stopped.
//! - Messages whose workflow is unknown (or gone) go straight to recovery.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Weak};

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use super::processing::{ProcessingExceptionHandler, run_recovery};
use crate::chain::ProcessingChain;
use crate::config::RetryConfig;
use crate::events::{Bus, Event, EventKind};
use crate::lifecycle::{Guarded, Lifecycle, LifecycleGuard};
use crate::message::{Message, MessageId, WORKFLOW_ID_KEY};
use crate::workflow::Workflow;

struct RetryState {
    msg: Message,
    workflow: Weak<Workflow>,
    workflow_id: String,
    attempts: AtomicU32,
    lock: tokio::sync::Mutex<()>,
    retrying: AtomicBool,
    finished: AtomicBool,
    stop: CancellationToken,
}

enum Attempt {
    Succeeded,
    Failed,
    Busy,
    Interrupted,
    Gone,
    Finished,
}

/// Exit path of a retry loop.
enum Exit {
    Succeeded(u32),
    Exhausted(u32),
    Interrupted(&'static str),
    WorkflowGone,
}

/// Retry handler with per-message loops and operator controls.
pub struct RetryMessageErrorHandler {
    me: Weak<Self>,
    guard: LifecycleGuard,
    cfg: RetryConfig,
    recovery: ProcessingChain,
    always_handle: bool,
    workflows: RwLock<HashMap<String, Weak<Workflow>>>,
    retries: Mutex<HashMap<MessageId, Arc<RetryState>>>,
    tracker: TaskTracker,
    cancel: RwLock<CancellationToken>,
}

impl RetryMessageErrorHandler {
    /// Creates the handler; `recovery` receives every message that is not retried
    /// successfully.
    pub fn new(name: impl Into<Arc<str>>, cfg: RetryConfig, recovery: ProcessingChain) -> Arc<Self> {
        Self::build(name.into(), cfg, recovery, false)
    }

    /// Same as [`new`](Self::new) with `always_handle` set.
    pub fn always_handling(
        name: impl Into<Arc<str>>,
        cfg: RetryConfig,
        recovery: ProcessingChain,
    ) -> Arc<Self> {
        Self::build(name.into(), cfg, recovery, true)
    }

    fn build(name: Arc<str>, cfg: RetryConfig, recovery: ProcessingChain, always_handle: bool) -> Arc<Self> {
        Arc::new_cyclic(|me| Self {
            me: me.clone(),
            guard: LifecycleGuard::new(name),
            cfg,
            recovery,
            always_handle,
            workflows: RwLock::new(HashMap::new()),
            retries: Mutex::new(HashMap::new()),
            tracker: TaskTracker::new(),
            cancel: RwLock::new(CancellationToken::new()),
        })
    }

    pub fn config(&self) -> &RetryConfig {
        &self.cfg
    }

    /// Ids of every message currently held for retry.
    pub fn waiting_for_retry(&self) -> Vec<MessageId> {
        let mut ids: Vec<MessageId> = self.retries.lock().keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// True while an attempt for `id` is running.
    pub fn is_retrying(&self, id: MessageId) -> bool {
        self.retries
            .lock()
            .get(&id)
            .is_some_and(|s| s.retrying.load(Ordering::Acquire))
    }

    /// Attempts `id` immediately under its lock.
    ///
    /// Returns `true` when the attempt succeeded and the message left the retry queue.
    pub async fn retry_message(&self, id: MessageId) -> bool {
        let Some(state) = self.state(id) else {
            return false;
        };
        let _held = state.lock.lock().await;
        match self.run_attempt(&state).await {
            Attempt::Succeeded => {
                let n = state.attempts.load(Ordering::Acquire);
                self.finish(&state, Exit::Succeeded(n)).await;
                true
            }
            _ => false,
        }
    }

    /// Stops retrying `id` and hands it to the recovery chain.
    ///
    /// Returns `false` if the message is not held for retry.
    pub async fn fail_message(&self, id: MessageId) -> bool {
        match self.state(id) {
            Some(state) => {
                self.finish(&state, Exit::Interrupted("failed by operator")).await;
                true
            }
            None => false,
        }
    }

    /// [`fail_message`](Self::fail_message) for every held message.
    pub async fn fail_all(&self) -> usize {
        let states: Vec<Arc<RetryState>> = self.retries.lock().values().cloned().collect();
        let mut failed = 0;
        for state in states {
            if self.finish(&state, Exit::Interrupted("failed by operator")).await {
                failed += 1;
            }
        }
        failed
    }

    fn state(&self, id: MessageId) -> Option<Arc<RetryState>> {
        self.retries.lock().get(&id).cloned()
    }

    fn publish(&self, ev: impl FnOnce() -> Event) {
        if let Some(bus) = self.guard.bus() {
            bus.publish(ev());
        }
    }

    async fn retry_loop(self: Arc<Self>, state: Arc<RetryState>) {
        loop {
            let made = state.attempts.load(Ordering::Acquire);
            if self.cfg.limit().is_some_and(|limit| made >= limit) {
                self.finish(&state, Exit::Exhausted(made)).await;
                return;
            }

            let delay = self.cfg.backoff.next(made);
            self.publish(|| {
                Event::new(EventKind::RetryScheduled)
                    .with_component(state.workflow_id.as_str())
                    .with_message(state.msg.id().to_string())
                    .with_attempt(made + 1)
                    .with_delay(delay)
            });
            tokio::select! {
                _ = state.stop.cancelled() => {
                    self.finish(&state, Exit::Interrupted("retry handler stopped")).await;
                    return;
                }
                _ = tokio::time::sleep(delay) => {}
            }

            let outcome = match tokio::time::timeout(self.cfg.lock_timeout, state.lock.lock()).await {
                Ok(_held) => self.run_attempt(&state).await,
                Err(_) => Attempt::Busy,
            };
            match outcome {
                Attempt::Succeeded => {
                    let n = state.attempts.load(Ordering::Acquire);
                    self.finish(&state, Exit::Succeeded(n)).await;
                    return;
                }
                Attempt::Failed => {}
                Attempt::Busy => {
                    tracing::debug!(message = %state.msg.id(), "retry lock busy; waiting for next interval");
                }
                Attempt::Interrupted => {
                    self.finish(&state, Exit::Interrupted("retry handler stopped")).await;
                    return;
                }
                Attempt::Gone => {
                    self.finish(&state, Exit::WorkflowGone).await;
                    return;
                }
                Attempt::Finished => return,
            }
        }
    }

    /// One attempt; the caller holds the message lock.
    async fn run_attempt(&self, state: &RetryState) -> Attempt {
        if state.finished.load(Ordering::Acquire) {
            return Attempt::Finished;
        }
        let Some(workflow) = state.workflow.upgrade() else {
            return Attempt::Gone;
        };

        state.retrying.store(true, Ordering::Release);
        let n = state.attempts.fetch_add(1, Ordering::AcqRel) + 1;
        let res = tokio::select! {
            _ = state.stop.cancelled() => None,
            res = workflow.process_once(state.msg.clone()) => Some(res),
        };
        state.retrying.store(false, Ordering::Release);

        match res {
            None => Attempt::Interrupted,
            Some(Ok(())) => Attempt::Succeeded,
            Some(Err(e)) => {
                tracing::warn!(
                    workflow = %state.workflow_id,
                    message = %state.msg.id(),
                    attempt = n,
                    error = %e,
                    "retry attempt failed"
                );
                Attempt::Failed
            }
        }
    }

    /// Removes the message and runs the exit action; only the first caller wins.
    async fn finish(&self, state: &RetryState, exit: Exit) -> bool {
        if state.finished.swap(true, Ordering::AcqRel) {
            return false;
        }
        self.retries.lock().remove(&state.msg.id());
        state.stop.cancel();

        let id = state.msg.id().to_string();
        let wf = state.workflow_id.as_str();
        match exit {
            Exit::Succeeded(n) => {
                tracing::info!(workflow = wf, message = %id, attempt = n, "retry succeeded");
                self.publish(|| {
                    Event::new(EventKind::RetrySucceeded)
                        .with_component(wf)
                        .with_message(id.clone())
                        .with_attempt(n)
                });
                return true;
            }
            Exit::Exhausted(n) => {
                tracing::error!(workflow = wf, message = %id, attempts = n, "retry limit reached");
                self.publish(|| {
                    Event::new(EventKind::RetryExhausted)
                        .with_component(wf)
                        .with_message(id.clone())
                        .with_attempt(n)
                });
            }
            Exit::Interrupted(reason) => {
                tracing::warn!(workflow = wf, message = %id, reason, "retry interrupted");
                self.publish(|| {
                    Event::new(EventKind::RetryInterrupted)
                        .with_message(id.clone())
                        .with_reason(reason)
                });
            }
            Exit::WorkflowGone => {
                tracing::warn!(workflow = wf, message = %id, "workflow no longer registered");
            }
        }
        let name = self.guard.name();
        run_recovery(&name, &self.recovery, state.msg.clone(), &self.guard.bus()).await;
        true
    }

    /// Cancels every loop and waits until each has run its exit action.
    async fn drain(&self) {
        self.cancel.read().cancel();
        self.tracker.close();
        self.tracker.wait().await;
        self.tracker.reopen();
    }
}

#[async_trait]
impl Lifecycle for RetryMessageErrorHandler {
    async fn init(&self) -> anyhow::Result<()> {
        self.recovery.init().await
    }

    async fn start(&self) -> anyhow::Result<()> {
        {
            let mut cancel = self.cancel.write();
            if cancel.is_cancelled() {
                *cancel = CancellationToken::new();
            }
        }
        self.recovery.start().await
    }

    async fn stop(&self) -> anyhow::Result<()> {
        self.drain().await;
        self.recovery.stop().await
    }

    async fn close(&self) -> anyhow::Result<()> {
        self.drain().await;
        self.recovery.close().await
    }
}

impl Guarded for RetryMessageErrorHandler {
    fn guard(&self) -> &LifecycleGuard {
        &self.guard
    }
}

#[async_trait]
impl ProcessingExceptionHandler for RetryMessageErrorHandler {
    fn kind(&self) -> &'static str {
        "retry"
    }

    async fn handle_processing_failure(&self, msg: Message) {
        let name = self.guard.name();
        let token = self.cancel.read().clone();
        if token.is_cancelled() {
            tracing::warn!(handler = %name, message = %msg.id(), "retry handler stopped; recovering immediately");
            run_recovery(&name, &self.recovery, msg, &self.guard.bus()).await;
            return;
        }

        let workflow_id = msg.metadata(WORKFLOW_ID_KEY).unwrap_or_default().to_string();
        let workflow = self.workflows.read().get(&workflow_id).cloned();
        let (Some(workflow), Some(me)) = (workflow, self.me.upgrade()) else {
            tracing::warn!(handler = %name, workflow = %workflow_id, message = %msg.id(), "no workflow to retry against");
            run_recovery(&name, &self.recovery, msg, &self.guard.bus()).await;
            return;
        };

        let state = Arc::new(RetryState {
            workflow,
            workflow_id,
            attempts: AtomicU32::new(0),
            lock: tokio::sync::Mutex::new(()),
            retrying: AtomicBool::new(false),
            finished: AtomicBool::new(false),
            stop: token.child_token(),
            msg,
        });
        self.retries.lock().insert(state.msg.id(), Arc::clone(&state));
        self.tracker.spawn(me.retry_loop(state));
    }

    fn always_handle(&self) -> bool {
        self.always_handle
    }

    fn register_workflow(&self, workflow: &Arc<Workflow>) {
        self.workflows
            .write()
            .insert(workflow.workflow_id(), Arc::downgrade(workflow));
    }

    fn unregister_workflow(&self, workflow_id: &str) {
        self.workflows.write().remove(workflow_id);
    }

    fn attach_bus(&self, bus: Bus) {
        self.guard.attach_bus(bus);
    }
}
