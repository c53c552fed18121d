//! # Worker pool behind a pooled workflow.
//!
//! Each worker owns a private [`ProcessingChain`] built by the workflow's chain factory and
//! started on creation. Concurrency is bounded by a semaphore of `pool_size` permits held
//! for the whole life of one message.
//!
//! ```text
//! on_message ─► permit ─► spawn on tracker ─► borrow ─► attempt ─► route? ─► give_back
//!                                              │                           │
//!                                      idle (LIFO) or new          idle ≤ max_idle, surplus closed
//! ```
//!
//! ## Rules
//! - Idle workers are reused most-recently-returned first, so cold workers age at the front.
//! - The janitor evicts workers idle longer than `worker_keep_alive` while more than
//!   `min_idle` are idle.
//! - `drain` waits `shutdown_wait` for in-flight messages, then aborts the rest.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use tokio::sync::Semaphore;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::chain::{ChainFactory, ProcessingChain};
use crate::config::PoolConfig;
use crate::error::WorkflowError;
use crate::lifecycle::{Component, Managed};

pub(crate) struct Worker {
    chain: Managed<ProcessingChain>,
    idle_since: Instant,
}

impl Worker {
    pub(crate) fn chain(&self) -> &ProcessingChain {
        self.chain.get()
    }
}

pub(crate) struct WorkerPool {
    cfg: PoolConfig,
    factory: ChainFactory,
    idle: Mutex<VecDeque<Worker>>,
    permits: Arc<Semaphore>,
    tracker: TaskTracker,
    active: AtomicUsize,
    created: AtomicUsize,
    abort: RwLock<CancellationToken>,
    janitor: Mutex<Option<CancellationToken>>,
}

impl WorkerPool {
    pub(crate) fn new(cfg: PoolConfig, factory: ChainFactory) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(cfg.pool_size())),
            cfg,
            factory,
            idle: Mutex::new(VecDeque::new()),
            tracker: TaskTracker::new(),
            active: AtomicUsize::new(0),
            created: AtomicUsize::new(0),
            abort: RwLock::new(CancellationToken::new()),
            janitor: Mutex::new(None),
        }
    }

    pub(crate) fn config(&self) -> &PoolConfig {
        &self.cfg
    }

    pub(crate) fn permits(&self) -> Arc<Semaphore> {
        Arc::clone(&self.permits)
    }

    pub(crate) fn tracker(&self) -> &TaskTracker {
        &self.tracker
    }

    pub(crate) fn abort_token(&self) -> CancellationToken {
        self.abort.read().clone()
    }

    pub(crate) fn idle_count(&self) -> usize {
        self.idle.lock().len()
    }

    pub(crate) fn active_count(&self) -> usize {
        self.active.load(Ordering::Acquire)
    }

    /// Takes an idle worker or creates one.
    pub(crate) async fn borrow(&self) -> Result<Worker, WorkflowError> {
        let reused = self.idle.lock().pop_back();
        let worker = match reused {
            Some(worker) => worker,
            None => self.create().await?,
        };
        self.active.fetch_add(1, Ordering::AcqRel);
        Ok(worker)
    }

    /// Returns a worker; beyond `max_idle` it is closed instead.
    pub(crate) async fn give_back(&self, mut worker: Worker) {
        self.active.fetch_sub(1, Ordering::AcqRel);
        worker.idle_since = Instant::now();
        let surplus = {
            let mut idle = self.idle.lock();
            if idle.len() < self.cfg.max_idle() {
                idle.push_back(worker);
                None
            } else {
                Some(worker)
            }
        };
        if let Some(worker) = surplus {
            retire(worker).await;
        }
    }

    /// Creates workers until `min_idle` are idle.
    pub(crate) async fn warm_up(&self) -> Result<(), WorkflowError> {
        while self.idle_count() < self.cfg.min_idle() {
            let worker = self.create().await?;
            self.idle.lock().push_back(worker);
        }
        Ok(())
    }

    /// Closes workers idle past `worker_keep_alive`, never going below `min_idle`.
    pub(crate) async fn evict_expired(&self) -> usize {
        let Some(keep_alive) = self.cfg.worker_keep_alive() else {
            return 0;
        };
        let expired: Vec<Worker> = {
            let mut idle = self.idle.lock();
            let mut out = Vec::new();
            while idle.len() > self.cfg.min_idle() {
                match idle.front() {
                    Some(w) if w.idle_since.elapsed() >= keep_alive => {
                        if let Some(w) = idle.pop_front() {
                            out.push(w);
                        }
                    }
                    _ => break,
                }
            }
            out
        };
        let n = expired.len();
        for worker in expired {
            retire(worker).await;
        }
        n
    }

    /// Starts the periodic eviction task; a no-op without keep-alive.
    pub(crate) fn start_janitor(self: &Arc<Self>) {
        let Some(keep_alive) = self.cfg.worker_keep_alive() else {
            return;
        };
        let token = CancellationToken::new();
        if let Some(old) = self.janitor.lock().replace(token.clone()) {
            old.cancel();
        }
        let period = (keep_alive / 2).max(Duration::from_millis(10));
        let pool = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut tick = tokio::time::interval(period);
            tick.tick().await;
            loop {
                tokio::select! {
                    _ = token.cancelled() => return,
                    _ = tick.tick() => {}
                }
                let Some(pool) = pool.upgrade() else { return };
                let evicted = pool.evict_expired().await;
                if evicted > 0 {
                    tracing::debug!(evicted, idle = pool.idle_count(), "evicted idle workers");
                }
            }
        });
    }

    /// Waits up to `shutdown_wait` for in-flight messages, then aborts what is left.
    pub(crate) async fn drain(&self) {
        if let Some(token) = self.janitor.lock().take() {
            token.cancel();
        }
        self.tracker.close();
        if tokio::time::timeout(self.cfg.shutdown_wait(), self.tracker.wait())
            .await
            .is_err()
        {
            tracing::warn!(
                in_flight = self.tracker.len(),
                wait = ?self.cfg.shutdown_wait(),
                "pool did not drain in time; aborting in-flight messages"
            );
            self.abort.read().cancel();
            self.tracker.wait().await;
        }
        self.tracker.reopen();
        let mut abort = self.abort.write();
        if abort.is_cancelled() {
            *abort = CancellationToken::new();
        }
    }

    /// Closes every idle worker.
    pub(crate) async fn close_idle(&self) {
        let workers: Vec<Worker> = self.idle.lock().drain(..).collect();
        for worker in workers {
            retire(worker).await;
        }
    }

    async fn create(&self) -> Result<Worker, WorkflowError> {
        let n = self.created.fetch_add(1, Ordering::Relaxed);
        let chain = Managed::new(format!("worker-{n}"), Arc::new((self.factory)()));
        chain
            .request_start()
            .await
            .map_err(|e| WorkflowError::WorkerUnavailable {
                reason: e.to_string(),
            })?;
        Ok(Worker {
            chain,
            idle_since: Instant::now(),
        })
    }
}

async fn retire(worker: Worker) {
    if let Err(e) = worker.chain.request_close().await {
        tracing::warn!(worker = %worker.chain.name(), error = %e, "worker chain failed to close");
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use async_trait::async_trait;

    use super::*;
    use crate::chain::Step;
    use crate::error::ProcessingError;
    use crate::lifecycle::Lifecycle;
    use crate::message::Message;

    struct Counted(Arc<AtomicUsize>);

    #[async_trait]
    impl Lifecycle for Counted {
        async fn close(&self) -> anyhow::Result<()> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[async_trait]
    impl Step for Counted {
        fn name(&self) -> &str {
            "counted"
        }

        async fn process(&self, _msg: &mut Message) -> Result<(), ProcessingError> {
            Ok(())
        }
    }

    fn pool(cfg: PoolConfig) -> (WorkerPool, Arc<AtomicUsize>) {
        let closed = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&closed);
        let factory: ChainFactory = Arc::new(move || {
            ProcessingChain::new().with_step(Arc::new(Counted(Arc::clone(&counter))))
        });
        (WorkerPool::new(cfg, factory), closed)
    }

    #[tokio::test]
    async fn surplus_workers_are_closed_on_return() {
        let (pool, closed) = pool(PoolConfig::default().with_pool_size(3).with_max_idle(1));
        let a = pool.borrow().await.unwrap();
        let b = pool.borrow().await.unwrap();
        assert_eq!(pool.active_count(), 2);

        pool.give_back(a).await;
        pool.give_back(b).await;
        assert_eq!(pool.idle_count(), 1);
        assert_eq!(closed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn warm_up_fills_min_idle() {
        let (pool, _) = pool(PoolConfig::default().with_pool_size(4).with_min_idle(2));
        pool.warm_up().await.unwrap();
        assert_eq!(pool.idle_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn eviction_keeps_min_idle() {
        let cfg = PoolConfig::default()
            .with_pool_size(4)
            .with_min_idle(1)
            .with_worker_keep_alive(Duration::from_secs(5));
        let (pool, closed) = pool(cfg);
        let workers = vec![
            pool.borrow().await.unwrap(),
            pool.borrow().await.unwrap(),
            pool.borrow().await.unwrap(),
        ];
        for w in workers {
            pool.give_back(w).await;
        }

        tokio::time::advance(Duration::from_secs(6)).await;
        assert_eq!(pool.evict_expired().await, 2);
        assert_eq!(pool.idle_count(), 1);
        assert_eq!(closed.load(Ordering::SeqCst), 2);
    }
}
