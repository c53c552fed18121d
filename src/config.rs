//! # Runtime configuration.
//!
//! Plain structs with documented defaults:
//!
//! - [`AdapterConfig`] root-level settings (event bus, shutdown grace, cascade strategy)
//! - [`WorkflowConfig`] per-workflow message pipeline settings
//! - [`PoolConfig`] pooled-workflow sizing; setters keep `min_idle ≤ max_idle ≤ pool_size`
//! - [`RetryConfig`] retry handler settings
//!
//! ## Sentinel values
//! - `RetryConfig::retry_limit = 0` → retry forever
//! - `PoolConfig::worker_keep_alive = 0s` → idle workers are never evicted

use std::time::Duration;

use crate::lifecycle::LifecycleStrategy;
use crate::policies::{BackoffPolicy, ProduceFailurePolicy};

/// Root-level settings.
#[derive(Clone, Debug)]
pub struct AdapterConfig {
    /// Capacity of the event bus ring buffer (min 1).
    pub bus_capacity: usize,
    /// How long [`Adapter::shutdown`](crate::Adapter::shutdown) waits for every component
    /// to reach `Closed`.
    pub shutdown_grace: Duration,
    /// How the adapter drives its channels.
    pub strategy: LifecycleStrategy,
}

impl Default for AdapterConfig {
    /// `bus_capacity = 1024`, `shutdown_grace = 60s`, `strategy = Blocking`.
    fn default() -> Self {
        Self {
            bus_capacity: 1024,
            shutdown_grace: Duration::from_secs(60),
            strategy: LifecycleStrategy::Blocking,
        }
    }
}

/// Per-workflow pipeline settings.
#[derive(Clone, Debug)]
pub struct WorkflowConfig {
    /// How long a message waits for its channel to become available.
    pub channel_unavailable_wait: Duration,
    /// Produce the processed message (`true`) or the message as consumed (`false`).
    pub use_processed_message: bool,
    /// Upper bound on a request/reply round trip.
    pub reply_timeout: Duration,
    /// Keep only request metadata on the reply instead of merging the reply's.
    pub ignore_reply_metadata: bool,
    /// What to restart after a produce failure.
    pub produce_policy: ProduceFailurePolicy,
}

impl Default for WorkflowConfig {
    /// `channel_unavailable_wait = 30s`, `use_processed_message = true`,
    /// `reply_timeout = 30s`, `ignore_reply_metadata = false`, `produce_policy = None`.
    fn default() -> Self {
        Self {
            channel_unavailable_wait: Duration::from_secs(30),
            use_processed_message: true,
            reply_timeout: Duration::from_secs(30),
            ignore_reply_metadata: false,
            produce_policy: ProduceFailurePolicy::None,
        }
    }
}

/// Pooled-workflow sizing.
///
/// Fields are private so every setter can keep `min_idle ≤ max_idle ≤ pool_size`.
///
/// ```rust
/// use flowvisor::PoolConfig;
///
/// let cfg = PoolConfig::default().with_max_idle(4).with_pool_size(2);
/// assert_eq!((cfg.pool_size(), cfg.max_idle(), cfg.min_idle()), (2, 2, 1));
///
/// let cfg = PoolConfig::default().with_max_idle(2).with_min_idle(5);
/// assert_eq!((cfg.min_idle(), cfg.max_idle()), (5, 5));
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PoolConfig {
    pool_size: usize,
    min_idle: usize,
    max_idle: usize,
    worker_keep_alive: Duration,
    shutdown_wait: Duration,
}

impl Default for PoolConfig {
    /// `pool_size = 10`, `min_idle = 1`, `max_idle = 10`, `worker_keep_alive = 60s`,
    /// `shutdown_wait = 60s`.
    fn default() -> Self {
        Self {
            pool_size: 10,
            min_idle: 1,
            max_idle: 10,
            worker_keep_alive: Duration::from_secs(60),
            shutdown_wait: Duration::from_secs(60),
        }
    }
}

impl PoolConfig {
    /// Maximum concurrent messages and workers (min 1); lowers the idle bounds to fit.
    pub fn with_pool_size(mut self, n: usize) -> Self {
        self.pool_size = n.max(1);
        self.max_idle = self.max_idle.min(self.pool_size);
        self.min_idle = self.min_idle.min(self.max_idle);
        self
    }

    /// Idle workers kept after use; capped at `pool_size`, lowers `min_idle` to fit.
    pub fn with_max_idle(mut self, n: usize) -> Self {
        self.max_idle = n.min(self.pool_size);
        self.min_idle = self.min_idle.min(self.max_idle);
        self
    }

    /// Workers created on start and never evicted; capped at `pool_size`, raises
    /// `max_idle` to fit.
    pub fn with_min_idle(mut self, n: usize) -> Self {
        self.min_idle = n.min(self.pool_size);
        self.max_idle = self.max_idle.max(self.min_idle);
        self
    }

    pub fn with_worker_keep_alive(mut self, d: Duration) -> Self {
        self.worker_keep_alive = d;
        self
    }

    pub fn with_shutdown_wait(mut self, d: Duration) -> Self {
        self.shutdown_wait = d;
        self
    }

    pub fn pool_size(&self) -> usize {
        self.pool_size
    }

    pub fn min_idle(&self) -> usize {
        self.min_idle
    }

    pub fn max_idle(&self) -> usize {
        self.max_idle
    }

    /// `None` when idle workers are never evicted.
    pub fn worker_keep_alive(&self) -> Option<Duration> {
        if self.worker_keep_alive.is_zero() {
            None
        } else {
            Some(self.worker_keep_alive)
        }
    }

    pub fn shutdown_wait(&self) -> Duration {
        self.shutdown_wait
    }
}

/// Retry handler settings.
#[derive(Clone, Debug)]
pub struct RetryConfig {
    /// Attempts after the original failure (`0` = unbounded).
    pub retry_limit: u32,
    /// Interval between attempts.
    pub backoff: BackoffPolicy,
    /// How long an attempt waits for the per-message lock.
    pub lock_timeout: Duration,
}

impl Default for RetryConfig {
    /// `retry_limit = 10`, constant 10 minute backoff, `lock_timeout = 10s`.
    fn default() -> Self {
        Self {
            retry_limit: 10,
            backoff: BackoffPolicy::default(),
            lock_timeout: Duration::from_secs(10),
        }
    }
}

impl RetryConfig {
    /// Retry limit as an `Option` (`None` = unbounded).
    #[inline]
    pub fn limit(&self) -> Option<u32> {
        if self.retry_limit == 0 {
            None
        } else {
            Some(self.retry_limit)
        }
    }
}
