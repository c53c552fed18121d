//! Channel availability flag shared by a channel and its workflows.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

/// Outcome of [`Availability::wait`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Wait {
    Available,
    TimedOut,
    Cancelled,
}

/// Set by the owning channel while it is started.
#[derive(Debug, Default)]
pub struct Availability {
    up: AtomicBool,
    changed: Notify,
}

impl Availability {
    /// Starts unavailable.
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts available; used by workflows that no channel owns.
    pub fn always() -> Self {
        Self {
            up: AtomicBool::new(true),
            changed: Notify::new(),
        }
    }

    pub fn is_available(&self) -> bool {
        self.up.load(Ordering::Acquire)
    }

    pub(crate) fn set(&self, up: bool) {
        self.up.store(up, Ordering::Release);
        if up {
            self.changed.notify_waiters();
        }
    }

    /// Waits until available, at most `limit`, aborting when `cancel` fires.
    pub(crate) async fn wait(&self, limit: Duration, cancel: &CancellationToken) -> Wait {
        let deadline = tokio::time::Instant::now() + limit;
        loop {
            let notified = self.changed.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.is_available() {
                return Wait::Available;
            }
            tokio::select! {
                _ = cancel.cancelled() => return Wait::Cancelled,
                _ = tokio::time::sleep_until(deadline) => {
                    return if self.is_available() { Wait::Available } else { Wait::TimedOut };
                }
                _ = &mut notified => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    #[tokio::test(start_paused = true)]
    async fn times_out_when_never_available() {
        let a = Availability::new();
        let res = a.wait(Duration::from_secs(5), &CancellationToken::new()).await;
        assert_eq!(res, Wait::TimedOut);
    }

    #[tokio::test(start_paused = true)]
    async fn wakes_when_set() {
        let a = Arc::new(Availability::new());
        let setter = Arc::clone(&a);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            setter.set(true);
        });
        let res = a.wait(Duration::from_secs(30), &CancellationToken::new()).await;
        assert_eq!(res, Wait::Available);
    }

    #[tokio::test]
    async fn cancellation_wins() {
        let a = Availability::new();
        let token = CancellationToken::new();
        token.cancel();
        assert_eq!(a.wait(Duration::from_secs(30), &token).await, Wait::Cancelled);
    }
}
