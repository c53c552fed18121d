//! # LogWriter: renders runtime events through `tracing`.
//!
//! Lifecycle and retry noise goes to `debug`/`info`; failures go to `warn`/`error`.
//!
//! ```text
//! INFO  component=orders state=started          state changed
//! WARN  component=orders-wf message=6f1c… reason="produce to 'jms' failed: down"  message failed
//! INFO  component=orders-wf message=6f1c… attempt=2 delay_ms=500  retry scheduled
//! ERROR component=orders-wf message=6f1c… attempt=10  retries exhausted
//! ```

use async_trait::async_trait;

use crate::events::{Event, EventKind};
use crate::subscribers::Subscribe;

/// Subscriber that logs every event.
#[derive(Default)]
pub struct LogWriter;

impl LogWriter {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Subscribe for LogWriter {
    async fn on_event(&self, e: &Event) {
        let component = e.component.as_deref().unwrap_or("-");
        let message = e.message.as_deref().unwrap_or("-");
        let reason = e.reason.as_deref().unwrap_or("-");

        match e.kind {
            EventKind::StateChanged => {
                let state = e.state.map(|s| s.to_string()).unwrap_or_default();
                tracing::info!(component, state = %state, "state changed");
            }
            EventKind::LifecycleFailed | EventKind::CascadeChildFailed => {
                tracing::warn!(component, reason, kind = ?e.kind, "lifecycle failure");
            }
            EventKind::MessageFailed => {
                tracing::warn!(component, message, reason, "message failed");
            }
            EventKind::MessageRecovered => {
                tracing::info!(component, message, "message handed to recovery chain");
            }
            EventKind::RetryScheduled => {
                tracing::info!(component, message, attempt = ?e.attempt, delay_ms = ?e.delay_ms, "retry scheduled");
            }
            EventKind::RetrySucceeded => {
                tracing::info!(component, message, attempt = ?e.attempt, "retry succeeded");
            }
            EventKind::RetryExhausted => {
                tracing::error!(component, message, attempt = ?e.attempt, "retries exhausted");
            }
            EventKind::RetryInterrupted => {
                tracing::warn!(message, reason, "retry interrupted");
            }
            EventKind::RestartRequested => {
                tracing::warn!(component, reason, "restart requested after produce failure");
            }
            EventKind::ConnectionFailed => {
                tracing::error!(component, reason, "connection failed");
            }
            EventKind::DependentRecovered => {
                tracing::info!(component, state = ?e.state, "dependent recovered");
            }
            EventKind::ShutdownRequested => tracing::info!("shutdown requested"),
            EventKind::AllStoppedWithin => tracing::info!("all components closed within grace"),
            EventKind::GraceExceeded => tracing::error!("shutdown grace exceeded"),
            EventKind::SubscriberOverflow | EventKind::SubscriberPanicked => {
                tracing::warn!(subscriber = component, reason, kind = ?e.kind, "subscriber trouble");
            }
        }
    }

    fn name(&self) -> &'static str {
        "LogWriter"
    }
}
