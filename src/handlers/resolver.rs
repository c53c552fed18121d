//! # Effective handler resolution.
//!
//! Scopes are walked closest-first (workflow → channel → root):
//!
//! ```text
//! processing:  primary    = first configured scope, else Null
//!              escalations = outer scopes whose handler has always_handle()
//! connection:  first configured of (connection, channel, root), else Null
//! ```

use std::sync::Arc;

use super::connection::{ConnectionHandlerRef, NullConnectionHandler};
use super::processing::{HandlerRef, NullProcessingHandler};
use crate::message::Message;

/// The handlers a workflow routes failures to.
#[derive(Clone)]
pub struct ResolvedHandler {
    primary: HandlerRef,
    escalations: Vec<HandlerRef>,
}

impl ResolvedHandler {
    /// Handler that owns the failure.
    pub fn primary(&self) -> &HandlerRef {
        &self.primary
    }

    /// Outer-scope handlers that also see every failure.
    pub fn escalations(&self) -> &[HandlerRef] {
        &self.escalations
    }

    /// Primary first, then escalations.
    pub fn all(&self) -> impl Iterator<Item = &HandlerRef> {
        std::iter::once(&self.primary).chain(self.escalations.iter())
    }

    /// Hands `msg` to the primary and then to every escalation.
    pub async fn handle(&self, msg: Message) {
        if self.escalations.is_empty() {
            self.primary.handle_processing_failure(msg).await;
            return;
        }
        self.primary.handle_processing_failure(msg.clone()).await;
        for handler in &self.escalations {
            handler.handle_processing_failure(msg.clone()).await;
        }
    }

    pub(crate) fn contains(&self, handler: &HandlerRef) -> bool {
        self.all().any(|h| Arc::ptr_eq(h, handler))
    }
}

/// Resolves from `scopes` ordered closest-first.
pub fn resolve_processing_handler(scopes: &[Option<HandlerRef>]) -> ResolvedHandler {
    let mut configured = scopes.iter().flatten();
    let Some(primary) = configured.next().cloned() else {
        return ResolvedHandler {
            primary: NullProcessingHandler::arc(),
            escalations: Vec::new(),
        };
    };

    let mut escalations: Vec<HandlerRef> = Vec::new();
    for outer in configured {
        let duplicate =
            Arc::ptr_eq(outer, &primary) || escalations.iter().any(|e| Arc::ptr_eq(e, outer));
        if outer.always_handle() && !duplicate {
            escalations.push(Arc::clone(outer));
        }
    }
    ResolvedHandler {
        primary,
        escalations,
    }
}

/// First configured of `own`, `channel`, `root`; Null otherwise.
pub fn resolve_connection_handler(
    own: Option<&ConnectionHandlerRef>,
    channel: Option<&ConnectionHandlerRef>,
    root: Option<&ConnectionHandlerRef>,
) -> ConnectionHandlerRef {
    own.or(channel)
        .or(root)
        .cloned()
        .unwrap_or_else(|| Arc::new(NullConnectionHandler))
}
