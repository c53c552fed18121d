//! # Last-known component states, ordered by event sequence.
//!
//! [`StateTracker`] listens for `StateChanged` events and remembers the newest state per
//! component. The adapter asks it which components never reached `Closed` when the
//! shutdown grace runs out.
//!
//! ## Rules
//! - Only `StateChanged` events update a component's state.
//! - Events with `seq <= last_seq` for the same component are ignored (stale).
//! - Reads are eventually consistent with the bus.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::events::{Event, EventKind};
use crate::lifecycle::ComponentState;
use crate::subscribers::Subscribe;

#[derive(Debug, Clone, Copy)]
struct Seen {
    last_seq: u64,
    state: ComponentState,
}

/// Subscriber tracking the last recorded state of every component.
#[derive(Default)]
pub struct StateTracker {
    seen: RwLock<HashMap<String, Seen>>,
}

impl StateTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Applies `ev` if it is a newer `StateChanged` for its component.
    pub async fn update(&self, ev: &Event) -> bool {
        let (EventKind::StateChanged, Some(name), Some(state)) =
            (ev.kind, ev.component.as_deref(), ev.state)
        else {
            return false;
        };

        let mut seen = self.seen.write().await;
        match seen.get_mut(name) {
            Some(entry) if ev.seq <= entry.last_seq => false,
            Some(entry) => {
                *entry = Seen {
                    last_seq: ev.seq,
                    state,
                };
                true
            }
            None => {
                seen.insert(
                    name.to_string(),
                    Seen {
                        last_seq: ev.seq,
                        state,
                    },
                );
                true
            }
        }
    }

    /// Last known state of `name`.
    pub async fn state_of(&self, name: &str) -> Option<ComponentState> {
        self.seen.read().await.get(name).map(|s| s.state)
    }

    /// Sorted names of components whose last known state is not `Closed`.
    pub async fn not_closed(&self) -> Vec<String> {
        let seen = self.seen.read().await;
        let mut names: Vec<String> = seen
            .iter()
            .filter(|(_, s)| s.state != ComponentState::Closed)
            .map(|(name, _)| name.clone())
            .collect();
        names.sort_unstable();
        names
    }
}

#[async_trait]
impl Subscribe for StateTracker {
    async fn on_event(&self, event: &Event) {
        self.update(event).await;
    }

    fn name(&self) -> &'static str {
        "state-tracker"
    }

    fn queue_capacity(&self) -> usize {
        4096
    }
}
