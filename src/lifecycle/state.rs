//! # Lifecycle state machine.
//!
//! A pure transition table over [`ComponentState`]. Given the current state and a requested
//! [`Transition`], [`ComponentState::plan`] returns the ordered [`Phase`]s (side effects) that
//! must run and the state the component ends in.
//!
//! ```text
//!              Init              Start            Stop           Close
//! Closed       Initialised(i)    Started(i,s)     Closed(-)      Closed(-)
//! Initialised  Initialised(-)    Started(s)       Initialised(-) Closed(c)
//! Started      Started(-)        Started(-)       Stopped(t)     Closed(t,c)
//! Stopped      Initialised(c,i)  Started(i,s)     Stopped(-)     Closed(c)
//!
//! Restart (any state): [stop if Started] → [close unless Closed] → init → start
//! ```
//!
//! ## Rules
//! - A request whose post-condition already holds has an **empty** plan.
//! - Re-init while running is refused (Started + Init is a no-op).
//! - Stopped + Init discards stale resources (close) before initialising again.

use std::fmt;

/// Lifecycle state of a component. Components are constructed `Closed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum ComponentState {
    /// No resources held.
    #[default]
    Closed = 0,
    /// Resources acquired, not processing.
    Initialised = 1,
    /// Processing.
    Started = 2,
    /// Processing paused, resources still held.
    Stopped = 3,
}

impl From<u8> for ComponentState {
    fn from(value: u8) -> Self {
        match value {
            1 => ComponentState::Initialised,
            2 => ComponentState::Started,
            3 => ComponentState::Stopped,
            _ => ComponentState::Closed,
        }
    }
}

impl fmt::Display for ComponentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ComponentState::Closed => "closed",
            ComponentState::Initialised => "initialised",
            ComponentState::Started => "started",
            ComponentState::Stopped => "stopped",
        })
    }
}

/// A lifecycle request issued to a component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Transition {
    /// Acquire resources.
    Init,
    /// Begin processing (initialising first if needed).
    Start,
    /// Pause processing.
    Stop,
    /// Release resources (stopping first if needed).
    Close,
    /// Stop, close, init and start; always lands on `Started`.
    Restart,
}

impl fmt::Display for Transition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Transition::Init => "init",
            Transition::Start => "start",
            Transition::Stop => "stop",
            Transition::Close => "close",
            Transition::Restart => "restart",
        })
    }
}

/// A single side-effect hook.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    /// `Lifecycle::init`
    Init,
    /// `Lifecycle::start`
    Start,
    /// `Lifecycle::stop`
    Stop,
    /// `Lifecycle::close`
    Close,
}

impl Phase {
    /// State recorded once this hook completes successfully.
    pub fn completes_to(self) -> ComponentState {
        match self {
            Phase::Init => ComponentState::Initialised,
            Phase::Start => ComponentState::Started,
            Phase::Stop => ComponentState::Stopped,
            Phase::Close => ComponentState::Closed,
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Phase::Init => "init",
            Phase::Start => "start",
            Phase::Stop => "stop",
            Phase::Close => "close",
        })
    }
}

/// Ordered side effects for one request, and the state they lead to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Plan {
    /// State after every phase completed.
    pub target: ComponentState,
    /// Hooks to run, in order.
    pub phases: &'static [Phase],
}

impl Plan {
    const fn new(target: ComponentState, phases: &'static [Phase]) -> Self {
        Self { target, phases }
    }

    /// True if the request is already satisfied.
    pub fn is_noop(&self) -> bool {
        self.phases.is_empty()
    }
}

impl ComponentState {
    /// Computes the side effects needed to satisfy `transition` from this state.
    pub fn plan(self, transition: Transition) -> Plan {
        use ComponentState::*;
        use Phase as P;

        match (self, transition) {
            (Closed, Transition::Init) => Plan::new(Initialised, &[P::Init]),
            (Closed, Transition::Start) => Plan::new(Started, &[P::Init, P::Start]),
            (Closed, Transition::Stop | Transition::Close) => Plan::new(Closed, &[]),
            (Closed, Transition::Restart) => Plan::new(Started, &[P::Init, P::Start]),

            (Initialised, Transition::Init) => Plan::new(Initialised, &[]),
            (Initialised, Transition::Start) => Plan::new(Started, &[P::Start]),
            (Initialised, Transition::Stop) => Plan::new(Initialised, &[]),
            (Initialised, Transition::Close) => Plan::new(Closed, &[P::Close]),
            (Initialised, Transition::Restart) => {
                Plan::new(Started, &[P::Close, P::Init, P::Start])
            }

            (Started, Transition::Init | Transition::Start) => Plan::new(Started, &[]),
            (Started, Transition::Stop) => Plan::new(Stopped, &[P::Stop]),
            (Started, Transition::Close) => Plan::new(Closed, &[P::Stop, P::Close]),
            (Started, Transition::Restart) => {
                Plan::new(Started, &[P::Stop, P::Close, P::Init, P::Start])
            }

            (Stopped, Transition::Init) => Plan::new(Initialised, &[P::Close, P::Init]),
            (Stopped, Transition::Start) => Plan::new(Started, &[P::Init, P::Start]),
            (Stopped, Transition::Stop) => Plan::new(Stopped, &[]),
            (Stopped, Transition::Close) => Plan::new(Closed, &[P::Close]),
            (Stopped, Transition::Restart) => Plan::new(Started, &[P::Close, P::Init, P::Start]),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL_STATES: [ComponentState; 4] = [
        ComponentState::Closed,
        ComponentState::Initialised,
        ComponentState::Started,
        ComponentState::Stopped,
    ];

    #[test]
    fn table_matches_documented_transitions() {
        use ComponentState::*;
        use Phase as P;

        assert_eq!(Closed.plan(Transition::Start).phases, &[P::Init, P::Start]);
        assert_eq!(Initialised.plan(Transition::Close).phases, &[P::Close]);
        assert_eq!(Started.plan(Transition::Close).phases, &[P::Stop, P::Close]);
        assert_eq!(Stopped.plan(Transition::Init).phases, &[P::Close, P::Init]);
        assert_eq!(Stopped.plan(Transition::Init).target, Initialised);
        assert_eq!(Stopped.plan(Transition::Start).phases, &[P::Init, P::Start]);
    }

    #[test]
    fn requests_in_post_state_are_noops() {
        use ComponentState::*;

        assert!(Closed.plan(Transition::Close).is_noop());
        assert!(Closed.plan(Transition::Stop).is_noop());
        assert!(Initialised.plan(Transition::Init).is_noop());
        assert!(Initialised.plan(Transition::Stop).is_noop());
        assert!(Started.plan(Transition::Start).is_noop());
        assert!(Started.plan(Transition::Init).is_noop());
        assert!(Stopped.plan(Transition::Stop).is_noop());
    }

    #[test]
    fn restart_always_lands_on_started() {
        for state in ALL_STATES {
            let plan = state.plan(Transition::Restart);
            assert_eq!(plan.target, ComponentState::Started, "from {state}");
            assert_eq!(plan.phases.last(), Some(&Phase::Start));
        }
    }

    #[test]
    fn last_phase_completes_to_target() {
        let transitions = [
            Transition::Init,
            Transition::Start,
            Transition::Stop,
            Transition::Close,
            Transition::Restart,
        ];
        for state in ALL_STATES {
            for t in transitions {
                let plan = state.plan(t);
                let reached = plan.phases.last().map(|p| p.completes_to()).unwrap_or(state);
                assert_eq!(reached, plan.target, "{state} + {t}");
            }
        }
    }

    #[test]
    fn state_roundtrips_through_u8() {
        for state in ALL_STATES {
            assert_eq!(ComponentState::from(state as u8), state);
        }
    }
}
