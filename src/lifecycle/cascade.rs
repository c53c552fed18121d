//! # Container cascade.
//!
//! Propagates one lifecycle request from a container into its ordered children.
//!
//! ```text
//!                 Blocking                         NonBlocking
//! Init/Start  in order, first failure aborts    one task per child, all awaited;
//!             the rest and propagates           failures logged + published
//! Stop/Close  in order, failures logged,        one task per child, all awaited;
//!             every child is attempted          failures logged + published
//! ```
//!
//! ## Rules
//! - Init/Start are issued to **every** child, even when the container itself was already
//!   at target: a child that drifted below (e.g. closed directly) is driven back up.
//! - Stop/Close never fail: a child's error must not keep siblings or the container running.
//! - NonBlocking cascades are structured: the task group is joined before returning.

use std::sync::Arc;

use tokio::task::JoinSet;

use super::component::{Component, Lifecycle};
use super::guard::{LifecycleGuard, LifecycleSession};
use super::state::{ComponentState, Transition};
use crate::error::LifecycleError;
use crate::events::{Bus, Event, EventKind, publish_to};

/// How a container drives its children.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LifecycleStrategy {
    /// Children transition fully, one after another (default).
    #[default]
    Blocking,
    /// Children transition concurrently; failures never propagate.
    NonBlocking,
}

/// Drives `transition` into `children` under `strategy`.
///
/// Returns an error only for a Blocking Init/Start (or Restart) cascade whose child failed.
pub async fn cascade<C>(
    strategy: LifecycleStrategy,
    children: &[Arc<C>],
    transition: Transition,
    bus: &Option<Bus>,
) -> Result<(), LifecycleError>
where
    C: Component + ?Sized + 'static,
{
    let best_effort = matches!(transition, Transition::Stop | Transition::Close);

    match strategy {
        LifecycleStrategy::Blocking => {
            for child in children {
                match child.request(transition).await {
                    Ok(_) => {}
                    Err(e) if best_effort => report(bus, &child.name(), transition, &e),
                    Err(e) => return Err(e),
                }
            }
        }
        LifecycleStrategy::NonBlocking => {
            let mut set = JoinSet::new();
            for child in children {
                let child = Arc::clone(child);
                set.spawn(async move {
                    let res = child.request(transition).await;
                    (child.name(), res)
                });
            }
            while let Some(joined) = set.join_next().await {
                match joined {
                    Ok((_, Ok(_))) => {}
                    Ok((name, Err(e))) => report(bus, &name, transition, &e),
                    Err(join_err) => {
                        tracing::error!(%transition, error = %join_err, "cascade task aborted");
                    }
                }
            }
        }
    }
    Ok(())
}

/// Runs a container request: own hooks plus the cascade into `children`, all under the
/// container's guard.
///
/// ```text
/// Init/Start   own hooks ──► cascade(children)
/// Stop/Close   cascade(children) ──► own hooks
/// Restart      Close, then Start
/// ```
pub(crate) async fn request_container<L, C>(
    guard: &LifecycleGuard,
    own: &L,
    strategy: LifecycleStrategy,
    children: &[Arc<C>],
    transition: Transition,
) -> Result<ComponentState, LifecycleError>
where
    L: Lifecycle + ?Sized,
    C: Component + ?Sized + 'static,
{
    let mut session = guard.lock().await;
    if transition == Transition::Restart {
        container_step(&mut session, own, strategy, children, Transition::Close).await?;
        return container_step(&mut session, own, strategy, children, Transition::Start).await;
    }
    container_step(&mut session, own, strategy, children, transition).await
}

async fn container_step<L, C>(
    session: &mut LifecycleSession<'_>,
    own: &L,
    strategy: LifecycleStrategy,
    children: &[Arc<C>],
    transition: Transition,
) -> Result<ComponentState, LifecycleError>
where
    L: Lifecycle + ?Sized,
    C: Component + ?Sized + 'static,
{
    let bus = session.bus();
    match transition {
        Transition::Init | Transition::Start => {
            session.apply(own, transition).await?;
            cascade(strategy, children, transition, &bus).await?;
        }
        _ => {
            cascade(strategy, children, transition, &bus).await?;
            session.apply(own, transition).await?;
        }
    }
    Ok(session.state())
}

fn report(bus: &Option<Bus>, child: &str, transition: Transition, err: &LifecycleError) {
    tracing::warn!(
        child,
        %transition,
        error = %err,
        "child failed during cascade; continuing"
    );
    publish_to(bus, || {
        Event::new(EventKind::CascadeChildFailed)
            .with_component(child)
            .with_reason(err.to_string())
    });
}
