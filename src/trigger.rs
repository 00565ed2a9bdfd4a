use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use crate::scheduler::SimCtx;
use crate::wheel::Entry;
use crate::{SimTime, TestError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrigKind {
    /// Elapse of a number of simulation steps from the park instant.
    TimeDelay(SimTime),
    /// Occurrence of an external event registered with the scheduler.
    SignalEvent(String),
}

/// An awaitable condition. Immutable once created; consumed by exactly one
/// wait. `TimeDelay(0)` resolves on the next scheduler step without the
/// clock moving past the current instant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Trigger {
    kind: TrigKind,
}

impl Trigger {
    pub fn time_delay(steps: SimTime) -> Self {
        Trigger {
            kind: TrigKind::TimeDelay(steps),
        }
    }
    pub fn signal_event(id: &str) -> Self {
        Trigger {
            kind: TrigKind::SignalEvent(id.to_string()),
        }
    }
    pub fn kind(&self) -> &TrigKind {
        &self.kind
    }
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            TrigKind::TimeDelay(steps) => write!(f, "TimeDelay({})", steps),
            TrigKind::SignalEvent(id) => write!(f, "SignalEvent({})", id),
        }
    }
}

/// Suspend point for one trigger. The first poll parks an entry in the time
/// wheel; the wake-up poll reads the entry's outcome and yields the
/// resolution time. Dropping an unresolved wait cancels its entry, which is
/// how the losing side of a timeout race leaves the wheel.
pub struct Wait {
    ctx: SimCtx,
    trigger: Option<Trigger>,
    entry: Option<Entry>,
}

impl Wait {
    pub(crate) fn new(ctx: SimCtx, trigger: Trigger) -> Self {
        Wait {
            ctx,
            trigger: Some(trigger),
            entry: None,
        }
    }
}

impl Future for Wait {
    type Output = Result<SimTime, TestError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        if let Some(entry) = &self.entry {
            return match entry.outcome() {
                Some(outcome) => Poll::Ready(outcome),
                None => {
                    // woken by something else (a raced branch); stay parked
                    entry.set_waker(cx.waker().clone());
                    Poll::Pending
                }
            };
        }

        let trigger = self
            .trigger
            .take()
            .expect("wait polled again after completion");
        let task = self.ctx.current_task();
        let parked = match trigger.kind() {
            TrigKind::TimeDelay(steps) => {
                let deadline = self.ctx.now().saturating_add(*steps);
                self.ctx
                    .wheel()
                    .with_mut(|w| w.park_timer(task, deadline, cx.waker().clone(), trigger.clone()))
            }
            TrigKind::SignalEvent(id) => {
                if !self.ctx.event_registered(id) {
                    return Poll::Ready(Err(TestError::UnknownEvent(id.clone())));
                }
                self.ctx
                    .wheel()
                    .with_mut(|w| w.park_event(task, id, cx.waker().clone(), trigger.clone()))
            }
        };
        match parked {
            Ok(entry) => {
                self.entry = Some(entry);
                Poll::Pending
            }
            Err(err) => {
                // invariant violations abort the loop, not this coroutine
                self.ctx.raise_invariant(err);
                Poll::Pending
            }
        }
    }
}

impl Drop for Wait {
    fn drop(&mut self) {
        if let Some(entry) = &self.entry {
            entry.cancel();
        }
    }
}
