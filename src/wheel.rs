use std::cmp::Reverse;
use std::collections::{BinaryHeap, VecDeque};
use std::task::Waker;

use intmap::IntMap;

use crate::sched_obj::SchedObjSafe;
use crate::seamap::SeaMap;
use crate::trigger::Trigger;
use crate::{InvariantError, SimTime, TestError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EntryState {
    Pending,
    Resolved(SimTime),
    TimedOut(SimTime),
    Cancelled,
}

#[derive(Debug)]
struct EntryInner {
    state: EntryState,
    waker: Option<Waker>,
}

/// One coroutine parked on one trigger. The wheel owns a clone; the `Wait`
/// future holds another and reads the outcome when it is re-polled.
#[derive(Clone, Debug)]
pub struct Entry {
    shared: SchedObjSafe<EntryInner>,
    task: u64,
    trigger: Trigger,
    deadline: Option<SimTime>,
}

impl Entry {
    fn new(task: u64, waker: Waker, trigger: Trigger, deadline: Option<SimTime>) -> Self {
        Entry {
            shared: SchedObjSafe::new(EntryInner {
                state: EntryState::Pending,
                waker: Some(waker),
            }),
            task,
            trigger,
            deadline,
        }
    }

    pub(crate) fn task(&self) -> u64 {
        self.task
    }

    pub(crate) fn trigger(&self) -> &Trigger {
        &self.trigger
    }

    pub(crate) fn deadline(&self) -> Option<SimTime> {
        self.deadline
    }

    pub(crate) fn is_pending(&self) -> bool {
        self.shared.get().state == EntryState::Pending
    }

    /// Remove this entry from consideration. Idempotent, and a no-op if the
    /// entry already resolved.
    pub fn cancel(&self) {
        self.shared.with_mut(|e| {
            if e.state == EntryState::Pending {
                e.state = EntryState::Cancelled;
                e.waker = None;
            }
        });
    }

    /// Mark resolved at `time` and hand back the waker, exactly once.
    pub(crate) fn resolve(&self, time: SimTime) -> Option<Waker> {
        self.shared.with_mut(|e| {
            if e.state == EntryState::Pending {
                e.state = EntryState::Resolved(time);
                e.waker.take()
            } else {
                None
            }
        })
    }

    /// Force-fail the wait: the horizon or watchdog gave up on it.
    pub(crate) fn expire(&self, time: SimTime) -> Option<Waker> {
        self.shared.with_mut(|e| {
            if e.state == EntryState::Pending {
                e.state = EntryState::TimedOut(time);
                e.waker.take()
            } else {
                None
            }
        })
    }

    pub(crate) fn set_waker(&self, waker: Waker) {
        self.shared.with_mut(|e| {
            if e.state == EntryState::Pending {
                e.waker = Some(waker);
            }
        });
    }

    pub(crate) fn outcome(&self) -> Option<Result<SimTime, TestError>> {
        match self.shared.get().state {
            EntryState::Pending => None,
            EntryState::Resolved(t) => Some(Ok(t)),
            EntryState::TimedOut(t) => Some(Err(TestError::Timeout { at: t })),
            EntryState::Cancelled => Some(Err(TestError::Cancelled)),
        }
    }

    fn same(&self, other: &Entry) -> bool {
        self.shared.ptr_eq(&other.shared)
    }
}

/// Pending entries indexed by resolution key: a min-heap of distinct
/// deadlines over FIFO buckets for timers, FIFO waitlists per identity for
/// events. Ties resolve in park order so runs are exactly reproducible.
pub struct TimeWheel {
    deadlines: BinaryHeap<Reverse<SimTime>>,
    timers: IntMap<VecDeque<Entry>>,
    events: SeaMap<String, VecDeque<Entry>>,
    // task id -> live entry; rejects double parks. Task 0 is "unattributed"
    // (an entry polled outside the executor) and is not tracked.
    parked: IntMap<Entry>,
}

impl TimeWheel {
    pub fn new() -> Self {
        TimeWheel {
            deadlines: BinaryHeap::new(),
            timers: IntMap::new(),
            events: SeaMap::new(),
            parked: IntMap::new(),
        }
    }

    fn check_park(&self, task: u64) -> Result<(), InvariantError> {
        if task != 0 {
            if let Some(prev) = self.parked.get(task) {
                if prev.is_pending() {
                    return Err(InvariantError::DoublePark { task });
                }
            }
        }
        Ok(())
    }

    fn track(&mut self, entry: &Entry) {
        if entry.task() != 0 {
            self.parked.remove(entry.task());
            self.parked.insert(entry.task(), entry.clone());
        }
    }

    fn untrack(&mut self, entry: &Entry) {
        let task = entry.task();
        if task == 0 {
            return;
        }
        // only drop the record if it still points at this entry; the task may
        // have re-parked after a cancelled wait
        if let Some(current) = self.parked.get(task) {
            if current.same(entry) {
                self.parked.remove(task);
            }
        }
    }

    pub fn park_timer(
        &mut self,
        task: u64,
        deadline: SimTime,
        waker: Waker,
        trigger: Trigger,
    ) -> Result<Entry, InvariantError> {
        self.check_park(task)?;
        let entry = Entry::new(task, waker, trigger, Some(deadline));
        if let Some(bucket) = self.timers.get_mut(deadline) {
            bucket.push_back(entry.clone());
        } else {
            let mut bucket = VecDeque::new();
            bucket.push_back(entry.clone());
            self.timers.insert(deadline, bucket);
            self.deadlines.push(Reverse(deadline));
        }
        self.track(&entry);
        Ok(entry)
    }

    pub fn park_event(
        &mut self,
        task: u64,
        id: &str,
        waker: Waker,
        trigger: Trigger,
    ) -> Result<Entry, InvariantError> {
        self.check_park(task)?;
        let entry = Entry::new(task, waker, trigger, None);
        if let Some(waiters) = self.events.get_mut(id) {
            waiters.push_back(entry.clone());
        } else {
            let mut waiters = VecDeque::new();
            waiters.push_back(entry.clone());
            self.events.insert(id.to_string(), waiters);
        }
        self.track(&entry);
        Ok(entry)
    }

    /// Earliest deadline with at least one live entry. Buckets that were
    /// cancelled out from under their deadline are purged here.
    pub fn next_deadline(&mut self) -> Option<SimTime> {
        while let Some(&Reverse(deadline)) = self.deadlines.peek() {
            let live = self
                .timers
                .get(deadline)
                .map(|bucket| bucket.iter().any(Entry::is_pending))
                .unwrap_or(false);
            if live {
                return Some(deadline);
            }
            self.deadlines.pop();
            if let Some(bucket) = self.timers.remove(deadline) {
                for entry in &bucket {
                    self.untrack(entry);
                }
            }
        }
        None
    }

    /// Every live entry due at or before `now`, in deadline order, FIFO
    /// within a deadline.
    pub fn pop_ready(&mut self, now: SimTime) -> Vec<Entry> {
        let mut due = Vec::new();
        while let Some(&Reverse(deadline)) = self.deadlines.peek() {
            if deadline > now {
                break;
            }
            self.deadlines.pop();
            if let Some(bucket) = self.timers.remove(deadline) {
                for entry in bucket {
                    self.untrack(&entry);
                    if entry.is_pending() {
                        due.push(entry);
                    }
                }
            }
        }
        due
    }

    /// Hand back the FIFO waitlist for an event occurrence. Unwaited
    /// occurrences return an empty list.
    pub fn raise_event(&mut self, id: &str) -> Vec<Entry> {
        match self.events.remove(id) {
            Some(waiters) => {
                let mut woken = Vec::new();
                for entry in waiters {
                    self.untrack(&entry);
                    if entry.is_pending() {
                        woken.push(entry);
                    }
                }
                woken
            }
            None => Vec::new(),
        }
    }

    pub fn has_event_waiters(&self) -> bool {
        self.events
            .iter()
            .any(|(_, waiters)| waiters.iter().any(Entry::is_pending))
    }

    /// Remove every live entry: timers in deadline order, then event
    /// waitlists. Used when the horizon or watchdog forces a timeout.
    pub fn drain_all(&mut self) -> Vec<Entry> {
        let mut entries = self.pop_ready(SimTime::MAX);
        let mut ids: Vec<String> = self.events.iter().map(|(id, _)| id.clone()).collect();
        ids.sort();
        for id in ids {
            entries.extend(self.raise_event(&id));
        }
        entries
    }
}
