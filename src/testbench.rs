use std::collections::VecDeque;

use crate::sched_obj::SchedObj;
use crate::value::Val;
use crate::{TestError, TestResult};

/// Expected/received comparison queues for concurrent producer/checker
/// routines. Clone the handle into each side; compares eagerly as data
/// arrives.
pub struct Scoreboard<T: PartialEq>(SchedObj<ScoreboardInner<T>>);

impl<T: PartialEq> Clone for Scoreboard<T> {
    fn clone(&self) -> Self {
        Scoreboard(self.0.clone())
    }
}

impl<T: 'static + PartialEq> Scoreboard<T> {
    #[allow(clippy::new_without_default)]
    pub fn new() -> Self {
        Self(SchedObj::new(ScoreboardInner {
            exp_q: VecDeque::new(),
            recv_q: VecDeque::new(),
            errors: 0,
            expected: 0,
            received: 0,
            matched: 0,
        }))
    }

    pub fn add_exp(&self, data: T) {
        {
            let mut inner = self.0.get_mut();
            inner.exp_q.push_back(data);
            inner.expected += 1;
        }
        self.compare();
    }

    pub fn add_recv(&self, data: T) {
        {
            let mut inner = self.0.get_mut();
            inner.recv_q.push_back(data);
            inner.received += 1;
        }
        self.compare();
    }

    fn compare(&self) {
        let mut inner = self.0.get_mut();
        while !inner.exp_q.is_empty() && !inner.recv_q.is_empty() {
            match inner.exp_q.pop_front() == inner.recv_q.pop_front() {
                true => inner.matched += 1,
                false => inner.errors += 1,
            }
        }
    }

    pub fn passed(&self) -> bool {
        let inner = self.0.get();
        inner.expected > 0
            && inner.received == inner.expected
            && inner.matched == inner.received
            && inner.errors == 0
            && inner.exp_q.is_empty()
            && inner.recv_q.is_empty()
    }

    pub fn result(&self) -> TestResult {
        match self.passed() {
            true => Ok(Val::String(self.summary())),
            false => Err(TestError::Assertion(self.summary())),
        }
    }

    pub fn summary(&self) -> String {
        let inner = self.0.get();
        format!(
            "expected={}, received={}, matched={}, errors={}, expQ: {}, recvQ: {}",
            inner.expected,
            inner.received,
            inner.matched,
            inner.errors,
            inner.exp_q.len(),
            inner.recv_q.len()
        )
    }
}

struct ScoreboardInner<T>
where
    T: PartialEq,
{
    exp_q: VecDeque<T>,
    recv_q: VecDeque<T>,
    errors: u32,
    expected: u32,
    received: u32,
    matched: u32,
}
