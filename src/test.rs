use futures::future::BoxFuture;

use crate::sched_obj::SchedObjSafe;
use crate::scheduler::SimCtx;
use crate::{SimTime, TestError, TestResult};

pub type TestGenerator = Box<dyn FnOnce(SimCtx) -> BoxFuture<'static, TestResult> + Send>;

/// A named top-level test coroutine plus its recorded outcome.
pub struct Test {
    pub name: String,
    generator: Option<TestGenerator>,
    pub result: Option<TestResult>,
    pub time_secs: f64,
    pub sim_steps: SimTime,
}

impl Test {
    pub fn new(
        name: impl Into<String>,
        generator: impl FnOnce(SimCtx) -> BoxFuture<'static, TestResult> + Send + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            generator: Some(Box::new(generator)),
            result: None,
            time_secs: 0.0,
            sim_steps: 0,
        }
    }

    pub(crate) fn take_generator(&mut self) -> Option<TestGenerator> {
        self.generator.take()
    }
}

pub struct SchedTests(Vec<SchedObjSafe<Test>>);

impl SchedTests {
    pub fn new() -> Self {
        Self(Vec::new())
    }
    pub fn len(&self) -> usize {
        self.0.len()
    }
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
    pub fn iter(&self) -> core::slice::Iter<SchedObjSafe<Test>> {
        self.0.iter()
    }
    pub fn push(&mut self, test: Test) {
        self.0.push(SchedObjSafe::new(test));
    }

    pub(crate) fn all_finished(&self) -> bool {
        self.0.iter().all(|t| t.get().result.is_some())
    }

    /// Force-fail whatever has no result yet. Used when the horizon or the
    /// watchdog gives up on coroutines that cannot be woken.
    pub(crate) fn force_fail_unfinished(&self, at: SimTime) {
        for test in self.0.iter() {
            test.with_mut(|t| {
                if t.result.is_none() {
                    t.result = Some(Err(TestError::Timeout { at }));
                }
            });
        }
    }
}

impl Default for SchedTests {
    fn default() -> Self {
        Self::new()
    }
}
