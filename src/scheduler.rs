use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use num_format::{Locale, ToFormattedString};

use crate::executor::{Executor, JoinHandle};
use crate::report::{Report, TestReport, TraceRecord};
use crate::sched_obj::SchedObjSafe;
use crate::seamap::SeaMap;
use crate::sim_if::{steps_from, SimInterface, Step};
use crate::test::{SchedTests, Test};
use crate::trigger::{Trigger, Wait};
use crate::wheel::{Entry, TimeWheel};
use crate::{InvariantError, SimTime, TestError, TestResult};

#[derive(Debug, Clone)]
pub struct Config {
    /// Maximum simulated time before unresolved waits are failed with
    /// `Timeout`. The loop still reaches `Halted`.
    pub horizon: Option<SimTime>,
    /// Wall-clock watchdog with the same effect as the horizon.
    pub wall_limit: Option<Duration>,
    /// Maximum coroutine resumptions within one simulated instant; bounds
    /// zero-delay chains that never let the clock advance.
    pub resume_cap: u64,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            horizon: None,
            wall_limit: None,
            resume_cap: 10_000,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Idle,
    Running,
    Draining,
    Halted,
}

/// Handle handed to every test coroutine. Carries the shared pieces a
/// coroutine may touch (wheel, clock, event registry, executor); the clock
/// and wheel themselves are only ever mutated by the scheduler loop.
#[derive(Clone)]
pub struct SimCtx {
    wheel: SchedObjSafe<TimeWheel>,
    clock: Arc<AtomicU64>,
    registered: SchedObjSafe<SeaMap<String, ()>>,
    executor: Executor,
    invariant: SchedObjSafe<Option<InvariantError>>,
    precision: i8,
}

impl SimCtx {
    /// Current simulated time in steps.
    pub fn now(&self) -> SimTime {
        self.clock.load(Ordering::Relaxed)
    }

    /// Suspend on an explicit trigger.
    pub fn wait(&self, trigger: Trigger) -> Wait {
        Wait::new(self.clone(), trigger)
    }

    /// Suspend for `steps` simulation steps.
    pub fn delay(&self, steps: SimTime) -> Wait {
        self.wait(Trigger::time_delay(steps))
    }

    /// Suspend for a time given in `fs`..`sec`, converted at the source's
    /// precision.
    pub fn timer(&self, time: f64, unit: &str) -> Wait {
        self.wait(Trigger::time_delay(steps_from(time, unit, self.precision)))
    }

    /// Suspend until the named external event occurs.
    pub fn event(&self, id: &str) -> Wait {
        self.wait(Trigger::signal_event(id))
    }

    /// Run a helper coroutine concurrently with the current one.
    pub fn fork(&self, future: impl Future<Output = TestResult> + Send + 'static) -> JoinHandle {
        self.executor.spawn(future, "forked")
    }

    pub fn precision(&self) -> i8 {
        self.precision
    }

    pub(crate) fn wheel(&self) -> &SchedObjSafe<TimeWheel> {
        &self.wheel
    }

    pub(crate) fn current_task(&self) -> u64 {
        self.executor.current_task()
    }

    pub(crate) fn event_registered(&self, id: &str) -> bool {
        self.registered.get().contains_key(id)
    }

    pub(crate) fn raise_invariant(&self, err: InvariantError) {
        self.invariant.with_mut(|slot| {
            if slot.is_none() {
                *slot = Some(err);
            }
        });
    }
}

/// The cooperative driver: advances simulated time to the next pending
/// deadline or external event, resumes every coroutine whose trigger
/// resolved, and repeats until no coroutine remains runnable.
pub struct Scheduler {
    sim: Box<dyn SimInterface>,
    config: Config,
    tests: SchedTests,
    state: LoopState,
    ctx: SimCtx,
    trace: Vec<TraceRecord>,
    on_complete: Option<Box<dyn FnOnce(&Report)>>,
}

impl Scheduler {
    pub fn new(sim: impl SimInterface + 'static) -> Self {
        Self::with_config(sim, Config::default())
    }

    pub fn with_config(sim: impl SimInterface + 'static, config: Config) -> Self {
        let precision = sim.precision();
        let clock = Arc::new(AtomicU64::new(sim.time()));
        Scheduler {
            sim: Box::new(sim),
            config,
            tests: SchedTests::new(),
            state: LoopState::Idle,
            ctx: SimCtx {
                wheel: SchedObjSafe::new(TimeWheel::new()),
                clock,
                registered: SchedObjSafe::new(SeaMap::new()),
                executor: Executor::new(),
                invariant: SchedObjSafe::new(None),
                precision,
            },
            trace: Vec::new(),
            on_complete: None,
        }
    }

    /// Make an event identity waitable. Waiting on an identity that was never
    /// registered fails the waiting coroutine at suspend time.
    pub fn register_event(&mut self, id: &str) {
        self.ctx.registered.with_mut(|m| {
            m.insert(id.to_string(), ());
        });
    }

    pub fn add_test(&mut self, test: Test) {
        self.tests.push(test);
    }

    /// Callback invoked exactly once with the aggregate report when the loop
    /// reaches `Halted`.
    pub fn on_complete(&mut self, callback: impl FnOnce(&Report) + 'static) {
        self.on_complete = Some(Box::new(callback));
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    fn now(&self) -> SimTime {
        self.ctx.now()
    }

    fn set_clock(&self, t: SimTime) {
        self.ctx.clock.store(t, Ordering::Relaxed);
    }

    /// Drive every registered test to completion. Per-test failures are
    /// aggregated into the report; only invariant violations abort the run.
    pub fn run(&mut self) -> Result<Report, InvariantError> {
        let wall_start = Instant::now();
        self.state = LoopState::Running;

        // all tests start as concurrent siblings at the current instant
        for test in self.tests.iter() {
            let test = test.clone();
            let ctx = self.ctx.clone();
            let clock = self.ctx.clock.clone();
            let name = test.get().name.clone();
            let _ = self.ctx.executor.spawn(
                async move {
                    let wall = Instant::now();
                    let sim_start = clock.load(Ordering::Relaxed);
                    let generator = test
                        .with_mut(|t| t.take_generator())
                        .expect("test generator already taken");
                    let result = generator(ctx).await;
                    test.with_mut(|t| {
                        t.time_secs = wall.elapsed().as_secs_f64();
                        t.sim_steps = clock.load(Ordering::Relaxed) - sim_start;
                        t.result = Some(result.clone());
                    });
                    result
                },
                &name,
            );
        }

        let mut instant_spent: u64 = 0;
        loop {
            let budget = self.config.resume_cap.saturating_sub(instant_spent);
            match self.ctx.executor.run_once(budget) {
                Ok(n) => instant_spent += n,
                Err(_) => return Err(InvariantError::ResumeCapExceeded { at: self.now() }),
            }
            if let Some(err) = self.ctx.invariant.with_mut(Option::take) {
                return Err(err);
            }
            if self.tests.all_finished() {
                break;
            }
            if let Some(limit) = self.config.wall_limit {
                if wall_start.elapsed() > limit {
                    self.force_timeout(self.now());
                    continue;
                }
            }

            // next resolution key: earliest wheel deadline or, while someone
            // waits on an event, the next external occurrence
            let deadline = self.ctx.wheel.with_mut(TimeWheel::next_deadline);
            let waiters = self.ctx.wheel.with_mut(|w| w.has_event_waiters());
            let occurrence = if waiters { self.sim.next_event_time() } else { None };
            let target = match (deadline, occurrence) {
                (Some(d), Some(e)) => d.min(e),
                (Some(d), None) => d,
                (None, Some(e)) => e,
                (None, None) => {
                    // nothing left that could resolve; give up at the horizon
                    let at = self.config.horizon.unwrap_or_else(|| self.now());
                    let at = self.advance_clock(at)?;
                    self.force_timeout(at);
                    continue;
                }
            };
            if let Some(horizon) = self.config.horizon {
                if target > horizon {
                    let at = self.advance_clock(horizon)?;
                    self.force_timeout(at);
                    continue;
                }
            }

            let before = self.now();
            match self.sim.advance(target) {
                Step::Time(t) => {
                    self.check_monotonic(before, t)?;
                    self.set_clock(t);
                    self.resolve_due(t);
                }
                Step::Event(t, id) => {
                    self.check_monotonic(before, t)?;
                    self.set_clock(t);
                    // deadlines at or before the occurrence fire first
                    self.resolve_due(t);
                    self.resolve_event(t, &id);
                }
            }
            if self.now() > before {
                instant_spent = 0;
            }
        }

        self.state = LoopState::Draining;
        let report = self.finish(wall_start);
        self.state = LoopState::Halted;
        if let Some(callback) = self.on_complete.take() {
            callback(&report);
        }
        Ok(report)
    }

    fn check_monotonic(&self, from: SimTime, to: SimTime) -> Result<(), InvariantError> {
        if to < from {
            return Err(InvariantError::ClockBackward { from, to });
        }
        Ok(())
    }

    /// Advance the source to `to`, draining (and dispatching) any stray
    /// occurrences on the way.
    fn advance_clock(&mut self, to: SimTime) -> Result<SimTime, InvariantError> {
        loop {
            let before = self.now();
            match self.sim.advance(to) {
                Step::Time(t) => {
                    self.check_monotonic(before, t)?;
                    self.set_clock(t);
                    return Ok(t);
                }
                Step::Event(t, id) => {
                    self.check_monotonic(before, t)?;
                    self.set_clock(t);
                    self.resolve_due(t);
                    self.resolve_event(t, &id);
                }
            }
        }
    }

    fn resolve_due(&mut self, now: SimTime) {
        let due = self.ctx.wheel.with_mut(|w| w.pop_ready(now));
        for entry in due {
            let at = entry.deadline().unwrap_or(now);
            self.dispatch(entry, at);
        }
    }

    fn resolve_event(&mut self, now: SimTime, id: &str) {
        let woken = self.ctx.wheel.with_mut(|w| w.raise_event(id));
        if woken.is_empty() {
            self.sim
                .log(&format!("event '{}' at t={} had no waiters", id, now));
            return;
        }
        for entry in woken {
            self.dispatch(entry, now);
        }
    }

    fn dispatch(&mut self, entry: Entry, at: SimTime) {
        if let Some(waker) = entry.resolve(at) {
            self.trace.push(TraceRecord {
                task: entry.task(),
                trigger: entry.trigger().to_string(),
                time: at,
            });
            waker.wake();
        }
    }

    /// The horizon or watchdog fired: every unresolved wait fails with
    /// `Timeout`, and coroutines that cannot even be woken are failed
    /// directly so the loop still halts.
    fn force_timeout(&mut self, at: SimTime) {
        let victims = self.ctx.wheel.with_mut(TimeWheel::drain_all);
        for entry in victims {
            if let Some(waker) = entry.expire(at) {
                self.trace.push(TraceRecord {
                    task: entry.task(),
                    trigger: entry.trigger().to_string(),
                    time: at,
                });
                waker.wake();
            }
        }
        self.tests.force_fail_unfinished(at);
    }

    fn finish(&mut self, wall_start: Instant) -> Report {
        let wall_secs = wall_start.elapsed().as_secs_f64();
        let sim_steps = self.now();

        let mut tests = Vec::new();
        for test in self.tests.iter() {
            let t = test.get();
            tests.push(TestReport {
                name: t.name.clone(),
                result: t.result.clone().unwrap_or(Err(TestError::Cancelled)),
                time_secs: t.time_secs,
                sim_steps: t.sim_steps,
            });
        }

        for t in &tests {
            let verdict = match &t.result {
                Ok(_) => "passed".to_string(),
                Err(e) => format!("failed ({})", e),
            };
            self.sim.log(&format!(
                "TEST {}: Result={}, Time={:.3}s, SimTime={} steps",
                t.name,
                verdict,
                t.time_secs,
                t.sim_steps.to_formatted_string(&Locale::en)
            ));
        }
        self.sim.log(&format!(
            "Simulation time: {} steps",
            sim_steps.to_formatted_string(&Locale::en)
        ));
        self.sim.log(&format!("Real time: {:.3} s", wall_secs));

        Report {
            tests,
            sim_steps,
            wall_secs,
            trace: std::mem::take(&mut self.trace),
        }
    }
}
