mod executor;
pub mod prelude;
mod report;
mod sched_obj;
mod scheduler;
mod seamap;
pub mod sim_if;
pub mod test;
mod testbench;
mod trigger;
pub mod utils;
mod value;
mod wheel;

use once_cell::sync::OnceCell;
use thiserror::Error;

pub use executor::JoinHandle;
pub use report::{Report, TestReport, TraceRecord};
pub use scheduler::{Config, LoopState, Scheduler, SimCtx};
pub use sim_if::{SimInterface, Step, VirtualSim};
pub use test::Test;
pub use testbench::Scoreboard;
pub use trigger::{TrigKind, Trigger, Wait};
pub use value::Val;

/// Simulated time in simulator steps. The step size is whatever the time
/// source's precision says it is; the scheduler never interprets it.
pub type SimTime = u64;

pub type TestResult = Result<Val, TestError>;

/// Suite name used for JUnit output, set by `add_tests!` from the caller's
/// module path.
pub static SUITE_NAME: OnceCell<String> = OnceCell::new();

/// Failures local to one test coroutine. Caught at the scheduler boundary and
/// aggregated; sibling coroutines keep running.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TestError {
    #[error("wait on unregistered event '{0}'")]
    UnknownEvent(String),
    #[error("no trigger resolved before t={at}")]
    Timeout { at: SimTime },
    #[error("assertion failed: {0}")]
    Assertion(String),
    #[error("coroutine cancelled")]
    Cancelled,
}

/// Violations of the scheduler's own invariants. Always fatal to the whole
/// loop: these indicate a bug in the harness, not in test logic.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvariantError {
    #[error("task {task} is already parked on a pending trigger")]
    DoublePark { task: u64 },
    #[error("simulated clock would move backward: {from} -> {to}")]
    ClockBackward { from: SimTime, to: SimTime },
    #[error("resumption cap exceeded at t={at}")]
    ResumeCapExceeded { at: SimTime },
}

/// Fail the current test with `TestError::Assertion` unless the condition
/// holds.
#[macro_export]
macro_rules! check {
    ($cond:expr) => {
        if !$cond {
            return Err($crate::TestError::Assertion(stringify!($cond).to_string()));
        }
    };
    ($cond:expr, $($arg:tt)+) => {
        if !$cond {
            return Err($crate::TestError::Assertion(format!($($arg)+)));
        }
    };
}

/// Register test coroutines with a scheduler by name.
///
/// ```ignore
/// let mut sched = Scheduler::new(VirtualSim::new());
/// simsched::add_tests!(sched, test_smoke, test_irq);
/// let report = sched.run()?;
/// ```
#[macro_export]
macro_rules! add_tests {
    ($sched:expr, $( $t:ident ),+ $(,)?) => {{
        let _ = $crate::SUITE_NAME.set(::std::module_path!().to_string());
        $(
            $sched.add_test($crate::test::Test::new(
                stringify!($t),
                |ctx| $crate::prelude::FutureExt::boxed($t(ctx)),
            ));
        )+
    }};
}
