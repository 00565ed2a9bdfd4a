pub use crate::executor::JoinHandle;
pub use crate::report::{Report, TestReport, TraceRecord};
pub use crate::sched_obj::{SchedObj, SchedObjSafe};
pub use crate::scheduler::{Config, LoopState, Scheduler, SimCtx};
pub use crate::sim_if::{SimInterface, Step, VirtualSim};
pub use crate::test::{SchedTests, Test};
pub use crate::testbench::Scoreboard;
pub use crate::trigger::{TrigKind, Trigger, Wait};
pub use crate::utils::with_timeout;
pub use crate::value::Val;
pub use crate::{add_tests, check};
pub use crate::{InvariantError, SimTime, TestError, TestResult, SUITE_NAME};
pub use futures::future::FutureExt;
