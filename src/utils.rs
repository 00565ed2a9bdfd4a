use std::future::Future;

use futures::future::select_all;
use lazy_static::lazy_static;
use rand::{rngs::StdRng, Rng, SeedableRng};

use crate::sched_obj::SchedObjSafe;
use crate::scheduler::SimCtx;
use crate::value::Val;
use crate::{SimTime, TestError, TestResult};

/// Race `future` against a `TimeDelay` of `steps`. Whichever resolves first
/// wins; the loser is cancelled and its pending entry leaves the wheel.
pub async fn with_timeout(
    ctx: SimCtx,
    steps: SimTime,
    future: impl Future<Output = TestResult> + Send + 'static,
) -> TestResult {
    let work = ctx.fork(future);
    let guard_ctx = ctx.clone();
    let guard = ctx.fork(async move {
        guard_ctx.delay(steps).await?;
        Ok(Val::None)
    });

    let (result, index, rest) = select_all(vec![work, guard]).await;
    for handle in rest {
        handle.cancel();
    }
    match index {
        0 => result,
        _ => Err(TestError::Timeout { at: ctx.now() }),
    }
}

/// Await `n` consecutive delays of `steps` each.
pub async fn delays(ctx: &SimCtx, n: u32, steps: SimTime) -> TestResult {
    for _ in 0..n {
        ctx.delay(steps).await?;
    }
    Ok(Val::None)
}

lazy_static! {
    // seeded, so stimulus sequences reproduce across runs
    static ref RNG: SchedObjSafe<StdRng> = SchedObjSafe::new(StdRng::seed_from_u64(0));
}

/// Re-seed the stimulus generator. Identical seeds give identical sequences.
pub fn seed(value: u64) {
    RNG.with_mut(|r| *r = StdRng::seed_from_u64(value));
}

#[inline]
pub fn rand() -> f32 {
    RNG.with_mut(|r| r.gen::<f32>())
}

#[inline]
pub fn rand_int(ceil: u32) -> u32 {
    RNG.with_mut(|r| r.gen::<u32>() % ceil)
}
