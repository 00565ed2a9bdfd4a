use std::time::Duration;

use simsched::prelude::*;
use simsched::{add_tests, check, utils};

fn quiet() -> VirtualSim {
    VirtualSim::new().quiet()
}

async fn test_smoke(ctx: SimCtx) -> TestResult {
    let resumed_at = ctx.timer(1000.0, "ms").await?;
    check!(resumed_at == 1000, "resumed at {}", resumed_at);
    Ok(Val::None)
}

async fn test_two_beats(ctx: SimCtx) -> TestResult {
    ctx.delay(200).await?;
    ctx.delay(300).await?;
    check!(ctx.now() == 500);
    Ok(Val::None)
}

async fn test_ticks(ctx: SimCtx) -> TestResult {
    utils::delays(&ctx, 5, 100).await?;
    check!(ctx.now() == 500);
    Ok(Val::None)
}

#[test]
fn registered_tests_run_to_completion() {
    let mut sched = Scheduler::new(quiet().with_precision(-3));
    add_tests!(sched, test_smoke, test_two_beats, test_ticks);
    let report = sched.run().unwrap();
    assert!(report.passed());
    assert_eq!(report.tests.len(), 3);
    assert_eq!(report.sim_steps, 1000);
    assert_eq!(sched.state(), LoopState::Halted);
}

#[test]
fn unraised_event_times_out_at_the_horizon_and_siblings_survive() {
    let mut sched = Scheduler::with_config(
        quiet(),
        Config {
            horizon: Some(100),
            ..Config::default()
        },
    );
    sched.register_event("x");
    sched.add_test(Test::new("waits_forever", |ctx: SimCtx| {
        async move {
            ctx.event("x").await?;
            Ok(Val::None)
        }
        .boxed()
    }));
    sched.add_test(Test::new("short_delay", |ctx: SimCtx| {
        async move {
            ctx.delay(50).await?;
            Ok(Val::None)
        }
        .boxed()
    }));

    let report = sched.run().unwrap();
    assert_eq!(sched.state(), LoopState::Halted);
    assert!(!report.passed());
    assert_eq!(report.failures(), 1);
    assert_eq!(
        report.tests[0].result,
        Err(TestError::Timeout { at: 100 })
    );
    assert!(report.tests[1].result.is_ok());
    assert_eq!(report.sim_steps, 100);
}

#[test]
fn waiting_on_an_unregistered_event_fails_at_suspend_time() {
    let mut sched = Scheduler::new(quiet());
    sched.add_test(Test::new("typo", |ctx: SimCtx| {
        async move {
            ctx.event("no_such_event").await?;
            Ok(Val::None)
        }
        .boxed()
    }));
    sched.add_test(Test::new("fine", |ctx: SimCtx| {
        async move {
            ctx.delay(10).await?;
            Ok(Val::None)
        }
        .boxed()
    }));

    let report = sched.run().unwrap();
    assert_eq!(
        report.tests[0].result,
        Err(TestError::UnknownEvent("no_such_event".to_string()))
    );
    assert!(report.tests[1].result.is_ok());
}

#[test]
fn scripted_occurrences_resolve_waiters_at_the_scripted_time() {
    // the occurrence at t=10 lands while nobody waits and is dropped; the
    // waiter catches the one at t=60
    let mut sched = Scheduler::new(quiet().fire_at(10, "irq").fire_at(60, "irq"));
    sched.register_event("irq");
    sched.add_test(Test::new("latecomer", |ctx: SimCtx| {
        async move {
            ctx.delay(30).await?;
            let at = ctx.event("irq").await?;
            check!(at == 60, "irq seen at {}", at);
            Ok(Val::None)
        }
        .boxed()
    }));

    let report = sched.run().unwrap();
    assert!(report.passed());
    assert_eq!(report.sim_steps, 60);
}

#[test]
fn one_occurrence_wakes_every_waiter_in_park_order() {
    let order = SchedObj::new(Vec::<&str>::new());
    let mut sched = Scheduler::new(quiet().fire_at(10, "irq"));
    sched.register_event("irq");
    let o = order.clone();
    sched.add_test(Test::new("first", move |ctx: SimCtx| {
        async move {
            ctx.event("irq").await?;
            o.get_mut().push("first");
            Ok(Val::None)
        }
        .boxed()
    }));
    let o = order.clone();
    sched.add_test(Test::new("second", move |ctx: SimCtx| {
        async move {
            ctx.event("irq").await?;
            o.get_mut().push("second");
            Ok(Val::None)
        }
        .boxed()
    }));

    let report = sched.run().unwrap();
    assert!(report.passed());
    assert_eq!(*order.get(), vec!["first", "second"]);
    assert_eq!(report.sim_steps, 10);
}

#[test]
fn timeout_race_lets_the_work_win() {
    let mut sched = Scheduler::new(quiet());
    sched.add_test(Test::new("quick", |ctx: SimCtx| {
        async move {
            let inner = ctx.clone();
            let result = utils::with_timeout(ctx, 1000, async move {
                inner.delay(5).await?;
                Ok(Val::Int(5))
            })
            .await?;
            check!(result == Val::Int(5));
            Ok(Val::None)
        }
        .boxed()
    }));

    let report = sched.run().unwrap();
    assert!(report.passed());
    // the losing guard was cancelled; its 1000-step deadline never ran
    assert_eq!(report.sim_steps, 5);
}

#[test]
fn timeout_race_cancels_the_slow_work() {
    let mut sched = Scheduler::new(quiet());
    sched.register_event("never");
    sched.add_test(Test::new("guarded", |ctx: SimCtx| {
        async move {
            let inner = ctx.clone();
            let result = utils::with_timeout(ctx.clone(), 100, async move {
                inner.event("never").await?;
                Ok(Val::None)
            })
            .await;
            check!(
                result == Err(TestError::Timeout { at: 100 }),
                "unexpected result {:?}",
                result
            );
            check!(ctx.now() == 100);
            Ok(Val::None)
        }
        .boxed()
    }));

    let report = sched.run().unwrap();
    assert!(report.passed());
    assert_eq!(report.sim_steps, 100);
}

#[test]
fn zero_delay_chains_complete_without_advancing_time() {
    let mut sched = Scheduler::new(quiet());
    sched.add_test(Test::new("instant", |ctx: SimCtx| {
        async move {
            for _ in 0..100 {
                let at = ctx.delay(0).await?;
                check!(at == 0);
            }
            Ok(Val::None)
        }
        .boxed()
    }));

    let report = sched.run().unwrap();
    assert!(report.passed());
    assert_eq!(report.sim_steps, 0);
}

#[test]
fn wall_clock_watchdog_forces_a_timeout() {
    let mut sched = Scheduler::with_config(
        quiet(),
        Config {
            wall_limit: Some(Duration::from_millis(0)),
            ..Config::default()
        },
    );
    sched.register_event("x");
    sched.add_test(Test::new("stuck", |ctx: SimCtx| {
        async move {
            ctx.event("x").await?;
            Ok(Val::None)
        }
        .boxed()
    }));

    let report = sched.run().unwrap();
    assert_eq!(sched.state(), LoopState::Halted);
    assert_eq!(report.tests[0].result, Err(TestError::Timeout { at: 0 }));
}

#[test]
fn failed_assertion_is_recorded_without_starving_siblings() {
    let order = SchedObj::new(Vec::<&str>::new());
    let mut sched = Scheduler::new(quiet());
    sched.add_test(Test::new("broken", |ctx: SimCtx| {
        async move {
            ctx.delay(10).await?;
            check!(1 == 2, "one is not two");
            Ok(Val::None)
        }
        .boxed()
    }));
    let o = order.clone();
    sched.add_test(Test::new("sibling", move |ctx: SimCtx| {
        async move {
            ctx.delay(20).await?;
            o.get_mut().push("sibling ran");
            Ok(Val::None)
        }
        .boxed()
    }));

    let report = sched.run().unwrap();
    assert!(!report.passed());
    assert_eq!(
        report.tests[0].result,
        Err(TestError::Assertion("one is not two".to_string()))
    );
    assert!(report.tests[1].result.is_ok());
    assert_eq!(*order.get(), vec!["sibling ran"]);
    assert_eq!(report.sim_steps, 20);
}

#[test]
fn scoreboard_checks_a_forked_producer() {
    let mut sched = Scheduler::new(quiet());
    sched.add_test(Test::new("scoreboard", |ctx: SimCtx| {
        async move {
            let sb = Scoreboard::new();
            let side = sb.clone();
            let producer_ctx = ctx.clone();
            let producer = ctx.fork(async move {
                for v in [1u32, 2, 3] {
                    producer_ctx.delay(10).await?;
                    side.add_recv(v);
                }
                Ok(Val::None)
            });
            for v in [1u32, 2, 3] {
                sb.add_exp(v);
            }
            producer.await?;
            sb.result()
        }
        .boxed()
    }));

    let report = sched.run().unwrap();
    assert!(report.passed());
    assert_eq!(report.sim_steps, 30);
}

#[test]
fn trace_records_every_resolution_in_order() {
    let mut sched = Scheduler::new(quiet().fire_at(40, "irq"));
    sched.register_event("irq");
    sched.add_test(Test::new("traced", |ctx: SimCtx| {
        async move {
            ctx.delay(25).await?;
            ctx.event("irq").await?;
            Ok(Val::None)
        }
        .boxed()
    }));

    let report = sched.run().unwrap();
    assert!(report.passed());
    let summary: Vec<(String, u64)> = report
        .trace
        .iter()
        .map(|r| (r.trigger.clone(), r.time))
        .collect();
    assert_eq!(
        summary,
        vec![
            ("TimeDelay(25)".to_string(), 25),
            ("SignalEvent(irq)".to_string(), 40),
        ]
    );
    let times: Vec<u64> = report.trace.iter().map(|r| r.time).collect();
    let mut sorted = times.clone();
    sorted.sort_unstable();
    assert_eq!(times, sorted);
}

#[test]
fn completion_callback_sees_the_aggregate_status() {
    let seen = SchedObj::new(Option::<bool>::None);
    let mut sched = Scheduler::new(quiet());
    sched.add_test(Test::new("t", |ctx: SimCtx| {
        async move {
            ctx.delay(1).await?;
            Ok(Val::None)
        }
        .boxed()
    }));
    let s = seen.clone();
    sched.on_complete(move |report| {
        *s.get_mut() = Some(report.passed());
    });
    sched.run().unwrap();
    assert_eq!(*seen.get(), Some(true));
}
