//! End-to-end scheduling behavior, driven deterministically under tokio's
//! paused clock, with a manual clock pinning the wall time of day where
//! window admission matters.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::NaiveTime;
use metronome::{
    FailureKind, ManualClock, Priority, Scheduler, SchedulerConfig, TaskSpec, TaskStatus,
    TimeWindow,
};

fn paused_config() -> SchedulerConfig {
    SchedulerConfig {
        check_interval: Duration::from_millis(100),
        ..SchedulerConfig::default()
    }
}

fn tod(h: u32, m: u32, s: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(h, m, s).unwrap()
}

#[tokio::test(start_paused = true)]
async fn test_basic_periodic_cadence() {
    let scheduler = Scheduler::with_config(paused_config());
    let counter = Arc::new(AtomicU32::new(0));

    let counter_clone = Arc::clone(&counter);
    let handle = scheduler
        .register(
            TaskSpec::every_secs(10).with_name("beat").build().unwrap(),
            move |_ctx| {
                let counter = Arc::clone(&counter_clone);
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }
            },
        )
        .unwrap();

    scheduler.start().await.unwrap();
    tokio::time::sleep(Duration::from_secs(25)).await;
    scheduler.stop().await.unwrap();

    // Due at 0, 10 and 20 seconds.
    assert_eq!(counter.load(Ordering::SeqCst), 3);
    let view = handle.view();
    assert_eq!(view.run_count, 3);
    assert_eq!(view.success_count, 3);
}

#[tokio::test(start_paused = true)]
async fn test_priority_dispatch_order() {
    let scheduler = Scheduler::with_config(paused_config());
    let log = Arc::new(Mutex::new(Vec::new()));

    for (name, priority) in [
        ("a-low", Priority::Low),
        ("b-critical", Priority::Critical),
        ("c-normal", Priority::Normal),
    ] {
        let handle = scheduler
            .register(
                TaskSpec::every_secs(60)
                    .with_name(name)
                    .with_priority(priority)
                    .build()
                    .unwrap(),
                |_ctx| async { Ok(()) },
            )
            .unwrap();

        let log_clone = Arc::clone(&log);
        handle.add_status_callback(move |view, _, new| {
            if new == TaskStatus::Running {
                log_clone.lock().unwrap().push(view.name.clone());
            }
        });
    }

    scheduler.start().await.unwrap();
    tokio::time::sleep(Duration::from_millis(150)).await;
    scheduler.stop().await.unwrap();

    assert_eq!(
        log.lock().unwrap().as_slice(),
        &[
            "b-critical".to_string(),
            "c-normal".to_string(),
            "a-low".to_string()
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn test_equal_priority_dispatches_in_registration_order() {
    let scheduler = Scheduler::with_config(paused_config());
    let log = Arc::new(Mutex::new(Vec::new()));

    for name in ["first", "second", "third"] {
        let handle = scheduler
            .register(
                TaskSpec::every_secs(60).with_name(name).build().unwrap(),
                |_ctx| async { Ok(()) },
            )
            .unwrap();

        let log_clone = Arc::clone(&log);
        handle.add_status_callback(move |view, _, new| {
            if new == TaskStatus::Running {
                log_clone.lock().unwrap().push(view.name.clone());
            }
        });
    }

    scheduler.start().await.unwrap();
    tokio::time::sleep(Duration::from_millis(150)).await;
    scheduler.stop().await.unwrap();

    assert_eq!(
        log.lock().unwrap().as_slice(),
        &[
            "first".to_string(),
            "second".to_string(),
            "third".to_string()
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn test_window_admission_gates_execution() {
    let clock = Arc::new(ManualClock::new(tod(8, 59, 59)));
    let scheduler = Scheduler::with_config(SchedulerConfig {
        check_interval: Duration::from_millis(100),
        clock: Arc::clone(&clock) as Arc<dyn metronome::Clock>,
        ..SchedulerConfig::default()
    });

    let handle = scheduler
        .register(
            TaskSpec::every_secs(1)
                .with_name("office-hours")
                .with_window(TimeWindow::new(tod(9, 0, 0), tod(17, 0, 0)))
                .build()
                .unwrap(),
            |_ctx| async { Ok(()) },
        )
        .unwrap();

    scheduler.start().await.unwrap();

    // One second before the window opens: due but not admitted.
    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(handle.view().run_count, 0);

    // The window opens: the overdue task runs on the next tick.
    clock.set_time_of_day(tod(9, 0, 0));
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(handle.view().run_count, 1);

    // Past closing: attempts are skipped without counting runs.
    clock.set_time_of_day(tod(17, 0, 1));
    tokio::time::sleep(Duration::from_secs(3)).await;
    assert_eq!(handle.view().run_count, 1);
    assert_eq!(handle.view().error_count, 0);

    // Back inside the window the task resumes running.
    clock.set_time_of_day(tod(9, 30, 0));
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(handle.view().run_count, 2);

    scheduler.stop().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_window_wrapping_midnight_admits_both_sides() {
    let clock = Arc::new(ManualClock::new(tod(12, 0, 0)));
    let scheduler = Scheduler::with_config(SchedulerConfig {
        check_interval: Duration::from_millis(100),
        clock: Arc::clone(&clock) as Arc<dyn metronome::Clock>,
        ..SchedulerConfig::default()
    });

    let handle = scheduler
        .register(
            TaskSpec::every_secs(1)
                .with_name("night-shift")
                .with_window(TimeWindow::new(tod(23, 0, 0), tod(1, 0, 0)))
                .build()
                .unwrap(),
            |_ctx| async { Ok(()) },
        )
        .unwrap();

    scheduler.start().await.unwrap();

    // Midday: closed.
    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(handle.view().run_count, 0);

    // Just before midnight: admitted.
    clock.set_time_of_day(tod(23, 59, 59));
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(handle.view().run_count, 1);

    // Just after midnight: still admitted.
    clock.set_time_of_day(tod(0, 0, 1));
    tokio::time::sleep(Duration::from_millis(1200)).await;
    assert!(handle.view().run_count >= 2);

    scheduler.stop().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_timeout_fails_run_and_fires_failure_once() {
    let scheduler = Scheduler::with_config(paused_config());
    let failures = Arc::new(AtomicU32::new(0));

    let handle = scheduler
        .register(
            TaskSpec::every_secs(60)
                .with_name("sleeper")
                .with_max_running_time(Duration::from_millis(500))
                .build()
                .unwrap(),
            |_ctx| async {
                tokio::time::sleep(Duration::from_secs(2)).await;
                Ok(())
            },
        )
        .unwrap();

    let failures_clone = Arc::clone(&failures);
    handle.add_failure_callback(move |_, failure| {
        assert_eq!(failure.kind(), FailureKind::Timeout);
        failures_clone.fetch_add(1, Ordering::SeqCst);
    });

    scheduler.start().await.unwrap();
    tokio::time::sleep(Duration::from_secs(1)).await;
    scheduler.stop().await.unwrap();

    let view = handle.view();
    assert_eq!(view.status, TaskStatus::Failed);
    assert_eq!(view.run_count, 1);
    assert_eq!(view.error_count, 1);
    assert_eq!(view.last_error.unwrap().kind(), FailureKind::Timeout);
    assert_eq!(failures.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn test_pause_skips_runs_and_resume_catches_up() {
    let scheduler = Scheduler::with_config(paused_config());

    let handle = scheduler
        .register(
            TaskSpec::every_secs(10).with_name("pausable").build().unwrap(),
            |_ctx| async { Ok(()) },
        )
        .unwrap();

    scheduler.start().await.unwrap();

    // First run at t=0.
    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(handle.view().run_count, 1);
    handle.pause().unwrap();

    // The t=10 run is skipped while paused.
    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(handle.view().run_count, 1);

    // Resuming at t=15 leaves the due time at t=10, so the task is
    // immediately due and runs on the next tick.
    handle.resume().unwrap();
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(handle.view().run_count, 2);

    scheduler.stop().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_failures_do_not_stop_scheduling() {
    let scheduler = Scheduler::with_config(paused_config());
    let runs = Arc::new(AtomicU32::new(0));

    let runs_clone = Arc::clone(&runs);
    let handle = scheduler
        .register(
            TaskSpec::every_secs(1).with_name("alternating").build().unwrap(),
            move |_ctx| {
                let runs = Arc::clone(&runs_clone);
                async move {
                    let nth = runs.fetch_add(1, Ordering::SeqCst) + 1;
                    if nth % 2 == 0 {
                        Err(format!("failure on run {}", nth).into())
                    } else {
                        Ok(())
                    }
                }
            },
        )
        .unwrap();

    scheduler.start().await.unwrap();
    tokio::time::sleep(Duration::from_millis(5500)).await;

    let view = handle.view();
    assert_eq!(view.run_count, 6);
    assert_eq!(view.success_count, 3);
    assert_eq!(view.error_count, 3);
    let failure = view.last_error.unwrap();
    assert_eq!(failure.kind(), FailureKind::UserError);
    assert!(failure.message().contains("run 6"));

    // Still being scheduled after all those failures.
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(handle.view().run_count, 7);

    scheduler.stop().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_tiny_interval_runs_at_most_once_per_tick() {
    let scheduler = Scheduler::with_config(SchedulerConfig {
        check_interval: Duration::from_millis(1),
        ..SchedulerConfig::default()
    });
    let counter = Arc::new(AtomicU32::new(0));

    let counter_clone = Arc::clone(&counter);
    scheduler
        .register(
            TaskSpec::every(Duration::from_nanos(1))
                .with_name("eager")
                .build()
                .unwrap(),
            move |_ctx| {
                let counter = Arc::clone(&counter_clone);
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }
            },
        )
        .unwrap();

    scheduler.start().await.unwrap();
    tokio::time::sleep(Duration::from_micros(10500)).await;
    scheduler.stop().await.unwrap();

    // Eleven ticks elapsed (t = 0..=10 ms): one run per tick, no more.
    let runs = counter.load(Ordering::SeqCst);
    assert!(runs >= 10, "expected ~11 runs, got {}", runs);
    assert!(runs <= 11, "expected at most one run per tick, got {}", runs);
}

#[tokio::test(start_paused = true)]
async fn test_runs_of_one_task_never_overlap() {
    let scheduler = Scheduler::with_config(SchedulerConfig {
        check_interval: Duration::from_millis(50),
        ..SchedulerConfig::default()
    });
    let spans = Arc::new(Mutex::new(Vec::new()));

    // The body takes longer than the interval on purpose.
    let spans_clone = Arc::clone(&spans);
    scheduler
        .register(
            TaskSpec::every(Duration::from_millis(100))
                .with_name("overlapper")
                .build()
                .unwrap(),
            move |_ctx| {
                let spans = Arc::clone(&spans_clone);
                async move {
                    let started = tokio::time::Instant::now();
                    tokio::time::sleep(Duration::from_millis(250)).await;
                    spans
                        .lock()
                        .unwrap()
                        .push((started, tokio::time::Instant::now()));
                    Ok(())
                }
            },
        )
        .unwrap();

    scheduler.start().await.unwrap();
    tokio::time::sleep(Duration::from_secs(2)).await;
    scheduler.stop().await.unwrap();

    let spans = spans.lock().unwrap();
    assert!(spans.len() >= 3);
    for pair in spans.windows(2) {
        let (_, first_end) = pair[0];
        let (second_start, _) = pair[1];
        assert!(
            second_start >= first_end,
            "two runs of the same task overlapped"
        );
    }
}

#[tokio::test(start_paused = true)]
async fn test_observed_status_sequence_is_a_valid_path() {
    let scheduler = Scheduler::with_config(paused_config());
    let observed = Arc::new(Mutex::new(Vec::new()));
    let runs = Arc::new(AtomicU32::new(0));

    let runs_clone = Arc::clone(&runs);
    let handle = scheduler
        .register(
            TaskSpec::every_secs(1).with_name("traveller").build().unwrap(),
            move |_ctx| {
                let runs = Arc::clone(&runs_clone);
                async move {
                    if runs.fetch_add(1, Ordering::SeqCst) == 0 {
                        Ok(())
                    } else {
                        Err("second run fails".into())
                    }
                }
            },
        )
        .unwrap();

    let observed_clone = Arc::clone(&observed);
    handle.add_status_callback(move |_, old, new| {
        observed_clone.lock().unwrap().push((old, new));
    });

    scheduler.start().await.unwrap();
    // One success at t=0, one failure at t=1.
    tokio::time::sleep(Duration::from_millis(1500)).await;

    handle.pause().unwrap();
    handle.resume().unwrap();
    handle.stop().unwrap();
    handle.reset().unwrap();
    handle.cancel().unwrap();
    handle.reset().unwrap();

    scheduler.stop().await.unwrap();

    use TaskStatus::*;
    let observed = observed.lock().unwrap();
    assert_eq!(
        observed.as_slice(),
        &[
            (Pending, Running),
            (Running, Completed),
            (Completed, Pending),
            (Pending, Running),
            (Running, Failed),
            (Failed, Paused),
            (Paused, Pending),
            (Pending, Stopped),
            (Stopped, Pending),
            (Pending, Cancelled),
            (Cancelled, Pending),
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn test_no_callbacks_after_scheduler_stop_returns() {
    let scheduler = Scheduler::with_config(paused_config());
    let transitions = Arc::new(AtomicU32::new(0));

    let handle = scheduler
        .register(
            TaskSpec::every_secs(1).with_name("chatty").build().unwrap(),
            |_ctx| async { Ok(()) },
        )
        .unwrap();

    let transitions_clone = Arc::clone(&transitions);
    handle.add_status_callback(move |_, _, _| {
        transitions_clone.fetch_add(1, Ordering::SeqCst);
    });

    scheduler.start().await.unwrap();
    tokio::time::sleep(Duration::from_millis(2500)).await;
    scheduler.stop().await.unwrap();

    let after_stop = transitions.load(Ordering::SeqCst);
    assert!(after_stop > 0);

    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(transitions.load(Ordering::SeqCst), after_stop);
}

#[tokio::test(start_paused = true)]
async fn test_grace_expiry_abandons_stuck_run() {
    let scheduler = Scheduler::with_config(SchedulerConfig {
        check_interval: Duration::from_millis(10),
        shutdown_grace: Duration::from_secs(1),
        ..SchedulerConfig::default()
    });

    // Ignores its cancellation token entirely.
    let handle = scheduler
        .register(
            TaskSpec::every_secs(60).with_name("stubborn").build().unwrap(),
            |_ctx| async {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(())
            },
        )
        .unwrap();

    scheduler.start().await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(handle.status(), TaskStatus::Running);

    scheduler.stop().await.unwrap();

    // The stuck run was abandoned and the task marked cancelled; the
    // uncounted run leaves the counters consistent.
    let view = handle.view();
    assert_eq!(view.status, TaskStatus::Cancelled);
    assert_eq!(view.run_count, 0);
    assert_eq!(view.success_count, 0);
    assert_eq!(view.error_count, 0);
}

#[tokio::test(start_paused = true)]
async fn test_counters_stay_consistent_when_idle() {
    let scheduler = Scheduler::with_config(paused_config());
    let runs = Arc::new(AtomicU32::new(0));

    let runs_clone = Arc::clone(&runs);
    let handle = scheduler
        .register(
            TaskSpec::every_secs(1).with_name("mixed").build().unwrap(),
            move |_ctx| {
                let runs = Arc::clone(&runs_clone);
                async move {
                    if runs.fetch_add(1, Ordering::SeqCst) % 3 == 0 {
                        Err("every third run fails".into())
                    } else {
                        Ok(())
                    }
                }
            },
        )
        .unwrap();

    scheduler.start().await.unwrap();
    tokio::time::sleep(Duration::from_millis(4500)).await;
    scheduler.stop().await.unwrap();

    let view = handle.view();
    assert_ne!(view.status, TaskStatus::Running);
    assert_eq!(view.run_count, view.success_count + view.error_count);
    assert!(view.run_count >= 4);
}

#[tokio::test(start_paused = true)]
async fn test_stop_then_reset_returns_task_to_service() {
    let scheduler = Scheduler::with_config(paused_config());

    let handle = scheduler
        .register(
            TaskSpec::every_secs(1).with_name("revivable").build().unwrap(),
            |_ctx| async { Ok(()) },
        )
        .unwrap();

    scheduler.start().await.unwrap();
    tokio::time::sleep(Duration::from_millis(1500)).await;

    handle.stop().unwrap();
    let runs_at_stop = handle.view().run_count;
    assert!(runs_at_stop >= 1);

    // Stopped is sticky: nothing runs.
    tokio::time::sleep(Duration::from_secs(3)).await;
    assert_eq!(handle.view().run_count, runs_at_stop);

    // Reset keeps the accumulated counters and resumes scheduling.
    handle.reset().unwrap();
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(handle.view().run_count > runs_at_stop);

    scheduler.stop().await.unwrap();
}
