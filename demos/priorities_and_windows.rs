use std::error::Error;
use std::time::Duration;

use chrono::NaiveTime;
use env_logger::Builder;
use log::{info, LevelFilter};
use metronome::{Priority, Scheduler, SchedulerConfig, TaskSpec, TimeWindow};

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    Builder::new().filter_level(LevelFilter::Info).init();

    let scheduler = Scheduler::with_config(SchedulerConfig {
        check_interval: Duration::from_millis(100),
        ..SchedulerConfig::default()
    });

    // When both are due on the same tick, the critical task goes first.
    scheduler.register(
        TaskSpec::every_secs(3)
            .with_name("flush-wal")
            .with_priority(Priority::Critical)
            .build()?,
        |_ctx| async {
            info!("flushing write-ahead log");
            Ok(())
        },
    )?;

    scheduler.register(
        TaskSpec::every_secs(3)
            .with_name("refresh-metrics")
            .with_priority(Priority::Low)
            .build()?,
        |_ctx| async {
            info!("refreshing metrics");
            Ok(())
        },
    )?;

    // Confined to business hours; outside the window the task stays due
    // but is never dispatched.
    scheduler.register(
        TaskSpec::every_secs(10)
            .with_name("sync-upstream")
            .with_window(TimeWindow::new(
                NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
                NaiveTime::from_hms_opt(17, 0, 0).unwrap(),
            ))
            .with_max_running_time(Duration::from_secs(5))
            .build()?,
        |ctx| async move {
            info!("syncing with upstream");
            // Honor the cancellation token so timeouts can interrupt us.
            tokio::select! {
                _ = tokio::time::sleep(Duration::from_secs(1)) => Ok(()),
                _ = ctx.cancelled() => Ok(()),
            }
        },
    )?;

    scheduler.start().await?;
    info!("Scheduler running. Will run for 30 seconds...");
    tokio::time::sleep(Duration::from_secs(30)).await;
    scheduler.stop().await?;

    Ok(())
}
