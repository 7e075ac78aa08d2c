use std::error::Error;

use env_logger::Builder;
use log::{info, LevelFilter};
use metronome::{Scheduler, TaskSpec};

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    // Initialize the logger
    Builder::new().filter_level(LevelFilter::Info).init();

    info!("Starting basic scheduler example");

    // Create a new scheduler
    let scheduler = Scheduler::new();

    // A heartbeat every two seconds
    scheduler.register(
        TaskSpec::every_secs(2).with_name("heartbeat").build()?,
        |_ctx| async {
            info!("Executing task: heartbeat");
            Ok(())
        },
    )?;

    // A slower job that simulates some work
    scheduler.register(
        TaskSpec::every_secs(5).with_name("report").build()?,
        |_ctx| async {
            info!("Executing task: report");
            tokio::time::sleep(tokio::time::Duration::from_millis(500)).await;
            Ok(())
        },
    )?;

    info!("Scheduled tasks: {:?}", scheduler.task_names());

    // Start the scheduler in the background
    scheduler.start().await?;

    info!("Scheduler running. Will run for 20 seconds...");
    tokio::time::sleep(tokio::time::Duration::from_secs(20)).await;

    // Stop the scheduler
    info!("Stopping scheduler...");
    scheduler.stop().await?;

    // Final statistics
    for name in scheduler.task_names() {
        if let Some(handle) = scheduler.get_task(&name) {
            let view = handle.view();
            info!(
                "Task '{}': {} runs, {} ok, {} failed",
                name, view.run_count, view.success_count, view.error_count
            );
        }
    }

    info!("Scheduler stopped. Example complete.");
    Ok(())
}
