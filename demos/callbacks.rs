use std::error::Error;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use env_logger::Builder;
use log::{info, warn, LevelFilter};
use metronome::{Scheduler, TaskSpec};

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    Builder::new().filter_level(LevelFilter::Info).init();

    let scheduler = Scheduler::new();
    let attempts = Arc::new(AtomicU32::new(0));

    // Fails every other run so both callback paths fire.
    let handle = scheduler.register(
        TaskSpec::every_secs(2).with_name("flaky-import").build()?,
        move |_ctx| {
            let attempts = Arc::clone(&attempts);
            async move {
                if attempts.fetch_add(1, Ordering::SeqCst) % 2 == 0 {
                    Ok(())
                } else {
                    Err("upstream returned 503".into())
                }
            }
        },
    )?;

    handle.add_status_callback(|view, old, new| {
        info!("'{}' moved {} -> {}", view.name, old, new);
    });

    handle.add_success_callback(|view| {
        info!("'{}' succeeded ({} total)", view.name, view.success_count);
    });

    let failure_id = handle.add_failure_callback(|view, failure| {
        warn!(
            "'{}' failed ({} total): {}",
            view.name, view.error_count, failure
        );
    });

    scheduler.start().await?;
    tokio::time::sleep(Duration::from_secs(7)).await;

    // Callbacks can be detached again by their id.
    handle.remove_failure_callback(failure_id);
    info!("failure callback removed; running quietly for a bit");
    tokio::time::sleep(Duration::from_secs(4)).await;

    scheduler.stop().await?;

    let view = handle.view();
    info!(
        "final: {} runs, {} failures, last error: {:?}",
        view.run_count,
        view.error_count,
        view.last_error.map(|e| e.to_string())
    );
    Ok(())
}
