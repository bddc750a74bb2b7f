use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use watchearn::{InMemoryLedger, WatchConfig, WatchController, WatchEvent, WatchSubject};

/// Runs one watch-to-earn session against the in-memory ledger: a short
/// target, a mid-watch visibility flap, settlement, and the redirect
/// countdown.
#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .init();

    let config = WatchConfig {
        target_duration: Duration::from_secs(3),
        redirect_delay: Duration::from_secs(2),
        ..WatchConfig::default()
    };

    let ledger = Arc::new(InMemoryLedger::new(0.05, Some(5)));
    let controller = WatchController::new(ledger, config);
    let mut events = controller.subscribe();

    controller
        .begin_watch(WatchSubject::with_destination(
            "demo-post",
            "https://example.com/offer",
        ))
        .await?;

    // background the tab for a moment; none of this counts toward the target
    controller.set_hidden(true).await;
    tokio::time::sleep(Duration::from_millis(500)).await;
    controller.set_hidden(false).await;

    loop {
        match events.recv().await? {
            WatchEvent::Progress { percent, .. } => log::info!("watched {percent:.0}%"),
            WatchEvent::Completed {
                credited_amount, ..
            } => println!("credited ${credited_amount:.2}"),
            WatchEvent::RedirectPending { url, delay_ms } => {
                println!("redirecting to {url} in {}s", delay_ms / 1000);
            }
            WatchEvent::Redirect { url } => {
                println!("navigating to {url}");
                break;
            }
            WatchEvent::Failed { reason, .. } => {
                eprintln!("watch failed: {reason}");
                break;
            }
            WatchEvent::Cancelled => break,
        }
    }

    controller.teardown().await;
    Ok(())
}
