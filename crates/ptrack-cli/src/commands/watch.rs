use std::time::Duration;

use anyhow::Result;

use crate::cli::BoardCommand;
use crate::commands::board::BoardSettings;
use crate::commands::AppTracker;
use crate::config::Config;

const CLEAR_SCREEN: &str = "\x1b[2J\x1b[H";

/// Writes from other `ptrack` processes never reach this process's change
/// bus, so the realm is also refetched on this interval.
const REFETCH_INTERVAL: Duration = Duration::from_secs(5);

/// Re-renders the board whenever the live view changes, until Ctrl-C.
pub async fn watch_board(tracker: &AppTracker, command: BoardCommand, config: &Config) -> Result<()> {
    let settings = BoardSettings::from_command(&command, config)?;
    let realm_config = tracker.config().await?;
    let mut views = tracker.watch();
    let mut refetch = tokio::time::interval(REFETCH_INTERVAL);
    refetch.tick().await;
    let mut last_frame = String::new();

    loop {
        let view = views.borrow_and_update().clone();
        if !view.loading {
            let frame = settings.render(&view, &realm_config);
            if frame != last_frame {
                print!("{CLEAR_SCREEN}");
                println!("{frame}");
                println!("watching for changes, Ctrl-C to stop");
                last_frame = frame;
            }
        }

        tokio::select! {
            changed = views.changed() => {
                if changed.is_err() {
                    tracing::warn!("live store closed, stopping watch");
                    break;
                }
            }
            _ = refetch.tick() => {
                if let Err(e) = tracker.refetch().await {
                    tracing::warn!(error = %e, "periodic refetch failed");
                }
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }
    Ok(())
}
