use dialoguer::Confirm;
use owo_colors::{OwoColorize, Style};
use ptrack_core::repository::SqliteRepository;
use ptrack_core::tracker::Tracker;

pub mod board;
pub mod config;
pub mod log;
pub mod milestone;
pub mod realm;
pub mod step;
pub mod subtask;
pub mod task;
pub mod temp;
pub mod user;
pub mod watch;

pub type AppTracker = Tracker<SqliteRepository>;

/// Asks before a destructive action unless `force` is set.
pub(crate) fn confirm(force: bool, prompt: String) -> bool {
    if force {
        return true;
    }
    let confirmed = Confirm::new()
        .with_prompt(prompt)
        .default(false)
        .interact()
        .unwrap_or(false);
    if !confirmed {
        println!("Deletion cancelled.");
    }
    confirmed
}

pub(crate) fn success(message: impl std::fmt::Display) {
    let style = Style::new().green().bold();
    println!("{} {}", "✓".style(style), message);
}
