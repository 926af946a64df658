use anyhow::Result;
use chrono::{Local, NaiveDate};
use ptrack_core::live::TrackerView;
use ptrack_core::query::{filter_tasks, Query};
use ptrack_core::realm_config::RealmConfig;

use crate::cli::BoardCommand;
use crate::commands::AppTracker;
use crate::config::Config;
use crate::parser::parse_date;
use crate::query_parser::parse_query;
use crate::views::board::{legend, render_board};

/// Widest timeline the board will draw.
const MAX_BOARD_DAYS: u32 = 366;

/// Window and filter shared by `board` and `watch`.
pub(crate) struct BoardSettings {
    pub start: NaiveDate,
    pub days: u32,
    pub query: Option<Query>,
}

impl BoardSettings {
    pub fn from_command(command: &BoardCommand, config: &Config) -> Result<Self> {
        let start = match &command.from {
            Some(from) => parse_date(from)?,
            None => Local::now().date_naive(),
        };
        let days = command.days.unwrap_or(config.board_days);
        if !(1..=MAX_BOARD_DAYS).contains(&days) {
            anyhow::bail!("--days must be between 1 and {MAX_BOARD_DAYS}");
        }
        let query_str = if command.query.trim().is_empty() {
            config.default_query()
        } else {
            command.query.clone()
        };
        Ok(Self {
            start,
            days,
            query: parse_query(&query_str)?,
        })
    }

    pub fn render(&self, view: &TrackerView, realm_config: &RealmConfig) -> String {
        if let Some(error) = &view.error {
            return format!("Failed to load tracker data: {error}");
        }
        let tasks = filter_tasks(&view.tasks, self.query.as_ref());
        format!(
            "{}\n{}",
            render_board(&tasks, realm_config, self.start, self.days),
            legend()
        )
    }
}

pub async fn show_board(tracker: &AppTracker, command: BoardCommand, config: &Config) -> Result<()> {
    let settings = BoardSettings::from_command(&command, config)?;
    let realm_config = tracker.config().await?;
    println!("{}", settings.render(&tracker.view(), &realm_config));
    Ok(())
}
