use anyhow::Result;
use ptrack_core::repository::AuditLog;
use ptrack_core::session::Session;

use crate::cli::LogCommand;
use crate::commands::AppTracker;
use crate::views::table::display_actions;

pub async fn show_log(tracker: &AppTracker, session: &Session, command: LogCommand) -> Result<()> {
    let actions = tracker
        .repository()
        .find_actions(session.realm_id, command.limit.max(1))
        .await?;
    display_actions(&actions);
    Ok(())
}
