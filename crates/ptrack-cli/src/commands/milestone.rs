use anyhow::Result;
use ptrack_core::realm_config::MilestoneOption;

use crate::cli::MilestoneSubcommand;
use crate::commands::{confirm, success, AppTracker};
use crate::parser::parse_date;
use crate::util::{resolve_id, resolve_milestone_parent, short_id, IdKind};

/// Maps a typed label onto the realm's vocabulary when it names a known
/// option; anything else is kept as free text.
fn canonical_label(options: &[MilestoneOption], input: &str) -> String {
    let input = input.trim();
    options
        .iter()
        .find(|o| o.value.eq_ignore_ascii_case(input) || o.label.eq_ignore_ascii_case(input))
        .map(|o| o.label.clone())
        .unwrap_or_else(|| input.to_string())
}

pub async fn milestone_command(tracker: &AppTracker, command: MilestoneSubcommand) -> Result<()> {
    match command {
        MilestoneSubcommand::Add(command) => {
            let parent = resolve_milestone_parent(&tracker.view(), &command.parent)?;
            let date = parse_date(&command.on)?;
            let options = tracker.config().await?.milestone_options();
            let label = canonical_label(&options, &command.label);
            let milestone = tracker.add_milestone(parent, date, &label).await?;
            success(format!(
                "Added milestone {} '{}' on {}",
                short_id(milestone.id),
                milestone.milestone_text,
                milestone.milestone_date
            ));
        }
        MilestoneSubcommand::Delete(command) => {
            let id = resolve_id(&tracker.view(), IdKind::Milestone, &command.id)?;
            if !confirm(command.force, format!("Delete milestone {}?", short_id(id))) {
                return Ok(());
            }
            tracker.delete_milestone(id).await?;
            success(format!("Deleted milestone {}", short_id(id)));
        }
    }
    Ok(())
}
