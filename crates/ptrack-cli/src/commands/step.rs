use anyhow::Result;

use crate::cli::StepSubcommand;
use crate::commands::subtask::requested_assignment;
use crate::commands::{confirm, success, AppTracker};
use crate::util::{resolve_id, resolve_user, short_id, IdKind};

pub async fn step_command(tracker: &AppTracker, command: StepSubcommand) -> Result<()> {
    match command {
        StepSubcommand::Add(command) => {
            let view = tracker.view();
            let subtask_id = resolve_id(&view, IdKind::Subtask, &command.subtask)?;
            let assignee = command.assign.as_deref().map(|u| resolve_user(&view, u)).transpose()?;
            let step = tracker.add_sub_subtask(subtask_id, &command.name, assignee).await?;
            success(format!(
                "Created step {} '{}' at position {}",
                short_id(step.id),
                step.name,
                step.order_index + 1
            ));
        }
        StepSubcommand::Edit(command) => {
            let id = resolve_id(&tracker.view(), IdKind::Step, &command.id)?;
            let assignment = requested_assignment(tracker, &command)?;
            if command.name.is_none() && assignment.is_none() {
                anyhow::bail!("Nothing to change: pass --name, --assign or --unassign");
            }
            if let Some(name) = &command.name {
                tracker.rename_sub_subtask(id, name).await?;
            }
            if let Some(user) = assignment {
                tracker.assign_sub_subtask(id, user).await?;
            }
            success(format!("Updated step {}", short_id(id)));
        }
        StepSubcommand::Delete(command) => {
            let id = resolve_id(&tracker.view(), IdKind::Step, &command.id)?;
            if !confirm(command.force, format!("Delete step {} with its milestones?", short_id(id))) {
                return Ok(());
            }
            let removed = tracker.delete_sub_subtask(id).await?;
            success(format!("Deleted step {} ({} row(s) removed)", short_id(id), removed));
        }
    }
    Ok(())
}
