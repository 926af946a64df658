use anyhow::Result;
use uuid::Uuid;

use crate::cli::{EditAssignableCommand, SubtaskSubcommand};
use crate::commands::{confirm, success, AppTracker};
use crate::util::{resolve_id, resolve_user, short_id, IdKind};

/// The assignment requested by `--assign`/`--unassign`, if any.
pub(crate) fn requested_assignment(tracker: &AppTracker, command: &EditAssignableCommand) -> Result<Option<Option<Uuid>>> {
    if command.unassign {
        return Ok(Some(None));
    }
    command
        .assign
        .as_deref()
        .map(|user| resolve_user(&tracker.view(), user).map(Some))
        .transpose()
}

pub async fn subtask_command(tracker: &AppTracker, command: SubtaskSubcommand) -> Result<()> {
    match command {
        SubtaskSubcommand::Add(command) => {
            let view = tracker.view();
            let task_id = resolve_id(&view, IdKind::Task, &command.task)?;
            let assignee = command.assign.as_deref().map(|u| resolve_user(&view, u)).transpose()?;
            let subtask = tracker.add_subtask(task_id, &command.name, assignee).await?;
            success(format!("Created subtask {} '{}'", short_id(subtask.id), subtask.name));
        }
        SubtaskSubcommand::Edit(command) => {
            let id = resolve_id(&tracker.view(), IdKind::Subtask, &command.id)?;
            let assignment = requested_assignment(tracker, &command)?;
            if command.name.is_none() && assignment.is_none() {
                anyhow::bail!("Nothing to change: pass --name, --assign or --unassign");
            }
            if let Some(name) = &command.name {
                tracker.rename_subtask(id, name).await?;
            }
            if let Some(user) = assignment {
                tracker.assign_subtask(id, user).await?;
            }
            success(format!("Updated subtask {}", short_id(id)));
        }
        SubtaskSubcommand::Delete(command) => {
            let view = tracker.view();
            let id = resolve_id(&view, IdKind::Subtask, &command.id)?;
            let name = view
                .tasks
                .iter()
                .flat_map(|t| t.subtasks.iter())
                .find(|s| s.subtask.id == id)
                .map(|s| s.subtask.name.clone())
                .unwrap_or_default();
            if !confirm(command.force, format!("Delete subtask '{name}' with its steps and milestones?")) {
                return Ok(());
            }
            let removed = tracker.delete_subtask(id).await?;
            success(format!("Deleted subtask {} '{}' ({} row(s) removed)", short_id(id), name, removed));
        }
    }
    Ok(())
}
