use anyhow::Result;
use ptrack_core::models::TaskPatch;
use ptrack_core::query::filter_tasks;

use crate::cli::{AddTaskCommand, EditTaskCommand, TaskSubcommand};
use crate::commands::{confirm, success, AppTracker};
use crate::config::Config;
use crate::query_parser::parse_query;
use crate::util::{resolve_id, short_id, IdKind};
use crate::views::table::{display_task_detail, display_tasks};

pub async fn task_command(tracker: &AppTracker, command: TaskSubcommand, config: &Config) -> Result<()> {
    match command {
        TaskSubcommand::Add(command) => add_task(tracker, command).await,
        TaskSubcommand::List(command) => {
            let query_str = if command.query.trim().is_empty() {
                config.default_query()
            } else {
                command.query
            };
            let query = parse_query(&query_str)?;
            let view = tracker.view();
            let realm_config = tracker.config().await?;
            display_tasks(&filter_tasks(&view.tasks, query.as_ref()), &realm_config);
            Ok(())
        }
        TaskSubcommand::Show(command) => {
            let view = tracker.view();
            let id = resolve_id(&view, IdKind::Task, &command.id)?;
            if let Some(task) = view.find_task(id) {
                display_task_detail(task, &view.users);
            }
            Ok(())
        }
        TaskSubcommand::Edit(command) => edit_task(tracker, command).await,
        TaskSubcommand::Delete(command) => {
            let view = tracker.view();
            let id = resolve_id(&view, IdKind::Task, &command.id)?;
            let name = view.find_task(id).map(|t| t.task.name.clone()).unwrap_or_default();
            if !confirm(
                command.force,
                format!("Delete task '{name}' with all of its subtasks, steps and milestones?"),
            ) {
                return Ok(());
            }
            let removed = tracker.delete_task(id).await?;
            success(format!("Deleted task {} '{}' ({} row(s) removed)", short_id(id), name, removed));
            Ok(())
        }
    }
}

async fn add_task(tracker: &AppTracker, command: AddTaskCommand) -> Result<()> {
    let task = tracker
        .create_task(&command.name, command.category.into(), command.priority)
        .await?;
    success(format!("Created task {} '{}'", short_id(task.id), task.name));
    Ok(())
}

async fn edit_task(tracker: &AppTracker, command: EditTaskCommand) -> Result<()> {
    let id = resolve_id(&tracker.view(), IdKind::Task, &command.id)?;
    let patch = TaskPatch {
        name: command.name,
        category: command.category.map(Into::into),
        priority: command.priority,
    };
    if patch.name.is_none() && patch.category.is_none() && patch.priority.is_none() {
        anyhow::bail!("Nothing to change: pass --name, --category and/or --priority");
    }
    let task = tracker.update_task(id, patch).await?;
    success(format!(
        "Updated task {} '{}' [{} | priority {}]",
        short_id(task.id),
        task.name,
        task.category,
        task.priority
    ));
    Ok(())
}
