use anyhow::Result;
use ptrack_core::live::TrackerView;
use ptrack_core::models::{NewTempTask, TempTaskPatch, TempTaskStatus};
use ptrack_core::repository::query_builder::Direction;
use ptrack_core::repository::TempTaskRepository;
use ptrack_core::session::Session;
use ptrack_core::temp::{TempTaskQuery, TempTaskSort};
use uuid::Uuid;

use crate::cli::{AddTempCommand, EditTempCommand, ListTempCommand, TempSubcommand};
use crate::commands::{confirm, success, AppTracker};
use crate::util::{resolve_among, resolve_user, short_id};
use crate::views::table::{display_temp_page, display_temp_stats};

fn assignee(view: &TrackerView, input: &str) -> Result<(Uuid, String)> {
    let id = resolve_user(view, input)?;
    let name = view
        .users
        .iter()
        .find(|u| u.id == id)
        .map(|u| u.full_name.clone())
        .unwrap_or_default();
    Ok((id, name))
}

async fn resolve_temp(tracker: &AppTracker, session: &Session, input: &str) -> Result<Uuid> {
    let candidates = tracker
        .repository()
        .find_temp_tasks(session.realm_id)
        .await?
        .into_iter()
        .map(|t| (t.id, t.name))
        .collect();
    resolve_among(candidates, "temp task", input)
}

pub async fn temp_command(tracker: &AppTracker, session: &Session, command: TempSubcommand) -> Result<()> {
    match command {
        TempSubcommand::Add(command) => add_temp(tracker, command).await?,
        TempSubcommand::List(command) => list_temp(tracker, command).await?,
        TempSubcommand::Edit(command) => edit_temp(tracker, session, command).await?,
        TempSubcommand::Delete(command) => {
            let id = resolve_temp(tracker, session, &command.id).await?;
            if !confirm(command.force, format!("Delete temp task {}?", short_id(id))) {
                return Ok(());
            }
            tracker.delete_temp_task(id).await?;
            success(format!("Deleted temp task {}", short_id(id)));
        }
        TempSubcommand::Stats => display_temp_stats(&tracker.temp_task_stats().await?),
    }
    Ok(())
}

async fn add_temp(tracker: &AppTracker, command: AddTempCommand) -> Result<()> {
    let mut data = NewTempTask {
        name: command.name,
        priority: command.priority.into(),
        ..NewTempTask::default()
    };
    if let Some(input) = &command.assign {
        let (id, name) = assignee(&tracker.view(), input)?;
        data.user_id = Some(id);
        data.assigned_byname = name;
        data.status = TempTaskStatus::Assigned;
    }
    let task = tracker.add_temp_task(data).await?;
    success(format!("Created temp task {} '{}'", short_id(task.id), task.name));
    Ok(())
}

async fn list_temp(tracker: &AppTracker, command: ListTempCommand) -> Result<()> {
    let query = TempTaskQuery {
        page: command.page.max(1),
        sort: command.sort.parse::<TempTaskSort>()?,
        direction: if command.asc { Direction::Asc } else { Direction::Desc },
    };
    display_temp_page(&tracker.temp_task_page(query).await?);
    Ok(())
}

async fn edit_temp(tracker: &AppTracker, session: &Session, command: EditTempCommand) -> Result<()> {
    let id = resolve_temp(tracker, session, &command.id).await?;
    let mut patch = TempTaskPatch {
        name: command.name,
        priority: command.priority.map(Into::into),
        status: command.status.map(Into::into),
        ..TempTaskPatch::default()
    };
    if command.unassign {
        patch.user_id = Some(None);
        patch.assigned_byname = Some(String::new());
    } else if let Some(input) = &command.assign {
        let (user, name) = assignee(&tracker.view(), input)?;
        patch.user_id = Some(Some(user));
        patch.assigned_byname = Some(name);
    }
    if patch.name.is_none() && patch.priority.is_none() && patch.status.is_none() && patch.user_id.is_none() {
        anyhow::bail!("Nothing to change");
    }
    let task = tracker.update_temp_task(id, patch).await?;
    success(format!("Updated temp task {} '{}'", short_id(task.id), task.name));
    Ok(())
}
