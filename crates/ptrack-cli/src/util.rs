use anyhow::{anyhow, Result};
use ptrack_core::error::CoreError;
use ptrack_core::live::TrackerView;
use ptrack_core::models::MilestoneParent;
use uuid::Uuid;

/// Eight hex digits shown in tables. UUIDv7 ids share their leading
/// timestamp digits, so the short form is taken from the random tail.
pub fn short_id(id: Uuid) -> String {
    let hex = id.simple().to_string();
    hex[hex.len() - 8..].to_string()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdKind {
    Task,
    Subtask,
    Step,
    Milestone,
}

impl IdKind {
    fn label(&self) -> &'static str {
        match self {
            IdKind::Task => "task",
            IdKind::Subtask => "subtask",
            IdKind::Step => "step",
            IdKind::Milestone => "milestone",
        }
    }
}

fn candidates(view: &TrackerView, kind: IdKind) -> Vec<(Uuid, String)> {
    let tasks = view.tasks.iter();
    match kind {
        IdKind::Task => tasks.map(|t| (t.task.id, t.task.name.clone())).collect(),
        IdKind::Subtask => tasks
            .flat_map(|t| t.subtasks.iter())
            .map(|s| (s.subtask.id, s.subtask.name.clone()))
            .collect(),
        IdKind::Step => tasks
            .flat_map(|t| t.subtasks.iter())
            .flat_map(|s| s.sub_subtasks.iter())
            .map(|s| (s.sub_subtask.id, s.sub_subtask.name.clone()))
            .collect(),
        IdKind::Milestone => tasks
            .flat_map(|t| t.subtasks.iter())
            .flat_map(|s| s.all_milestones())
            .map(|m| (m.id, format!("{} on {}", m.milestone_text, m.milestone_date)))
            .collect(),
    }
}

fn matches_input(id: Uuid, input: &str) -> bool {
    short_id(id).starts_with(input) || id.simple().to_string().starts_with(input)
}

fn pick(matches: Vec<(Uuid, String)>, input: &str, what: &str) -> Result<Uuid> {
    match matches.len() {
        1 => Ok(matches[0].0),
        0 => Err(anyhow!(CoreError::NotFound(format!(
            "No {} found with ID '{}'",
            what, input
        )))),
        _ => Err(anyhow!(CoreError::AmbiguousId(
            matches
                .into_iter()
                .map(|(id, name)| (short_id(id), name))
                .collect()
        ))),
    }
}

fn normalize(input: &str) -> Result<String> {
    let normalized = input.trim().to_lowercase().replace('-', "");
    if normalized.len() < 2 {
        return Err(anyhow!(CoreError::InvalidInput(
            "Short ID must be at least 2 characters long.".to_string()
        )));
    }
    Ok(normalized)
}

/// Resolves a full UUID or a short-id prefix against the live view.
pub fn resolve_id(view: &TrackerView, kind: IdKind, input: &str) -> Result<Uuid> {
    if let Ok(id) = Uuid::parse_str(input.trim()) {
        return Ok(id);
    }
    let needle = normalize(input)?;
    let matches = candidates(view, kind)
        .into_iter()
        .filter(|(id, _)| matches_input(*id, &needle))
        .collect();
    pick(matches, input, kind.label())
}

/// Resolves an id among rows that are not part of the live view.
pub fn resolve_among(candidates: Vec<(Uuid, String)>, what: &str, input: &str) -> Result<Uuid> {
    if let Ok(id) = Uuid::parse_str(input.trim()) {
        return Ok(id);
    }
    let needle = normalize(input)?;
    let matches = candidates
        .into_iter()
        .filter(|(id, _)| matches_input(*id, &needle))
        .collect();
    pick(matches, input, what)
}

/// Resolves a milestone parent, which may be either a subtask or a step.
pub fn resolve_milestone_parent(view: &TrackerView, input: &str) -> Result<MilestoneParent> {
    let needle = match Uuid::parse_str(input.trim()) {
        Ok(id) => id.simple().to_string(),
        Err(_) => normalize(input)?,
    };
    let subtasks: Vec<_> = candidates(view, IdKind::Subtask)
        .into_iter()
        .filter(|(id, _)| matches_input(*id, &needle))
        .collect();
    let steps: Vec<_> = candidates(view, IdKind::Step)
        .into_iter()
        .filter(|(id, _)| matches_input(*id, &needle))
        .collect();

    match (subtasks.len(), steps.len()) {
        (1, 0) => Ok(MilestoneParent::Subtask(subtasks[0].0)),
        (0, 1) => Ok(MilestoneParent::SubSubtask(steps[0].0)),
        _ => {
            let all: Vec<_> = subtasks.into_iter().chain(steps).collect();
            pick(all, input, "subtask or step").map(MilestoneParent::Subtask)
        }
    }
}

/// Resolves a user by email or id.
pub fn resolve_user(view: &TrackerView, input: &str) -> Result<Uuid> {
    let input = input.trim();
    if input.contains('@') {
        let email = input.to_lowercase();
        return view
            .users
            .iter()
            .find(|u| u.email == email)
            .map(|u| u.id)
            .ok_or_else(|| anyhow!(CoreError::NotFound(format!("No user with email '{}'", input))));
    }
    if let Ok(id) = Uuid::parse_str(input) {
        return Ok(id);
    }
    let needle = normalize(input)?;
    let matches = view
        .users
        .iter()
        .filter(|u| matches_input(u.id, &needle))
        .map(|u| (u.id, u.email.clone()))
        .collect();
    pick(matches, input, "user")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_id_uses_the_tail() {
        let id = Uuid::parse_str("018f0a6e-0000-7000-8000-00000000beef").unwrap();
        assert_eq!(short_id(id), "0000beef");
    }

    #[test]
    fn test_unknown_id_is_not_found() {
        let view = TrackerView::default();
        let err = resolve_id(&view, IdKind::Task, "abcd").unwrap_err();
        assert!(matches!(err.downcast_ref::<CoreError>(), Some(CoreError::NotFound(_))));

        let err = resolve_id(&view, IdKind::Task, "a").unwrap_err();
        assert!(matches!(err.downcast_ref::<CoreError>(), Some(CoreError::InvalidInput(_))));
    }
}
