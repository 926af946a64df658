//! Children-first delete plans.
//!
//! The backend has no foreign-key cascade, so removing a task means removing
//! its milestones, sub-subtasks and subtasks by hand, deepest level first.
//! Steps are executed in order, best effort and without rollback.

use crate::aggregate::{GroupedSubSubtask, GroupedSubtask, GroupedTask};
use crate::error::CoreError;
use crate::models::EntityKind;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteStep {
    Milestone(Uuid),
    SubSubtask(Uuid),
    Subtask(Uuid),
    Task(Uuid),
}

impl DeleteStep {
    pub fn id(&self) -> Uuid {
        match self {
            DeleteStep::Milestone(id)
            | DeleteStep::SubSubtask(id)
            | DeleteStep::Subtask(id)
            | DeleteStep::Task(id) => *id,
        }
    }

    pub fn kind(&self) -> EntityKind {
        match self {
            DeleteStep::Milestone(_) => EntityKind::Milestone,
            DeleteStep::SubSubtask(_) => EntityKind::SubSubtask,
            DeleteStep::Subtask(_) => EntityKind::Subtask,
            DeleteStep::Task(_) => EntityKind::Task,
        }
    }
}

/// An ordered list of deletes that never removes a parent before its children.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeletePlan {
    steps: Vec<DeleteStep>,
}

impl DeletePlan {
    pub fn steps(&self) -> &[DeleteStep] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    fn push_step(&mut self, step: &GroupedSubSubtask) {
        self.steps
            .extend(step.milestones.iter().map(|m| DeleteStep::Milestone(m.id)));
        self.steps.push(DeleteStep::SubSubtask(step.sub_subtask.id));
    }

    fn push_subtask(&mut self, subtask: &GroupedSubtask) {
        // Sub-subtask milestones go first, then the sub-subtasks, then the
        // subtask's own milestones.
        for step in &subtask.sub_subtasks {
            self.steps
                .extend(step.milestones.iter().map(|m| DeleteStep::Milestone(m.id)));
        }
        self.steps.extend(
            subtask
                .sub_subtasks
                .iter()
                .map(|s| DeleteStep::SubSubtask(s.sub_subtask.id)),
        );
        self.steps
            .extend(subtask.milestones.iter().map(|m| DeleteStep::Milestone(m.id)));
        self.steps.push(DeleteStep::Subtask(subtask.subtask.id));
    }
}

pub fn plan_task_delete(task: &GroupedTask) -> DeletePlan {
    let mut plan = DeletePlan::default();
    for subtask in &task.subtasks {
        plan.push_subtask(subtask);
    }
    plan.steps.push(DeleteStep::Task(task.task.id));
    plan
}

pub fn plan_subtask_delete(subtask: &GroupedSubtask) -> DeletePlan {
    let mut plan = DeletePlan::default();
    plan.push_subtask(subtask);
    plan
}

pub fn plan_sub_subtask_delete(step: &GroupedSubSubtask) -> DeletePlan {
    let mut plan = DeletePlan::default();
    plan.push_step(step);
    plan
}

/// Outcome of running a plan.
#[derive(Debug, Default)]
pub struct CascadeReport {
    pub completed: Vec<DeleteStep>,
    pub failed: Vec<(DeleteStep, CoreError)>,
}

impl CascadeReport {
    pub fn total(&self) -> usize {
        self.completed.len() + self.failed.len()
    }

    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }

    pub fn into_result(self) -> Result<usize, CoreError> {
        let total = self.total();
        match self.failed.into_iter().next() {
            None => Ok(total),
            Some((step, error)) => Err(CoreError::PartialCascade {
                failed: total - self.completed.len(),
                total,
                first_error: format!("{:?} {}: {}", step.kind(), step.id(), error),
            }),
        }
    }
}
