//! # Aggregator
//!
//! Turns the flat Record Store into the nested view consumed by the board:
//! task, its subtasks, and each subtask's milestones and sub-subtasks.
//! Every join stays inside the store's realm.
//!
//! Also home to the ACTUAL rollup: for each milestone label, the latest date
//! reached by any non-PLANNED subtask or sub-subtask of a task.

use crate::models::{is_planned, Milestone, SubSubtask, Subtask, Task, User};
use crate::store::{RecordStore, StoreRevision};
use chrono::NaiveDate;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq)]
pub struct GroupedSubSubtask {
    pub sub_subtask: SubSubtask,
    pub assigned_user: Option<User>,
    pub milestones: Vec<Milestone>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GroupedSubtask {
    pub subtask: Subtask,
    pub assigned_user: Option<User>,
    pub milestones: Vec<Milestone>,
    pub sub_subtasks: Vec<GroupedSubSubtask>,
}

impl GroupedSubtask {
    pub fn is_planned(&self) -> bool {
        self.subtask.is_planned()
    }

    /// Milestones of this subtask and all of its sub-subtasks.
    pub fn all_milestones(&self) -> impl Iterator<Item = &Milestone> {
        self.milestones
            .iter()
            .chain(self.sub_subtasks.iter().flat_map(|s| s.milestones.iter()))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GroupedTask {
    pub task: Task,
    pub subtasks: Vec<GroupedSubtask>,
}

impl GroupedTask {
    /// The baseline-plan row, if the task has one.
    pub fn planned(&self) -> Option<&GroupedSubtask> {
        self.subtasks.iter().find(|s| s.is_planned())
    }

    /// Every subtask that feeds the ACTUAL rollup.
    pub fn actual_contributors(&self) -> impl Iterator<Item = &GroupedSubtask> {
        self.subtasks.iter().filter(|s| !s.is_planned())
    }

    pub fn actual(&self) -> ActualRollup {
        ActualRollup::for_task(self)
    }

    /// A task counts as closed once any subtask carries a `CLOSED` milestone.
    pub fn is_closed(&self) -> bool {
        self.subtasks.iter().any(|s| {
            s.milestones
                .iter()
                .any(|m| m.milestone_text.trim().eq_ignore_ascii_case("CLOSED"))
        })
    }
}

fn by_parent<'a, T, F>(records: impl Iterator<Item = &'a T>, parent: F) -> HashMap<Uuid, Vec<&'a T>>
where
    T: 'a,
    F: Fn(&T) -> Option<Uuid>,
{
    let mut index: HashMap<Uuid, Vec<&T>> = HashMap::new();
    for record in records {
        if let Some(key) = parent(record) {
            index.entry(key).or_default().push(record);
        }
    }
    index
}

fn sorted_milestones(milestones: Option<&Vec<&Milestone>>) -> Vec<Milestone> {
    let mut out: Vec<Milestone> = milestones
        .map(|ms| ms.iter().map(|m| (*m).clone()).collect())
        .unwrap_or_default();
    out.sort_by(|a, b| {
        (a.milestone_date, &a.milestone_text, a.id).cmp(&(b.milestone_date, &b.milestone_text, b.id))
    });
    out
}

/// Builds the nested view from the store.
///
/// Returns nothing while the store is not bound to a realm. Tasks are ordered
/// by category then creation time, subtasks by creation time, sub-subtasks by
/// their order index.
pub fn group(store: &RecordStore) -> Vec<GroupedTask> {
    let Some(realm_id) = store.realm_id() else {
        return Vec::new();
    };

    let users: HashMap<Uuid, &User> = store
        .users()
        .iter()
        .filter(|u| u.realm_id == realm_id)
        .map(|u| (u.id, u))
        .collect();
    let resolve_user = |id: Option<Uuid>| id.and_then(|id| users.get(&id).map(|u| (*u).clone()));

    let in_realm_subtasks = store.subtasks().iter().filter(|s| s.realm_id == realm_id);
    let subtasks_by_task = by_parent(in_realm_subtasks, |s: &Subtask| Some(s.task_id));
    let in_realm_steps = store.sub_subtasks().iter().filter(|s| s.realm_id == realm_id);
    let steps_by_subtask = by_parent(in_realm_steps, |s: &SubSubtask| Some(s.subtask_id));
    let in_realm_milestones: Vec<&Milestone> = store
        .milestones()
        .iter()
        .filter(|m| m.realm_id == realm_id)
        .collect();
    let milestones_by_subtask = by_parent(in_realm_milestones.iter().copied(), |m: &Milestone| m.subtask_id);
    let milestones_by_step = by_parent(in_realm_milestones.iter().copied(), |m: &Milestone| m.sub_subtask_id);

    let mut tasks: Vec<&Task> = store.tasks().iter().filter(|t| t.realm_id == realm_id).collect();
    tasks.sort_by(|a, b| (a.category, a.created_at, a.id).cmp(&(b.category, b.created_at, b.id)));

    tasks
        .into_iter()
        .map(|task| {
            let mut subtasks = subtasks_by_task.get(&task.id).cloned().unwrap_or_default();
            subtasks.sort_by(|a, b| (a.created_at, a.id).cmp(&(b.created_at, b.id)));

            let subtasks = subtasks
                .into_iter()
                .map(|subtask| {
                    let mut steps = steps_by_subtask.get(&subtask.id).cloned().unwrap_or_default();
                    steps.sort_by(|a, b| {
                        (a.order_index, a.created_at, a.id).cmp(&(b.order_index, b.created_at, b.id))
                    });

                    GroupedSubtask {
                        subtask: subtask.clone(),
                        assigned_user: resolve_user(subtask.assigned_to),
                        milestones: sorted_milestones(milestones_by_subtask.get(&subtask.id)),
                        sub_subtasks: steps
                            .into_iter()
                            .map(|step| GroupedSubSubtask {
                                sub_subtask: step.clone(),
                                assigned_user: resolve_user(step.assigned_to),
                                milestones: sorted_milestones(milestones_by_step.get(&step.id)),
                            })
                            .collect(),
                    }
                })
                .collect();

            GroupedTask {
                task: task.clone(),
                subtasks,
            }
        })
        .collect()
}

/// Memoized `group` output, recomputed only when a store revision moves.
#[derive(Debug, Default)]
pub struct Projection {
    revision: Option<(Option<Uuid>, StoreRevision)>,
    view: Arc<Vec<GroupedTask>>,
    users: Arc<Vec<User>>,
}

impl Projection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the grouped view for `store`, and whether it was recomputed.
    pub fn refresh(&mut self, store: &RecordStore) -> bool {
        let key = (store.realm_id(), store.revision());
        if self.revision == Some(key) {
            return false;
        }
        self.view = Arc::new(group(store));
        let mut users: Vec<User> = match store.realm_id() {
            Some(realm_id) => store.users().iter().filter(|u| u.realm_id == realm_id).cloned().collect(),
            None => Vec::new(),
        };
        users.sort_by(|a, b| a.full_name.cmp(&b.full_name).then(a.id.cmp(&b.id)));
        self.users = Arc::new(users);
        self.revision = Some(key);
        true
    }

    pub fn view(&self) -> Arc<Vec<GroupedTask>> {
        Arc::clone(&self.view)
    }

    pub fn users(&self) -> Arc<Vec<User>> {
        Arc::clone(&self.users)
    }
}

/// Latest date per milestone label across the non-PLANNED part of a task.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActualRollup {
    latest: BTreeMap<String, NaiveDate>,
}

impl ActualRollup {
    pub fn for_task(task: &GroupedTask) -> Self {
        let mut rollup = Self::default();
        for milestone in task.actual_contributors().flat_map(|s| s.all_milestones()) {
            rollup.observe(&milestone.milestone_text, milestone.milestone_date);
        }
        rollup
    }

    /// Folds one observation in. The stored date never moves backwards.
    pub fn observe(&mut self, label: &str, date: NaiveDate) {
        self.latest
            .entry(label.to_string())
            .and_modify(|current| {
                if date > *current {
                    *current = date;
                }
            })
            .or_insert(date);
    }

    pub fn date_for(&self, label: &str) -> Option<NaiveDate> {
        self.latest.get(label).copied()
    }

    pub fn is_empty(&self) -> bool {
        self.latest.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, NaiveDate)> {
        self.latest.iter().map(|(label, date)| (label.as_str(), *date))
    }

    /// Per-date lookup of the labels whose latest date falls on that day.
    pub fn by_date(&self) -> BTreeMap<NaiveDate, Vec<String>> {
        let mut lookup: BTreeMap<NaiveDate, Vec<String>> = BTreeMap::new();
        for (label, date) in &self.latest {
            lookup.entry(*date).or_default().push(label.clone());
        }
        lookup
    }
}

/// The maximum date among sibling milestones sharing a label.
pub fn longest_pole<I>(dates: I) -> Option<NaiveDate>
where
    I: IntoIterator<Item = NaiveDate>,
{
    dates.into_iter().max()
}

/// What to do with a parent subtask's rolled-up milestone for one label.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RollupAction {
    /// The parent has no milestone for the label yet.
    Insert { date: NaiveDate },
    /// The new longest pole is strictly later than the stored date.
    Advance {
        milestone_id: Uuid,
        from: NaiveDate,
        to: NaiveDate,
    },
    Keep,
}

/// Decides how the parent's milestone follows the longest pole of its
/// sub-subtasks. `existing` is the parent's own milestone for the label.
pub fn plan_rollup(existing: Option<&Milestone>, sibling_dates: &[NaiveDate]) -> RollupAction {
    let Some(pole) = longest_pole(sibling_dates.iter().copied()) else {
        return RollupAction::Keep;
    };
    match existing {
        None => RollupAction::Insert { date: pole },
        Some(current) if pole > current.milestone_date => RollupAction::Advance {
            milestone_id: current.id,
            from: current.milestone_date,
            to: pole,
        },
        Some(_) => RollupAction::Keep,
    }
}

/// Consecutive days shown by the timeline, starting at `start`. The window
/// ends early rather than running past the last representable date.
pub fn timeline_window(start: NaiveDate, days: u32) -> Vec<NaiveDate> {
    std::iter::successors(Some(start), |day| day.succ_opt())
        .take(days as usize)
        .collect()
}

/// Milestones of `milestones` that fall on `day`.
pub fn milestones_on<'a>(milestones: &'a [Milestone], day: NaiveDate) -> impl Iterator<Item = &'a Milestone> {
    milestones.iter().filter(move |m| m.milestone_date == day)
}

/// Whether a subtask row should be treated as the baseline plan.
pub fn is_planned_row(subtask: &Subtask) -> bool {
    is_planned(&subtask.name)
}
