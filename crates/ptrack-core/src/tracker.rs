//! # Tracker
//!
//! The service the presentation layer talks to. It owns the realm lifecycle:
//!
//! 1. A session arrives and the [`ScopeGate`] opens a new generation.
//! 2. The live store is reset, the change feed is subscribed, then the five
//!    collections are fetched. Both paths are tagged with the generation.
//! 3. Mutations go to the backend and are followed by a refetch. Feed events
//!    and refetches race; whichever lands last wins.
//! 4. A realm switch or sign-out tears the subscription down and clears the
//!    store before anything from the new realm can arrive.

use crate::aggregate::{group, plan_rollup, GroupedTask, RollupAction};
use crate::cascade::{plan_sub_subtask_delete, plan_subtask_delete, plan_task_delete, CascadeReport, DeletePlan, DeleteStep};
use crate::error::CoreError;
use crate::feed::{ChangeFeed, FeedSignal, Subscription};
use crate::live::{LiveStore, StoreCommand, TrackerView};
use crate::models::{
    is_planned, ActionLog, ActionType, EntityKind, Milestone, MilestoneParent, NewMilestone,
    NewSubSubtask, NewSubtask, NewTask, NewTempTask, NewUser, SubSubtask, SubSubtaskPatch, Subtask,
    SubtaskPatch, Task, TaskCategory, TaskPatch, TempTask, TempTaskPatch, User, UserPatch, PLANNED,
};
use crate::permissions::can_edit;
use crate::realm_config::{ConfigKey, RealmConfig};
use crate::repository::{AuditLog, Repository};
use crate::scope::{Generation, ScopeGate, ScopeTransition};
use crate::session::Session;
use crate::store::{RecordStore, Snapshot, Table};
use crate::temp::{TempTaskPage, TempTaskQuery, TempTaskStats};
use chrono::NaiveDate;
use serde_json::json;
use std::sync::Arc;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct TrackerOptions {
    /// Name of the change-feed channel.
    pub channel_name: String,
    /// Bound of the writer queue and of the subscription buffer.
    pub channel_capacity: usize,
}

impl Default for TrackerOptions {
    fn default() -> Self {
        Self {
            channel_name: "tracker_changes".to_string(),
            channel_capacity: 256,
        }
    }
}

#[derive(Default)]
struct TrackerState {
    gate: ScopeGate,
    session: Option<Session>,
    pump: Option<JoinHandle<()>>,
}

impl TrackerState {
    fn stop_pump(&mut self) {
        if let Some(pump) = self.pump.take() {
            pump.abort();
        }
    }
}

pub struct Tracker<R: Repository + 'static> {
    repo: Arc<R>,
    feed: Arc<dyn ChangeFeed>,
    audit: Arc<dyn AuditLog>,
    live: LiveStore,
    writer: JoinHandle<()>,
    options: TrackerOptions,
    state: Mutex<TrackerState>,
}

async fn pump(mut subscription: Subscription, commands: mpsc::Sender<StoreCommand>, generation: Generation) {
    while let Some(signal) = subscription.recv().await {
        match signal {
            FeedSignal::Change(event) => {
                if commands.send(StoreCommand::Change { generation, event }).await.is_err() {
                    break;
                }
            }
            FeedSignal::Error(message) => {
                tracing::error!(channel = subscription.channel(), %message, "change feed error");
            }
        }
    }
    tracing::debug!(generation, "change feed pump stopped");
}

impl<R: Repository + 'static> Tracker<R> {
    /// Builds a tracker that audits into the repository itself.
    pub fn new(repo: Arc<R>, feed: Arc<dyn ChangeFeed>, options: TrackerOptions) -> Self {
        let audit: Arc<dyn AuditLog> = repo.clone();
        let (live, writer) = LiveStore::spawn(options.channel_capacity);
        Self {
            repo,
            feed,
            audit,
            live,
            writer,
            options,
            state: Mutex::new(TrackerState::default()),
        }
    }

    pub fn with_audit_log(mut self, audit: Arc<dyn AuditLog>) -> Self {
        self.audit = audit;
        self
    }

    pub fn repository(&self) -> &Arc<R> {
        &self.repo
    }

    pub fn view(&self) -> TrackerView {
        self.live.view()
    }

    pub fn watch(&self) -> watch::Receiver<TrackerView> {
        self.live.watch()
    }

    /// Waits until every queued fetch result and feed event has been applied.
    pub async fn flush(&self) -> Result<(), CoreError> {
        self.live.flush().await
    }

    pub async fn session(&self) -> Option<Session> {
        self.state.lock().await.session.clone()
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    /// Feeds the latest session (or its absence) through the scope gate.
    pub async fn resolve(&self, session: Option<Session>) -> Result<ScopeTransition, CoreError> {
        let mut state = self.state.lock().await;
        let transition = state.gate.resolve(session.as_ref().map(|s| s.realm_id));

        let (realm_id, generation) = match transition {
            ScopeTransition::Unchanged => {
                state.session = session;
                return Ok(transition);
            }
            ScopeTransition::AlreadyClosed => {
                state.session = None;
                return Ok(transition);
            }
            ScopeTransition::Closed { generation } => {
                state.stop_pump();
                state.session = None;
                self.live.send(StoreCommand::Reset { realm: None, generation }).await?;
                tracing::info!(generation, "realm closed");
                return Ok(transition);
            }
            ScopeTransition::Opened { realm_id, generation } => (realm_id, generation),
            ScopeTransition::Switched { from, to, generation } => {
                tracing::info!(%from, %to, generation, "switching realm");
                (to, generation)
            }
        };

        state.stop_pump();
        state.session = session;
        self.live
            .send(StoreCommand::Reset {
                realm: Some(realm_id),
                generation,
            })
            .await?;

        match self.feed.subscribe(&self.options.channel_name, &Table::ALL).await {
            Ok(subscription) => {
                state.pump = Some(tokio::spawn(pump(subscription, self.live.sender(), generation)));
            }
            Err(e) => {
                tracing::error!(error = %e, channel = %self.options.channel_name, "change feed subscription failed");
            }
        }
        drop(state);

        self.fetch(realm_id, generation).await?;
        Ok(transition)
    }

    pub async fn sign_out(&self) -> Result<ScopeTransition, CoreError> {
        self.resolve(None).await
    }

    /// Full refetch of the current realm.
    pub async fn refetch(&self) -> Result<(), CoreError> {
        let (realm_id, generation) = self.scope().await?;
        self.fetch(realm_id, generation).await
    }

    async fn scope(&self) -> Result<(Uuid, Generation), CoreError> {
        let state = self.state.lock().await;
        Ok((state.gate.require_realm()?, state.gate.generation()))
    }

    async fn context(&self) -> Result<(Session, Generation), CoreError> {
        let state = self.state.lock().await;
        state.gate.require_realm()?;
        let session = state.session.clone().ok_or(CoreError::RealmUnresolved)?;
        Ok((session, state.gate.generation()))
    }

    async fn load_snapshot(&self, realm_id: Uuid) -> Result<Snapshot, CoreError> {
        let repo = &self.repo;
        let (tasks, subtasks, sub_subtasks, milestones, users) = tokio::try_join!(
            repo.find_tasks(realm_id),
            repo.find_subtasks(realm_id),
            repo.find_sub_subtasks(realm_id),
            repo.find_milestones(realm_id),
            repo.find_users(realm_id),
        )?;
        Ok(Snapshot {
            tasks,
            subtasks,
            sub_subtasks,
            milestones,
            users,
        })
    }

    async fn fetch(&self, realm_id: Uuid, generation: Generation) -> Result<(), CoreError> {
        self.live.send(StoreCommand::Loading { generation }).await?;
        tracing::info!(%realm_id, generation, "fetching tracker data");

        match self.load_snapshot(realm_id).await {
            Ok(snapshot) => {
                tracing::info!(rows = snapshot.row_count(), generation, "fetch finished");
                self.live.send(StoreCommand::Snapshot { generation, snapshot }).await
            }
            Err(e) => {
                tracing::error!(error = %e, %realm_id, "fetch failed");
                self.live
                    .send(StoreCommand::LoadFailed {
                        generation,
                        message: e.to_string(),
                    })
                    .await?;
                Err(e)
            }
        }
    }

    /// A grouped tree straight from the backend, for planning deletes.
    async fn fresh_tree(&self, realm_id: Uuid) -> Result<Vec<GroupedTask>, CoreError> {
        let mut store = RecordStore::new();
        store.reset(Some(realm_id));
        store.load(self.load_snapshot(realm_id).await?);
        Ok(group(&store))
    }

    async fn audit(&self, session: &Session, action_type: ActionType, entity_type: EntityKind, entity_id: Uuid, entity_name: &str, details: serde_json::Value) {
        let entry = ActionLog {
            action_type,
            entity_type,
            entity_id,
            entity_name: entity_name.to_string(),
            realm_id: session.realm_id,
            user_id: session.user_id,
            performed_by: session.full_name.clone(),
            details,
        };
        if let Err(e) = self.audit.log_action(&entry).await {
            tracing::warn!(error = %e, ?action_type, ?entity_type, %entity_id, "audit log write failed");
        }
    }

    fn forbid(session: &Session, what: &str) -> CoreError {
        CoreError::Forbidden(format!("{} may not edit this {}", session.email, what))
    }

    // ------------------------------------------------------------------
    // Tasks
    // ------------------------------------------------------------------

    /// Creates a task together with its `PLANNED` baseline subtask.
    pub async fn create_task(&self, name: &str, category: TaskCategory, priority: i32) -> Result<Task, CoreError> {
        let (session, _) = self.context().await?;
        let task = self
            .repo
            .add_task(
                session.realm_id,
                NewTask {
                    name: name.to_string(),
                    category,
                    priority,
                    created_by: Some(session.user_id),
                },
            )
            .await?;
        self.repo
            .add_subtask(
                session.realm_id,
                NewSubtask {
                    task_id: task.id,
                    name: PLANNED.to_string(),
                    assigned_to: None,
                    created_by: Some(session.user_id),
                },
            )
            .await?;
        self.refetch().await?;
        Ok(task)
    }

    async fn editable_task(&self, session: &Session, id: Uuid) -> Result<Task, CoreError> {
        let task = self
            .repo
            .find_task_by_id(session.realm_id, id)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("Task {id}")))?;
        if !can_edit(session, &task) {
            return Err(Self::forbid(session, "task"));
        }
        Ok(task)
    }

    pub async fn update_task(&self, id: Uuid, patch: TaskPatch) -> Result<Task, CoreError> {
        let (session, _) = self.context().await?;
        self.editable_task(&session, id).await?;
        let task = self.repo.update_task(session.realm_id, id, patch).await?;
        self.refetch().await?;
        Ok(task)
    }

    pub async fn rename_task(&self, id: Uuid, name: &str) -> Result<Task, CoreError> {
        self.update_task(
            id,
            TaskPatch {
                name: Some(name.to_string()),
                ..Default::default()
            },
        )
        .await
    }

    pub async fn change_category(&self, id: Uuid, category: TaskCategory) -> Result<Task, CoreError> {
        self.update_task(
            id,
            TaskPatch {
                category: Some(category),
                ..Default::default()
            },
        )
        .await
    }

    pub async fn set_priority(&self, id: Uuid, priority: i32) -> Result<Task, CoreError> {
        self.update_task(
            id,
            TaskPatch {
                priority: Some(priority),
                ..Default::default()
            },
        )
        .await
    }

    // ------------------------------------------------------------------
    // Subtasks and sub-subtasks
    // ------------------------------------------------------------------

    pub async fn add_subtask(&self, task_id: Uuid, name: &str, assigned_to: Option<Uuid>) -> Result<Subtask, CoreError> {
        let (session, _) = self.context().await?;
        let subtask = self
            .repo
            .add_subtask(
                session.realm_id,
                NewSubtask {
                    task_id,
                    name: name.to_string(),
                    assigned_to,
                    created_by: Some(session.user_id),
                },
            )
            .await?;
        self.refetch().await?;
        Ok(subtask)
    }

    pub async fn add_sub_subtask(
        &self,
        subtask_id: Uuid,
        name: &str,
        assigned_to: Option<Uuid>,
    ) -> Result<SubSubtask, CoreError> {
        let (session, _) = self.context().await?;
        let step = self
            .repo
            .add_sub_subtask(
                session.realm_id,
                NewSubSubtask {
                    subtask_id,
                    name: name.to_string(),
                    assigned_to,
                    order_index: None,
                    created_by: Some(session.user_id),
                },
            )
            .await?;
        self.refetch().await?;
        Ok(step)
    }

    async fn editable_subtask(&self, session: &Session, id: Uuid) -> Result<Subtask, CoreError> {
        let subtask = self
            .repo
            .find_subtask_by_id(session.realm_id, id)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("Subtask {id}")))?;
        if !can_edit(session, &subtask) {
            return Err(Self::forbid(session, "subtask"));
        }
        Ok(subtask)
    }

    async fn editable_sub_subtask(&self, session: &Session, id: Uuid) -> Result<(SubSubtask, Subtask), CoreError> {
        let step = self
            .repo
            .find_sub_subtask_by_id(session.realm_id, id)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("Sub-subtask {id}")))?;
        let parent = self
            .repo
            .find_subtask_by_id(session.realm_id, step.subtask_id)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("Subtask {}", step.subtask_id)))?;
        if !can_edit(session, &step) && !can_edit(session, &parent) {
            return Err(Self::forbid(session, "sub-subtask"));
        }
        Ok((step, parent))
    }

    pub async fn rename_subtask(&self, id: Uuid, name: &str) -> Result<Subtask, CoreError> {
        let (session, _) = self.context().await?;
        self.editable_subtask(&session, id).await?;
        let patch = SubtaskPatch {
            name: Some(name.to_string()),
            ..Default::default()
        };
        let subtask = self.repo.update_subtask(session.realm_id, id, patch).await?;
        self.refetch().await?;
        Ok(subtask)
    }

    pub async fn assign_subtask(&self, id: Uuid, user_id: Option<Uuid>) -> Result<Subtask, CoreError> {
        let (session, _) = self.context().await?;
        self.editable_subtask(&session, id).await?;
        let patch = SubtaskPatch {
            assigned_to: Some(user_id),
            ..Default::default()
        };
        let subtask = self.repo.update_subtask(session.realm_id, id, patch).await?;
        self.refetch().await?;
        Ok(subtask)
    }

    pub async fn rename_sub_subtask(&self, id: Uuid, name: &str) -> Result<SubSubtask, CoreError> {
        let (session, _) = self.context().await?;
        self.editable_sub_subtask(&session, id).await?;
        let patch = SubSubtaskPatch {
            name: Some(name.to_string()),
            ..Default::default()
        };
        let step = self.repo.update_sub_subtask(session.realm_id, id, patch).await?;
        self.refetch().await?;
        Ok(step)
    }

    pub async fn assign_sub_subtask(&self, id: Uuid, user_id: Option<Uuid>) -> Result<SubSubtask, CoreError> {
        let (session, _) = self.context().await?;
        self.editable_sub_subtask(&session, id).await?;
        let patch = SubSubtaskPatch {
            assigned_to: Some(user_id),
            ..Default::default()
        };
        let step = self.repo.update_sub_subtask(session.realm_id, id, patch).await?;
        self.refetch().await?;
        Ok(step)
    }

    // ------------------------------------------------------------------
    // Milestones
    // ------------------------------------------------------------------

    /// Adds a milestone. On a sub-subtask, the parent subtask's milestone with
    /// the same label follows the longest pole of its sub-subtasks.
    pub async fn add_milestone(&self, parent: MilestoneParent, date: NaiveDate, label: &str) -> Result<Milestone, CoreError> {
        let (session, _) = self.context().await?;
        let realm_id = session.realm_id;

        let (owner, parent_subtask) = match parent {
            MilestoneParent::Subtask(id) => {
                let subtask = self.editable_subtask(&session, id).await?;
                (subtask.name.clone(), subtask)
            }
            MilestoneParent::SubSubtask(id) => {
                let (step, subtask) = self.editable_sub_subtask(&session, id).await?;
                (step.name, subtask)
            }
        };

        let milestone = self
            .repo
            .add_milestone(
                realm_id,
                NewMilestone {
                    parent,
                    milestone_date: date,
                    milestone_text: label.to_string(),
                    created_by: Some(session.user_id),
                },
            )
            .await?;

        // The milestone is already stored; a failed roll-up only loses the parent update.
        if matches!(parent, MilestoneParent::SubSubtask(_)) {
            if let Err(e) = self.roll_up(&session, &parent_subtask, &milestone.milestone_text).await {
                tracing::warn!(error = %e, subtask = %parent_subtask.id, milestone = %milestone.id, "milestone roll-up failed");
            }
        }

        if parent_subtask.is_planned() {
            self.audit(
                &session,
                ActionType::Create,
                EntityKind::Milestone,
                milestone.id,
                &milestone.milestone_text,
                json!({
                    "milestone_date": milestone.milestone_date,
                    "owner": owner,
                    "subtask_id": parent_subtask.id,
                    "task_id": parent_subtask.task_id,
                }),
            )
            .await;
        }

        self.refetch().await?;
        Ok(milestone)
    }

    async fn roll_up(&self, session: &Session, parent: &Subtask, label: &str) -> Result<(), CoreError> {
        let realm_id = session.realm_id;
        let step_ids: Vec<Uuid> = self
            .repo
            .find_sub_subtasks(realm_id)
            .await?
            .into_iter()
            .filter(|s| s.subtask_id == parent.id)
            .map(|s| s.id)
            .collect();
        let milestones = self.repo.find_milestones(realm_id).await?;

        let sibling_dates: Vec<NaiveDate> = milestones
            .iter()
            .filter(|m| m.milestone_text == label)
            .filter(|m| m.sub_subtask_id.is_some_and(|id| step_ids.contains(&id)))
            .map(|m| m.milestone_date)
            .collect();
        let own = self
            .repo
            .find_milestones_for(realm_id, MilestoneParent::Subtask(parent.id))
            .await?;
        let existing = own
            .iter()
            .filter(|m| m.milestone_text == label)
            .max_by_key(|m| m.milestone_date);

        match plan_rollup(existing, &sibling_dates) {
            RollupAction::Insert { date } => {
                tracing::debug!(subtask = %parent.id, label, %date, "rolling up new parent milestone");
                self.repo
                    .add_milestone(
                        realm_id,
                        NewMilestone {
                            parent: MilestoneParent::Subtask(parent.id),
                            milestone_date: date,
                            milestone_text: label.to_string(),
                            created_by: Some(session.user_id),
                        },
                    )
                    .await?;
            }
            RollupAction::Advance { milestone_id, from, to } => {
                tracing::debug!(subtask = %parent.id, label, %from, %to, "advancing parent milestone");
                self.repo.move_milestone(realm_id, milestone_id, to).await?;
            }
            RollupAction::Keep => {}
        }
        Ok(())
    }

    pub async fn delete_milestone(&self, id: Uuid) -> Result<(), CoreError> {
        let (session, generation) = self.context().await?;
        let milestone = self
            .repo
            .find_milestone_by_id(session.realm_id, id)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("Milestone {id}")))?;

        if !can_edit(&session, &milestone) {
            let allowed = match milestone.parent() {
                Some(MilestoneParent::Subtask(sid)) => self.editable_subtask(&session, sid).await.is_ok(),
                Some(MilestoneParent::SubSubtask(sid)) => self.editable_sub_subtask(&session, sid).await.is_ok(),
                None => false,
            };
            if !allowed {
                return Err(Self::forbid(&session, "milestone"));
            }
        }

        self.repo.delete_milestone(session.realm_id, id).await?;
        self.live
            .send(StoreCommand::Remove {
                generation,
                table: Table::Milestones,
                id,
            })
            .await?;
        self.refetch().await
    }

    // ------------------------------------------------------------------
    // Cascading deletes
    // ------------------------------------------------------------------

    async fn run_plan(&self, realm_id: Uuid, generation: Generation, plan: &DeletePlan) -> Result<CascadeReport, CoreError> {
        let mut report = CascadeReport::default();
        for step in plan.steps() {
            let (table, result) = match *step {
                DeleteStep::Milestone(id) => (Table::Milestones, self.repo.delete_milestone(realm_id, id).await),
                DeleteStep::SubSubtask(id) => (Table::SubSubtasks, self.repo.delete_sub_subtask(realm_id, id).await),
                DeleteStep::Subtask(id) => (Table::Subtasks, self.repo.delete_subtask(realm_id, id).await),
                DeleteStep::Task(id) => (Table::Tasks, self.repo.delete_task(realm_id, id).await),
            };
            match result {
                // Already gone counts as deleted.
                Ok(()) | Err(CoreError::NotFound(_)) => {
                    self.live
                        .send(StoreCommand::Remove {
                            generation,
                            table,
                            id: step.id(),
                        })
                        .await?;
                    report.completed.push(*step);
                }
                Err(e) => {
                    tracing::warn!(error = %e, step = ?step, "cascade step failed, continuing");
                    report.failed.push((*step, e));
                }
            }
        }
        Ok(report)
    }

    async fn finish_cascade(&self, report: CascadeReport) -> Result<usize, CoreError> {
        if let Err(e) = self.refetch().await {
            tracing::warn!(error = %e, "refetch after delete failed");
        }
        report.into_result()
    }

    /// Deletes a task and everything under it, children first.
    pub async fn delete_task(&self, id: Uuid) -> Result<usize, CoreError> {
        let (session, generation) = self.context().await?;
        let task = self.editable_task(&session, id).await?;
        let tree = self.fresh_tree(session.realm_id).await?;
        let grouped = tree
            .iter()
            .find(|g| g.task.id == id)
            .ok_or_else(|| CoreError::NotFound(format!("Task {id}")))?;
        let plan = plan_task_delete(grouped);

        let report = self.run_plan(session.realm_id, generation, &plan).await?;
        if report.completed.contains(&DeleteStep::Task(id)) {
            self.audit(
                &session,
                ActionType::Delete,
                EntityKind::Task,
                task.id,
                &task.name,
                json!({ "category": task.category, "priority": task.priority, "rows_removed": report.completed.len() }),
            )
            .await;
        }
        self.finish_cascade(report).await
    }

    pub async fn delete_subtask(&self, id: Uuid) -> Result<usize, CoreError> {
        let (session, generation) = self.context().await?;
        let subtask = self.editable_subtask(&session, id).await?;
        let tree = self.fresh_tree(session.realm_id).await?;
        let grouped = tree
            .iter()
            .flat_map(|t| t.subtasks.iter())
            .find(|s| s.subtask.id == id)
            .ok_or_else(|| CoreError::NotFound(format!("Subtask {id}")))?;
        let plan = plan_subtask_delete(grouped);

        let report = self.run_plan(session.realm_id, generation, &plan).await?;
        if subtask.is_planned() && report.completed.contains(&DeleteStep::Subtask(id)) {
            self.audit(
                &session,
                ActionType::Delete,
                EntityKind::Subtask,
                subtask.id,
                &subtask.name,
                json!({ "task_id": subtask.task_id, "rows_removed": report.completed.len() }),
            )
            .await;
        }
        self.finish_cascade(report).await
    }

    pub async fn delete_sub_subtask(&self, id: Uuid) -> Result<usize, CoreError> {
        let (session, generation) = self.context().await?;
        let (step, parent) = self.editable_sub_subtask(&session, id).await?;
        let tree = self.fresh_tree(session.realm_id).await?;
        let grouped = tree
            .iter()
            .flat_map(|t| t.subtasks.iter())
            .flat_map(|s| s.sub_subtasks.iter())
            .find(|s| s.sub_subtask.id == id)
            .ok_or_else(|| CoreError::NotFound(format!("Sub-subtask {id}")))?;
        let plan = plan_sub_subtask_delete(grouped);

        let report = self.run_plan(session.realm_id, generation, &plan).await?;
        if is_planned(&parent.name) && report.completed.contains(&DeleteStep::SubSubtask(id)) {
            self.audit(
                &session,
                ActionType::Delete,
                EntityKind::SubSubtask,
                step.id,
                &step.name,
                json!({ "subtask_id": parent.id, "task_id": parent.task_id }),
            )
            .await;
        }
        self.finish_cascade(report).await
    }

    // ------------------------------------------------------------------
    // Users
    // ------------------------------------------------------------------

    async fn require_admin(&self) -> Result<Session, CoreError> {
        let (session, _) = self.context().await?;
        if !session.is_admin() {
            return Err(CoreError::Forbidden(format!("{} is not a realm admin", session.email)));
        }
        Ok(session)
    }

    pub async fn add_user(&self, data: NewUser) -> Result<User, CoreError> {
        let session = self.require_admin().await?;
        let user = self.repo.add_user(session.realm_id, data).await?;
        self.refetch().await?;
        Ok(user)
    }

    pub async fn update_user(&self, id: Uuid, patch: UserPatch) -> Result<User, CoreError> {
        let session = self.require_admin().await?;
        let user = self.repo.update_user(session.realm_id, id, patch).await?;
        self.refetch().await?;
        Ok(user)
    }

    /// Clears every assignment pointing at the user, then deletes the user.
    pub async fn delete_user(&self, id: Uuid) -> Result<u64, CoreError> {
        let session = self.require_admin().await?;
        if id == session.user_id {
            return Err(CoreError::InvalidInput("You cannot delete your own account".to_string()));
        }
        let unassigned = self.repo.unassign_user(session.realm_id, id).await?;
        self.repo.delete_user(session.realm_id, id).await?;
        tracing::info!(user = %id, unassigned, "user deleted");
        self.refetch().await?;
        Ok(unassigned)
    }

    // ------------------------------------------------------------------
    // Realm configuration
    // ------------------------------------------------------------------

    pub async fn config(&self) -> Result<RealmConfig, CoreError> {
        let (realm_id, _) = self.scope().await?;
        RealmConfig::load(self.repo.as_ref(), realm_id).await
    }

    pub async fn save_config(&self, config: &RealmConfig, key: ConfigKey) -> Result<(), CoreError> {
        let session = self.require_admin().await?;
        config.save(self.repo.as_ref(), session.realm_id, key).await
    }

    // ------------------------------------------------------------------
    // Temporary tasks
    // ------------------------------------------------------------------

    pub async fn add_temp_task(&self, mut data: NewTempTask) -> Result<TempTask, CoreError> {
        let (session, _) = self.context().await?;
        data.created_by = Some(session.user_id);
        if data.created_byname.is_empty() {
            data.created_byname = session.full_name.clone();
        }
        self.repo.add_temp_task(session.realm_id, data).await
    }

    pub async fn temp_task_page(&self, query: TempTaskQuery) -> Result<TempTaskPage, CoreError> {
        let (realm_id, _) = self.scope().await?;
        self.repo.find_temp_task_page(realm_id, query).await
    }

    pub async fn temp_task_stats(&self) -> Result<TempTaskStats, CoreError> {
        let (realm_id, _) = self.scope().await?;
        let tasks = self.repo.find_temp_tasks(realm_id).await?;
        Ok(TempTaskStats::from_tasks(&tasks))
    }

    async fn editable_temp_task(&self, session: &Session, id: Uuid) -> Result<TempTask, CoreError> {
        let task = self
            .repo
            .find_temp_task_by_id(session.realm_id, id)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("Temp task {id}")))?;
        if !can_edit(session, &task) {
            return Err(Self::forbid(session, "temp task"));
        }
        Ok(task)
    }

    pub async fn update_temp_task(&self, id: Uuid, patch: TempTaskPatch) -> Result<TempTask, CoreError> {
        let (session, _) = self.context().await?;
        self.editable_temp_task(&session, id).await?;
        self.repo.update_temp_task(session.realm_id, id, patch).await
    }

    pub async fn delete_temp_task(&self, id: Uuid) -> Result<(), CoreError> {
        let (session, _) = self.context().await?;
        self.editable_temp_task(&session, id).await?;
        self.repo.delete_temp_task(session.realm_id, id).await
    }
}

impl<R: Repository + 'static> Drop for Tracker<R> {
    fn drop(&mut self) {
        self.state.get_mut().stop_pump();
        self.writer.abort();
    }
}
