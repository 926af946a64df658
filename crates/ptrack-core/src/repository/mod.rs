use crate::db::DbPool;
use crate::error::CoreError;
use crate::feed::{ChangeBus, ChangeEvent};
use crate::models::{
    ActionLog, ActionLogRecord, Milestone, MilestoneParent, NewMilestone, NewSubSubtask,
    NewSubtask, NewTask, NewTempTask, NewUser, Realm, SubSubtask, SubSubtaskPatch, Subtask,
    SubtaskPatch, Task, TaskPatch, TempTask, TempTaskPatch, User, UserPatch,
};
use crate::store::Table;
use crate::temp::{TempTaskPage, TempTaskQuery};
use async_trait::async_trait;
use chrono::NaiveDate;
use serde::Serialize;
use uuid::Uuid;

pub mod audit;
pub mod config;
pub mod milestones;
pub mod query_builder;
pub mod subtasks;
pub mod tasks;
pub mod temp_tasks;
pub mod users;

// Every operation takes the realm explicitly; reads filter on it and writes
// match on both `id` and `realm_id`.

/// Domain-specific trait for task operations
#[async_trait]
pub trait TaskRepository {
    async fn add_task(&self, realm_id: Uuid, data: NewTask) -> Result<Task, CoreError>;
    async fn find_task_by_id(&self, realm_id: Uuid, id: Uuid) -> Result<Option<Task>, CoreError>;
    async fn find_tasks(&self, realm_id: Uuid) -> Result<Vec<Task>, CoreError>;
    async fn update_task(&self, realm_id: Uuid, id: Uuid, patch: TaskPatch) -> Result<Task, CoreError>;
    async fn delete_task(&self, realm_id: Uuid, id: Uuid) -> Result<(), CoreError>;
}

/// Domain-specific trait for subtask and sub-subtask operations
#[async_trait]
pub trait SubtaskRepository {
    async fn add_subtask(&self, realm_id: Uuid, data: NewSubtask) -> Result<Subtask, CoreError>;
    async fn find_subtask_by_id(&self, realm_id: Uuid, id: Uuid) -> Result<Option<Subtask>, CoreError>;
    async fn find_subtasks(&self, realm_id: Uuid) -> Result<Vec<Subtask>, CoreError>;
    async fn update_subtask(&self, realm_id: Uuid, id: Uuid, patch: SubtaskPatch) -> Result<Subtask, CoreError>;
    async fn delete_subtask(&self, realm_id: Uuid, id: Uuid) -> Result<(), CoreError>;

    async fn add_sub_subtask(&self, realm_id: Uuid, data: NewSubSubtask) -> Result<SubSubtask, CoreError>;
    async fn find_sub_subtask_by_id(&self, realm_id: Uuid, id: Uuid) -> Result<Option<SubSubtask>, CoreError>;
    async fn find_sub_subtasks(&self, realm_id: Uuid) -> Result<Vec<SubSubtask>, CoreError>;
    async fn update_sub_subtask(
        &self,
        realm_id: Uuid,
        id: Uuid,
        patch: SubSubtaskPatch,
    ) -> Result<SubSubtask, CoreError>;
    async fn delete_sub_subtask(&self, realm_id: Uuid, id: Uuid) -> Result<(), CoreError>;

    /// Clears `assigned_to` wherever it points at `user_id`. Returns the number of rows touched.
    async fn unassign_user(&self, realm_id: Uuid, user_id: Uuid) -> Result<u64, CoreError>;
}

/// Domain-specific trait for milestone operations
#[async_trait]
pub trait MilestoneRepository {
    async fn add_milestone(&self, realm_id: Uuid, data: NewMilestone) -> Result<Milestone, CoreError>;
    async fn find_milestone_by_id(&self, realm_id: Uuid, id: Uuid) -> Result<Option<Milestone>, CoreError>;
    async fn find_milestones(&self, realm_id: Uuid) -> Result<Vec<Milestone>, CoreError>;
    async fn find_milestones_for(&self, realm_id: Uuid, parent: MilestoneParent) -> Result<Vec<Milestone>, CoreError>;
    async fn move_milestone(&self, realm_id: Uuid, id: Uuid, date: NaiveDate) -> Result<Milestone, CoreError>;
    async fn delete_milestone(&self, realm_id: Uuid, id: Uuid) -> Result<(), CoreError>;
}

/// Domain-specific trait for realm and user operations
#[async_trait]
pub trait UserRepository {
    async fn add_realm(&self, name: &str) -> Result<Realm, CoreError>;
    async fn find_realm_by_name(&self, name: &str) -> Result<Option<Realm>, CoreError>;
    async fn find_realms(&self) -> Result<Vec<Realm>, CoreError>;

    async fn add_user(&self, realm_id: Uuid, data: NewUser) -> Result<User, CoreError>;
    async fn find_user_by_id(&self, realm_id: Uuid, id: Uuid) -> Result<Option<User>, CoreError>;
    async fn find_user_by_email(&self, realm_id: Uuid, email: &str) -> Result<Option<User>, CoreError>;
    async fn find_users(&self, realm_id: Uuid) -> Result<Vec<User>, CoreError>;
    async fn update_user(&self, realm_id: Uuid, id: Uuid, patch: UserPatch) -> Result<User, CoreError>;
    async fn delete_user(&self, realm_id: Uuid, id: Uuid) -> Result<(), CoreError>;
}

/// Domain-specific trait for per-realm configuration documents
#[async_trait]
pub trait ConfigRepository {
    async fn load_config(&self, realm_id: Uuid, key: &str) -> Result<Option<serde_json::Value>, CoreError>;
    /// Upserts on the `(realm_id, config_key)` conflict key.
    async fn upsert_config(&self, realm_id: Uuid, key: &str, value: &serde_json::Value) -> Result<(), CoreError>;
}

/// Domain-specific trait for temporary task operations
#[async_trait]
pub trait TempTaskRepository {
    async fn add_temp_task(&self, realm_id: Uuid, data: NewTempTask) -> Result<TempTask, CoreError>;
    async fn find_temp_task_by_id(&self, realm_id: Uuid, id: Uuid) -> Result<Option<TempTask>, CoreError>;
    async fn find_temp_tasks(&self, realm_id: Uuid) -> Result<Vec<TempTask>, CoreError>;
    async fn find_temp_task_page(&self, realm_id: Uuid, query: TempTaskQuery) -> Result<TempTaskPage, CoreError>;
    async fn update_temp_task(&self, realm_id: Uuid, id: Uuid, patch: TempTaskPatch) -> Result<TempTask, CoreError>;
    async fn delete_temp_task(&self, realm_id: Uuid, id: Uuid) -> Result<(), CoreError>;
}

/// The audit collaborator. Baseline-plan changes are recorded here.
#[async_trait]
pub trait AuditLog: Send + Sync {
    async fn log_action(&self, entry: &ActionLog) -> Result<(), CoreError>;
    async fn find_actions(&self, realm_id: Uuid, limit: i64) -> Result<Vec<ActionLogRecord>, CoreError>;
}

/// Main repository trait that composes all domain traits
#[async_trait]
pub trait Repository:
    TaskRepository
    + SubtaskRepository
    + MilestoneRepository
    + UserRepository
    + ConfigRepository
    + TempTaskRepository
    + AuditLog
    + Send
    + Sync
{
}

/// SQLite implementation of the repository pattern
#[derive(Clone)]
pub struct SqliteRepository {
    pool: DbPool,
    bus: Option<ChangeBus>,
}

impl SqliteRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool, bus: None }
    }

    /// Publishes a change event onto `bus` after every committed write to a
    /// live table.
    pub fn with_change_bus(mut self, bus: ChangeBus) -> Self {
        self.bus = Some(bus);
        self
    }

    pub(crate) fn pool(&self) -> &DbPool {
        &self.pool
    }

    pub(crate) fn announce(&self, event: Result<ChangeEvent, CoreError>) {
        let Some(bus) = &self.bus else {
            return;
        };
        match event {
            Ok(event) => bus.publish(event),
            Err(e) => tracing::warn!(error = %e, "failed to encode change event"),
        }
    }

    pub(crate) fn announce_insert<T: Serialize>(&self, table: Table, record: &T) {
        if self.bus.is_some() {
            self.announce(ChangeEvent::insert(table, record));
        }
    }

    pub(crate) fn announce_update<T: Serialize>(&self, table: Table, record: &T) {
        if self.bus.is_some() {
            self.announce(ChangeEvent::update(table, record));
        }
    }

    pub(crate) fn announce_delete<T: Serialize>(&self, table: Table, record: &T) {
        if self.bus.is_some() {
            self.announce(ChangeEvent::delete(table, record));
        }
    }
}

impl Repository for SqliteRepository {}

pub(crate) fn not_found(entity: &str, id: Uuid) -> CoreError {
    CoreError::NotFound(format!("{entity} {id}"))
}
