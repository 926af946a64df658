use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

/// Name of the baseline-plan subtask every task is created with.
pub const PLANNED: &str = "PLANNED";

/// Returns true when a subtask name marks the planning baseline row.
pub fn is_planned(name: &str) -> bool {
    name.trim().eq_ignore_ascii_case(PLANNED)
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, FromRow)]
pub struct Realm {
    pub id: Uuid,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash, sqlx::Type)]
#[sqlx(type_name = "TEXT", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum TaskCategory {
    Dev,
    Test,
    Infra,
    Support,
}

impl std::fmt::Display for TaskCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskCategory::Dev => write!(f, "dev"),
            TaskCategory::Test => write!(f, "test"),
            TaskCategory::Infra => write!(f, "infra"),
            TaskCategory::Support => write!(f, "support"),
        }
    }
}

#[derive(Error, Debug, PartialEq)]
#[error("Invalid task category: {0}")]
pub struct ParseTaskCategoryError(String);

impl FromStr for TaskCategory {
    type Err = ParseTaskCategoryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "dev" => Ok(TaskCategory::Dev),
            "test" => Ok(TaskCategory::Test),
            "infra" => Ok(TaskCategory::Infra),
            "support" => Ok(TaskCategory::Support),
            _ => Err(ParseTaskCategoryError(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, sqlx::Type)]
#[sqlx(type_name = "TEXT", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    Admin,
    Lead,
    Engineer,
}

impl std::fmt::Display for UserRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UserRole::Admin => write!(f, "admin"),
            UserRole::Lead => write!(f, "lead"),
            UserRole::Engineer => write!(f, "engineer"),
        }
    }
}

#[derive(Error, Debug, PartialEq)]
#[error("Invalid user role: {0}")]
pub struct ParseUserRoleError(String);

impl FromStr for UserRole {
    type Err = ParseUserRoleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "admin" => Ok(UserRole::Admin),
            "lead" => Ok(UserRole::Lead),
            "engineer" => Ok(UserRole::Engineer),
            _ => Err(ParseUserRoleError(s.to_string())),
        }
    }
}

/// Lowest and highest task priority accepted by the tracker.
pub const PRIORITY_RANGE: std::ops::RangeInclusive<i32> = 1..=3;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, FromRow)]
pub struct Task {
    pub id: Uuid,
    pub name: String,
    pub category: TaskCategory,
    pub priority: i32,
    pub realm_id: Uuid,
    pub created_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, FromRow)]
pub struct Subtask {
    pub id: Uuid,
    pub task_id: Uuid,
    pub name: String,
    pub assigned_to: Option<Uuid>,
    pub realm_id: Uuid,
    pub created_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Subtask {
    pub fn is_planned(&self) -> bool {
        is_planned(&self.name)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, FromRow)]
pub struct SubSubtask {
    pub id: Uuid,
    pub subtask_id: Uuid,
    pub name: String,
    pub assigned_to: Option<Uuid>,
    pub order_index: i32,
    pub realm_id: Uuid,
    pub created_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, FromRow)]
pub struct Milestone {
    pub id: Uuid,
    pub subtask_id: Option<Uuid>,
    pub sub_subtask_id: Option<Uuid>,
    pub milestone_date: NaiveDate,
    pub milestone_text: String,
    pub created_by: Option<Uuid>,
    pub realm_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Milestone {
    /// The owning row, or `None` when the record breaks the subtask XOR
    /// sub-subtask invariant.
    pub fn parent(&self) -> Option<MilestoneParent> {
        match (self.subtask_id, self.sub_subtask_id) {
            (Some(id), None) => Some(MilestoneParent::Subtask(id)),
            (None, Some(id)) => Some(MilestoneParent::SubSubtask(id)),
            _ => None,
        }
    }
}

/// Where a milestone hangs in the hierarchy. Exactly one parent, by construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MilestoneParent {
    Subtask(Uuid),
    SubSubtask(Uuid),
}

impl MilestoneParent {
    pub fn id(&self) -> Uuid {
        match self {
            MilestoneParent::Subtask(id) | MilestoneParent::SubSubtask(id) => *id,
        }
    }

    pub(crate) fn columns(&self) -> (Option<Uuid>, Option<Uuid>) {
        match self {
            MilestoneParent::Subtask(id) => (Some(*id), None),
            MilestoneParent::SubSubtask(id) => (None, Some(*id)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, FromRow)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub full_name: String,
    pub role: UserRole,
    pub realm_id: Uuid,
    pub created_at: DateTime<Utc>,
}

/// Display name for an optional user reference, `"Unknown"` when it cannot be resolved.
pub fn user_name(user_id: Option<Uuid>, users: &[User]) -> &str {
    user_id
        .and_then(|id| users.iter().find(|u| u.id == id))
        .map(|u| u.full_name.as_str())
        .unwrap_or("Unknown")
}

// ============================================================================
// Temporary tasks
// ============================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, sqlx::Type)]
#[sqlx(type_name = "TEXT", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum TempTaskPriority {
    Low,
    Medium,
    High,
}

impl std::fmt::Display for TempTaskPriority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TempTaskPriority::Low => write!(f, "low"),
            TempTaskPriority::Medium => write!(f, "medium"),
            TempTaskPriority::High => write!(f, "high"),
        }
    }
}

#[derive(Error, Debug, PartialEq)]
#[error("Invalid temp task priority: {0}")]
pub struct ParseTempTaskPriorityError(String);

impl FromStr for TempTaskPriority {
    type Err = ParseTempTaskPriorityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "low" => Ok(TempTaskPriority::Low),
            "medium" => Ok(TempTaskPriority::Medium),
            "high" => Ok(TempTaskPriority::High),
            _ => Err(ParseTempTaskPriorityError(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, sqlx::Type)]
#[sqlx(type_name = "TEXT", rename_all = "kebab-case")]
#[serde(rename_all = "kebab-case")]
pub enum TempTaskStatus {
    Created,
    Assigned,
    InProgress,
    Completed,
    ProjectTaskCreated,
    DePrioritized,
}

impl std::fmt::Display for TempTaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TempTaskStatus::Created => write!(f, "created"),
            TempTaskStatus::Assigned => write!(f, "assigned"),
            TempTaskStatus::InProgress => write!(f, "in-progress"),
            TempTaskStatus::Completed => write!(f, "completed"),
            TempTaskStatus::ProjectTaskCreated => write!(f, "project-task-created"),
            TempTaskStatus::DePrioritized => write!(f, "de-prioritized"),
        }
    }
}

#[derive(Error, Debug, PartialEq)]
#[error("Invalid temp task status: {0}")]
pub struct ParseTempTaskStatusError(String);

impl FromStr for TempTaskStatus {
    type Err = ParseTempTaskStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('_', "-").as_str() {
            "created" => Ok(TempTaskStatus::Created),
            "assigned" => Ok(TempTaskStatus::Assigned),
            "in-progress" => Ok(TempTaskStatus::InProgress),
            "completed" => Ok(TempTaskStatus::Completed),
            "project-task-created" => Ok(TempTaskStatus::ProjectTaskCreated),
            "de-prioritized" => Ok(TempTaskStatus::DePrioritized),
            _ => Err(ParseTempTaskStatusError(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, FromRow)]
pub struct TempTask {
    pub id: Uuid,
    pub name: String,
    pub priority: TempTaskPriority,
    pub status: TempTaskStatus,
    /// Assigned engineer
    pub user_id: Option<Uuid>,
    pub created_by: Option<Uuid>,
    pub created_byname: String,
    pub assigned_byname: String,
    pub realm_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// ============================================================================
// Data Transfer Objects (DTOs)
// ============================================================================

#[derive(Debug, Clone)]
pub struct NewTask {
    pub name: String,
    pub category: TaskCategory,
    pub priority: i32,
    pub created_by: Option<Uuid>,
}

#[derive(Debug, Clone, Default)]
pub struct TaskPatch {
    pub name: Option<String>,
    pub category: Option<TaskCategory>,
    pub priority: Option<i32>,
}

#[derive(Debug, Clone)]
pub struct NewSubtask {
    pub task_id: Uuid,
    pub name: String,
    pub assigned_to: Option<Uuid>,
    pub created_by: Option<Uuid>,
}

#[derive(Debug, Clone, Default)]
pub struct SubtaskPatch {
    pub name: Option<String>,
    pub assigned_to: Option<Option<Uuid>>,
}

#[derive(Debug, Clone)]
pub struct NewSubSubtask {
    pub subtask_id: Uuid,
    pub name: String,
    pub assigned_to: Option<Uuid>,
    /// Appended after the current last sibling when `None`
    pub order_index: Option<i32>,
    pub created_by: Option<Uuid>,
}

#[derive(Debug, Clone, Default)]
pub struct SubSubtaskPatch {
    pub name: Option<String>,
    pub assigned_to: Option<Option<Uuid>>,
    pub order_index: Option<i32>,
}

#[derive(Debug, Clone)]
pub struct NewMilestone {
    pub parent: MilestoneParent,
    pub milestone_date: NaiveDate,
    pub milestone_text: String,
    pub created_by: Option<Uuid>,
}

#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: String,
    pub full_name: String,
    pub role: UserRole,
}

#[derive(Debug, Clone, Default)]
pub struct UserPatch {
    pub full_name: Option<String>,
    pub role: Option<UserRole>,
}

#[derive(Debug, Clone)]
pub struct NewTempTask {
    pub name: String,
    pub priority: TempTaskPriority,
    pub status: TempTaskStatus,
    pub user_id: Option<Uuid>,
    pub created_by: Option<Uuid>,
    pub created_byname: String,
    pub assigned_byname: String,
}

impl Default for NewTempTask {
    fn default() -> Self {
        Self {
            name: String::new(),
            priority: TempTaskPriority::Medium,
            status: TempTaskStatus::Created,
            user_id: None,
            created_by: None,
            created_byname: String::new(),
            assigned_byname: String::new(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct TempTaskPatch {
    pub name: Option<String>,
    pub priority: Option<TempTaskPriority>,
    pub status: Option<TempTaskStatus>,
    pub user_id: Option<Option<Uuid>>,
    pub assigned_byname: Option<String>,
}

// ============================================================================
// Audit trail
// ============================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, sqlx::Type)]
#[sqlx(type_name = "TEXT", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ActionType {
    Create,
    Update,
    Delete,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, sqlx::Type)]
#[sqlx(type_name = "TEXT", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Task,
    Subtask,
    SubSubtask,
    Milestone,
}

/// One entry for the external action log.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ActionLog {
    pub action_type: ActionType,
    pub entity_type: EntityKind,
    pub entity_id: Uuid,
    pub entity_name: String,
    pub realm_id: Uuid,
    pub user_id: Uuid,
    pub performed_by: String,
    pub details: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, FromRow)]
pub struct ActionLogRecord {
    pub id: Uuid,
    pub action_type: ActionType,
    pub entity_type: EntityKind,
    pub entity_id: Uuid,
    pub entity_name: String,
    pub realm_id: Uuid,
    pub user_id: Uuid,
    pub performed_by: String,
    pub details: String,
    pub created_at: DateTime<Utc>,
}
