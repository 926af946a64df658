use crate::error::CoreError;
use crate::models::{NewTask, Task, TaskPatch, PRIORITY_RANGE};
use crate::repository::query_builder::{Direction, Select};
use crate::repository::{not_found, SqliteRepository};
use crate::store::Table;
use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

/// Trims a display name and rejects empty ones.
pub(crate) fn validate_name(entity: &str, name: &str) -> Result<String, CoreError> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(CoreError::InvalidInput(format!("{entity} name cannot be empty")));
    }
    Ok(trimmed.to_string())
}

pub(crate) fn validate_priority(priority: i32) -> Result<i32, CoreError> {
    if !PRIORITY_RANGE.contains(&priority) {
        return Err(CoreError::InvalidInput(format!(
            "Priority must be between {} and {}, got {}",
            PRIORITY_RANGE.start(),
            PRIORITY_RANGE.end(),
            priority
        )));
    }
    Ok(priority)
}

#[async_trait]
impl super::TaskRepository for SqliteRepository {
    async fn add_task(&self, realm_id: Uuid, data: NewTask) -> Result<Task, CoreError> {
        let name = validate_name("Task", &data.name)?;
        let priority = validate_priority(data.priority)?;
        let now = Utc::now();

        let mut tx = self.pool().begin().await?;
        let task: Task = sqlx::query_as(
            r#"INSERT INTO tasks (id, name, category, priority, realm_id, created_by, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING *
            "#,
        )
        .bind(Uuid::now_v7())
        .bind(name)
        .bind(data.category)
        .bind(priority)
        .bind(realm_id)
        .bind(data.created_by)
        .bind(now)
        .bind(now)
        .fetch_one(&mut *tx)
        .await?;
        tx.commit().await?;

        self.announce_insert(Table::Tasks, &task);
        Ok(task)
    }

    async fn find_task_by_id(&self, realm_id: Uuid, id: Uuid) -> Result<Option<Task>, CoreError> {
        Select::scoped("tasks", realm_id)
            .eq("id", id)
            .fetch_optional(self.pool())
            .await
    }

    async fn find_tasks(&self, realm_id: Uuid) -> Result<Vec<Task>, CoreError> {
        Select::scoped("tasks", realm_id)
            .order_by("category", Direction::Asc)
            .order_by("created_at", Direction::Asc)
            .fetch_all(self.pool())
            .await
    }

    async fn update_task(&self, realm_id: Uuid, id: Uuid, patch: TaskPatch) -> Result<Task, CoreError> {
        let name = patch.name.as_deref().map(|n| validate_name("Task", n)).transpose()?;
        let priority = patch.priority.map(validate_priority).transpose()?;

        let mut tx = self.pool().begin().await?;
        let task: Option<Task> = sqlx::query_as(
            r#"UPDATE tasks SET
                name = COALESCE($1, name),
                category = COALESCE($2, category),
                priority = COALESCE($3, priority),
                updated_at = $4
            WHERE id = $5 AND realm_id = $6
            RETURNING *
            "#,
        )
        .bind(name)
        .bind(patch.category)
        .bind(priority)
        .bind(Utc::now())
        .bind(id)
        .bind(realm_id)
        .fetch_optional(&mut *tx)
        .await?;
        tx.commit().await?;

        let task = task.ok_or_else(|| not_found("Task", id))?;
        self.announce_update(Table::Tasks, &task);
        Ok(task)
    }

    async fn delete_task(&self, realm_id: Uuid, id: Uuid) -> Result<(), CoreError> {
        let mut tx = self.pool().begin().await?;
        let deleted: Option<Task> = sqlx::query_as("DELETE FROM tasks WHERE id = $1 AND realm_id = $2 RETURNING *")
            .bind(id)
            .bind(realm_id)
            .fetch_optional(&mut *tx)
            .await?;
        tx.commit().await?;

        let task = deleted.ok_or_else(|| not_found("Task", id))?;
        self.announce_delete(Table::Tasks, &task);
        Ok(())
    }
}
