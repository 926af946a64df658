use crate::error::CoreError;
use crate::models::{NewTempTask, TempTask, TempTaskPatch};
use crate::repository::query_builder::{Direction, Select};
use crate::repository::tasks::validate_name;
use crate::repository::{not_found, SqliteRepository};
use crate::temp::{TempTaskPage, TempTaskQuery, TEMP_TASKS_PER_PAGE};
use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

#[async_trait]
impl super::TempTaskRepository for SqliteRepository {
    async fn add_temp_task(&self, realm_id: Uuid, data: NewTempTask) -> Result<TempTask, CoreError> {
        let name = validate_name("Temp task", &data.name)?;
        if let Some(user_id) = data.user_id {
            self.ensure_exists("users", realm_id, user_id).await?;
        }
        let now = Utc::now();

        let mut tx = self.pool().begin().await?;
        let task = sqlx::query_as(
            r#"INSERT INTO temp_tasks (id, name, priority, status, user_id, created_by, created_byname, assigned_byname, realm_id, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            RETURNING *
            "#,
        )
        .bind(Uuid::now_v7())
        .bind(name)
        .bind(data.priority)
        .bind(data.status)
        .bind(data.user_id)
        .bind(data.created_by)
        .bind(data.created_byname)
        .bind(data.assigned_byname)
        .bind(realm_id)
        .bind(now)
        .bind(now)
        .fetch_one(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(task)
    }

    async fn find_temp_task_by_id(&self, realm_id: Uuid, id: Uuid) -> Result<Option<TempTask>, CoreError> {
        Select::scoped("temp_tasks", realm_id)
            .eq("id", id)
            .fetch_optional(self.pool())
            .await
    }

    async fn find_temp_tasks(&self, realm_id: Uuid) -> Result<Vec<TempTask>, CoreError> {
        Select::scoped("temp_tasks", realm_id)
            .order_by("created_at", Direction::Desc)
            .fetch_all(self.pool())
            .await
    }

    async fn find_temp_task_page(&self, realm_id: Uuid, query: TempTaskQuery) -> Result<TempTaskPage, CoreError> {
        let select = Select::scoped("temp_tasks", realm_id);
        let total = select.count(self.pool()).await?;
        let items = select
            .order_by(query.sort.order_expr(), query.direction)
            .order_by("id", query.direction)
            .limit(TEMP_TASKS_PER_PAGE)
            .offset(query.offset())
            .fetch_all(self.pool())
            .await?;

        Ok(TempTaskPage {
            items,
            total,
            page: query.page.max(1),
        })
    }

    async fn update_temp_task(&self, realm_id: Uuid, id: Uuid, patch: TempTaskPatch) -> Result<TempTask, CoreError> {
        let name = patch.name.as_deref().map(|n| validate_name("Temp task", n)).transpose()?;
        if let Some(Some(user_id)) = patch.user_id {
            self.ensure_exists("users", realm_id, user_id).await?;
        }
        let (touch_user, user_id) = match patch.user_id {
            None => (false, None),
            Some(value) => (true, value),
        };

        let mut tx = self.pool().begin().await?;
        let task: Option<TempTask> = sqlx::query_as(
            r#"UPDATE temp_tasks SET
                name = COALESCE($1, name),
                priority = COALESCE($2, priority),
                status = COALESCE($3, status),
                user_id = CASE WHEN $4 THEN $5 ELSE user_id END,
                assigned_byname = COALESCE($6, assigned_byname),
                updated_at = $7
            WHERE id = $8 AND realm_id = $9
            RETURNING *
            "#,
        )
        .bind(name)
        .bind(patch.priority)
        .bind(patch.status)
        .bind(touch_user)
        .bind(user_id)
        .bind(patch.assigned_byname)
        .bind(Utc::now())
        .bind(id)
        .bind(realm_id)
        .fetch_optional(&mut *tx)
        .await?;
        tx.commit().await?;

        task.ok_or_else(|| not_found("Temp task", id))
    }

    async fn delete_temp_task(&self, realm_id: Uuid, id: Uuid) -> Result<(), CoreError> {
        let mut tx = self.pool().begin().await?;
        let result = sqlx::query("DELETE FROM temp_tasks WHERE id = $1 AND realm_id = $2")
            .bind(id)
            .bind(realm_id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        if result.rows_affected() == 0 {
            return Err(not_found("Temp task", id));
        }
        Ok(())
    }
}
