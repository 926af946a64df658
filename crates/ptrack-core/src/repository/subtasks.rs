use crate::error::CoreError;
use crate::models::{NewSubSubtask, NewSubtask, SubSubtask, SubSubtaskPatch, Subtask, SubtaskPatch};
use crate::repository::query_builder::{Direction, Select};
use crate::repository::tasks::validate_name;
use crate::repository::{not_found, SqliteRepository};
use crate::store::Table;
use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

impl SqliteRepository {
    /// Fails with `NotFound` unless `id` names a row of `table` in `realm_id`.
    pub(crate) async fn ensure_exists(&self, table: &'static str, realm_id: Uuid, id: Uuid) -> Result<(), CoreError> {
        let count = Select::scoped(table, realm_id).eq("id", id).count(self.pool()).await?;
        if count == 0 {
            return Err(CoreError::NotFound(format!("{table} row {id} in this realm")));
        }
        Ok(())
    }
}

#[async_trait]
impl super::SubtaskRepository for SqliteRepository {
    async fn add_subtask(&self, realm_id: Uuid, data: NewSubtask) -> Result<Subtask, CoreError> {
        let name = validate_name("Subtask", &data.name)?;
        self.ensure_exists("tasks", realm_id, data.task_id).await?;
        if let Some(user_id) = data.assigned_to {
            self.ensure_exists("users", realm_id, user_id).await?;
        }
        let now = Utc::now();

        let mut tx = self.pool().begin().await?;
        let subtask: Subtask = sqlx::query_as(
            r#"INSERT INTO subtasks (id, task_id, name, assigned_to, realm_id, created_by, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING *
            "#,
        )
        .bind(Uuid::now_v7())
        .bind(data.task_id)
        .bind(name)
        .bind(data.assigned_to)
        .bind(realm_id)
        .bind(data.created_by)
        .bind(now)
        .bind(now)
        .fetch_one(&mut *tx)
        .await?;
        tx.commit().await?;

        self.announce_insert(Table::Subtasks, &subtask);
        Ok(subtask)
    }

    async fn find_subtask_by_id(&self, realm_id: Uuid, id: Uuid) -> Result<Option<Subtask>, CoreError> {
        Select::scoped("subtasks", realm_id)
            .eq("id", id)
            .fetch_optional(self.pool())
            .await
    }

    async fn find_subtasks(&self, realm_id: Uuid) -> Result<Vec<Subtask>, CoreError> {
        Select::scoped("subtasks", realm_id)
            .order_by("created_at", Direction::Asc)
            .fetch_all(self.pool())
            .await
    }

    async fn update_subtask(&self, realm_id: Uuid, id: Uuid, patch: SubtaskPatch) -> Result<Subtask, CoreError> {
        let name = patch.name.as_deref().map(|n| validate_name("Subtask", n)).transpose()?;
        if let Some(Some(user_id)) = patch.assigned_to {
            self.ensure_exists("users", realm_id, user_id).await?;
        }

        // `assigned_to` is a tri-state: untouched, cleared, or set.
        let (touch_assignee, assignee) = match patch.assigned_to {
            None => (false, None),
            Some(value) => (true, value),
        };

        let mut tx = self.pool().begin().await?;
        let subtask: Option<Subtask> = sqlx::query_as(
            r#"UPDATE subtasks SET
                name = COALESCE($1, name),
                assigned_to = CASE WHEN $2 THEN $3 ELSE assigned_to END,
                updated_at = $4
            WHERE id = $5 AND realm_id = $6
            RETURNING *
            "#,
        )
        .bind(name)
        .bind(touch_assignee)
        .bind(assignee)
        .bind(Utc::now())
        .bind(id)
        .bind(realm_id)
        .fetch_optional(&mut *tx)
        .await?;
        tx.commit().await?;

        let subtask = subtask.ok_or_else(|| not_found("Subtask", id))?;
        self.announce_update(Table::Subtasks, &subtask);
        Ok(subtask)
    }

    async fn delete_subtask(&self, realm_id: Uuid, id: Uuid) -> Result<(), CoreError> {
        let mut tx = self.pool().begin().await?;
        let deleted: Option<Subtask> =
            sqlx::query_as("DELETE FROM subtasks WHERE id = $1 AND realm_id = $2 RETURNING *")
                .bind(id)
                .bind(realm_id)
                .fetch_optional(&mut *tx)
                .await?;
        tx.commit().await?;

        let subtask = deleted.ok_or_else(|| not_found("Subtask", id))?;
        self.announce_delete(Table::Subtasks, &subtask);
        Ok(())
    }

    async fn add_sub_subtask(&self, realm_id: Uuid, data: NewSubSubtask) -> Result<SubSubtask, CoreError> {
        let name = validate_name("Sub-subtask", &data.name)?;
        self.ensure_exists("subtasks", realm_id, data.subtask_id).await?;
        if let Some(user_id) = data.assigned_to {
            self.ensure_exists("users", realm_id, user_id).await?;
        }

        let mut tx = self.pool().begin().await?;
        let order_index = match data.order_index {
            Some(index) => index,
            None => {
                let (next,): (i32,) = sqlx::query_as(
                    "SELECT COALESCE(MAX(order_index), -1) + 1 FROM sub_subtasks WHERE subtask_id = $1 AND realm_id = $2",
                )
                .bind(data.subtask_id)
                .bind(realm_id)
                .fetch_one(&mut *tx)
                .await?;
                next
            }
        };
        let now = Utc::now();

        let step: SubSubtask = sqlx::query_as(
            r#"INSERT INTO sub_subtasks (id, subtask_id, name, assigned_to, order_index, realm_id, created_by, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING *
            "#,
        )
        .bind(Uuid::now_v7())
        .bind(data.subtask_id)
        .bind(name)
        .bind(data.assigned_to)
        .bind(order_index)
        .bind(realm_id)
        .bind(data.created_by)
        .bind(now)
        .bind(now)
        .fetch_one(&mut *tx)
        .await?;
        tx.commit().await?;

        self.announce_insert(Table::SubSubtasks, &step);
        Ok(step)
    }

    async fn find_sub_subtask_by_id(&self, realm_id: Uuid, id: Uuid) -> Result<Option<SubSubtask>, CoreError> {
        Select::scoped("sub_subtasks", realm_id)
            .eq("id", id)
            .fetch_optional(self.pool())
            .await
    }

    async fn find_sub_subtasks(&self, realm_id: Uuid) -> Result<Vec<SubSubtask>, CoreError> {
        Select::scoped("sub_subtasks", realm_id)
            .order_by("order_index", Direction::Asc)
            .fetch_all(self.pool())
            .await
    }

    async fn update_sub_subtask(
        &self,
        realm_id: Uuid,
        id: Uuid,
        patch: SubSubtaskPatch,
    ) -> Result<SubSubtask, CoreError> {
        let name = patch.name.as_deref().map(|n| validate_name("Sub-subtask", n)).transpose()?;
        if let Some(Some(user_id)) = patch.assigned_to {
            self.ensure_exists("users", realm_id, user_id).await?;
        }
        let (touch_assignee, assignee) = match patch.assigned_to {
            None => (false, None),
            Some(value) => (true, value),
        };

        let mut tx = self.pool().begin().await?;
        let step: Option<SubSubtask> = sqlx::query_as(
            r#"UPDATE sub_subtasks SET
                name = COALESCE($1, name),
                assigned_to = CASE WHEN $2 THEN $3 ELSE assigned_to END,
                order_index = COALESCE($4, order_index),
                updated_at = $5
            WHERE id = $6 AND realm_id = $7
            RETURNING *
            "#,
        )
        .bind(name)
        .bind(touch_assignee)
        .bind(assignee)
        .bind(patch.order_index)
        .bind(Utc::now())
        .bind(id)
        .bind(realm_id)
        .fetch_optional(&mut *tx)
        .await?;
        tx.commit().await?;

        let step = step.ok_or_else(|| not_found("Sub-subtask", id))?;
        self.announce_update(Table::SubSubtasks, &step);
        Ok(step)
    }

    async fn delete_sub_subtask(&self, realm_id: Uuid, id: Uuid) -> Result<(), CoreError> {
        let mut tx = self.pool().begin().await?;
        let deleted: Option<SubSubtask> =
            sqlx::query_as("DELETE FROM sub_subtasks WHERE id = $1 AND realm_id = $2 RETURNING *")
                .bind(id)
                .bind(realm_id)
                .fetch_optional(&mut *tx)
                .await?;
        tx.commit().await?;

        let step = deleted.ok_or_else(|| not_found("Sub-subtask", id))?;
        self.announce_delete(Table::SubSubtasks, &step);
        Ok(())
    }

    async fn unassign_user(&self, realm_id: Uuid, user_id: Uuid) -> Result<u64, CoreError> {
        let now = Utc::now();
        let mut tx = self.pool().begin().await?;
        let subtasks: Vec<Subtask> = sqlx::query_as(
            "UPDATE subtasks SET assigned_to = NULL, updated_at = $1 WHERE assigned_to = $2 AND realm_id = $3 RETURNING *",
        )
        .bind(now)
        .bind(user_id)
        .bind(realm_id)
        .fetch_all(&mut *tx)
        .await?;

        let steps: Vec<SubSubtask> = sqlx::query_as(
            "UPDATE sub_subtasks SET assigned_to = NULL, updated_at = $1 WHERE assigned_to = $2 AND realm_id = $3 RETURNING *",
        )
        .bind(now)
        .bind(user_id)
        .bind(realm_id)
        .fetch_all(&mut *tx)
        .await?;
        tx.commit().await?;

        for subtask in &subtasks {
            self.announce_update(Table::Subtasks, subtask);
        }
        for step in &steps {
            self.announce_update(Table::SubSubtasks, step);
        }

        Ok((subtasks.len() + steps.len()) as u64)
    }
}
