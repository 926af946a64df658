use crate::error::CoreError;
use crate::models::{Milestone, MilestoneParent, NewMilestone};
use crate::repository::query_builder::{Direction, Select};
use crate::repository::{not_found, SqliteRepository};
use crate::store::Table;
use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use uuid::Uuid;

#[async_trait]
impl super::MilestoneRepository for SqliteRepository {
    async fn add_milestone(&self, realm_id: Uuid, data: NewMilestone) -> Result<Milestone, CoreError> {
        let label = data.milestone_text.trim();
        if label.is_empty() {
            return Err(CoreError::InvalidInput("Milestone label cannot be empty".to_string()));
        }
        match data.parent {
            MilestoneParent::Subtask(id) => self.ensure_exists("subtasks", realm_id, id).await?,
            MilestoneParent::SubSubtask(id) => self.ensure_exists("sub_subtasks", realm_id, id).await?,
        }
        let (subtask_id, sub_subtask_id) = data.parent.columns();
        let now = Utc::now();

        let mut tx = self.pool().begin().await?;
        let milestone: Milestone = sqlx::query_as(
            r#"INSERT INTO milestones (id, subtask_id, sub_subtask_id, milestone_date, milestone_text, created_by, realm_id, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING *
            "#,
        )
        .bind(Uuid::now_v7())
        .bind(subtask_id)
        .bind(sub_subtask_id)
        .bind(data.milestone_date)
        .bind(label)
        .bind(data.created_by)
        .bind(realm_id)
        .bind(now)
        .bind(now)
        .fetch_one(&mut *tx)
        .await?;
        tx.commit().await?;

        self.announce_insert(Table::Milestones, &milestone);
        Ok(milestone)
    }

    async fn find_milestone_by_id(&self, realm_id: Uuid, id: Uuid) -> Result<Option<Milestone>, CoreError> {
        Select::scoped("milestones", realm_id)
            .eq("id", id)
            .fetch_optional(self.pool())
            .await
    }

    async fn find_milestones(&self, realm_id: Uuid) -> Result<Vec<Milestone>, CoreError> {
        Select::scoped("milestones", realm_id)
            .order_by("milestone_date", Direction::Asc)
            .fetch_all(self.pool())
            .await
    }

    async fn find_milestones_for(&self, realm_id: Uuid, parent: MilestoneParent) -> Result<Vec<Milestone>, CoreError> {
        let select = match parent {
            MilestoneParent::Subtask(id) => Select::scoped("milestones", realm_id)
                .eq("subtask_id", id)
                .is_null("sub_subtask_id"),
            MilestoneParent::SubSubtask(id) => Select::scoped("milestones", realm_id)
                .eq("sub_subtask_id", id)
                .is_null("subtask_id"),
        };
        select
            .order_by("milestone_date", Direction::Asc)
            .fetch_all(self.pool())
            .await
    }

    async fn move_milestone(&self, realm_id: Uuid, id: Uuid, date: NaiveDate) -> Result<Milestone, CoreError> {
        let mut tx = self.pool().begin().await?;
        let milestone: Option<Milestone> = sqlx::query_as(
            "UPDATE milestones SET milestone_date = $1, updated_at = $2 WHERE id = $3 AND realm_id = $4 RETURNING *",
        )
        .bind(date)
        .bind(Utc::now())
        .bind(id)
        .bind(realm_id)
        .fetch_optional(&mut *tx)
        .await?;
        tx.commit().await?;

        let milestone = milestone.ok_or_else(|| not_found("Milestone", id))?;
        self.announce_update(Table::Milestones, &milestone);
        Ok(milestone)
    }

    async fn delete_milestone(&self, realm_id: Uuid, id: Uuid) -> Result<(), CoreError> {
        let mut tx = self.pool().begin().await?;
        let deleted: Option<Milestone> =
            sqlx::query_as("DELETE FROM milestones WHERE id = $1 AND realm_id = $2 RETURNING *")
                .bind(id)
                .bind(realm_id)
                .fetch_optional(&mut *tx)
                .await?;
        tx.commit().await?;

        let milestone = deleted.ok_or_else(|| not_found("Milestone", id))?;
        self.announce_delete(Table::Milestones, &milestone);
        Ok(())
    }
}
