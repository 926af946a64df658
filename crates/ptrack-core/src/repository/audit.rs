use crate::error::CoreError;
use crate::models::{ActionLog, ActionLogRecord};
use crate::repository::query_builder::{Direction, Select};
use crate::repository::SqliteRepository;
use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

#[async_trait]
impl super::AuditLog for SqliteRepository {
    async fn log_action(&self, entry: &ActionLog) -> Result<(), CoreError> {
        let mut tx = self.pool().begin().await?;
        sqlx::query(
            r#"INSERT INTO action_logs (id, action_type, entity_type, entity_id, entity_name, realm_id, user_id, performed_by, details, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(Uuid::now_v7())
        .bind(entry.action_type)
        .bind(entry.entity_type)
        .bind(entry.entity_id)
        .bind(&entry.entity_name)
        .bind(entry.realm_id)
        .bind(entry.user_id)
        .bind(&entry.performed_by)
        .bind(serde_json::to_string(&entry.details)?)
        .bind(Utc::now())
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(())
    }

    async fn find_actions(&self, realm_id: Uuid, limit: i64) -> Result<Vec<ActionLogRecord>, CoreError> {
        Select::scoped("action_logs", realm_id)
            .order_by("created_at", Direction::Desc)
            .limit(limit)
            .fetch_all(self.pool())
            .await
    }
}
