use crate::error::CoreError;
use crate::repository::SqliteRepository;
use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

#[async_trait]
impl super::ConfigRepository for SqliteRepository {
    async fn load_config(&self, realm_id: Uuid, key: &str) -> Result<Option<serde_json::Value>, CoreError> {
        let row: Option<(String,)> =
            sqlx::query_as("SELECT config_value FROM app_config WHERE realm_id = $1 AND config_key = $2")
                .bind(realm_id)
                .bind(key)
                .fetch_optional(self.pool())
                .await?;

        row.map(|(raw,)| serde_json::from_str(&raw))
            .transpose()
            .map_err(CoreError::from)
    }

    async fn upsert_config(&self, realm_id: Uuid, key: &str, value: &serde_json::Value) -> Result<(), CoreError> {
        let mut tx = self.pool().begin().await?;
        sqlx::query(
            r#"INSERT INTO app_config (id, realm_id, config_key, config_value, updated_at)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (realm_id, config_key)
            DO UPDATE SET config_value = excluded.config_value, updated_at = excluded.updated_at
            "#,
        )
        .bind(Uuid::now_v7())
        .bind(realm_id)
        .bind(key)
        .bind(serde_json::to_string(value)?)
        .bind(Utc::now())
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;

        tracing::debug!(%realm_id, key, "realm config saved");
        Ok(())
    }
}
