use crate::error::CoreError;
use crate::models::{NewUser, Realm, User, UserPatch};
use crate::repository::query_builder::{Direction, Select};
use crate::repository::tasks::validate_name;
use crate::repository::{not_found, SqliteRepository, UserRepository};
use crate::store::Table;
use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

fn validate_email(email: &str) -> Result<String, CoreError> {
    let email = email.trim().to_lowercase();
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && !domain.is_empty() => Ok(email),
        _ => Err(CoreError::InvalidInput(format!("'{email}' is not a valid email address"))),
    }
}

#[async_trait]
impl UserRepository for SqliteRepository {
    async fn add_realm(&self, name: &str) -> Result<Realm, CoreError> {
        let name = validate_name("Realm", name)?;
        if self.find_realm_by_name(&name).await?.is_some() {
            return Err(CoreError::InvalidInput(format!("Realm '{name}' already exists")));
        }

        let mut tx = self.pool().begin().await?;
        let realm: Realm = sqlx::query_as("INSERT INTO realms (id, name, created_at) VALUES ($1, $2, $3) RETURNING *")
            .bind(Uuid::now_v7())
            .bind(name)
            .bind(Utc::now())
            .fetch_one(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(realm)
    }

    async fn find_realm_by_name(&self, name: &str) -> Result<Option<Realm>, CoreError> {
        let realm = sqlx::query_as("SELECT * FROM realms WHERE name = $1")
            .bind(name.trim())
            .fetch_optional(self.pool())
            .await?;
        Ok(realm)
    }

    async fn find_realms(&self) -> Result<Vec<Realm>, CoreError> {
        let realms = sqlx::query_as("SELECT * FROM realms ORDER BY name")
            .fetch_all(self.pool())
            .await?;
        Ok(realms)
    }

    async fn add_user(&self, realm_id: Uuid, data: NewUser) -> Result<User, CoreError> {
        let email = validate_email(&data.email)?;
        let full_name = validate_name("User", &data.full_name)?;
        if self.find_user_by_email(realm_id, &email).await?.is_some() {
            return Err(CoreError::InvalidInput(format!("A user with email '{email}' already exists")));
        }

        let mut tx = self.pool().begin().await?;
        let user: User = sqlx::query_as(
            r#"INSERT INTO users (id, email, full_name, role, realm_id, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING *
            "#,
        )
        .bind(Uuid::now_v7())
        .bind(email)
        .bind(full_name)
        .bind(data.role)
        .bind(realm_id)
        .bind(Utc::now())
        .fetch_one(&mut *tx)
        .await?;
        tx.commit().await?;

        self.announce_insert(Table::Users, &user);
        Ok(user)
    }

    async fn find_user_by_id(&self, realm_id: Uuid, id: Uuid) -> Result<Option<User>, CoreError> {
        Select::scoped("users", realm_id)
            .eq("id", id)
            .fetch_optional(self.pool())
            .await
    }

    async fn find_user_by_email(&self, realm_id: Uuid, email: &str) -> Result<Option<User>, CoreError> {
        Select::scoped("users", realm_id)
            .eq("email", email.trim().to_lowercase())
            .fetch_optional(self.pool())
            .await
    }

    async fn find_users(&self, realm_id: Uuid) -> Result<Vec<User>, CoreError> {
        Select::scoped("users", realm_id)
            .order_by("full_name", Direction::Asc)
            .fetch_all(self.pool())
            .await
    }

    async fn update_user(&self, realm_id: Uuid, id: Uuid, patch: UserPatch) -> Result<User, CoreError> {
        let full_name = patch.full_name.as_deref().map(|n| validate_name("User", n)).transpose()?;

        let mut tx = self.pool().begin().await?;
        let user: Option<User> = sqlx::query_as(
            r#"UPDATE users SET
                full_name = COALESCE($1, full_name),
                role = COALESCE($2, role)
            WHERE id = $3 AND realm_id = $4
            RETURNING *
            "#,
        )
        .bind(full_name)
        .bind(patch.role)
        .bind(id)
        .bind(realm_id)
        .fetch_optional(&mut *tx)
        .await?;
        tx.commit().await?;

        let user = user.ok_or_else(|| not_found("User", id))?;
        self.announce_update(Table::Users, &user);
        Ok(user)
    }

    async fn delete_user(&self, realm_id: Uuid, id: Uuid) -> Result<(), CoreError> {
        let mut tx = self.pool().begin().await?;
        let deleted: Option<User> = sqlx::query_as("DELETE FROM users WHERE id = $1 AND realm_id = $2 RETURNING *")
            .bind(id)
            .bind(realm_id)
            .fetch_optional(&mut *tx)
            .await?;
        tx.commit().await?;

        let user = deleted.ok_or_else(|| not_found("User", id))?;
        self.announce_delete(Table::Users, &user);
        Ok(())
    }
}
