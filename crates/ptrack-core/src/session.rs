use crate::error::CoreError;
use crate::models::{User, UserRole};
use crate::repository::UserRepository;
use uuid::Uuid;

/// The signed-in identity, as handed over by the auth collaborator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub user_id: Uuid,
    pub email: String,
    pub full_name: String,
    pub role: UserRole,
    pub realm_id: Uuid,
}

impl Session {
    pub fn for_user(user: &User) -> Self {
        Self {
            user_id: user.id,
            email: user.email.clone(),
            full_name: user.full_name.clone(),
            role: user.role,
            realm_id: user.realm_id,
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role == UserRole::Admin
    }

    /// Looks up `email` inside the realm called `realm_name`.
    pub async fn resolve<R>(repo: &R, realm_name: &str, email: &str) -> Result<Self, CoreError>
    where
        R: UserRepository + Sync + ?Sized,
    {
        let realm = repo
            .find_realm_by_name(realm_name)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("Realm '{realm_name}'")))?;
        let user = repo
            .find_user_by_email(realm.id, email)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("User '{email}' in realm '{realm_name}'")))?;
        Ok(Self::for_user(&user))
    }
}
