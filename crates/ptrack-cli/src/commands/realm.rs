use anyhow::Result;
use ptrack_core::models::{NewUser, UserRole};
use ptrack_core::repository::{SqliteRepository, UserRepository};

use crate::cli::{CreateRealmCommand, RealmSubcommand};
use crate::commands::success;
use crate::util::short_id;
use crate::views::table::display_realms;

/// Realm commands run before any session exists.
pub async fn realm_command(repo: &SqliteRepository, command: RealmSubcommand) -> Result<()> {
    match command {
        RealmSubcommand::Create(command) => create_realm(repo, command).await,
        RealmSubcommand::List => {
            display_realms(&repo.find_realms().await?);
            Ok(())
        }
    }
}

async fn create_realm(repo: &SqliteRepository, command: CreateRealmCommand) -> Result<()> {
    let realm = repo.add_realm(&command.name).await?;
    let admin = repo
        .add_user(
            realm.id,
            NewUser {
                email: command.admin_email,
                full_name: command.admin_name,
                role: UserRole::Admin,
            },
        )
        .await?;
    tracing::info!(realm = %realm.id, admin = %admin.id, "realm created");

    success(format!("Created realm {} '{}'", short_id(realm.id), realm.name));
    println!("  admin: {} <{}>", admin.full_name, admin.email);
    Ok(())
}
