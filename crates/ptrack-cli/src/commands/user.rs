use anyhow::Result;
use ptrack_core::models::{NewUser, UserPatch};

use crate::cli::UserSubcommand;
use crate::commands::{confirm, success, AppTracker};
use crate::util::{resolve_user, short_id};
use crate::views::table::display_users;

pub async fn user_command(tracker: &AppTracker, command: UserSubcommand) -> Result<()> {
    match command {
        UserSubcommand::Add(command) => {
            let user = tracker
                .add_user(NewUser {
                    email: command.email,
                    full_name: command.name,
                    role: command.role.into(),
                })
                .await?;
            success(format!("Added user {} '{}' ({})", short_id(user.id), user.email, user.role));
        }
        UserSubcommand::List => display_users(&tracker.view().users),
        UserSubcommand::Edit(command) => {
            let id = resolve_user(&tracker.view(), &command.user)?;
            if command.name.is_none() && command.role.is_none() {
                anyhow::bail!("Nothing to change: pass --name and/or --role");
            }
            let user = tracker
                .update_user(
                    id,
                    UserPatch {
                        full_name: command.name,
                        role: command.role.map(Into::into),
                    },
                )
                .await?;
            success(format!("Updated user '{}' ({})", user.email, user.role));
        }
        UserSubcommand::Delete(command) => {
            let view = tracker.view();
            let id = resolve_user(&view, &command.id)?;
            let email = view
                .users
                .iter()
                .find(|u| u.id == id)
                .map(|u| u.email.clone())
                .unwrap_or_else(|| id.to_string());
            if !confirm(command.force, format!("Delete user '{email}' and clear their assignments?")) {
                return Ok(());
            }
            let cleared = tracker.delete_user(id).await?;
            success(format!("Deleted user '{email}' ({cleared} assignment(s) cleared)"));
        }
    }
    Ok(())
}
