use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use owo_colors::{OwoColorize, Style};
use ptrack_core::db;
use ptrack_core::error::CoreError;
use ptrack_core::feed::{ChangeBus, LocalChangeFeed};
use ptrack_core::repository::SqliteRepository;
use ptrack_core::session::Session;
use ptrack_core::tracker::{Tracker, TrackerOptions};
use tracing_subscriber::EnvFilter;

mod cli;
mod commands;
mod config;
mod parser;
mod query_parser;
mod util;
mod views;

use cli::{Cli, Commands};
use config::Config;

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("ptrack=warn,ptrack_core=warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() {
    init_tracing();
    let cli = Cli::parse();

    let config = match Config::new() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{} Invalid configuration: {}", "Error:".red().bold(), e);
            std::process::exit(1);
        }
    };

    if let Err(e) = run(cli, config).await {
        handle_error(e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli, config: Config) -> Result<()> {
    let pool = db::establish_connection(&config.database_path)
        .await
        .with_context(|| format!("Failed to open database '{}'", config.database_path))?;

    let bus = ChangeBus::new(config.feed_capacity);
    let repo = Arc::new(SqliteRepository::new(pool).with_change_bus(bus.clone()));

    if let Commands::Realm(command) = cli.command {
        return commands::realm::realm_command(&repo, command.command).await;
    }

    let realm = cli.realm.or_else(|| config.realm.clone()).ok_or(CoreError::RealmUnresolved)?;
    let email = cli.user.or_else(|| config.user_email.clone()).ok_or_else(|| {
        CoreError::InvalidInput("No acting user: pass --as EMAIL or set PTRACK_USER_EMAIL".to_string())
    })?;
    let session = Session::resolve(repo.as_ref(), &realm, &email).await?;
    tracing::debug!(realm = %session.realm_id, user = %session.email, "session resolved");

    let feed = Arc::new(LocalChangeFeed::new(bus, config.feed_capacity));
    let tracker = Tracker::new(
        repo,
        feed,
        TrackerOptions {
            channel_capacity: config.feed_capacity,
            ..TrackerOptions::default()
        },
    );
    tracker.resolve(Some(session.clone())).await?;
    tracker.flush().await?;

    match cli.command {
        Commands::Realm(_) => Ok(()),
        Commands::User(command) => commands::user::user_command(&tracker, command.command).await,
        Commands::Task(command) => commands::task::task_command(&tracker, command.command, &config).await,
        Commands::Subtask(command) => commands::subtask::subtask_command(&tracker, command.command).await,
        Commands::Step(command) => commands::step::step_command(&tracker, command.command).await,
        Commands::Milestone(command) => commands::milestone::milestone_command(&tracker, command.command).await,
        Commands::Board(command) => commands::board::show_board(&tracker, command, &config).await,
        Commands::Watch(command) => commands::watch::watch_board(&tracker, command, &config).await,
        Commands::Config(command) => commands::config::config_command(&tracker, command.command).await,
        Commands::Temp(command) => commands::temp::temp_command(&tracker, &session, command.command).await,
        Commands::Log(command) => commands::log::show_log(&tracker, &session, command).await,
    }
}

fn handle_error(err: anyhow::Error) {
    let error_style = Style::new().red().bold();

    if let Some(core_error) = err.downcast_ref::<CoreError>() {
        match core_error {
            CoreError::NotFound(s) => {
                eprintln!("{} Not found: {}", "Error:".style(error_style), s);
            }
            CoreError::AmbiguousId(rows) => {
                eprintln!("{}", "Error: Ambiguous ID.".style(error_style));
                eprintln!("Did you mean one of these?");
                for (id, name) in rows {
                    eprintln!("  {} ({})", id.yellow(), name);
                }
            }
            CoreError::InvalidInput(s) => {
                eprintln!("{} Invalid input: {}", "Error:".style(error_style), s);
            }
            CoreError::Forbidden(s) => {
                eprintln!("{} Permission denied: {}", "Error:".style(error_style), s.yellow());
            }
            CoreError::RealmUnresolved => {
                eprintln!(
                    "{} No realm selected: pass --realm NAME or set PTRACK_REALM",
                    "Error:".style(error_style)
                );
            }
            CoreError::PartialCascade {
                failed,
                total,
                first_error,
            } => {
                eprintln!(
                    "{} Delete only partly succeeded: {} of {} step(s) failed",
                    "Error:".style(error_style),
                    failed.yellow(),
                    total
                );
                eprintln!("  first failure: {}", first_error);
            }
            _ => eprintln!("{} {:#}", "Error:".style(error_style), err),
        }
    } else {
        eprintln!("{} {:#}", "Error:".style(error_style), err);
    }
}
