//! # Ptrack Core Library
//!
//! Realm-scoped project tracking: tasks, subtasks, ordered sub-subtasks and
//! dated milestones, kept in sync with a backend through a change feed.
//!
//! ## Features
//!
//! - **Realm Isolation**: Every collection is bound to one realm; records from
//!   other realms are rejected on load and on every feed event
//! - **Live Sync**: A single-writer store applies fetches and change events in
//!   arrival order, tagged with a scope generation so stale work is dropped
//! - **Hierarchical Views**: Grouped task trees with resolved assignees and an
//!   ACTUAL rollup that tracks the latest date per milestone label
//! - **Cascading Deletes**: Children-first delete plans executed best-effort
//! - **Realm Configuration**: Custom milestone labels and display colours
//!
//! ## Core Modules
//!
//! - [`db`]: Database connection and migration management
//! - [`models`]: Core records and transfer objects
//! - [`repository`]: Realm-scoped data access over SQLite
//! - [`store`]: The in-memory Record Store
//! - [`feed`]: Change events and the change feed abstraction
//! - [`scope`]: Realm resolution and generations
//! - [`live`]: The single-writer live store
//! - [`aggregate`]: Grouping, rollups and the memoized projection
//! - [`cascade`]: Delete planning
//! - [`tracker`]: The service tying all of the above together
//! - [`query`]: Task filtering
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use ptrack_core::{
//!     db, feed::{ChangeBus, LocalChangeFeed}, repository::SqliteRepository,
//!     session::Session, tracker::{Tracker, TrackerOptions},
//! };
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), ptrack_core::error::CoreError> {
//!     let pool = db::establish_connection("ptrack.db").await?;
//!     let bus = ChangeBus::new(256);
//!     let repo = Arc::new(SqliteRepository::new(pool).with_change_bus(bus.clone()));
//!     let feed = Arc::new(LocalChangeFeed::new(bus, 256));
//!
//!     let session = Session::resolve(repo.as_ref(), "Acme", "ada@acme.test").await?;
//!     let tracker = Tracker::new(repo, feed, TrackerOptions::default());
//!     tracker.resolve(Some(session)).await?;
//!
//!     for task in tracker.view().tasks.iter() {
//!         println!("{} ({} subtasks)", task.task.name, task.subtasks.len());
//!     }
//!     Ok(())
//! }
//! ```

pub mod aggregate;
pub mod cascade;
pub mod db;
pub mod error;
pub mod feed;
pub mod live;
pub mod models;
pub mod permissions;
pub mod query;
pub mod realm_config;
pub mod repository;
pub mod scope;
pub mod session;
pub mod store;
pub mod temp;
pub mod tracker;
