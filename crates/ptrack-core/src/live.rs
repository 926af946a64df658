//! # Live store
//!
//! The Record Store is owned by a single writer task. Fetch results, feed
//! events and local mirror-deletes all arrive as [`StoreCommand`]s on one
//! bounded queue and are applied strictly in arrival order, so the
//! last-write-wins contract holds no matter which task produced them.
//!
//! Readers never touch the store. After each command that changes it, the
//! writer republishes a [`TrackerView`] on a `watch` channel.

use crate::aggregate::{GroupedTask, Projection};
use crate::error::CoreError;
use crate::feed::{apply_change, ChangeEvent, FeedOutcome};
use crate::models::User;
use crate::scope::Generation;
use crate::store::{RecordStore, Snapshot, Table};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use uuid::Uuid;

#[derive(Debug)]
pub enum StoreCommand {
    /// Clears the store and binds it to `realm` under a new generation.
    Reset {
        realm: Option<Uuid>,
        generation: Generation,
    },
    Loading {
        generation: Generation,
    },
    Snapshot {
        generation: Generation,
        snapshot: Snapshot,
    },
    LoadFailed {
        generation: Generation,
        message: String,
    },
    Change {
        generation: Generation,
        event: ChangeEvent,
    },
    /// Mirrors a confirmed delete without waiting for the feed.
    Remove {
        generation: Generation,
        table: Table,
        id: Uuid,
    },
    /// Answers once every earlier command has been applied.
    Flush(oneshot::Sender<()>),
}

/// What the presentation layer sees.
#[derive(Debug, Clone, Default)]
pub struct TrackerView {
    pub realm_id: Option<Uuid>,
    pub generation: Generation,
    pub loading: bool,
    pub error: Option<String>,
    pub tasks: Arc<Vec<GroupedTask>>,
    pub users: Arc<Vec<User>>,
}

impl TrackerView {
    pub fn find_task(&self, id: Uuid) -> Option<&GroupedTask> {
        self.tasks.iter().find(|t| t.task.id == id)
    }
}

struct Writer {
    store: RecordStore,
    projection: Projection,
    generation: Generation,
    loading: bool,
    error: Option<String>,
    view: watch::Sender<TrackerView>,
}

impl Writer {
    fn is_stale(&self, generation: Generation, what: &str) -> bool {
        if generation != self.generation {
            tracing::debug!(generation, current = self.generation, what, "discarding stale command");
            return true;
        }
        false
    }

    /// Applies one command. Returns true when the published view must change.
    fn apply(&mut self, command: StoreCommand) -> bool {
        match command {
            StoreCommand::Reset { realm, generation } => {
                self.generation = generation;
                self.store.reset(realm);
                self.loading = false;
                self.error = None;
                true
            }
            StoreCommand::Loading { generation } => {
                if self.is_stale(generation, "loading") {
                    return false;
                }
                self.loading = true;
                true
            }
            StoreCommand::Snapshot { generation, snapshot } => {
                if self.is_stale(generation, "snapshot") {
                    return false;
                }
                let rows = snapshot.row_count();
                let dropped = self.store.load(snapshot);
                if dropped > 0 {
                    tracing::warn!(dropped, "dropped rows outside the active realm from snapshot");
                }
                tracing::info!(rows = rows - dropped, generation, "snapshot applied");
                self.loading = false;
                self.error = None;
                true
            }
            StoreCommand::LoadFailed { generation, message } => {
                if self.is_stale(generation, "load failure") {
                    return false;
                }
                self.loading = false;
                self.error = Some(message);
                true
            }
            StoreCommand::Change { generation, event } => {
                if self.is_stale(generation, "change") {
                    return false;
                }
                match apply_change(&mut self.store, &event) {
                    Ok(FeedOutcome::Ignored(reason)) => {
                        tracing::debug!(table = %event.table, ?reason, "change ignored");
                        false
                    }
                    Ok(outcome) => {
                        tracing::debug!(table = %event.table, ?outcome, "change applied");
                        true
                    }
                    Err(e) => {
                        tracing::warn!(table = %event.table, error = %e, "malformed change event");
                        false
                    }
                }
            }
            StoreCommand::Remove { generation, table, id } => {
                if self.is_stale(generation, "remove") {
                    return false;
                }
                self.store.remove_row(table, &id)
            }
            StoreCommand::Flush(ack) => {
                let _ = ack.send(());
                false
            }
        }
    }

    fn publish(&mut self) {
        self.projection.refresh(&self.store);
        let view = TrackerView {
            realm_id: self.store.realm_id(),
            generation: self.generation,
            loading: self.loading,
            error: self.error.clone(),
            tasks: self.projection.view(),
            users: self.projection.users(),
        };
        self.view.send_replace(view);
    }

    async fn run(mut self, mut commands: mpsc::Receiver<StoreCommand>) {
        while let Some(command) = commands.recv().await {
            if self.apply(command) {
                self.publish();
            }
        }
        tracing::debug!("live store writer stopped");
    }
}

/// Handle to the single-writer task.
#[derive(Debug, Clone)]
pub struct LiveStore {
    commands: mpsc::Sender<StoreCommand>,
    view: watch::Receiver<TrackerView>,
}

impl LiveStore {
    /// Spawns the writer on the current tokio runtime.
    pub fn spawn(capacity: usize) -> (Self, JoinHandle<()>) {
        let (commands_tx, commands_rx) = mpsc::channel(capacity.max(1));
        let (view_tx, view_rx) = watch::channel(TrackerView::default());
        let writer = Writer {
            store: RecordStore::new(),
            projection: Projection::new(),
            generation: 0,
            loading: false,
            error: None,
            view: view_tx,
        };
        let handle = tokio::spawn(writer.run(commands_rx));
        (
            Self {
                commands: commands_tx,
                view: view_rx,
            },
            handle,
        )
    }

    pub async fn send(&self, command: StoreCommand) -> Result<(), CoreError> {
        self.commands.send(command).await.map_err(|_| CoreError::WriterClosed)
    }

    /// Waits until everything sent so far has been applied.
    pub async fn flush(&self) -> Result<(), CoreError> {
        let (tx, rx) = oneshot::channel();
        self.send(StoreCommand::Flush(tx)).await?;
        rx.await.map_err(|_| CoreError::WriterClosed)
    }

    pub fn view(&self) -> TrackerView {
        self.view.borrow().clone()
    }

    pub fn watch(&self) -> watch::Receiver<TrackerView> {
        self.view.clone()
    }

    pub(crate) fn sender(&self) -> mpsc::Sender<StoreCommand> {
        self.commands.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::fixtures::*;

    #[tokio::test]
    async fn test_snapshot_then_change_updates_view() {
        let (live, _handle) = LiveStore::spawn(16);
        let realm = Uuid::now_v7();
        let task = task(realm, "Login Flow");

        live.send(StoreCommand::Reset { realm: Some(realm), generation: 1 }).await.unwrap();
        live.send(StoreCommand::Snapshot {
            generation: 1,
            snapshot: Snapshot {
                tasks: vec![task.clone()],
                ..Default::default()
            },
        })
        .await
        .unwrap();
        let planned = subtask(&task, "PLANNED");
        live.send(StoreCommand::Change {
            generation: 1,
            event: ChangeEvent::insert(Table::Subtasks, &planned).unwrap(),
        })
        .await
        .unwrap();
        live.flush().await.unwrap();

        let view = live.view();
        assert_eq!(view.realm_id, Some(realm));
        assert!(!view.loading);
        assert_eq!(view.tasks.len(), 1);
        assert_eq!(view.tasks[0].subtasks.len(), 1);
    }

    #[tokio::test]
    async fn test_stale_generation_is_discarded() {
        let (live, _handle) = LiveStore::spawn(16);
        let realm_a = Uuid::now_v7();
        let realm_b = Uuid::now_v7();

        live.send(StoreCommand::Reset { realm: Some(realm_a), generation: 1 }).await.unwrap();
        live.send(StoreCommand::Reset { realm: Some(realm_b), generation: 2 }).await.unwrap();
        // A slow fetch for realm A lands after the switch.
        live.send(StoreCommand::Snapshot {
            generation: 1,
            snapshot: Snapshot {
                tasks: vec![task(realm_b, "Looks like B but fetched for A")],
                ..Default::default()
            },
        })
        .await
        .unwrap();
        live.flush().await.unwrap();

        let view = live.view();
        assert_eq!(view.realm_id, Some(realm_b));
        assert_eq!(view.generation, 2);
        assert!(view.tasks.is_empty());
    }

    #[tokio::test]
    async fn test_load_failure_sets_error_banner() {
        let (live, _handle) = LiveStore::spawn(4);
        let realm = Uuid::now_v7();
        live.send(StoreCommand::Reset { realm: Some(realm), generation: 7 }).await.unwrap();
        live.send(StoreCommand::Loading { generation: 7 }).await.unwrap();
        live.send(StoreCommand::LoadFailed {
            generation: 7,
            message: "connection refused".to_string(),
        })
        .await
        .unwrap();
        live.flush().await.unwrap();

        let view = live.view();
        assert!(!view.loading);
        assert_eq!(view.error.as_deref(), Some("connection refused"));
    }

    #[tokio::test]
    async fn test_watch_notifies_on_change() {
        let (live, _handle) = LiveStore::spawn(4);
        let mut watcher = live.watch();
        let realm = Uuid::now_v7();
        live.send(StoreCommand::Reset { realm: Some(realm), generation: 1 }).await.unwrap();
        watcher.changed().await.unwrap();
        assert_eq!(watcher.borrow().realm_id, Some(realm));
    }
}
