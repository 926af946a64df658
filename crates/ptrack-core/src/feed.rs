//! # Change Feed Adapter
//!
//! Bridges a push-based, per-table change stream into Record Store mutations.
//! This is the only realtime write path into the store, and it never issues
//! persistence calls of its own.
//!
//! Every event is filtered to the realm the store is bound to: inserts and
//! updates are checked against the new record, deletes against the old one.
//! An event that fails the check never touches the store.

use crate::error::CoreError;
use crate::store::{RecordStore, Row, Table};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ChangeOperation {
    #[serde(alias = "INSERT")]
    Insert,
    #[serde(alias = "UPDATE")]
    Update,
    #[serde(alias = "DELETE")]
    Delete,
}

/// One row-level change notification.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChangeEvent {
    pub table: Table,
    pub operation: ChangeOperation,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_record: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub old_record: Option<serde_json::Value>,
}

impl ChangeEvent {
    pub fn insert<T: Serialize>(table: Table, record: &T) -> Result<Self, CoreError> {
        Ok(Self {
            table,
            operation: ChangeOperation::Insert,
            new_record: Some(serde_json::to_value(record)?),
            old_record: None,
        })
    }

    pub fn update<T: Serialize>(table: Table, record: &T) -> Result<Self, CoreError> {
        Ok(Self {
            table,
            operation: ChangeOperation::Update,
            new_record: Some(serde_json::to_value(record)?),
            old_record: None,
        })
    }

    pub fn delete<T: Serialize>(table: Table, record: &T) -> Result<Self, CoreError> {
        Ok(Self {
            table,
            operation: ChangeOperation::Delete,
            new_record: None,
            old_record: Some(serde_json::to_value(record)?),
        })
    }

    /// The record whose realm decides whether this event applies.
    fn scoping_record(&self) -> Option<&serde_json::Value> {
        match self.operation {
            ChangeOperation::Insert | ChangeOperation::Update => self.new_record.as_ref(),
            ChangeOperation::Delete => self.old_record.as_ref(),
        }
    }

    pub fn realm_id(&self) -> Option<Uuid> {
        uuid_field(self.scoping_record()?, "realm_id")
    }

    pub fn record_id(&self) -> Option<Uuid> {
        uuid_field(self.scoping_record()?, "id")
    }
}

fn uuid_field(value: &serde_json::Value, field: &str) -> Option<Uuid> {
    value
        .get(field)
        .and_then(serde_json::Value::as_str)
        .and_then(|s| Uuid::parse_str(s).ok())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    /// The store is not bound to any realm.
    Inactive,
    /// The record belongs to another realm.
    ForeignRealm,
    /// The payload carries no realm to check against.
    MissingRealm,
    /// Insert for an id the store already holds.
    AlreadyPresent,
    /// Update or delete for an id the store does not hold.
    UnknownRecord,
    /// Update whose payload equals the stored record.
    Unchanged,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedOutcome {
    Inserted,
    Updated,
    Removed,
    Ignored(IgnoreReason),
}

impl FeedOutcome {
    pub fn mutated(&self) -> bool {
        !matches!(self, FeedOutcome::Ignored(_))
    }
}

/// Applies one change event to `store`.
///
/// Insert appends only when the id is absent, update replaces an existing id,
/// delete removes by id. Payloads that cannot be decoded are returned as
/// errors and leave the store untouched.
pub fn apply_change(store: &mut RecordStore, event: &ChangeEvent) -> Result<FeedOutcome, CoreError> {
    let Some(active_realm) = store.realm_id() else {
        return Ok(FeedOutcome::Ignored(IgnoreReason::Inactive));
    };
    match event.realm_id() {
        None => return Ok(FeedOutcome::Ignored(IgnoreReason::MissingRealm)),
        Some(realm) if realm != active_realm => {
            return Ok(FeedOutcome::Ignored(IgnoreReason::ForeignRealm))
        }
        Some(_) => {}
    }

    match event.operation {
        ChangeOperation::Insert | ChangeOperation::Update => {
            let payload = event
                .new_record
                .clone()
                .ok_or_else(|| CoreError::InvalidInput(format!("{} event without new record", event.table)))?;
            let row = Row::decode(event.table, payload)?;
            let present = store.contains(event.table, &row.id());

            if event.operation == ChangeOperation::Insert {
                if present {
                    return Ok(FeedOutcome::Ignored(IgnoreReason::AlreadyPresent));
                }
                store.upsert_row(row);
                Ok(FeedOutcome::Inserted)
            } else {
                if !present {
                    return Ok(FeedOutcome::Ignored(IgnoreReason::UnknownRecord));
                }
                if store.upsert_row(row) {
                    Ok(FeedOutcome::Updated)
                } else {
                    Ok(FeedOutcome::Ignored(IgnoreReason::Unchanged))
                }
            }
        }
        ChangeOperation::Delete => {
            let id = event.record_id().ok_or_else(|| {
                CoreError::InvalidInput(format!("{} delete event without record id", event.table))
            })?;
            if store.remove_row(event.table, &id) {
                Ok(FeedOutcome::Removed)
            } else {
                Ok(FeedOutcome::Ignored(IgnoreReason::UnknownRecord))
            }
        }
    }
}

/// What a subscription yields: a change, or a transport-level error report.
#[derive(Debug, Clone, PartialEq)]
pub enum FeedSignal {
    Change(ChangeEvent),
    Error(String),
}

/// A live subscription to a named channel. Dropping it stops delivery.
pub struct Subscription {
    channel: String,
    receiver: mpsc::Receiver<FeedSignal>,
    forwarder: Option<JoinHandle<()>>,
}

impl Subscription {
    pub fn new(channel: impl Into<String>, receiver: mpsc::Receiver<FeedSignal>) -> Self {
        Self {
            channel: channel.into(),
            receiver,
            forwarder: None,
        }
    }

    /// Ties a background forwarding task to this subscription's lifetime.
    pub fn with_forwarder(mut self, forwarder: JoinHandle<()>) -> Self {
        self.forwarder = Some(forwarder);
        self
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }

    pub async fn recv(&mut self) -> Option<FeedSignal> {
        self.receiver.recv().await
    }

    pub fn unsubscribe(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        if let Some(forwarder) = self.forwarder.take() {
            forwarder.abort();
        }
        self.receiver.close();
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.stop();
    }
}

/// External push-based change stream.
#[async_trait]
pub trait ChangeFeed: Send + Sync {
    async fn subscribe(&self, channel: &str, tables: &[Table]) -> Result<Subscription, CoreError>;
}

/// In-process fan-out of row changes, fed by the SQLite backend.
#[derive(Debug, Clone)]
pub struct ChangeBus {
    sender: broadcast::Sender<ChangeEvent>,
}

impl ChangeBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn publish(&self, event: ChangeEvent) {
        // No receivers is the normal state when nothing is subscribed.
        let _ = self.sender.send(event);
    }

    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }

    fn receiver(&self) -> broadcast::Receiver<ChangeEvent> {
        self.sender.subscribe()
    }
}

/// `ChangeFeed` over a local `ChangeBus`.
#[derive(Debug, Clone)]
pub struct LocalChangeFeed {
    bus: ChangeBus,
    capacity: usize,
}

impl LocalChangeFeed {
    pub fn new(bus: ChangeBus, capacity: usize) -> Self {
        Self {
            bus,
            capacity: capacity.max(1),
        }
    }
}

#[async_trait]
impl ChangeFeed for LocalChangeFeed {
    async fn subscribe(&self, channel: &str, tables: &[Table]) -> Result<Subscription, CoreError> {
        if tables.is_empty() {
            return Err(CoreError::Subscription(format!(
                "channel '{}' requested no tables",
                channel
            )));
        }
        let tables = tables.to_vec();
        let mut source = self.bus.receiver();
        let (sender, receiver) = mpsc::channel(self.capacity);
        let name = channel.to_string();

        let forwarder = tokio::spawn(async move {
            loop {
                match source.recv().await {
                    Ok(event) => {
                        if !tables.contains(&event.table) {
                            continue;
                        }
                        if sender.send(FeedSignal::Change(event)).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(channel = %name, skipped, "change feed lagged");
                        let message = format!("subscriber lagged, {} event(s) skipped", skipped);
                        if sender.send(FeedSignal::Error(message)).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
            tracing::debug!(channel = %name, "change feed forwarder stopped");
        });

        tracing::debug!(channel, "subscribed to change feed");
        Ok(Subscription::new(channel, receiver).with_forwarder(forwarder))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Milestone, Task};
    use crate::store::fixtures::*;
    use proptest::prelude::*;

    fn store_for(realm: Uuid) -> RecordStore {
        let mut store = RecordStore::new();
        store.reset(Some(realm));
        store
    }

    #[test]
    fn test_insert_appends_when_absent() {
        let realm = Uuid::now_v7();
        let mut store = store_for(realm);
        let task = task(realm, "Login Flow");

        let event = ChangeEvent::insert(Table::Tasks, &task).unwrap();
        assert_eq!(apply_change(&mut store, &event).unwrap(), FeedOutcome::Inserted);
        assert_eq!(
            apply_change(&mut store, &event).unwrap(),
            FeedOutcome::Ignored(IgnoreReason::AlreadyPresent)
        );
        assert_eq!(store.tasks().len(), 1);
    }

    #[test]
    fn test_update_replaces_by_id() {
        let realm = Uuid::now_v7();
        let mut store = store_for(realm);
        let mut task = task(realm, "Login Flow");
        store.upsert(task.clone());

        task.name = "Login Flow (SSO)".to_string();
        let event = ChangeEvent::update(Table::Tasks, &task).unwrap();
        assert_eq!(apply_change(&mut store, &event).unwrap(), FeedOutcome::Updated);
        assert_eq!(store.get::<Task>(&task.id).unwrap().name, "Login Flow (SSO)");
    }

    #[test]
    fn test_update_for_unknown_id_is_ignored() {
        let realm = Uuid::now_v7();
        let mut store = store_for(realm);
        let event = ChangeEvent::update(Table::Tasks, &task(realm, "Ghost")).unwrap();
        assert_eq!(
            apply_change(&mut store, &event).unwrap(),
            FeedOutcome::Ignored(IgnoreReason::UnknownRecord)
        );
        assert_eq!(store.tasks().len(), 0);
    }

    #[test]
    fn test_delete_removes_by_id() {
        let realm = Uuid::now_v7();
        let mut store = store_for(realm);
        let task = task(realm, "Login Flow");
        store.upsert(task.clone());

        let event = ChangeEvent::delete(Table::Tasks, &task).unwrap();
        assert_eq!(apply_change(&mut store, &event).unwrap(), FeedOutcome::Removed);
        assert_eq!(store.tasks().len(), 0);
    }

    #[test]
    fn test_foreign_realm_milestone_insert_leaves_store_untouched() {
        let realm_a = Uuid::now_v7();
        let realm_b = Uuid::now_v7();
        let mut store = store_for(realm_a);
        let own = subtask(&task(realm_a, "Mine"), "Impl");
        store.upsert(subtask_milestone(&own, date(2024, 1, 10), "dev-complete"));
        let before = store.milestones().len();

        let foreign = subtask(&task(realm_b, "Theirs"), "Impl");
        let event = ChangeEvent::insert(Table::Milestones, &subtask_milestone(&foreign, date(2024, 1, 11), "closed")).unwrap();

        assert_eq!(
            apply_change(&mut store, &event).unwrap(),
            FeedOutcome::Ignored(IgnoreReason::ForeignRealm)
        );
        assert_eq!(store.milestones().len(), before);
    }

    #[test]
    fn test_foreign_realm_delete_is_dropped() {
        let realm_a = Uuid::now_v7();
        let mut store = store_for(realm_a);
        let mut task = task(realm_a, "Login Flow");
        store.upsert(task.clone());

        task.realm_id = Uuid::now_v7();
        let event = ChangeEvent::delete(Table::Tasks, &task).unwrap();
        assert_eq!(
            apply_change(&mut store, &event).unwrap(),
            FeedOutcome::Ignored(IgnoreReason::ForeignRealm)
        );
        assert_eq!(store.tasks().len(), 1);
    }

    #[test]
    fn test_delete_without_realm_is_dropped() {
        let realm = Uuid::now_v7();
        let mut store = store_for(realm);
        let task = task(realm, "Login Flow");
        store.upsert(task.clone());

        let event = ChangeEvent {
            table: Table::Tasks,
            operation: ChangeOperation::Delete,
            new_record: None,
            old_record: Some(serde_json::json!({ "id": task.id.to_string() })),
        };
        assert_eq!(
            apply_change(&mut store, &event).unwrap(),
            FeedOutcome::Ignored(IgnoreReason::MissingRealm)
        );
        assert_eq!(store.tasks().len(), 1);
    }

    #[test]
    fn test_inactive_store_ignores_everything() {
        let mut store = RecordStore::new();
        let event = ChangeEvent::insert(Table::Tasks, &task(Uuid::now_v7(), "Early")).unwrap();
        assert_eq!(
            apply_change(&mut store, &event).unwrap(),
            FeedOutcome::Ignored(IgnoreReason::Inactive)
        );
        assert_eq!(store.tasks().len(), 0);
    }

    #[test]
    fn test_malformed_payload_is_an_error() {
        let realm = Uuid::now_v7();
        let mut store = store_for(realm);
        let event = ChangeEvent {
            table: Table::Milestones,
            operation: ChangeOperation::Insert,
            new_record: Some(serde_json::json!({ "id": Uuid::now_v7().to_string(), "realm_id": realm.to_string() })),
            old_record: None,
        };
        assert!(matches!(apply_change(&mut store, &event), Err(CoreError::Json(_))));
        assert_eq!(store.milestones().len(), 0);
    }

    #[test]
    fn test_wire_format_accepts_uppercase_operations() {
        let realm = Uuid::now_v7();
        let task = task(realm, "Login Flow");
        let json = serde_json::json!({
            "table": "tasks",
            "operation": "INSERT",
            "new_record": serde_json::to_value(&task).unwrap(),
        });
        let event: ChangeEvent = serde_json::from_value(json).unwrap();
        assert_eq!(event.operation, ChangeOperation::Insert);
        assert_eq!(event.realm_id(), Some(realm));
    }

    #[tokio::test]
    async fn test_local_feed_filters_tables() {
        let bus = ChangeBus::new(16);
        let feed = LocalChangeFeed::new(bus.clone(), 16);
        let mut subscription = feed.subscribe("tracker_changes", &[Table::Milestones]).await.unwrap();

        let realm = Uuid::now_v7();
        let task = task(realm, "Login Flow");
        let planned = subtask(&task, "PLANNED");
        let milestone = subtask_milestone(&planned, date(2024, 1, 10), "dev-complete");
        bus.publish(ChangeEvent::insert(Table::Tasks, &task).unwrap());
        bus.publish(ChangeEvent::insert(Table::Milestones, &milestone).unwrap());

        match subscription.recv().await {
            Some(FeedSignal::Change(event)) => {
                assert_eq!(event.table, Table::Milestones);
                let decoded: Milestone = serde_json::from_value(event.new_record.unwrap()).unwrap();
                assert_eq!(decoded, milestone);
            }
            other => panic!("unexpected signal: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_subscribe_requires_tables() {
        let feed = LocalChangeFeed::new(ChangeBus::new(4), 4);
        let result = feed.subscribe("empty", &[]).await;
        assert!(matches!(result, Err(CoreError::Subscription(_))));
    }

    proptest! {
        #[test]
        fn prop_update_is_idempotent(name in "[A-Za-z ]{1,24}", priority in 1i32..=3) {
            let realm = Uuid::now_v7();
            let mut original = task(realm, "Seed");
            let mut once = store_for(realm);
            once.upsert(original.clone());
            let mut twice = once.clone();

            original.name = name;
            original.priority = priority;
            let event = ChangeEvent::update(Table::Tasks, &original).unwrap();

            apply_change(&mut once, &event).unwrap();
            apply_change(&mut twice, &event).unwrap();
            let second = apply_change(&mut twice, &event).unwrap();

            prop_assert!(!second.mutated());
            prop_assert_eq!(once.get::<Task>(&original.id), twice.get::<Task>(&original.id));
            prop_assert_eq!(once.revision(), twice.revision());
        }
    }
}
