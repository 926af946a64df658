//! # Record Store
//!
//! The latest known snapshot of each entity collection for one realm, keyed
//! by id. Writes are last-write-wins per id: there is no version or timestamp
//! comparison, so a delayed update can overwrite a newer one.
//!
//! Each collection carries a revision counter that only moves when the
//! collection's observable contents change. The aggregator keys its
//! memoized projection on those counters.

use crate::models::{Milestone, SubSubtask, Subtask, Task, User};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Tables carried by the change feed and the record store.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Table {
    Tasks,
    Subtasks,
    SubSubtasks,
    Milestones,
    #[serde(alias = "profiles")]
    Users,
}

impl Table {
    pub const ALL: [Table; 5] = [
        Table::Tasks,
        Table::Subtasks,
        Table::SubSubtasks,
        Table::Milestones,
        Table::Users,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Table::Tasks => "tasks",
            Table::Subtasks => "subtasks",
            Table::SubSubtasks => "sub_subtasks",
            Table::Milestones => "milestones",
            Table::Users => "users",
        }
    }
}

impl std::fmt::Display for Table {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A record tagged with its entity type.
#[derive(Debug, Clone, PartialEq)]
pub enum Row {
    Task(Task),
    Subtask(Subtask),
    SubSubtask(SubSubtask),
    Milestone(Milestone),
    User(User),
}

impl Row {
    pub fn table(&self) -> Table {
        match self {
            Row::Task(_) => Table::Tasks,
            Row::Subtask(_) => Table::Subtasks,
            Row::SubSubtask(_) => Table::SubSubtasks,
            Row::Milestone(_) => Table::Milestones,
            Row::User(_) => Table::Users,
        }
    }

    pub fn id(&self) -> Uuid {
        match self {
            Row::Task(r) => r.id,
            Row::Subtask(r) => r.id,
            Row::SubSubtask(r) => r.id,
            Row::Milestone(r) => r.id,
            Row::User(r) => r.id,
        }
    }

    pub fn realm_id(&self) -> Uuid {
        match self {
            Row::Task(r) => r.realm_id,
            Row::Subtask(r) => r.realm_id,
            Row::SubSubtask(r) => r.realm_id,
            Row::Milestone(r) => r.realm_id,
            Row::User(r) => r.realm_id,
        }
    }

    /// Decodes a raw payload as a record of `table`.
    pub fn decode(table: Table, value: serde_json::Value) -> Result<Row, serde_json::Error> {
        Ok(match table {
            Table::Tasks => Row::Task(serde_json::from_value(value)?),
            Table::Subtasks => Row::Subtask(serde_json::from_value(value)?),
            Table::SubSubtasks => Row::SubSubtask(serde_json::from_value(value)?),
            Table::Milestones => Row::Milestone(serde_json::from_value(value)?),
            Table::Users => Row::User(serde_json::from_value(value)?),
        })
    }
}

/// An entity type the store keeps a collection for.
pub trait Record: Clone + PartialEq + DeserializeOwned + Send + Sync + 'static {
    const TABLE: Table;

    fn id(&self) -> Uuid;
    fn realm_id(&self) -> Uuid;
    fn collection(store: &RecordStore) -> &Collection<Self>;
    fn collection_mut(store: &mut RecordStore) -> &mut Collection<Self>;
}

macro_rules! impl_record {
    ($ty:ty, $table:expr, $field:ident) => {
        impl Record for $ty {
            const TABLE: Table = $table;

            fn id(&self) -> Uuid {
                self.id
            }

            fn realm_id(&self) -> Uuid {
                self.realm_id
            }

            fn collection(store: &RecordStore) -> &Collection<Self> {
                &store.$field
            }

            fn collection_mut(store: &mut RecordStore) -> &mut Collection<Self> {
                &mut store.$field
            }
        }
    };
}

impl_record!(Task, Table::Tasks, tasks);
impl_record!(Subtask, Table::Subtasks, subtasks);
impl_record!(SubSubtask, Table::SubSubtasks, sub_subtasks);
impl_record!(Milestone, Table::Milestones, milestones);
impl_record!(User, Table::Users, users);

/// Records of one entity type, keyed by id.
#[derive(Debug, Clone)]
pub struct Collection<R> {
    records: HashMap<Uuid, R>,
    revision: u64,
}

impl<R> Default for Collection<R> {
    fn default() -> Self {
        Self {
            records: HashMap::new(),
            revision: 0,
        }
    }
}

impl<R: Record> Collection<R> {
    pub fn get(&self, id: &Uuid) -> Option<&R> {
        self.records.get(id)
    }

    pub fn contains(&self, id: &Uuid) -> bool {
        self.records.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &R> {
        self.records.values()
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Inserts or replaces by id. Returns true when the stored value changed.
    pub fn upsert(&mut self, record: R) -> bool {
        if self.records.get(&record.id()) == Some(&record) {
            return false;
        }
        self.records.insert(record.id(), record);
        self.revision += 1;
        true
    }

    pub fn remove(&mut self, id: &Uuid) -> Option<R> {
        let removed = self.records.remove(id);
        if removed.is_some() {
            self.revision += 1;
        }
        removed
    }

    pub fn replace_all(&mut self, records: Vec<R>) {
        self.records = records.into_iter().map(|r| (r.id(), r)).collect();
        self.revision += 1;
    }

    pub fn clear(&mut self) {
        if !self.records.is_empty() {
            self.records.clear();
            self.revision += 1;
        }
    }
}

/// Full result set of one realm-scoped fetch.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    pub tasks: Vec<Task>,
    pub subtasks: Vec<Subtask>,
    pub sub_subtasks: Vec<SubSubtask>,
    pub milestones: Vec<Milestone>,
    pub users: Vec<User>,
}

impl Snapshot {
    pub fn row_count(&self) -> usize {
        self.tasks.len()
            + self.subtasks.len()
            + self.sub_subtasks.len()
            + self.milestones.len()
            + self.users.len()
    }
}

/// Revision counters of every collection, in `Table::ALL` order.
pub type StoreRevision = [u64; 5];

#[derive(Debug, Clone, Default)]
pub struct RecordStore {
    realm_id: Option<Uuid>,
    tasks: Collection<Task>,
    subtasks: Collection<Subtask>,
    sub_subtasks: Collection<SubSubtask>,
    milestones: Collection<Milestone>,
    users: Collection<User>,
}

impl RecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// The realm whose records this store holds, if any.
    pub fn realm_id(&self) -> Option<Uuid> {
        self.realm_id
    }

    /// Empties every collection and rebinds the store to `realm_id`.
    pub fn reset(&mut self, realm_id: Option<Uuid>) {
        self.realm_id = realm_id;
        self.tasks.clear();
        self.subtasks.clear();
        self.sub_subtasks.clear();
        self.milestones.clear();
        self.users.clear();
    }

    pub fn collection<R: Record>(&self) -> &Collection<R> {
        R::collection(self)
    }

    pub fn get<R: Record>(&self, id: &Uuid) -> Option<&R> {
        R::collection(self).get(id)
    }

    pub fn upsert<R: Record>(&mut self, record: R) -> bool {
        R::collection_mut(self).upsert(record)
    }

    pub fn remove<R: Record>(&mut self, id: &Uuid) -> Option<R> {
        R::collection_mut(self).remove(id)
    }

    pub fn replace_all<R: Record>(&mut self, records: Vec<R>) {
        R::collection_mut(self).replace_all(records)
    }

    pub fn contains(&self, table: Table, id: &Uuid) -> bool {
        match table {
            Table::Tasks => self.tasks.contains(id),
            Table::Subtasks => self.subtasks.contains(id),
            Table::SubSubtasks => self.sub_subtasks.contains(id),
            Table::Milestones => self.milestones.contains(id),
            Table::Users => self.users.contains(id),
        }
    }

    pub fn upsert_row(&mut self, row: Row) -> bool {
        match row {
            Row::Task(r) => self.upsert(r),
            Row::Subtask(r) => self.upsert(r),
            Row::SubSubtask(r) => self.upsert(r),
            Row::Milestone(r) => self.upsert(r),
            Row::User(r) => self.upsert(r),
        }
    }

    pub fn remove_row(&mut self, table: Table, id: &Uuid) -> bool {
        match table {
            Table::Tasks => self.tasks.remove(id).is_some(),
            Table::Subtasks => self.subtasks.remove(id).is_some(),
            Table::SubSubtasks => self.sub_subtasks.remove(id).is_some(),
            Table::Milestones => self.milestones.remove(id).is_some(),
            Table::Users => self.users.remove(id).is_some(),
        }
    }

    /// Replaces every collection with `snapshot`, dropping any row that does not
    /// belong to the bound realm. Returns the number of dropped rows.
    pub fn load(&mut self, snapshot: Snapshot) -> usize {
        let Some(realm_id) = self.realm_id else {
            return snapshot.row_count();
        };
        let before = snapshot.row_count();

        fn keep<R: Record>(records: Vec<R>, realm_id: Uuid) -> Vec<R> {
            records.into_iter().filter(|r| r.realm_id() == realm_id).collect()
        }

        let tasks = keep(snapshot.tasks, realm_id);
        let subtasks = keep(snapshot.subtasks, realm_id);
        let sub_subtasks = keep(snapshot.sub_subtasks, realm_id);
        let milestones = keep(snapshot.milestones, realm_id);
        let users = keep(snapshot.users, realm_id);
        let kept = tasks.len() + subtasks.len() + sub_subtasks.len() + milestones.len() + users.len();

        self.replace_all(tasks);
        self.replace_all(subtasks);
        self.replace_all(sub_subtasks);
        self.replace_all(milestones);
        self.replace_all(users);

        before - kept
    }

    pub fn revision(&self) -> StoreRevision {
        [
            self.tasks.revision(),
            self.subtasks.revision(),
            self.sub_subtasks.revision(),
            self.milestones.revision(),
            self.users.revision(),
        ]
    }

    pub fn len(&self, table: Table) -> usize {
        match table {
            Table::Tasks => self.tasks.len(),
            Table::Subtasks => self.subtasks.len(),
            Table::SubSubtasks => self.sub_subtasks.len(),
            Table::Milestones => self.milestones.len(),
            Table::Users => self.users.len(),
        }
    }

    pub fn tasks(&self) -> &Collection<Task> {
        &self.tasks
    }

    pub fn subtasks(&self) -> &Collection<Subtask> {
        &self.subtasks
    }

    pub fn sub_subtasks(&self) -> &Collection<SubSubtask> {
        &self.sub_subtasks
    }

    pub fn milestones(&self) -> &Collection<Milestone> {
        &self.milestones
    }

    pub fn users(&self) -> &Collection<User> {
        &self.users
    }
}


#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;

    #[test]
    fn test_upsert_is_last_write_wins() {
        let realm = Uuid::now_v7();
        let mut store = RecordStore::new();
        store.reset(Some(realm));

        let mut task = task(realm, "Login Flow");
        assert!(store.upsert(task.clone()));
        task.name = "Login Flow v2".to_string();
        assert!(store.upsert(task.clone()));

        assert_eq!(store.tasks().len(), 1);
        assert_eq!(store.get::<Task>(&task.id).unwrap().name, "Login Flow v2");
    }

    #[test]
    fn test_identical_upsert_keeps_revision() {
        let realm = Uuid::now_v7();
        let mut store = RecordStore::new();
        store.reset(Some(realm));
        let task = task(realm, "Login Flow");

        store.upsert(task.clone());
        let revision = store.revision();
        assert!(!store.upsert(task));
        assert_eq!(store.revision(), revision);
    }

    #[test]
    fn test_remove_missing_is_noop() {
        let mut store = RecordStore::new();
        store.reset(Some(Uuid::now_v7()));
        let revision = store.revision();
        assert!(!store.remove_row(Table::Milestones, &Uuid::now_v7()));
        assert_eq!(store.revision(), revision);
    }

    #[test]
    fn test_load_drops_foreign_realm_rows() {
        let realm_a = Uuid::now_v7();
        let realm_b = Uuid::now_v7();
        let mut store = RecordStore::new();
        store.reset(Some(realm_a));

        let snapshot = Snapshot {
            tasks: vec![task(realm_a, "Mine"), task(realm_b, "Theirs")],
            ..Default::default()
        };
        let dropped = store.load(snapshot);

        assert_eq!(dropped, 1);
        assert_eq!(store.tasks().len(), 1);
        assert!(store.tasks().iter().all(|t| t.realm_id == realm_a));
    }

    #[test]
    fn test_load_without_realm_materializes_nothing() {
        let mut store = RecordStore::new();
        let snapshot = Snapshot {
            tasks: vec![task(Uuid::now_v7(), "Anything")],
            ..Default::default()
        };
        assert_eq!(store.load(snapshot), 1);
        assert_eq!(store.tasks().len(), 0);
    }

    #[test]
    fn test_reset_clears_every_collection() {
        let realm = Uuid::now_v7();
        let mut store = RecordStore::new();
        store.reset(Some(realm));
        let t = task(realm, "Login Flow");
        let s = subtask(&t, "PLANNED");
        store.upsert(t);
        store.upsert(s);

        store.reset(None);
        assert_eq!(store.realm_id(), None);
        assert!(Table::ALL.iter().all(|table| store.len(*table) == 0));
    }

    #[test]
    fn test_table_accepts_profiles_alias() {
        let table: Table = serde_json::from_str("\"profiles\"").unwrap();
        assert_eq!(table, Table::Users);
        let table: Table = serde_json::from_str("\"sub_subtasks\"").unwrap();
        assert_eq!(table, Table::SubSubtasks);
    }
}
