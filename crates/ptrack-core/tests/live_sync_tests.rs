use async_trait::async_trait;
use chrono::NaiveDate;
use ptrack_core::db::establish_connection;
use ptrack_core::error::CoreError;
use ptrack_core::feed::{ChangeBus, LocalChangeFeed};
use ptrack_core::live::TrackerView;
use ptrack_core::models::*;
use ptrack_core::repository::{
    AuditLog, ConfigRepository, MilestoneRepository, Repository, SqliteRepository, SubtaskRepository, TaskRepository,
    TempTaskRepository, UserRepository,
};
use ptrack_core::scope::ScopeTransition;
use ptrack_core::session::Session;
use ptrack_core::temp::{TempTaskPage, TempTaskQuery};
use ptrack_core::tracker::{Tracker, TrackerOptions};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use uuid::Uuid;

struct Harness {
    repo: Arc<SqliteRepository>,
    tracker: Tracker<SqliteRepository>,
    _temp_dir: TempDir,
}

async fn setup() -> Harness {
    let temp_dir = tempfile::tempdir().expect("Failed to create temp directory");
    let db_path = temp_dir.path().join("live.db");
    let pool = establish_connection(&db_path.to_string_lossy())
        .await
        .expect("Failed to establish test database connection");

    let bus = ChangeBus::new(256);
    let repo = Arc::new(SqliteRepository::new(pool).with_change_bus(bus.clone()));
    let feed = Arc::new(LocalChangeFeed::new(bus, 256));
    let tracker = Tracker::new(repo.clone(), feed, TrackerOptions::default());

    Harness {
        repo,
        tracker,
        _temp_dir: temp_dir,
    }
}

async fn realm_with_user(repo: &SqliteRepository, realm: &str, name: &str, role: UserRole) -> Session {
    let realm = match repo.find_realm_by_name(realm).await.unwrap() {
        Some(existing) => existing,
        None => repo.add_realm(realm).await.unwrap(),
    };
    let user = repo
        .add_user(
            realm.id,
            NewUser {
                email: format!("{}@example.test", name.to_lowercase()),
                full_name: name.to_string(),
                role,
            },
        )
        .await
        .unwrap();
    Session::for_user(&user)
}

/// Waits until the published view satisfies `check`.
async fn wait_for<F>(tracker: &Tracker<SqliteRepository>, check: F) -> TrackerView
where
    F: Fn(&TrackerView) -> bool,
{
    let mut watcher = tracker.watch();
    let result = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            {
                let view = watcher.borrow_and_update();
                if check(&view) {
                    return view.clone();
                }
            }
            if watcher.changed().await.is_err() {
                panic!("live store writer stopped");
            }
        }
    })
    .await;
    result.expect("view never reached the expected state")
}

fn d(y: i32, m: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, day).unwrap()
}

#[tokio::test]
async fn test_resolve_fetches_realm_and_create_task_adds_planned() {
    let h = setup().await;
    let ada = realm_with_user(&h.repo, "Acme", "Ada", UserRole::Admin).await;

    let transition = h.tracker.resolve(Some(ada.clone())).await.unwrap();
    assert!(matches!(transition, ScopeTransition::Opened { .. }));

    let task = h.tracker.create_task("Login Flow", TaskCategory::Dev, 1).await.unwrap();
    h.tracker.flush().await.unwrap();

    let view = h.tracker.view();
    assert_eq!(view.realm_id, Some(ada.realm_id));
    assert!(!view.loading);
    let grouped = view.find_task(task.id).expect("task in view");
    assert_eq!(grouped.subtasks.len(), 1);
    assert!(grouped.subtasks[0].is_planned());
    assert_eq!(view.users.len(), 1);
}

#[tokio::test]
async fn test_backend_writes_arrive_through_the_feed() {
    let h = setup().await;
    let ada = realm_with_user(&h.repo, "Acme", "Ada", UserRole::Admin).await;
    h.tracker.resolve(Some(ada.clone())).await.unwrap();

    // Written by someone else; only the feed tells the tracker.
    let task = h
        .repo
        .add_task(
            ada.realm_id,
            NewTask {
                name: "From elsewhere".to_string(),
                category: TaskCategory::Infra,
                priority: 3,
                created_by: None,
            },
        )
        .await
        .unwrap();

    wait_for(&h.tracker, |v| v.find_task(task.id).is_some()).await;

    h.repo.delete_task(ada.realm_id, task.id).await.unwrap();
    wait_for(&h.tracker, |v| v.find_task(task.id).is_none()).await;
}

#[tokio::test]
async fn test_realm_switch_isolates_views() {
    let h = setup().await;
    let ada = realm_with_user(&h.repo, "Acme", "Ada", UserRole::Admin).await;
    let bob = realm_with_user(&h.repo, "Globex", "Bob", UserRole::Admin).await;

    h.tracker.resolve(Some(ada.clone())).await.unwrap();
    h.tracker.create_task("Acme task", TaskCategory::Dev, 2).await.unwrap();

    let transition = h.tracker.resolve(Some(bob.clone())).await.unwrap();
    assert!(matches!(transition, ScopeTransition::Switched { .. }));
    h.tracker.flush().await.unwrap();
    let view = h.tracker.view();
    assert_eq!(view.realm_id, Some(bob.realm_id));
    assert!(view.tasks.is_empty());

    // Writes in the old realm are ignored by the new scope.
    let acme_task = h
        .repo
        .add_task(
            ada.realm_id,
            NewTask {
                name: "Late Acme write".to_string(),
                category: TaskCategory::Dev,
                priority: 2,
                created_by: None,
            },
        )
        .await
        .unwrap();
    let globex_task = h
        .repo
        .add_task(
            bob.realm_id,
            NewTask {
                name: "Globex write".to_string(),
                category: TaskCategory::Dev,
                priority: 2,
                created_by: None,
            },
        )
        .await
        .unwrap();

    let view = wait_for(&h.tracker, |v| v.find_task(globex_task.id).is_some()).await;
    assert!(view.find_task(acme_task.id).is_none());
    assert!(view.tasks.iter().all(|t| t.task.realm_id == bob.realm_id));
}

#[tokio::test]
async fn test_sign_out_clears_the_view() {
    let h = setup().await;
    let ada = realm_with_user(&h.repo, "Acme", "Ada", UserRole::Admin).await;
    h.tracker.resolve(Some(ada)).await.unwrap();
    h.tracker.create_task("Login Flow", TaskCategory::Dev, 1).await.unwrap();

    let transition = h.tracker.sign_out().await.unwrap();
    assert!(matches!(transition, ScopeTransition::Closed { .. }));
    h.tracker.flush().await.unwrap();

    let view = h.tracker.view();
    assert_eq!(view.realm_id, None);
    assert!(view.tasks.is_empty());
    assert!(h.tracker.session().await.is_none());

    let err = h.tracker.create_task("After sign-out", TaskCategory::Dev, 1).await.unwrap_err();
    assert!(matches!(err, CoreError::RealmUnresolved));
}

#[tokio::test]
async fn test_delete_task_cascades_and_audits() {
    let h = setup().await;
    let ada = realm_with_user(&h.repo, "Acme", "Ada", UserRole::Admin).await;
    h.tracker.resolve(Some(ada.clone())).await.unwrap();

    let task = h.tracker.create_task("Login Flow", TaskCategory::Dev, 1).await.unwrap();
    let build = h.tracker.add_subtask(task.id, "Build", None).await.unwrap();
    let step = h.tracker.add_sub_subtask(build.id, "Design", None).await.unwrap();
    h.tracker
        .add_milestone(MilestoneParent::SubSubtask(step.id), d(2024, 1, 8), "Dev Complete")
        .await
        .unwrap();

    let removed = h.tracker.delete_task(task.id).await.unwrap();
    // Step milestone, rolled-up milestone, step, Build, PLANNED, task.
    assert_eq!(removed, 6);

    h.tracker.flush().await.unwrap();
    assert!(h.tracker.view().tasks.is_empty());
    assert!(h.repo.find_milestones(ada.realm_id).await.unwrap().is_empty());

    let actions = h.repo.find_actions(ada.realm_id, 10).await.unwrap();
    assert!(actions
        .iter()
        .any(|a| a.action_type == ActionType::Delete && a.entity_type == EntityKind::Task && a.entity_id == task.id));
}

#[tokio::test]
async fn test_sub_subtask_milestone_rolls_up_to_parent() {
    let h = setup().await;
    let ada = realm_with_user(&h.repo, "Acme", "Ada", UserRole::Admin).await;
    h.tracker.resolve(Some(ada.clone())).await.unwrap();

    let task = h.tracker.create_task("Login Flow", TaskCategory::Dev, 1).await.unwrap();
    let build = h.tracker.add_subtask(task.id, "Build", None).await.unwrap();
    let design = h.tracker.add_sub_subtask(build.id, "Design", None).await.unwrap();
    let implement = h.tracker.add_sub_subtask(build.id, "Implement", None).await.unwrap();

    let parent_dates = |milestones: Vec<Milestone>| -> Vec<NaiveDate> {
        milestones
            .into_iter()
            .filter(|m| m.subtask_id == Some(build.id) && m.milestone_text == "Dev Complete")
            .map(|m| m.milestone_date)
            .collect()
    };

    h.tracker
        .add_milestone(MilestoneParent::SubSubtask(design.id), d(2024, 1, 8), "Dev Complete")
        .await
        .unwrap();
    let all = h.repo.find_milestones(ada.realm_id).await.unwrap();
    assert_eq!(parent_dates(all), vec![d(2024, 1, 8)]);

    h.tracker
        .add_milestone(MilestoneParent::SubSubtask(implement.id), d(2024, 1, 12), "Dev Complete")
        .await
        .unwrap();
    let all = h.repo.find_milestones(ada.realm_id).await.unwrap();
    assert_eq!(parent_dates(all), vec![d(2024, 1, 12)]);

    // An earlier date never pulls the parent back.
    h.tracker
        .add_milestone(MilestoneParent::SubSubtask(design.id), d(2024, 1, 5), "Dev Complete")
        .await
        .unwrap();
    let all = h.repo.find_milestones(ada.realm_id).await.unwrap();
    assert_eq!(parent_dates(all), vec![d(2024, 1, 12)]);
}

#[tokio::test]
async fn test_non_admin_cannot_edit_foreign_rows() {
    let h = setup().await;
    let ada = realm_with_user(&h.repo, "Acme", "Ada", UserRole::Admin).await;
    let eve = realm_with_user(&h.repo, "Acme", "Eve", UserRole::Engineer).await;

    h.tracker.resolve(Some(ada)).await.unwrap();
    let task = h.tracker.create_task("Login Flow", TaskCategory::Dev, 1).await.unwrap();

    // Same realm, so the gate reports no change; only the identity moves.
    let transition = h.tracker.resolve(Some(eve.clone())).await.unwrap();
    assert_eq!(transition, ScopeTransition::Unchanged);

    let err = h.tracker.rename_task(task.id, "Hijacked").await.unwrap_err();
    assert!(matches!(err, CoreError::Forbidden(_)));

    let err = h
        .tracker
        .add_user(NewUser {
            email: "mallory@example.test".to_string(),
            full_name: "Mallory".to_string(),
            role: UserRole::Admin,
        })
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::Forbidden(_)));

    // Eve can edit what she created.
    let own = h.tracker.create_task("Eve's task", TaskCategory::Test, 3).await.unwrap();
    let renamed = h.tracker.rename_task(own.id, "Eve's renamed task").await.unwrap();
    assert_eq!(renamed.name, "Eve's renamed task");
}

#[tokio::test]
async fn test_delete_user_clears_assignments() {
    let h = setup().await;
    let ada = realm_with_user(&h.repo, "Acme", "Ada", UserRole::Admin).await;
    let eve = realm_with_user(&h.repo, "Acme", "Eve", UserRole::Engineer).await;
    h.tracker.resolve(Some(ada)).await.unwrap();

    let task = h.tracker.create_task("Login Flow", TaskCategory::Dev, 1).await.unwrap();
    let build = h.tracker.add_subtask(task.id, "Build", Some(eve.user_id)).await.unwrap();
    assert_eq!(build.assigned_to, Some(eve.user_id));

    let unassigned = h.tracker.delete_user(eve.user_id).await.unwrap();
    assert_eq!(unassigned, 1);

    h.tracker.flush().await.unwrap();
    let view = h.tracker.view();
    let grouped = view.find_task(task.id).expect("task in view");
    assert!(grouped.subtasks.iter().all(|s| s.assigned_user.is_none()));
    assert_eq!(view.users.len(), 1);
}

struct BrokenAudit {
    attempts: AtomicUsize,
}

#[async_trait]
impl AuditLog for BrokenAudit {
    async fn log_action(&self, _entry: &ActionLog) -> Result<(), CoreError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(CoreError::InvalidInput("audit backend unavailable".to_string()))
    }

    async fn find_actions(&self, _realm_id: Uuid, _limit: i64) -> Result<Vec<ActionLogRecord>, CoreError> {
        Ok(Vec::new())
    }
}

#[tokio::test]
async fn test_audit_failure_does_not_fail_the_delete() {
    let temp_dir = tempfile::tempdir().unwrap();
    let pool = establish_connection(&temp_dir.path().join("audit.db").to_string_lossy())
        .await
        .unwrap();
    let bus = ChangeBus::new(64);
    let repo = Arc::new(SqliteRepository::new(pool).with_change_bus(bus.clone()));
    let audit = Arc::new(BrokenAudit {
        attempts: AtomicUsize::new(0),
    });
    let tracker = Tracker::new(repo.clone(), Arc::new(LocalChangeFeed::new(bus, 64)), TrackerOptions::default())
        .with_audit_log(audit.clone());

    let ada = realm_with_user(&repo, "Acme", "Ada", UserRole::Admin).await;
    tracker.resolve(Some(ada.clone())).await.unwrap();
    let task = tracker.create_task("Login Flow", TaskCategory::Dev, 1).await.unwrap();

    let removed = tracker.delete_task(task.id).await.unwrap();
    assert_eq!(removed, 2);
    assert_eq!(audit.attempts.load(Ordering::SeqCst), 1);
    assert!(repo.find_tasks(ada.realm_id).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_delete_subtask_removes_its_milestones() {
    let h = setup().await;
    let ada = realm_with_user(&h.repo, "Acme", "Ada", UserRole::Admin).await;
    h.tracker.resolve(Some(ada.clone())).await.unwrap();

    let task = h.tracker.create_task("Login Flow", TaskCategory::Dev, 1).await.unwrap();
    let build = h.tracker.add_subtask(task.id, "Build", None).await.unwrap();
    let design = h.tracker.add_sub_subtask(build.id, "Design", None).await.unwrap();
    let implement = h.tracker.add_sub_subtask(build.id, "Implement", None).await.unwrap();
    h.tracker
        .add_milestone(MilestoneParent::SubSubtask(design.id), d(2024, 1, 8), "Dev Complete")
        .await
        .unwrap();
    h.tracker
        .add_milestone(MilestoneParent::Subtask(build.id), d(2024, 1, 15), "QA Sign-off")
        .await
        .unwrap();

    let removed = h.tracker.delete_subtask(build.id).await.unwrap();
    // Design's milestone, both sub-subtasks, the rolled-up and QA milestones, Build.
    assert_eq!(removed, 6);

    let doomed = [build.id, design.id, implement.id];
    let remaining = h.repo.find_milestones(ada.realm_id).await.unwrap();
    assert!(remaining
        .iter()
        .all(|m| !m.subtask_id.is_some_and(|id| doomed.contains(&id))
            && !m.sub_subtask_id.is_some_and(|id| doomed.contains(&id))));
    assert!(h.repo.find_subtask_by_id(ada.realm_id, build.id).await.unwrap().is_none());

    let view = wait_for(&h.tracker, |v| {
        v.find_task(task.id)
            .is_some_and(|t| t.subtasks.iter().all(|s| s.subtask.id != build.id))
    })
    .await;
    let grouped = view.find_task(task.id).expect("task in view");
    assert_eq!(grouped.subtasks.len(), 1);
    assert!(grouped.subtasks[0].is_planned());
    assert!(grouped
        .subtasks
        .iter()
        .flat_map(|s| s.milestones.iter())
        .all(|m| m.subtask_id != Some(build.id)));

    // Build is not the baseline plan, so nothing is audited.
    let actions = h.repo.find_actions(ada.realm_id, 20).await.unwrap();
    assert!(!actions
        .iter()
        .any(|a| a.action_type == ActionType::Delete && a.entity_type == EntityKind::Subtask));
}

#[tokio::test]
async fn test_deleting_planned_rows_is_audited() {
    let h = setup().await;
    let ada = realm_with_user(&h.repo, "Acme", "Ada", UserRole::Admin).await;
    h.tracker.resolve(Some(ada.clone())).await.unwrap();

    let task = h.tracker.create_task("Login Flow", TaskCategory::Dev, 1).await.unwrap();
    let view = wait_for(&h.tracker, |v| v.find_task(task.id).is_some()).await;
    let planned = view.find_task(task.id).expect("task in view").subtasks[0].subtask.clone();
    assert_eq!(planned.name, PLANNED);

    let step = h.tracker.add_sub_subtask(planned.id, "Design", None).await.unwrap();
    h.tracker
        .add_milestone(MilestoneParent::SubSubtask(step.id), d(2024, 1, 8), "Dev Complete")
        .await
        .unwrap();

    // The step and its milestone; the rolled-up PLANNED milestone stays.
    assert_eq!(h.tracker.delete_sub_subtask(step.id).await.unwrap(), 2);
    let actions = h.repo.find_actions(ada.realm_id, 20).await.unwrap();
    assert!(actions.iter().any(|a| a.action_type == ActionType::Delete
        && a.entity_type == EntityKind::SubSubtask
        && a.entity_id == step.id));

    assert_eq!(h.tracker.delete_subtask(planned.id).await.unwrap(), 2);
    let actions = h.repo.find_actions(ada.realm_id, 20).await.unwrap();
    let entry = actions
        .iter()
        .find(|a| a.action_type == ActionType::Delete && a.entity_type == EntityKind::Subtask)
        .expect("PLANNED delete audited");
    assert_eq!(entry.entity_id, planned.id);
    assert_eq!(entry.entity_name, PLANNED);
    assert!(h.repo.find_milestones(ada.realm_id).await.unwrap().is_empty());
}

/// Delegates to SQLite but can be told to fail milestone deletes or
/// parent-milestone lookups.
struct FlakyRepository {
    inner: SqliteRepository,
    fail_milestone_delete: AtomicBool,
    fail_milestone_lookup: AtomicBool,
}

fn backend_down() -> CoreError {
    CoreError::InvalidInput("backend unavailable".to_string())
}

#[async_trait]
impl TaskRepository for FlakyRepository {
    async fn add_task(&self, realm_id: Uuid, data: NewTask) -> Result<Task, CoreError> {
        self.inner.add_task(realm_id, data).await
    }
    async fn find_task_by_id(&self, realm_id: Uuid, id: Uuid) -> Result<Option<Task>, CoreError> {
        self.inner.find_task_by_id(realm_id, id).await
    }
    async fn find_tasks(&self, realm_id: Uuid) -> Result<Vec<Task>, CoreError> {
        self.inner.find_tasks(realm_id).await
    }
    async fn update_task(&self, realm_id: Uuid, id: Uuid, patch: TaskPatch) -> Result<Task, CoreError> {
        self.inner.update_task(realm_id, id, patch).await
    }
    async fn delete_task(&self, realm_id: Uuid, id: Uuid) -> Result<(), CoreError> {
        self.inner.delete_task(realm_id, id).await
    }
}

#[async_trait]
impl SubtaskRepository for FlakyRepository {
    async fn add_subtask(&self, realm_id: Uuid, data: NewSubtask) -> Result<Subtask, CoreError> {
        self.inner.add_subtask(realm_id, data).await
    }
    async fn find_subtask_by_id(&self, realm_id: Uuid, id: Uuid) -> Result<Option<Subtask>, CoreError> {
        self.inner.find_subtask_by_id(realm_id, id).await
    }
    async fn find_subtasks(&self, realm_id: Uuid) -> Result<Vec<Subtask>, CoreError> {
        self.inner.find_subtasks(realm_id).await
    }
    async fn update_subtask(&self, realm_id: Uuid, id: Uuid, patch: SubtaskPatch) -> Result<Subtask, CoreError> {
        self.inner.update_subtask(realm_id, id, patch).await
    }
    async fn delete_subtask(&self, realm_id: Uuid, id: Uuid) -> Result<(), CoreError> {
        self.inner.delete_subtask(realm_id, id).await
    }
    async fn add_sub_subtask(&self, realm_id: Uuid, data: NewSubSubtask) -> Result<SubSubtask, CoreError> {
        self.inner.add_sub_subtask(realm_id, data).await
    }
    async fn find_sub_subtask_by_id(&self, realm_id: Uuid, id: Uuid) -> Result<Option<SubSubtask>, CoreError> {
        self.inner.find_sub_subtask_by_id(realm_id, id).await
    }
    async fn find_sub_subtasks(&self, realm_id: Uuid) -> Result<Vec<SubSubtask>, CoreError> {
        self.inner.find_sub_subtasks(realm_id).await
    }
    async fn update_sub_subtask(
        &self,
        realm_id: Uuid,
        id: Uuid,
        patch: SubSubtaskPatch,
    ) -> Result<SubSubtask, CoreError> {
        self.inner.update_sub_subtask(realm_id, id, patch).await
    }
    async fn delete_sub_subtask(&self, realm_id: Uuid, id: Uuid) -> Result<(), CoreError> {
        self.inner.delete_sub_subtask(realm_id, id).await
    }
    async fn unassign_user(&self, realm_id: Uuid, user_id: Uuid) -> Result<u64, CoreError> {
        self.inner.unassign_user(realm_id, user_id).await
    }
}

#[async_trait]
impl MilestoneRepository for FlakyRepository {
    async fn add_milestone(&self, realm_id: Uuid, data: NewMilestone) -> Result<Milestone, CoreError> {
        self.inner.add_milestone(realm_id, data).await
    }
    async fn find_milestone_by_id(&self, realm_id: Uuid, id: Uuid) -> Result<Option<Milestone>, CoreError> {
        self.inner.find_milestone_by_id(realm_id, id).await
    }
    async fn find_milestones(&self, realm_id: Uuid) -> Result<Vec<Milestone>, CoreError> {
        self.inner.find_milestones(realm_id).await
    }
    async fn find_milestones_for(&self, realm_id: Uuid, parent: MilestoneParent) -> Result<Vec<Milestone>, CoreError> {
        if self.fail_milestone_lookup.load(Ordering::SeqCst) {
            return Err(backend_down());
        }
        self.inner.find_milestones_for(realm_id, parent).await
    }
    async fn move_milestone(&self, realm_id: Uuid, id: Uuid, date: NaiveDate) -> Result<Milestone, CoreError> {
        self.inner.move_milestone(realm_id, id, date).await
    }
    async fn delete_milestone(&self, realm_id: Uuid, id: Uuid) -> Result<(), CoreError> {
        if self.fail_milestone_delete.load(Ordering::SeqCst) {
            return Err(backend_down());
        }
        self.inner.delete_milestone(realm_id, id).await
    }
}

#[async_trait]
impl UserRepository for FlakyRepository {
    async fn add_realm(&self, name: &str) -> Result<Realm, CoreError> {
        self.inner.add_realm(name).await
    }
    async fn find_realm_by_name(&self, name: &str) -> Result<Option<Realm>, CoreError> {
        self.inner.find_realm_by_name(name).await
    }
    async fn find_realms(&self) -> Result<Vec<Realm>, CoreError> {
        self.inner.find_realms().await
    }
    async fn add_user(&self, realm_id: Uuid, data: NewUser) -> Result<User, CoreError> {
        self.inner.add_user(realm_id, data).await
    }
    async fn find_user_by_id(&self, realm_id: Uuid, id: Uuid) -> Result<Option<User>, CoreError> {
        self.inner.find_user_by_id(realm_id, id).await
    }
    async fn find_user_by_email(&self, realm_id: Uuid, email: &str) -> Result<Option<User>, CoreError> {
        self.inner.find_user_by_email(realm_id, email).await
    }
    async fn find_users(&self, realm_id: Uuid) -> Result<Vec<User>, CoreError> {
        self.inner.find_users(realm_id).await
    }
    async fn update_user(&self, realm_id: Uuid, id: Uuid, patch: UserPatch) -> Result<User, CoreError> {
        self.inner.update_user(realm_id, id, patch).await
    }
    async fn delete_user(&self, realm_id: Uuid, id: Uuid) -> Result<(), CoreError> {
        self.inner.delete_user(realm_id, id).await
    }
}

#[async_trait]
impl ConfigRepository for FlakyRepository {
    async fn load_config(&self, realm_id: Uuid, key: &str) -> Result<Option<serde_json::Value>, CoreError> {
        self.inner.load_config(realm_id, key).await
    }
    async fn upsert_config(&self, realm_id: Uuid, key: &str, value: &serde_json::Value) -> Result<(), CoreError> {
        self.inner.upsert_config(realm_id, key, value).await
    }
}

#[async_trait]
impl TempTaskRepository for FlakyRepository {
    async fn add_temp_task(&self, realm_id: Uuid, data: NewTempTask) -> Result<TempTask, CoreError> {
        self.inner.add_temp_task(realm_id, data).await
    }
    async fn find_temp_task_by_id(&self, realm_id: Uuid, id: Uuid) -> Result<Option<TempTask>, CoreError> {
        self.inner.find_temp_task_by_id(realm_id, id).await
    }
    async fn find_temp_tasks(&self, realm_id: Uuid) -> Result<Vec<TempTask>, CoreError> {
        self.inner.find_temp_tasks(realm_id).await
    }
    async fn find_temp_task_page(&self, realm_id: Uuid, query: TempTaskQuery) -> Result<TempTaskPage, CoreError> {
        self.inner.find_temp_task_page(realm_id, query).await
    }
    async fn update_temp_task(&self, realm_id: Uuid, id: Uuid, patch: TempTaskPatch) -> Result<TempTask, CoreError> {
        self.inner.update_temp_task(realm_id, id, patch).await
    }
    async fn delete_temp_task(&self, realm_id: Uuid, id: Uuid) -> Result<(), CoreError> {
        self.inner.delete_temp_task(realm_id, id).await
    }
}

#[async_trait]
impl AuditLog for FlakyRepository {
    async fn log_action(&self, entry: &ActionLog) -> Result<(), CoreError> {
        self.inner.log_action(entry).await
    }
    async fn find_actions(&self, realm_id: Uuid, limit: i64) -> Result<Vec<ActionLogRecord>, CoreError> {
        self.inner.find_actions(realm_id, limit).await
    }
}

impl Repository for FlakyRepository {}

async fn flaky_tracker(temp_dir: &TempDir) -> (Arc<FlakyRepository>, Tracker<FlakyRepository>) {
    let pool = establish_connection(&temp_dir.path().join("flaky.db").to_string_lossy())
        .await
        .unwrap();
    let bus = ChangeBus::new(64);
    let repo = Arc::new(FlakyRepository {
        inner: SqliteRepository::new(pool).with_change_bus(bus.clone()),
        fail_milestone_delete: AtomicBool::new(false),
        fail_milestone_lookup: AtomicBool::new(false),
    });
    let tracker = Tracker::new(repo.clone(), Arc::new(LocalChangeFeed::new(bus, 64)), TrackerOptions::default());
    (repo, tracker)
}

#[tokio::test]
async fn test_failed_cascade_step_reports_partial_delete() {
    let temp_dir = tempfile::tempdir().unwrap();
    let (repo, tracker) = flaky_tracker(&temp_dir).await;
    let ada = realm_with_user(&repo.inner, "Acme", "Ada", UserRole::Admin).await;
    tracker.resolve(Some(ada.clone())).await.unwrap();

    let task = tracker.create_task("Login Flow", TaskCategory::Dev, 1).await.unwrap();
    let build = tracker.add_subtask(task.id, "Build", None).await.unwrap();
    let design = tracker.add_sub_subtask(build.id, "Design", None).await.unwrap();
    tracker
        .add_milestone(MilestoneParent::SubSubtask(design.id), d(2024, 1, 8), "Dev Complete")
        .await
        .unwrap();

    repo.fail_milestone_delete.store(true, Ordering::SeqCst);
    let err = tracker.delete_subtask(build.id).await.unwrap_err();
    match err {
        CoreError::PartialCascade {
            failed,
            total,
            first_error,
        } => {
            // Both milestones fail; the sub-subtask and subtask still go.
            assert_eq!(failed, 2);
            assert_eq!(total, 4);
            assert!(first_error.contains("backend unavailable"));
        }
        other => panic!("expected a partial cascade, got {other:?}"),
    }

    assert!(repo.find_subtask_by_id(ada.realm_id, build.id).await.unwrap().is_none());
    assert!(repo.find_sub_subtask_by_id(ada.realm_id, design.id).await.unwrap().is_none());
    assert_eq!(repo.find_milestones(ada.realm_id).await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_failed_roll_up_still_returns_the_milestone() {
    let temp_dir = tempfile::tempdir().unwrap();
    let (repo, tracker) = flaky_tracker(&temp_dir).await;
    let ada = realm_with_user(&repo.inner, "Acme", "Ada", UserRole::Admin).await;
    tracker.resolve(Some(ada.clone())).await.unwrap();

    let task = tracker.create_task("Login Flow", TaskCategory::Dev, 1).await.unwrap();
    tracker.flush().await.unwrap();
    let planned = tracker.view().find_task(task.id).expect("task in view").subtasks[0]
        .subtask
        .clone();
    let step = tracker.add_sub_subtask(planned.id, "Design", None).await.unwrap();

    repo.fail_milestone_lookup.store(true, Ordering::SeqCst);
    let milestone = tracker
        .add_milestone(MilestoneParent::SubSubtask(step.id), d(2024, 1, 8), "Dev Complete")
        .await
        .unwrap();
    assert_eq!(milestone.sub_subtask_id, Some(step.id));

    // No parent milestone, but the step's own milestone is stored, audited and visible.
    let stored = repo.find_milestones(ada.realm_id).await.unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].id, milestone.id);

    let actions = repo.find_actions(ada.realm_id, 20).await.unwrap();
    assert!(actions.iter().any(|a| a.action_type == ActionType::Create
        && a.entity_type == EntityKind::Milestone
        && a.entity_id == milestone.id));

    tracker.flush().await.unwrap();
    let view = tracker.view();
    let grouped = view.find_task(task.id).expect("task in view");
    assert!(grouped
        .subtasks
        .iter()
        .flat_map(|s| s.sub_subtasks.iter())
        .flat_map(|s| s.milestones.iter())
        .any(|m| m.id == milestone.id));
}
