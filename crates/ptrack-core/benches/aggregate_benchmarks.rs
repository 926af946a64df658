use chrono::{Duration, NaiveDate, Utc};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use ptrack_core::aggregate::{group, Projection};
use ptrack_core::feed::{apply_change, ChangeEvent};
use ptrack_core::models::{Milestone, SubSubtask, Subtask, Task, TaskCategory, User, UserRole};
use ptrack_core::store::{RecordStore, Snapshot, Table};
use uuid::Uuid;

const LABELS: [&str; 4] = ["Dev Complete", "Test Complete", "Release", "Spec Review"];

fn create_snapshot(realm_id: Uuid, tasks: usize) -> Snapshot {
    let mut rng = fastrand::Rng::with_seed(7);
    let now = Utc::now();
    let base = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap_or_default();
    let mut snapshot = Snapshot::default();

    for i in 0..20 {
        snapshot.users.push(User {
            id: Uuid::now_v7(),
            email: format!("user{i}@bench.test"),
            full_name: format!("User {i}"),
            role: UserRole::Engineer,
            realm_id,
            created_at: now,
        });
    }

    let categories = [TaskCategory::Dev, TaskCategory::Test, TaskCategory::Infra, TaskCategory::Support];
    for t in 0..tasks {
        let task = Task {
            id: Uuid::now_v7(),
            name: format!("Task {t}"),
            category: categories[rng.usize(..categories.len())],
            priority: rng.i32(1..=3),
            realm_id,
            created_by: None,
            created_at: now,
            updated_at: now,
        };
        for s in 0..4 {
            let subtask = Subtask {
                id: Uuid::now_v7(),
                task_id: task.id,
                name: if s == 0 { "PLANNED".to_string() } else { format!("Subtask {s}") },
                assigned_to: Some(snapshot.users[rng.usize(..snapshot.users.len())].id),
                realm_id,
                created_by: None,
                created_at: now,
                updated_at: now,
            };
            for label in LABELS {
                snapshot.milestones.push(Milestone {
                    id: Uuid::now_v7(),
                    subtask_id: Some(subtask.id),
                    sub_subtask_id: None,
                    milestone_date: base + Duration::days(rng.i64(0..120)),
                    milestone_text: label.to_string(),
                    created_by: None,
                    realm_id,
                    created_at: now,
                    updated_at: now,
                });
            }
            for o in 0..3 {
                snapshot.sub_subtasks.push(SubSubtask {
                    id: Uuid::now_v7(),
                    subtask_id: subtask.id,
                    name: format!("Step {o}"),
                    assigned_to: None,
                    order_index: o,
                    realm_id,
                    created_by: None,
                    created_at: now,
                    updated_at: now,
                });
            }
            snapshot.subtasks.push(subtask);
        }
        snapshot.tasks.push(task);
    }
    snapshot
}

fn loaded_store(tasks: usize) -> RecordStore {
    let realm_id = Uuid::now_v7();
    let mut store = RecordStore::new();
    store.reset(Some(realm_id));
    store.load(create_snapshot(realm_id, tasks));
    store
}

fn bench_group(c: &mut Criterion) {
    let mut group_bench = c.benchmark_group("group");
    for tasks in [10, 100, 500] {
        let store = loaded_store(tasks);
        group_bench.bench_with_input(BenchmarkId::from_parameter(tasks), &store, |b, store| {
            b.iter(|| group(black_box(store)))
        });
    }
    group_bench.finish();
}

fn bench_actual_rollup(c: &mut Criterion) {
    let store = loaded_store(200);
    let tasks = group(&store);

    c.bench_function("actual_rollup_200_tasks", |b| {
        b.iter(|| {
            tasks
                .iter()
                .map(|t| black_box(t.actual()).iter().count())
                .sum::<usize>()
        })
    });
}

fn bench_projection_memo_hit(c: &mut Criterion) {
    let store = loaded_store(200);
    let mut projection = Projection::new();
    projection.refresh(&store);

    c.bench_function("projection_refresh_unchanged", |b| {
        b.iter(|| projection.refresh(black_box(&store)))
    });
}

fn bench_apply_change(c: &mut Criterion) {
    let mut store = loaded_store(200);
    let realm_id = store.realm_id().unwrap_or_default();
    let now = Utc::now();
    let task = Task {
        id: Uuid::now_v7(),
        name: "Churn".to_string(),
        category: TaskCategory::Dev,
        priority: 3,
        realm_id,
        created_by: None,
        created_at: now,
        updated_at: now,
    };
    let insert = ChangeEvent::insert(Table::Tasks, &task).expect("encode insert");
    let delete = ChangeEvent::delete(Table::Tasks, &task).expect("encode delete");

    c.bench_function("apply_change_insert_delete", |b| {
        b.iter(|| {
            let _ = apply_change(&mut store, black_box(&insert));
            let _ = apply_change(&mut store, black_box(&delete));
        })
    });
}

criterion_group!(
    benches,
    bench_group,
    bench_actual_rollup,
    bench_projection_memo_hit,
    bench_apply_change
);
criterion_main!(benches);
