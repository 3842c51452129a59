mod support;

use std::time::{Duration, Instant};

use rstest::rstest;
use taskhub_core::SyncTask;
use taskhub_sync::{
    plan_sync_task, run_all, run_sync_task, RetryPolicy, SyncError, SyncOptions,
};

use support::{issue, issues, Call, FakeSource, FakeStorage};

fn options() -> SyncOptions {
    SyncOptions {
        parallelism: 1,
        dry_run: false,
        retry: RetryPolicy::immediate(3),
        commit_cooldown: Duration::ZERO,
    }
}

fn task(container: &str, query: &str) -> SyncTask {
    SyncTask::new(container, query)
}

// ---------------------------------------------------------------------------
// run_sync_task
// ---------------------------------------------------------------------------

#[test]
fn creates_missing_items_in_new_container() {
    let source = FakeSource::new().with("is:open", issues(&["Fix bug"]));
    let storage = FakeStorage::new();

    let report = run_sync_task(&task("Work", "is:open"), &source, &storage, &options())
        .expect("sync");

    assert_eq!(report.created, 1);
    assert_eq!(report.removed, 0);
    assert_eq!(storage.titles("Work"), vec!["Fix bug"]);
    assert_eq!(
        storage.calls(),
        vec![
            Call::Ensure("Work".into()),
            Call::List("Work".into()),
            Call::Create("Work".into(), "Fix bug".into()),
            Call::Commit("is:open".into()),
        ]
    );
}

#[test]
fn empty_search_drains_container() {
    let source = FakeSource::new();
    let storage = FakeStorage::new().seeded("Work", issues(&["Stale"]));

    let report = run_sync_task(&task("Work", "q"), &source, &storage, &options()).expect("sync");

    assert_eq!(report.removed, 1);
    assert_eq!(report.removed_titles, vec!["Stale"]);
    assert!(storage.items("Work").is_empty());
}

#[test]
fn deletes_run_before_creates() {
    let source = FakeSource::new().with("q", issues(&["New"]));
    let storage = FakeStorage::new().seeded("Work", issues(&["Old"]));

    run_sync_task(&task("Work", "q"), &source, &storage, &options()).expect("sync");

    assert_eq!(
        storage.write_calls(),
        vec![
            Call::Delete("Work".into(), "Old".into()),
            Call::Create("Work".into(), "New".into()),
            Call::Commit("q".into()),
        ]
    );
}

#[test]
fn second_run_converges_to_no_writes() {
    let source = FakeSource::new().with("q", issues(&["A", "B", "C"]));
    let storage = FakeStorage::new().seeded("Work", issues(&["B", "Z"]));

    run_sync_task(&task("Work", "q"), &source, &storage, &options()).expect("first sync");
    assert_eq!(storage.titles("Work"), vec!["A", "B", "C"]);

    let writes_before = storage.write_calls().len();
    let report = run_sync_task(&task("Work", "q"), &source, &storage, &options())
        .expect("second sync");

    assert_eq!((report.created, report.removed), (0, 0));
    // Only the commit is added on a no-op run.
    assert_eq!(storage.write_calls().len(), writes_before + 1);
}

#[test]
fn title_only_storage_ignores_url_drift() {
    let moved = taskhub_core::Issue::new("A", "https://moved.example", "acme/repo");
    let source = FakeSource::new().with("q", vec![moved].into());
    let storage = FakeStorage::new().title_only().seeded("Work", issues(&["A"]));

    let report = run_sync_task(&task("Work", "q"), &source, &storage, &options()).expect("sync");

    assert_eq!((report.created, report.removed), (0, 0));
}

#[test]
fn full_comparison_replaces_item_with_changed_url() {
    let moved = taskhub_core::Issue::new("A", "https://moved.example", "acme/repo");
    let source = FakeSource::new().with("q", vec![moved.clone()].into());
    let storage = FakeStorage::new().seeded("Work", issues(&["A"]));

    let report = run_sync_task(&task("Work", "q"), &source, &storage, &options()).expect("sync");

    assert_eq!((report.created, report.removed), (1, 1));
    assert_eq!(storage.items("Work").as_slice(), &[moved]);
}

#[test]
fn dry_run_reports_plan_without_writing() {
    let source = FakeSource::new().with("q", issues(&["New"]));
    let storage = FakeStorage::new().seeded("Work", issues(&["Old"]));
    let opts = SyncOptions {
        dry_run: true,
        ..options()
    };

    let report = run_sync_task(&task("Work", "q"), &source, &storage, &opts).expect("dry run");

    assert!(report.dry_run);
    assert_eq!(report.created_titles, vec!["New"]);
    assert_eq!(report.removed_titles, vec!["Old"]);
    assert!(storage.write_calls().is_empty());
    assert_eq!(storage.titles("Work"), vec!["Old"]);
}

#[test]
fn plan_reports_counts_and_granularity() {
    let source = FakeSource::new().with("q", issues(&["A", "B"]));
    let storage = FakeStorage::new().title_only().seeded("Work", issues(&["B", "C"]));

    let plan = plan_sync_task(&task("Work", "q"), &source, &storage, &RetryPolicy::none())
        .expect("plan");

    assert_eq!(plan.fetched, 2);
    assert_eq!(plan.existing, 2);
    assert!(plan.title_only);
    assert_eq!(plan.plan.to_create.titles(), vec!["A"]);
    assert_eq!(plan.plan.to_delete.titles(), vec!["C"]);
}

// ---------------------------------------------------------------------------
// Failures
// ---------------------------------------------------------------------------

#[test]
fn rate_limited_search_is_retried() {
    let source = FakeSource::new()
        .with("q", issues(&["A"]))
        .rate_limited_for(2);
    let storage = FakeStorage::new();

    let report = run_sync_task(&task("Work", "q"), &source, &storage, &options()).expect("sync");

    assert_eq!(report.created, 1);
    assert_eq!(source.search_count(), 3);
}

#[test]
fn sustained_rate_limit_fails_without_touching_storage() {
    let source = FakeSource::new().rate_limited_for(10);
    let storage = FakeStorage::new();

    let err = run_sync_task(&task("Work", "q"), &source, &storage, &options())
        .expect_err("should fail");

    assert!(matches!(err, SyncError::Search { .. }), "{err}");
    assert_eq!(source.search_count(), 3);
    assert!(storage.calls().is_empty());
}

#[test]
fn auth_failure_is_not_retried() {
    let source = FakeSource::new().failing("q");
    let storage = FakeStorage::new();

    let err = run_sync_task(&task("Work", "q"), &source, &storage, &options())
        .expect_err("should fail");

    assert!(matches!(err, SyncError::Search { .. }));
    assert_eq!(source.search_count(), 1);
}

#[test]
fn failed_create_keeps_earlier_writes_and_skips_commit() {
    let source = FakeSource::new().with("q", issues(&["A", "B", "C"]));
    let storage = FakeStorage::new()
        .seeded("Work", issues(&["Old"]))
        .failing_after_creates(1);

    let err = run_sync_task(&task("Work", "q"), &source, &storage, &options())
        .expect_err("should fail");

    match &err {
        SyncError::Storage { step, container, .. } => {
            assert_eq!(*step, "create");
            assert_eq!(container, "Work");
        }
        other => panic!("expected storage error, got {other:?}"),
    }
    // The delete and the first create stay applied.
    let items = storage.items("Work");
    assert!(items.get("Old").is_none());
    assert_eq!(items.len(), 1);
    assert!(!storage
        .write_calls()
        .iter()
        .any(|c| matches!(c, Call::Commit(_))));
}

#[test]
fn commit_failure_waits_out_cooldown() {
    let source = FakeSource::new().with("q", issues(&["A"]));
    let storage = FakeStorage::new().failing_commit();
    let opts = SyncOptions {
        commit_cooldown: Duration::from_millis(50),
        ..options()
    };

    let started = Instant::now();
    let err = run_sync_task(&task("Work", "q"), &source, &storage, &opts)
        .expect_err("should fail");

    assert!(matches!(err, SyncError::Commit { .. }), "{err}");
    assert!(started.elapsed() >= Duration::from_millis(50));
    // Writes before the commit are not rolled back.
    assert_eq!(storage.titles("Work"), vec!["A"]);
}

// ---------------------------------------------------------------------------
// run_all
// ---------------------------------------------------------------------------

#[rstest]
#[case::sequential(1)]
#[case::parallel(4)]
fn one_failing_task_does_not_stop_the_others(#[case] parallelism: usize) {
    let source = FakeSource::new()
        .with("q-a", issues(&["A"]))
        .with("q-c", issues(&["C"]))
        .failing("q-b");
    let storage = FakeStorage::new();
    let tasks = vec![task("a", "q-a"), task("b", "q-b"), task("c", "q-c")];
    let opts = SyncOptions {
        parallelism,
        ..options()
    };

    let outcomes = run_all(&tasks, &source, &storage, &opts);

    assert_eq!(outcomes.len(), 3);
    let names: Vec<_> = outcomes.iter().map(|o| o.task.container.0.as_str()).collect();
    assert_eq!(names, vec!["a", "b", "c"]);
    assert!(outcomes[0].is_ok());
    assert!(!outcomes[1].is_ok());
    assert!(outcomes[2].is_ok());
    assert_eq!(storage.titles("a"), vec!["A"]);
    assert_eq!(storage.titles("c"), vec!["C"]);
}

#[test]
fn storage_failure_is_isolated_to_its_container() {
    let source = FakeSource::new()
        .with("q1", issues(&["one"]))
        .with("q2", issues(&["two"]));
    let storage = FakeStorage::new().failing_list_for("broken");
    let tasks = vec![task("broken", "q1"), task("fine", "q2")];

    let outcomes = run_all(&tasks, &source, &storage, &options());

    let err = outcomes[0].result.as_ref().expect_err("broken fails");
    assert_eq!(err.container(), "broken");
    assert!(outcomes[1].is_ok());
    assert_eq!(storage.titles("fine"), vec!["two"]);
}

#[test]
fn parallel_run_overlaps_searches() {
    let source = FakeSource::new().with_delay(Duration::from_millis(100));
    let storage = FakeStorage::new();
    let tasks: Vec<_> = (0..4).map(|i| task(&format!("c{i}"), &format!("q{i}"))).collect();
    let opts = SyncOptions {
        parallelism: 4,
        ..options()
    };

    let outcomes = run_all(&tasks, &source, &storage, &opts);

    assert!(outcomes.iter().all(|o| o.is_ok()));
    assert!(source.peak_concurrency() > 1);
}

#[test]
fn sequential_run_never_overlaps() {
    let source = FakeSource::new().with_delay(Duration::from_millis(10));
    let storage = FakeStorage::new();
    let tasks: Vec<_> = (0..3).map(|i| task(&format!("c{i}"), &format!("q{i}"))).collect();

    run_all(&tasks, &source, &storage, &options());

    assert_eq!(source.peak_concurrency(), 1);
}

#[test]
fn empty_task_list_is_a_noop() {
    let source = FakeSource::new();
    let storage = FakeStorage::new();

    assert!(run_all(&[], &source, &storage, &options()).is_empty());
    assert_eq!(source.search_count(), 0);
}

#[test]
fn report_serializes_for_the_daemon() {
    let source = FakeSource::new().with("q", vec![issue("A")].into());
    let storage = FakeStorage::new();

    let report = run_sync_task(&task("Work", "q"), &source, &storage, &options()).expect("sync");
    let json = serde_json::to_value(&report).expect("serialize");

    assert_eq!(json["container"], "Work");
    assert_eq!(json["created"], 1);
    assert_eq!(json["created_titles"][0], "A");
}
