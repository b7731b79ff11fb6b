// SQLite activity store against a database file in a temp directory
#![cfg(feature = "database")]

use chrono::{Duration, TimeZone, Utc};
use std::sync::Arc;
use tempfile::TempDir;
use uuid::Uuid;

use docflow::config::DatabaseConfig;
use docflow::store::{ActivityFilter, ActivityPatch, ActivityQuery};
use docflow::workflow::WorkflowLog;
use docflow::{
    Activity, ActivityKind, ActivityStatus, ActivityStore, CycleOutcome, DocflowConfig,
    Scheduler, SqliteActivityStore, StoreError, Workflow,
};

mod fixtures;

async fn open(dir: &TempDir) -> SqliteActivityStore {
    let config = DatabaseConfig {
        url: format!("sqlite://{}", dir.path().join("nested/docflow.db").display()),
        max_connections: 1,
    };
    SqliteActivityStore::connect(&config).await.unwrap()
}

#[tokio::test]
async fn test_connect_creates_database_and_parent_directory() {
    let dir = tempfile::tempdir().unwrap();
    let store = open(&dir).await;
    assert!(dir.path().join("nested/docflow.db").exists());
    assert!(store.query(&ActivityQuery::default()).await.unwrap().is_empty());
    store.close().await;
}

#[tokio::test]
async fn test_activity_round_trips_with_parameters_and_timestamps() {
    let dir = tempfile::tempdir().unwrap();
    let store = open(&dir).await;
    let at = Utc.with_ymd_and_hms(2024, 5, 1, 9, 30, 0).unwrap();

    let mut activity = Activity::new(Uuid::new_v4(), ActivityKind::FormatConversion, 2)
        .with_parameter("FileUrl", "https://files/doc.docx")
        .with_status(ActivityStatus::Completed);
    activity.started_at = Some(at);
    activity.ended_at = Some(at + Duration::milliseconds(1500));
    store.insert(&activity).await.unwrap();

    let loaded = store.get(activity.id).await.unwrap().unwrap();
    assert_eq!(loaded, activity);
    assert!(matches!(
        store.insert(&activity).await,
        Err(StoreError::Duplicate(id)) if id == activity.id
    ));
    assert!(store.get(Uuid::new_v4()).await.unwrap().is_none());
}

#[tokio::test]
async fn test_unknown_kind_survives_storage_verbatim() {
    let dir = tempfile::tempdir().unwrap();
    let store = open(&dir).await;
    let activity = Activity::new(Uuid::new_v4(), ActivityKind::parse("Send Email"), 0);
    store.insert(&activity).await.unwrap();

    let loaded = store.get(activity.id).await.unwrap().unwrap();
    assert_eq!(loaded.kind, ActivityKind::Unrecognized("Send Email".to_string()));
}

#[tokio::test]
async fn test_query_sorts_by_order_then_insertion_and_limits() {
    let dir = tempfile::tempdir().unwrap();
    let store = open(&dir).await;
    let (w1, w2) = (Uuid::new_v4(), Uuid::new_v4());
    let late = Activity::new(w1, ActivityKind::End, 9);
    let tie_first = Activity::new(w1, ActivityKind::QualityCheck, 3);
    let tie_second = Activity::new(w2, ActivityKind::QualityCheck, 3);
    let done = Activity::new(w2, ActivityKind::Start, 0).with_status(ActivityStatus::Completed);
    for activity in [&late, &tie_first, &tie_second, &done] {
        store.insert(activity).await.unwrap();
    }

    let pending = ActivityQuery::new(ActivityFilter::default().status(ActivityStatus::Pending));
    let ids: Vec<Uuid> = store
        .query(&pending.clone().ascending())
        .await
        .unwrap()
        .iter()
        .map(|a| a.id)
        .collect();
    assert_eq!(ids, vec![tie_first.id, tie_second.id, late.id]);

    let first = store.query(&pending.clone().ascending().limit(1)).await.unwrap();
    assert_eq!(first[0].id, tie_first.id);

    let newest = store.query(&pending.descending().limit(1)).await.unwrap();
    assert_eq!(newest[0].id, late.id);

    let by_kind = store
        .query(
            &ActivityQuery::new(ActivityFilter::default().kind(ActivityKind::QualityCheck))
                .ascending()
                .limit(1),
        )
        .await
        .unwrap();
    assert_eq!(by_kind.len(), 1);
    assert_eq!(by_kind[0].id, tie_first.id);
}

#[tokio::test]
async fn test_conditional_update_touches_only_matching_rows() {
    let dir = tempfile::tempdir().unwrap();
    let store = open(&dir).await;
    let activity = Activity::new(Uuid::new_v4(), ActivityKind::QualityCheck, 1)
        .with_parameter("FileUrl", "https://files/doc.docx");
    store.insert(&activity).await.unwrap();

    let claim = ActivityFilter::by_id(activity.id).status(ActivityStatus::Pending);
    let patch = ActivityPatch::status(ActivityStatus::Processing).started_at(Utc::now());
    assert_eq!(store.update_where(&claim, &patch).await.unwrap(), 1);
    assert_eq!(store.update_where(&claim, &patch).await.unwrap(), 0);

    let mut merged = docflow::workflow::Parameters::new();
    merged.insert("WordCount".to_string(), "120".to_string());
    let finish = ActivityPatch::status(ActivityStatus::Completed)
        .ended_at(Utc::now())
        .merge_parameters(merged);
    store
        .update_where(&ActivityFilter::by_id(activity.id), &finish)
        .await
        .unwrap();

    let loaded = store.get(activity.id).await.unwrap().unwrap();
    assert_eq!(loaded.status, ActivityStatus::Completed);
    assert_eq!(loaded.parameter("FileUrl"), Some("https://files/doc.docx"));
    assert_eq!(loaded.parameter("WordCount"), Some("120"));
    assert!(loaded.started_at.is_some() && loaded.ended_at.is_some());
}

#[tokio::test]
async fn test_replace_missing_activity_is_not_found() {
    let dir = tempfile::tempdir().unwrap();
    let store = open(&dir).await;
    let activity = Activity::new(Uuid::new_v4(), ActivityKind::Start, 0);
    assert!(matches!(
        store.replace(&activity).await,
        Err(StoreError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_workflows_and_journal_persist() {
    let dir = tempfile::tempdir().unwrap();
    let store = open(&dir).await;
    let now = Utc::now();
    let workflow = Workflow::new("Journal 7", now);
    store.insert_workflow(&workflow).await.unwrap();

    let activity = Activity::new(workflow.id, ActivityKind::Start, 0);
    let first = WorkflowLog::for_activity(&activity, "Processing", "started", now);
    let second = WorkflowLog::for_workflow(
        workflow.id,
        "Finished",
        "done",
        now + Duration::seconds(1),
    );
    store.append_log(&second).await.unwrap();
    store.append_log(&first).await.unwrap();

    let workflows = store.workflows().await.unwrap();
    assert_eq!(workflows.len(), 1);
    assert_eq!(workflows[0].name, "Journal 7");

    let journal = store.logs(workflow.id).await.unwrap();
    assert_eq!(journal.len(), 2);
    assert_eq!(journal[0].activity_id, Some(activity.id));
    assert_eq!(journal[1].status, "Finished");
    assert!(store.logs(Uuid::new_v4()).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_scheduler_drains_marker_workflow_over_sqlite() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(open(&dir).await);
    let workflow = Uuid::new_v4();
    let start = Activity::new(workflow, ActivityKind::Start, 0).with_parameter("FileUrl", "u");
    let end = Activity::new(workflow, ActivityKind::End, 1);
    store.insert(&start).await.unwrap();
    store.insert(&end).await.unwrap();

    let harness = fixtures::Harness::new(fixtures::StubFetcher::default());
    let mut services = harness.services();
    services.store = store.clone();
    let scheduler = Scheduler::new(services, &DocflowConfig::default()).unwrap();

    assert_eq!(
        scheduler.drain(10).await,
        vec![
            CycleOutcome::Completed { id: start.id },
            CycleOutcome::Completed { id: end.id },
            CycleOutcome::Idle,
        ]
    );
    let finished = store.get(end.id).await.unwrap().unwrap();
    assert_eq!(finished.status, ActivityStatus::Completed);
    assert_eq!(finished.parameter("FileUrl"), Some("u"));
}
