// tests/loaders.rs

use std::collections::BTreeMap;
use std::sync::Arc;

use etldag::errors::{LoadOperation, TaskError};
use etldag::task::{DedupeKey, Task, TaskContext, TaskKind};
use etldag::types::InsertMode;
use etldag::warehouse::Value;
use etldag_test_utils::builders::*;
use etldag_test_utils::{init_tracing, FakeWarehouse};

fn ctx(task: &str) -> TaskContext {
    TaskContext::new(&run_context(), 1, task.to_string(), 1, BTreeMap::new())
}

fn users_loader(mode: InsertMode, dedupe: Option<DedupeKey>) -> Task {
    let mut spec = load_spec("users", &["userid", "first_name", "last_name"], USERS_SQL, dedupe);
    spec.insert_mode = mode;
    Task::new(LOAD_USERS, TaskKind::LoadDimension(spec))
}

#[tokio::test]
async fn stage_twice_does_not_double_rows() {
    init_tracing();
    let warehouse = Arc::new(sparkify_warehouse());
    let services = services(Arc::clone(&warehouse));
    let task = stage_task(STAGE_EVENTS, "staging_events", "log_data/{year}/{month}", "log_json_path.json");

    task.execute(&ctx(STAGE_EVENTS), &services).await.unwrap();
    let once = warehouse.rows("staging_events");
    task.execute(&ctx(STAGE_EVENTS), &services).await.unwrap();

    assert_eq!(once.len(), 2);
    assert_eq!(warehouse.rows("staging_events"), once);

    let copies = warehouse.statements_matching("^COPY staging_events");
    assert_eq!(copies.len(), 2);
    assert!(copies[0].contains("FROM 's3://udacity-dend/log_data/2020/03'"), "{}", copies[0]);
    assert!(
        copies[0].contains("FORMAT AS JSON 's3://udacity-dend/log_json_path.json'"),
        "{}",
        copies[0]
    );
    assert!(copies[0].contains("REGION 'us-west-2'"));
    assert!(copies[0].contains("TIMEFORMAT AS 'epochmillisecs'"));
}

#[tokio::test]
async fn staging_clears_before_copying() {
    init_tracing();
    let warehouse = Arc::new(sparkify_warehouse());
    warehouse.set_rows("staging_songs", vec![vec![text("stale"), text("old"), text("x")]]);
    let services = services(Arc::clone(&warehouse));

    stage_task(STAGE_SONGS, "staging_songs", "song_data", "auto")
        .execute(&ctx(STAGE_SONGS), &services)
        .await
        .unwrap();

    assert_eq!(warehouse.rows("staging_songs"), vec![vec![text("SOAAA"), text("Song A"), text("ARX")]]);
    let statements = warehouse.statements();
    assert_eq!(statements[0], "DELETE FROM staging_songs");
    assert!(statements[1].contains("FORMAT AS JSON 'auto'"));
}

#[tokio::test]
async fn second_append_with_dedupe_inserts_nothing() {
    init_tracing();
    let warehouse = Arc::new(sparkify_warehouse());
    let services = services(Arc::clone(&warehouse));
    let task = users_loader(InsertMode::Append, Some(DedupeKey::same("userid")));

    task.execute(&ctx(LOAD_USERS), &services).await.unwrap();
    assert_eq!(warehouse.rows("users").len(), 2);

    task.execute(&ctx(LOAD_USERS), &services).await.unwrap();
    assert_eq!(warehouse.rows("users").len(), 2);

    let inserts = warehouse.statements_matching("^INSERT INTO users");
    assert!(inserts[0].ends_with(
        "AS src WHERE src.userid IS NOT NULL AND src.userid NOT IN (SELECT DISTINCT userid FROM users WHERE userid IS NOT NULL)"
    ));
}

#[tokio::test]
async fn null_dedupe_keys_are_never_appended() {
    init_tracing();
    let warehouse = Arc::new(sparkify_warehouse().with_source(
        USERS_SQL,
        &["userid", "firstname", "lastname"],
        vec![
            vec![Value::Null, text("Nobody"), text("Known")],
            vec![Value::Int(7), text("Ada"), text("Lovelace")],
        ],
    ));
    let services = services(Arc::clone(&warehouse));
    let task = users_loader(InsertMode::Append, Some(DedupeKey::same("userid")));

    task.execute(&ctx(LOAD_USERS), &services).await.unwrap();
    let once = warehouse.rows("users");
    task.execute(&ctx(LOAD_USERS), &services).await.unwrap();

    assert_eq!(once, vec![vec![Value::Int(7), text("Ada"), text("Lovelace")]]);
    assert_eq!(warehouse.rows("users"), once);
}

#[tokio::test]
async fn mapped_dedupe_key_compares_source_to_target_column() {
    init_tracing();
    let warehouse = Arc::new(sparkify_warehouse());
    let services = services(Arc::clone(&warehouse));
    let spec = load_spec(
        "songs",
        &["songid", "title"],
        SONGS_SQL,
        Some(DedupeKey::mapped("song_id", "songid")),
    );
    let task = Task::new(LOAD_SONGS, TaskKind::LoadDimension(spec));

    task.execute(&ctx(LOAD_SONGS), &services).await.unwrap();
    task.execute(&ctx(LOAD_SONGS), &services).await.unwrap();

    assert_eq!(warehouse.rows("songs"), vec![vec![text("SOAAA"), text("Song A")]]);
    assert!(warehouse.statements_matching("src.song_id NOT IN \\(SELECT DISTINCT songid FROM songs").len() == 2);
}

#[tokio::test]
async fn delete_and_load_twice_leaves_the_same_contents() {
    init_tracing();
    let warehouse = Arc::new(sparkify_warehouse());
    warehouse.set_rows("users", vec![vec![Value::Int(99), text("Old"), text("Row")]]);
    let services = services(Arc::clone(&warehouse));
    let task = users_loader(InsertMode::DeleteAndLoad, None);

    task.execute(&ctx(LOAD_USERS), &services).await.unwrap();
    let once = warehouse.rows("users");
    task.execute(&ctx(LOAD_USERS), &services).await.unwrap();

    assert_eq!(once.len(), 2);
    assert_eq!(warehouse.rows("users"), once);
    assert_eq!(warehouse.statements_matching("^DELETE FROM users$").len(), 2);
}

#[tokio::test]
async fn unrecognized_mode_appends() {
    init_tracing();
    let warehouse = Arc::new(sparkify_warehouse());
    warehouse.set_rows("users", vec![vec![Value::Int(99), text("Old"), text("Row")]]);
    let services = services(Arc::clone(&warehouse));
    let task = users_loader(InsertMode::parse("upsert"), None);

    let summary = task.execute(&ctx(LOAD_USERS), &services).await.unwrap();

    assert_eq!(warehouse.rows("users").len(), 3);
    assert!(warehouse.statements_matching("^DELETE").is_empty());
    assert!(summary.note.unwrap_or_default().contains("append"));
}

#[tokio::test]
async fn store_failure_is_a_retryable_load_error() {
    init_tracing();
    let warehouse = Arc::new(sparkify_warehouse());
    warehouse.fail_times("^INSERT INTO users", 1, "connection reset");
    let services = services(Arc::clone(&warehouse));

    let err = users_loader(InsertMode::Append, None)
        .execute(&ctx(LOAD_USERS), &services)
        .await
        .unwrap_err();

    match &err {
        TaskError::Load(load) => {
            assert_eq!(load.table, "users");
            assert_eq!(load.operation, LoadOperation::Insert);
        }
        other => panic!("expected a load error, got {other:?}"),
    }
    assert!(err.is_retryable());
}

#[tokio::test]
async fn unknown_credentials_fail_before_any_statement() {
    init_tracing();
    let warehouse = Arc::new(sparkify_warehouse());
    let services = services(Arc::clone(&warehouse));
    let mut task = stage_task(STAGE_SONGS, "staging_songs", "song_data", "auto");
    if let TaskKind::Stage(spec) = &mut task.kind {
        spec.credentials = "missing".to_string();
    }

    let err = task.execute(&ctx(STAGE_SONGS), &services).await.unwrap_err();

    assert!(matches!(err, TaskError::Credential(_)));
    assert!(warehouse.statements().is_empty());
}

#[tokio::test]
async fn unknown_key_placeholder_is_a_template_error() {
    init_tracing();
    let warehouse = Arc::new(sparkify_warehouse());
    let services = services(Arc::clone(&warehouse));
    let task = stage_task(STAGE_SONGS, "staging_songs", "song_data/{region}", "auto");

    let err = task.execute(&ctx(STAGE_SONGS), &services).await.unwrap_err();

    assert!(matches!(err, TaskError::Template(_)));
    assert!(!err.is_retryable());
}
