// tests/pipeline_run.rs

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use etldag::dag::DependencyGraph;
use etldag::errors::StoreError;
use etldag::pipeline::Pipeline;
use etldag::task::{RetryPolicy, Task, TaskKind, TaskServices};
use etldag::warehouse::{Row, StaticCredentialProvider, Value, WarehouseClient};
use etldag_test_utils::builders::*;
use etldag_test_utils::{init_tracing, with_timeout};

fn fast_retry() -> RetryPolicy {
    RetryPolicy::fixed(4, Duration::from_millis(10))
}

#[tokio::test]
async fn full_run_succeeds_and_respects_dependency_order() {
    init_tracing();
    let warehouse = Arc::new(sparkify_warehouse());
    let pipeline = Pipeline::new(sparkify_graph(fast_retry()), services(Arc::clone(&warehouse)))
        .with_workers(2);

    let report = with_timeout(pipeline.run_once(run_context())).await.unwrap();

    assert!(report.is_success(), "{report}");
    assert_eq!(report.succeeded.len(), 10);
    assert_eq!(warehouse.rows("songplays").len(), 2);
    assert_eq!(warehouse.rows("users").len(), 2);

    let statements = warehouse.statements();
    let first = |prefix: &str| statements.iter().position(|s| s.starts_with(prefix)).unwrap();
    let last = |prefix: &str| statements.iter().rposition(|s| s.starts_with(prefix)).unwrap();
    assert!(last("COPY staging_songs") < first("INSERT INTO songplays"));
    assert!(last("COPY staging_events") < first("INSERT INTO songplays"));
    assert!(first("INSERT INTO songplays") < first("INSERT INTO time"));
    assert!(last("INSERT INTO artists") < first("SELECT COUNT(*) FROM songplays"));
}

#[tokio::test]
async fn transient_copy_failure_is_retried() {
    init_tracing();
    let warehouse = Arc::new(sparkify_warehouse());
    warehouse.fail_times("^COPY staging_events", 2, "S3ServiceException: slow down");
    let pipeline = Pipeline::new(sparkify_graph(fast_retry()), services(Arc::clone(&warehouse)));

    let report = with_timeout(pipeline.run_once(run_context())).await.unwrap();

    assert!(report.is_success(), "{report}");
    assert_eq!(report.attempts.get(STAGE_EVENTS), Some(&3));
    assert_eq!(report.attempts.get(STAGE_SONGS), Some(&1));
    // Each attempt starts from an empty staging table.
    assert_eq!(warehouse.rows("staging_events").len(), 2);
}

#[tokio::test]
async fn persistent_failure_exhausts_and_skips_downstream() {
    init_tracing();
    let warehouse = Arc::new(sparkify_warehouse());
    warehouse.fail_always("^INSERT INTO songplays", "disk full");
    let pipeline = Pipeline::new(sparkify_graph(fast_retry()), services(Arc::clone(&warehouse)));

    let report = with_timeout(pipeline.run_once(run_context())).await.unwrap();

    let expected_skipped: BTreeSet<String> =
        [LOAD_USERS, LOAD_SONGS, LOAD_ARTISTS, LOAD_TIME, QUALITY, END]
            .into_iter()
            .map(String::from)
            .collect();
    assert_eq!(report.exhausted, BTreeSet::from([LOAD_SONGPLAYS.to_string()]));
    assert_eq!(report.skipped, expected_skipped);
    assert_eq!(report.attempts.get(LOAD_SONGPLAYS), Some(&4));
    assert!(warehouse.statements_matching("^INSERT INTO users").is_empty());
}

#[tokio::test]
async fn dirty_dimension_fails_the_quality_gate() {
    init_tracing();
    let warehouse = Arc::new(
        sparkify_warehouse().with_query_result(NULL_CHECKS[1].1, vec![vec![Value::Int(2)]]),
    );
    let pipeline = Pipeline::new(sparkify_graph(fast_retry()), services(Arc::clone(&warehouse)));

    let report = with_timeout(pipeline.run_once(run_context())).await.unwrap();

    assert_eq!(report.failed, BTreeSet::from([QUALITY.to_string()]));
    assert_eq!(report.skipped, BTreeSet::from([END.to_string()]));
    let failure = report.first_quality_failure.expect("quality failure recorded");
    assert_eq!(failure.index, 1);
    assert_eq!(failure.observed, vec![Value::Int(2)]);
    // Checks after the failing one never ran.
    assert!(warehouse.statements_matching("FROM artists WHERE").is_empty());
}

#[tokio::test]
async fn abort_during_backoff_fails_the_waiting_task() {
    init_tracing();
    let warehouse = Arc::new(sparkify_warehouse());
    warehouse.fail_always("^COPY staging_songs", "timeout");
    let slow = RetryPolicy::fixed(4, Duration::from_secs(60));
    let pipeline = Pipeline::new(sparkify_graph(slow), services(Arc::clone(&warehouse)));

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(200)).await;
            cancel.cancel();
        });
    }

    let report = with_timeout(pipeline.run_once_with_abort(run_context(), cancel))
        .await
        .unwrap();

    assert!(report.aborted);
    assert!(!report.is_success());
    assert!(report.failed.contains(STAGE_SONGS));
    assert!(report.succeeded.contains(STAGE_EVENTS));
    assert!(report.skipped.contains(LOAD_SONGPLAYS));
    assert!(report.skipped.contains(END));
    assert_eq!(report.attempts.get(STAGE_SONGS), Some(&1));
}

#[tokio::test]
async fn run_ids_increase_between_runs() {
    init_tracing();
    let graph = DependencyGraph::builder()
        .add_task(Task::marker("start"))
        .add_task(Task::marker("end").after("start"))
        .build()
        .unwrap();
    let warehouse = Arc::new(sparkify_warehouse());
    let pipeline = Pipeline::new(graph, services(Arc::clone(&warehouse)));

    let first = with_timeout(pipeline.run_once(run_context())).await.unwrap();
    let second = with_timeout(pipeline.run_once(run_context())).await.unwrap();

    assert!(first.is_success() && second.is_success());
    assert!(second.run_id > first.run_id);
    assert!(warehouse.statements().is_empty());
}

/// Holds every statement for a while and remembers how many overlapped.
#[derive(Debug, Default)]
struct SlowWarehouse {
    in_flight: AtomicUsize,
    peak: AtomicUsize,
    statements: AtomicUsize,
}

#[async_trait]
impl WarehouseClient for SlowWarehouse {
    async fn run(&self, _sql: &str) -> Result<(), StoreError> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(20)).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.statements.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn query(&self, sql: &str) -> Result<Vec<Row>, StoreError> {
        Err(StoreError::new(format!("unexpected query: {sql}")))
    }
}

/// Six independent loaders behind a start marker.
async fn fan_out_peak(workers: usize) -> usize {
    let mut builder = DependencyGraph::builder().add_task(Task::marker("start"));
    for i in 0..6 {
        let table = format!("t{i}");
        let spec = load_spec(&table, &["id"], "SELECT 1", None);
        builder = builder.add_task(Task::new(table, TaskKind::LoadFact(spec)).after("start"));
    }
    let graph = builder.build().unwrap();

    let warehouse = Arc::new(SlowWarehouse::default());
    let services = TaskServices {
        warehouse: Arc::clone(&warehouse) as Arc<dyn WarehouseClient>,
        credentials: Arc::new(StaticCredentialProvider::new()),
    };
    let pipeline = Pipeline::new(graph, services).with_workers(workers);

    let report = with_timeout(pipeline.run_once(run_context())).await.unwrap();

    assert!(report.is_success(), "{report}");
    assert_eq!(warehouse.statements.load(Ordering::SeqCst), 6);
    warehouse.peak.load(Ordering::SeqCst)
}

#[tokio::test]
async fn single_worker_runs_one_task_at_a_time() {
    init_tracing();
    assert_eq!(fan_out_peak(1).await, 1);
}

#[tokio::test]
async fn concurrent_attempts_never_exceed_the_worker_count() {
    init_tracing();
    assert_eq!(fan_out_peak(2).await, 2);
}
