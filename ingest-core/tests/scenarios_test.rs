use std::sync::Arc;

use ingest_core::batch::FakeBatchSubmitter;
use ingest_core::cache::BoundedCache;
use ingest_core::error::SubmitError;
use ingest_core::handler::{BatchHandler, BatchHandlerConfig, FailedEventLog};
use ingest_core::model::{ChannelCallback, DataPoint, DataPointEvent, DataPointValue, RowKey, RowSpec, TagMap};
use ingest_core::publish::IndexEventPublisher;

const ROW_WIDTH_MS: i64 = 1_814_400_000;

fn config() -> BatchHandlerConfig {
    BatchHandlerConfig {
        default_ttl_sec: 60,
        align_ttl_with_timestamp: false,
        force_default_ttl: false,
        write_cluster_name: "main".to_string(),
        row_width_sec: ROW_WIDTH_MS / 1000,
        min_batch_limit: 10,
    }
}

fn temp_log_path(label: &str) -> std::path::PathBuf {
    let path = std::env::temp_dir().join(format!(
        "ingest-core-scenario-{label}-{}-{}",
        std::process::id(),
        label
    ));
    let _ = std::fs::remove_file(&path);
    path
}

fn build_handler(
    submitter: Arc<FakeBatchSubmitter>,
    config: BatchHandlerConfig,
    log_enabled: bool,
    label: &str,
) -> (BatchHandler, Arc<IndexEventPublisher>, std::path::PathBuf) {
    let publisher = Arc::new(IndexEventPublisher::new());
    let log_path = temp_log_path(label);
    let handler = BatchHandler::new(
        config,
        RowSpec::new(ROW_WIDTH_MS),
        Arc::new(BoundedCache::new(10_000)),
        Arc::new(BoundedCache::new(10_000)),
        submitter,
        publisher.clone(),
        Arc::new(FailedEventLog::new(log_path.clone(), log_enabled)),
    );
    (handler, publisher, log_path)
}

fn event_with_tags(name: &str, ts: i64, tags: TagMap) -> DataPointEvent {
    DataPointEvent::new(
        name.to_string(),
        tags,
        DataPoint {
            timestamp_ms: ts,
            value: DataPointValue::Long(1),
        },
        0,
    )
    .unwrap()
}

fn cpu_event(ts: i64) -> DataPointEvent {
    let mut tags = TagMap::new();
    tags.insert("host".to_string(), "web1".to_string());
    event_with_tags("cpu", ts, tags)
}

/// Scenario 1: two events, same metric and tags, same row. One row-key
/// insert, one metric-name insert, one time-index insert, two data-point
/// inserts. Callback fires once, no batch-reduction event.
#[tokio::test]
async fn happy_path_two_events_same_row() {
    let submitter = Arc::new(FakeBatchSubmitter::new());
    let (handler, publisher, _log) = build_handler(submitter.clone(), config(), false, "happy-path");
    let mut reduction_rx = publisher.subscribe_batch_reduction();

    let (callback, rx) = ChannelCallback::new();
    handler
        .handle(vec![cpu_event(1_000_000), cpu_event(1_001_000)], Arc::new(callback))
        .await
        .unwrap();

    rx.await.expect("callback fires exactly once");
    assert_eq!(submitter.call_count(), 1);
    assert_eq!(submitter.submitted_mutation_counts(), vec![5]);
    assert!(reduction_rx.try_recv().is_err(), "no reduction on the happy path");
}

/// Scenario 2: the row key is already cached. Only the data-point insert
/// should be submitted.
#[tokio::test]
async fn cached_row_key_skips_index_writes() {
    let submitter = Arc::new(FakeBatchSubmitter::new());
    let (handler, _publisher, _log) = build_handler(submitter.clone(), config(), false, "cached-row-key");

    let row_spec = RowSpec::new(ROW_WIDTH_MS);
    let row_time = row_spec.row_time(1_000_000);
    let mut tags = TagMap::new();
    tags.insert("host".to_string(), "web1".to_string());
    let row_key = RowKey::new("cpu", "main", row_time, "long", tags);
    handler.row_key_cache().cache_item(row_key);

    let (callback, rx) = ChannelCallback::new();
    handler
        .handle(vec![cpu_event(1_000_000)], Arc::new(callback))
        .await
        .unwrap();

    rx.await.unwrap();
    assert_eq!(submitter.submitted_mutation_counts(), vec![1]);
}

/// Scenario 3: aligned TTL pushes an old event's effective TTL below zero.
/// It must be dropped silently - no submit call at all - but the callback
/// still completes.
#[tokio::test]
async fn aligned_ttl_drops_expired_event() {
    let submitter = Arc::new(FakeBatchSubmitter::new());
    let mut cfg = config();
    cfg.align_ttl_with_timestamp = true;
    let (handler, _publisher, _log) = build_handler(submitter.clone(), cfg, false, "aligned-ttl");
    let handler = handler.with_clock(|| 10_000_000);

    let (callback, rx) = ChannelCallback::new();
    handler
        .handle(vec![cpu_event(10_000_000 - 120_000)], Arc::new(callback))
        .await
        .unwrap();

    rx.await.unwrap();
    assert_eq!(submitter.call_count(), 0, "expired event must never reach submit");
}

/// Scenario 4: the first submit of 1000 events fails as "batch too large".
/// The handler halves the limit to 500, restarts from the beginning, and
/// two sub-batches of 500 succeed. A reduction event carries the new limit.
#[tokio::test]
async fn batch_too_large_halves_limit_and_restarts() {
    let submitter = Arc::new(FakeBatchSubmitter::new());
    submitter.fail_next(vec![SubmitError::BatchTooLarge("batch too large for ks.table".to_string())]);
    let (handler, publisher, _log) = build_handler(submitter.clone(), config(), false, "batch-too-large");
    let mut reduction_rx = publisher.subscribe_batch_reduction();

    let events: Vec<DataPointEvent> = (0..1000).map(|i| cpu_event(1_000_000 + i * 1000)).collect();
    let (callback, rx) = ChannelCallback::new();
    handler.handle(events, Arc::new(callback)).await.unwrap();

    rx.await.unwrap();
    // one failed attempt at limit 1000, then two successful sub-batches at limit 500
    assert_eq!(submitter.call_count(), 3);
    assert_eq!(reduction_rx.recv().await.unwrap().effective_limit, 500);
}

/// Scenario 5: a transport-level failure is rethrown untouched, and the
/// handler does not invoke the callback - the caller's backoff layer owns
/// completion on this path.
#[tokio::test]
async fn transport_failure_propagates_without_completing_callback() {
    let submitter = Arc::new(FakeBatchSubmitter::new());
    submitter.fail_next(vec![SubmitError::Unavailable("no host available".to_string())]);
    let (handler, _publisher, _log) = build_handler(submitter.clone(), config(), false, "transport-failure");

    let (callback, mut rx) = ChannelCallback::new();
    let result = handler
        .handle(vec![cpu_event(1_000_000)], Arc::new(callback))
        .await;

    assert!(result.is_err());
    assert!(rx.try_recv().is_err());
}

/// Scenario 6: five events, submit keeps failing with a generic error, the
/// limit is already at or below `minBatchLimit` so the handler gives up
/// immediately, dumps all five events to the failed-event log (trace
/// logging enabled), and still completes the callback once.
#[tokio::test]
async fn terminal_failure_dumps_events_and_completes_callback() {
    let submitter = Arc::new(FakeBatchSubmitter::new());
    submitter.fail_next(vec![SubmitError::Other("generic backend error".to_string())]);
    let (handler, _publisher, log_path) = build_handler(submitter.clone(), config(), true, "terminal-failure");

    let events: Vec<DataPointEvent> = (0..5).map(|i| cpu_event(1_000_000 + i * 1000)).collect();
    let (callback, rx) = ChannelCallback::new();
    handler.handle(events, Arc::new(callback)).await.unwrap();

    rx.await.unwrap();
    let contents = std::fs::read_to_string(&log_path).unwrap();
    assert_eq!(contents.lines().count(), 5);
    for line in contents.lines() {
        let record: serde_json::Value = serde_json::from_str(line).unwrap();
        assert_eq!(record["name"], "cpu");
        assert_eq!(record["tags"]["host"], "web1");
    }
    let _ = std::fs::remove_file(&log_path);
}
