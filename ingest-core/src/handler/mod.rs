pub mod failed_log;

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use thiserror::Error;
use tracing::{error, info, warn};

use crate::batch::{BatchSubmitter, CqlBatch};
use crate::cache::BoundedCache;
use crate::error::SubmitError;
use crate::model::{DataPointEvent, EventCompletionCallback, RowKey, RowSpec, TimedString};
use crate::publish::{BatchReductionEvent, IndexEventPublisher, RowKeyEvent};

pub use failed_log::FailedEventLog;

#[derive(Debug, Clone)]
pub struct BatchHandlerConfig {
    pub default_ttl_sec: i64,
    pub align_ttl_with_timestamp: bool,
    pub force_default_ttl: bool,
    pub write_cluster_name: String,
    pub row_width_sec: i64,
    pub min_batch_limit: usize,
}

#[derive(Error, Debug)]
pub enum HandlerError {
    /// Transport-level unavailability. The handler's caller owns completing
    /// the callback in this branch - its own backoff layer retries the
    /// whole call once the outage clears.
    #[error("transport failure submitting batch: {0}")]
    Transport(SubmitError),

    /// A programming error (timestamp outside its row, a negative TTL that
    /// slipped past construction-time validation). The callback still
    /// completes - the upstream queue must advance regardless - but the
    /// call is reported as failed.
    #[error("internal error: {0}")]
    Internal(String),
}

impl HandlerError {
    fn internal(err: impl std::fmt::Display) -> Self {
        HandlerError::Internal(err.to_string())
    }
}

enum RunOutcome {
    Completed,
    TerminalDump,
}

fn system_now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock before unix epoch")
        .as_millis() as i64
}

/// The adaptive batch-size retry loop. One instance is shared by every
/// worker task that drains the ingress adapter; the two caches and the
/// publisher are shared across instances too (see `AppContext`), so
/// `cache_item` winners/losers are coordinated across concurrently running
/// handler calls.
pub struct BatchHandler {
    config: BatchHandlerConfig,
    row_spec: RowSpec,
    row_key_cache: Arc<BoundedCache<RowKey>>,
    metric_name_cache: Arc<BoundedCache<TimedString>>,
    submitter: Arc<dyn BatchSubmitter>,
    publisher: Arc<IndexEventPublisher>,
    failed_event_log: Arc<FailedEventLog>,
    clock: Arc<dyn Fn() -> i64 + Send + Sync>,
}

impl BatchHandler {
    pub fn new(
        config: BatchHandlerConfig,
        row_spec: RowSpec,
        row_key_cache: Arc<BoundedCache<RowKey>>,
        metric_name_cache: Arc<BoundedCache<TimedString>>,
        submitter: Arc<dyn BatchSubmitter>,
        publisher: Arc<IndexEventPublisher>,
        failed_event_log: Arc<FailedEventLog>,
    ) -> Self {
        Self {
            config,
            row_spec,
            row_key_cache,
            metric_name_cache,
            submitter,
            publisher,
            failed_event_log,
            clock: Arc::new(system_now_millis),
        }
    }

    /// Test-only hook so the "aligned TTL drops an expired event" scenario
    /// doesn't race the real clock. Not `#[cfg(test)]`-gated since the
    /// scenario tests under `tests/` need it from outside the crate.
    pub fn with_clock(mut self, clock: impl Fn() -> i64 + Send + Sync + 'static) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    pub fn row_key_cache(&self) -> &BoundedCache<RowKey> {
        &self.row_key_cache
    }

    pub fn metric_name_cache(&self) -> &BoundedCache<TimedString> {
        &self.metric_name_cache
    }

    pub fn failed_event_log(&self) -> &FailedEventLog {
        &self.failed_event_log
    }

    /// Runs the retry loop for `events` and invokes `callback.complete()`
    /// exactly once, except when a transport-level failure is rethrown - in
    /// that branch the caller's own backoff/retry layer owns completion.
    pub async fn handle(
        &self,
        events: Vec<DataPointEvent>,
        callback: Arc<dyn EventCompletionCallback>,
    ) -> Result<(), HandlerError> {
        match self.run(events).await {
            Ok(RunOutcome::Completed) | Ok(RunOutcome::TerminalDump) => {
                callback.complete();
                Ok(())
            }
            Err(err @ HandlerError::Internal(_)) => {
                callback.complete();
                Err(err)
            }
            Err(err @ HandlerError::Transport(_)) => Err(err),
        }
    }

    async fn run(&self, events: Vec<DataPointEvent>) -> Result<RunOutcome, HandlerError> {
        let total = events.len();
        if total == 0 {
            return Ok(RunOutcome::Completed);
        }

        let mut divisor: usize = 1;
        let mut limit = total;

        loop {
            let now_millis = (self.clock)();
            let mut iter = events.iter();
            let mut failure: Option<SubmitError> = None;

            loop {
                let chunk: Vec<&DataPointEvent> = iter.by_ref().take(limit).collect();
                if chunk.is_empty() {
                    break;
                }

                let mut batch = CqlBatch::new();
                for event in &chunk {
                    self.prepare_event(event, &mut batch, now_millis)?;
                }

                if batch.is_empty() {
                    continue;
                }

                if let Err(err) = self.submitter.submit(&batch).await {
                    self.rollback(&batch);
                    match &err {
                        SubmitError::Unavailable(msg) => {
                            warn!(error = %msg, "backend unavailable submitting batch, rethrowing to caller");
                            return Err(HandlerError::Transport(err));
                        }
                        SubmitError::BatchTooLarge(msg) => {
                            warn!(error = %msg, limit, "batch too large, will retry with a smaller limit");
                        }
                        SubmitError::Other(msg) => {
                            error!(error = %msg, limit, "batch submit failed");
                        }
                    }
                    failure = Some(err);
                    break;
                }
            }

            let outcome = match failure {
                None => RunOutcome::Completed,
                Some(_) => {
                    if limit > self.config.min_batch_limit {
                        divisor += 1;
                        limit = (total / divisor).max(1);
                        info!(new_limit = limit, divisor, "restarting from the beginning of the event list");
                        continue;
                    }
                    warn!(total, limit, "batch limit exhausted, dumping events to the failed event log");
                    self.failed_event_log.dump(&events);
                    RunOutcome::TerminalDump
                }
            };

            if limit < total {
                info!(effective_limit = limit, initial = total, "batch limit was reduced to complete this call");
                self.publisher
                    .publish_batch_reduction(BatchReductionEvent { effective_limit: limit });
            }
            return Ok(outcome);
        }
    }

    /// Implements the per-event algorithm: TTL resolution, expiry check, row
    /// key derivation, cache-gated index mutations, and the data-point
    /// insert itself. Returns once the event has either been folded into
    /// `batch` or silently skipped as expired-on-arrival.
    fn prepare_event(
        &self,
        event: &DataPointEvent,
        batch: &mut CqlBatch,
        now_millis: i64,
    ) -> Result<(), HandlerError> {
        let mut ttl = if self.config.force_default_ttl {
            self.config.default_ttl_sec
        } else {
            event.ttl_sec
        };
        if ttl == 0 {
            ttl = self.config.default_ttl_sec;
        }

        if self.config.align_ttl_with_timestamp {
            let age_sec = (now_millis - event.data_point.timestamp_ms) / 1000;
            ttl -= age_sec;
            if ttl <= 0 {
                warn!(
                    metric = %event.metric_name,
                    timestamp = event.data_point.timestamp_ms,
                    "event already expired relative to its timestamp, skipping"
                );
                return Ok(());
            }
        }

        let row_time = self.row_spec.row_time(event.data_point.timestamp_ms);
        let row_key = RowKey::new(
            event.metric_name.clone(),
            self.config.write_cluster_name.clone(),
            row_time,
            event.data_point.value.data_store_type(),
            event.tags.clone(),
        );

        if self.row_key_cache.cache_item(row_key.clone()).is_none() {
            let row_key_ttl = if ttl == 0 { 0 } else { ttl + self.config.row_width_sec };
            batch
                .add_row_key(row_key.clone(), row_key_ttl)
                .map_err(HandlerError::internal)?;
            self.publisher.publish_row_key(RowKeyEvent {
                metric_name: event.metric_name.clone(),
                row_key: row_key.clone(),
                ttl_sec: row_key_ttl,
            });

            let timed_name = TimedString::new(event.metric_name.clone(), row_time);
            if self.metric_name_cache.cache_item(timed_name.clone()).is_none() {
                batch.add_metric_name(timed_name);
                batch.add_time_index(event.metric_name.clone(), row_time, row_key_ttl);
            }
        }

        let column_time = self
            .row_spec
            .column_name(row_time, event.data_point.timestamp_ms, event.data_point.value.is_long())
            .map_err(HandlerError::internal)?;
        batch
            .add_data_point(row_key, column_time, event.data_point.value.clone(), ttl)
            .map_err(HandlerError::internal)?;

        Ok(())
    }

    fn rollback(&self, batch: &CqlBatch) {
        for row_key in batch.new_row_keys() {
            self.row_key_cache.remove_key(row_key);
        }
        for timed_name in batch.new_metrics() {
            self.metric_name_cache.remove_key(timed_name);
        }
    }
}
