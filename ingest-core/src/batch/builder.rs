use std::collections::HashSet;

use thiserror::Error;
use tracing::warn;

use crate::model::{DataPointValue, RowKey, TimedString};

#[derive(Error, Debug, PartialEq)]
pub enum BuilderError {
    #[error("ttl must be non-negative, got {0}")]
    NegativeTtl(i64),
}

pub struct RowKeyInsert {
    pub row_key: RowKey,
    pub ttl_sec: i64,
}

pub struct MetricNameInsert {
    pub timed_name: TimedString,
}

pub struct TimeIndexInsert {
    pub metric_name: String,
    pub row_time: i64,
    pub ttl_sec: i64,
}

pub struct DataPointInsert {
    pub row_key: RowKey,
    pub column_name: i32,
    pub value: DataPointValue,
    pub ttl_sec: i64,
}

/// Accumulates the four mutation kinds for one submission, plus the set of
/// row keys and metric names newly introduced this batch so a failed
/// `submit` can be rolled back out of the shared caches. `submit` is meant to
/// be called once; on failure the same instance is still readable via
/// `new_row_keys` / `new_metrics` so the caller can undo the cache
/// insertions before discarding it.
#[derive(Default)]
pub struct CqlBatch {
    row_key_inserts: Vec<RowKeyInsert>,
    metric_name_inserts: Vec<MetricNameInsert>,
    time_index_inserts: Vec<TimeIndexInsert>,
    data_point_inserts: Vec<DataPointInsert>,
    new_row_keys: HashSet<RowKey>,
    new_metrics: HashSet<TimedString>,
}

impl CqlBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_row_key(&mut self, row_key: RowKey, ttl_sec: i64) -> Result<(), BuilderError> {
        if ttl_sec < 0 {
            return Err(BuilderError::NegativeTtl(ttl_sec));
        }
        self.new_row_keys.insert(row_key.clone());
        self.row_key_inserts.push(RowKeyInsert { row_key, ttl_sec });
        Ok(())
    }

    /// An empty metric name is not rejected here - the per-event algorithm
    /// already warned when it first saw one. Enforcing it again at this
    /// layer would just duplicate that warning for every row-time bucket.
    pub fn add_metric_name(&mut self, timed_name: TimedString) {
        if timed_name.name.is_empty() {
            warn!("indexing empty metric name at row_time {}", timed_name.row_time);
        }
        self.new_metrics.insert(timed_name.clone());
        self.metric_name_inserts.push(MetricNameInsert { timed_name });
    }

    pub fn add_time_index(&mut self, metric_name: impl Into<String>, row_time: i64, ttl_sec: i64) {
        self.time_index_inserts.push(TimeIndexInsert {
            metric_name: metric_name.into(),
            row_time,
            ttl_sec,
        });
    }

    pub fn add_data_point(
        &mut self,
        row_key: RowKey,
        column_name: i32,
        value: DataPointValue,
        ttl_sec: i64,
    ) -> Result<(), BuilderError> {
        if ttl_sec < 0 {
            return Err(BuilderError::NegativeTtl(ttl_sec));
        }
        self.data_point_inserts.push(DataPointInsert {
            row_key,
            column_name,
            value,
            ttl_sec,
        });
        Ok(())
    }

    pub fn row_key_inserts(&self) -> &[RowKeyInsert] {
        &self.row_key_inserts
    }

    pub fn metric_name_inserts(&self) -> &[MetricNameInsert] {
        &self.metric_name_inserts
    }

    pub fn time_index_inserts(&self) -> &[TimeIndexInsert] {
        &self.time_index_inserts
    }

    pub fn data_point_inserts(&self) -> &[DataPointInsert] {
        &self.data_point_inserts
    }

    /// Row keys newly introduced by this batch - the handler removes these
    /// from the row-key cache if `submit` fails.
    pub fn new_row_keys(&self) -> impl Iterator<Item = &RowKey> {
        self.new_row_keys.iter()
    }

    /// Metric-name/row-time pairs newly introduced by this batch - the
    /// handler removes these from the metric-name cache if `submit` fails.
    pub fn new_metrics(&self) -> impl Iterator<Item = &TimedString> {
        self.new_metrics.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.row_key_inserts.is_empty()
            && self.metric_name_inserts.is_empty()
            && self.time_index_inserts.is_empty()
            && self.data_point_inserts.is_empty()
    }

    pub fn mutation_count(&self) -> usize {
        self.row_key_inserts.len()
            + self.metric_name_inserts.len()
            + self.time_index_inserts.len()
            + self.data_point_inserts.len()
    }
}
