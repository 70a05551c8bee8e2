use thiserror::Error;

use super::event::TagMap;

#[derive(Error, Debug, PartialEq)]
pub enum RowSpecError {
    #[error("timestamp {ts} is outside row starting at {row_time} with width {width}")]
    TimestampOutsideRow {
        ts: i64,
        row_time: i64,
        width: i64,
    },
}

/// Pure, stateless mapping from a timestamp to a row bucket and an in-row
/// column offset. `row_width_ms` is typically three weeks.
#[derive(Debug, Clone, Copy)]
pub struct RowSpec {
    row_width_ms: i64,
}

impl RowSpec {
    pub fn new(row_width_ms: i64) -> Self {
        assert!(row_width_ms > 0, "row width must be positive");
        Self { row_width_ms }
    }

    pub fn row_width_ms(&self) -> i64 {
        self.row_width_ms
    }

    pub fn row_time(&self, ts_millis: i64) -> i64 {
        ts_millis.div_euclid(self.row_width_ms) * self.row_width_ms
    }

    /// In-row column offset for `ts_millis`, strictly monotonic in `ts_millis`
    /// within one row. The low bit distinguishes "long" values from every
    /// other data type, the way KairosDB's original column-name scheme did,
    /// so two data types at the same timestamp never collide in the same
    /// row's column space.
    pub fn column_name(
        &self,
        row_time: i64,
        ts_millis: i64,
        is_long: bool,
    ) -> Result<i32, RowSpecError> {
        if ts_millis < row_time || ts_millis >= row_time + self.row_width_ms {
            return Err(RowSpecError::TimestampOutsideRow {
                ts: ts_millis,
                row_time,
                width: self.row_width_ms,
            });
        }
        let offset = (ts_millis - row_time) as i32;
        let type_bit = if is_long { 0 } else { 1 };
        Ok((offset << 1) | type_bit)
    }
}

/// Identifies one wide row: (metric name, cluster name, row time, data type
/// tag, ordered tag map). Immutable after construction; equality and hashing
/// use all five fields, with the tag map compared order-insensitively (it's
/// a `BTreeMap`, so iteration order never varies with insertion order).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RowKey {
    pub metric_name: String,
    pub cluster_name: String,
    pub row_time: i64,
    pub data_type: String,
    pub tags: TagMap,
}

impl RowKey {
    pub fn new(
        metric_name: impl Into<String>,
        cluster_name: impl Into<String>,
        row_time: i64,
        data_type: impl Into<String>,
        tags: TagMap,
    ) -> Self {
        Self {
            metric_name: metric_name.into(),
            cluster_name: cluster_name.into(),
            row_time,
            data_type: data_type.into(),
            tags,
        }
    }

    /// Bit-exact wire serialization used as the row-key index blob. Note that
    /// `cluster_name` is deliberately excluded here: it selects which backend
    /// cluster's keyspace the row lands in, it is not stored inside that
    /// cluster's row key bytes.
    ///
    /// `[utf8 metricName][0x00][utf8 dataType][0x00][i64 BE rowTime]
    ///  [sorted tag entries: utf8 key 0x00 utf8 value 0x00][terminator 0x00]`
    pub fn to_wire_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(64 + self.tags.len() * 16);
        buf.extend_from_slice(self.metric_name.as_bytes());
        buf.push(0x00);
        buf.extend_from_slice(self.data_type.as_bytes());
        buf.push(0x00);
        buf.extend_from_slice(&self.row_time.to_be_bytes());
        for (key, value) in &self.tags {
            buf.extend_from_slice(key.as_bytes());
            buf.push(0x00);
            buf.extend_from_slice(value.as_bytes());
            buf.push(0x00);
        }
        buf.push(0x00);
        buf
    }
}

/// (string, rowTime) pair used as the metric-name-index cache key, so a
/// metric name is re-indexed once per row bucket rather than once per event.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TimedString {
    pub name: String,
    pub row_time: i64,
}

impl TimedString {
    pub fn new(name: impl Into<String>, row_time: i64) -> Self {
        Self {
            name: name.into(),
            row_time,
        }
    }
}
