use std::collections::BTreeMap;

use thiserror::Error;

/// Tag name -> tag value, lexicographically ordered and immutable once built.
pub type TagMap = BTreeMap<String, String>;

/// The closed set of value encodings the storage column codec understands.
/// `data_store_type()` is the tag that participates in `RowKey` identity so
/// two data types never share a row.
#[derive(Debug, Clone, PartialEq)]
pub enum DataPointValue {
    Long(i64),
    Double(f64),
    Text(String),
    Binary(Vec<u8>),
}

impl DataPointValue {
    pub fn data_store_type(&self) -> &'static str {
        match self {
            DataPointValue::Long(_) => "long",
            DataPointValue::Double(_) => "double",
            DataPointValue::Text(_) => "string",
            DataPointValue::Binary(_) => "binary",
        }
    }

    /// Whether this value is stored using the "long" column-name encoding
    /// (see `RowSpec::column_name`) or the generic one.
    pub fn is_long(&self) -> bool {
        matches!(self, DataPointValue::Long(_))
    }

    pub fn to_wire_bytes(&self) -> Vec<u8> {
        match self {
            DataPointValue::Long(v) => v.to_be_bytes().to_vec(),
            DataPointValue::Double(v) => v.to_be_bytes().to_vec(),
            DataPointValue::Text(v) => v.as_bytes().to_vec(),
            DataPointValue::Binary(v) => v.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DataPoint {
    pub timestamp_ms: i64,
    pub value: DataPointValue,
}

/// A single write request. `ttl_sec == 0` means "use the configured default".
#[derive(Debug, Clone)]
pub struct DataPointEvent {
    pub metric_name: String,
    pub tags: TagMap,
    pub data_point: DataPoint,
    pub ttl_sec: i64,
}

#[derive(Error, Debug, PartialEq)]
pub enum EventValidationError {
    #[error("metric name {0:?} contains a NUL byte, which collides with row key serialization")]
    MetricNameContainsNul(String),
    #[error("tag {key:?}={value:?} contains a NUL byte, which collides with row key serialization")]
    TagContainsNul { key: String, value: String },
    #[error("ttl_sec must be non-negative, got {0}")]
    NegativeTtl(i64),
}

impl DataPointEvent {
    /// Construct and validate an event. An empty metric name is allowed (the
    /// distilled spec treats it as "warn and proceed"); a NUL byte anywhere
    /// in the metric name or a tag is rejected outright, since it would
    /// silently corrupt the row key's wire serialization (`0x00` is the
    /// field separator there).
    pub fn new(
        metric_name: String,
        tags: TagMap,
        data_point: DataPoint,
        ttl_sec: i64,
    ) -> Result<Self, EventValidationError> {
        if metric_name.contains('\0') {
            return Err(EventValidationError::MetricNameContainsNul(metric_name));
        }
        for (key, value) in &tags {
            if key.contains('\0') || value.contains('\0') {
                return Err(EventValidationError::TagContainsNul {
                    key: key.clone(),
                    value: value.clone(),
                });
            }
        }
        if ttl_sec < 0 {
            return Err(EventValidationError::NegativeTtl(ttl_sec));
        }
        Ok(Self {
            metric_name,
            tags,
            data_point,
            ttl_sec,
        })
    }
}

/// Supplied by the upstream durable queue alongside a batch of events. Must
/// be invoked exactly once per handler call, on success or terminal failure
/// alike, so the queue can advance its read pointer.
pub trait EventCompletionCallback: Send + Sync {
    fn complete(&self);
}

/// A callback backed by a oneshot channel, used by tests and by the ingress
/// adapter to observe completion without coupling to a real queue.
pub struct ChannelCallback {
    sender: std::sync::Mutex<Option<tokio::sync::oneshot::Sender<()>>>,
}

impl ChannelCallback {
    pub fn new() -> (Self, tokio::sync::oneshot::Receiver<()>) {
        let (tx, rx) = tokio::sync::oneshot::channel();
        (
            Self {
                sender: std::sync::Mutex::new(Some(tx)),
            },
            rx,
        )
    }
}

impl EventCompletionCallback for ChannelCallback {
    fn complete(&self) {
        if let Some(sender) = self.sender.lock().expect("callback mutex poisoned").take() {
            let _ = sender.send(());
        }
    }
}
