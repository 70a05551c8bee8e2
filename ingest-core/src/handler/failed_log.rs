use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use base64::{engine::general_purpose::STANDARD, Engine};
use serde_json::{json, Value};
use tracing::error;

use crate::model::{DataPointEvent, DataPointValue};

fn value_to_json(value: &DataPointValue) -> Value {
    match value {
        DataPointValue::Long(v) => json!(v),
        DataPointValue::Double(v) => json!(v),
        DataPointValue::Text(v) => json!(v),
        DataPointValue::Binary(v) => json!(STANDARD.encode(v)),
    }
}

fn event_to_json(event: &DataPointEvent) -> Value {
    let mut tags = serde_json::Map::new();
    for (key, value) in &event.tags {
        tags.insert(key.clone(), json!(value));
    }
    json!({
        "name": event.metric_name,
        "timestamp": event.data_point.timestamp_ms,
        "value": value_to_json(&event.data_point.value),
        "tags": tags,
        "ttl": event.ttl_sec,
    })
}

/// Structured dump written when a handler call fails terminally. One JSON
/// object per line, appended - this is a last-resort audit trail for events
/// the adaptive retry loop gave up on, not a replay queue.
pub struct FailedEventLog {
    path: PathBuf,
    enabled: bool,
    write_lock: Mutex<()>,
}

impl FailedEventLog {
    pub fn new(path: impl Into<PathBuf>, enabled: bool) -> Self {
        Self {
            path: path.into(),
            enabled,
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Appends one JSON record per event. Errors opening or writing the log
    /// are logged, not propagated - a failing audit trail must not prevent
    /// the handler from completing the callback for the events it already
    /// gave up on.
    pub fn dump(&self, events: &[DataPointEvent]) {
        if !self.enabled {
            return;
        }
        let _guard = self.write_lock.lock().expect("failed event log mutex poisoned");

        let file = OpenOptions::new().create(true).append(true).open(&self.path);
        let mut file = match file {
            Ok(file) => file,
            Err(err) => {
                error!(path = %self.path.display(), error = %err, "could not open failed event log");
                return;
            }
        };

        for event in events {
            let record = event_to_json(event);
            if let Err(err) = writeln!(file, "{record}") {
                error!(path = %self.path.display(), error = %err, "could not write failed event record");
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{DataPoint, TagMap};

    fn sample_event() -> DataPointEvent {
        let mut tags = TagMap::new();
        tags.insert("host".to_string(), "web1".to_string());
        DataPointEvent::new(
            "cpu".to_string(),
            tags,
            DataPoint {
                timestamp_ms: 1000,
                value: DataPointValue::Long(42),
            },
            60,
        )
        .unwrap()
    }

    #[test]
    fn disabled_log_writes_nothing() {
        let dir = std::env::temp_dir().join(format!("failed-log-disabled-{:?}", std::thread::current().id()));
        let log = FailedEventLog::new(&dir, false);
        log.dump(&[sample_event()]);
        assert!(!dir.exists());
    }

    #[test]
    fn enabled_log_appends_one_json_line_per_event() {
        let path = std::env::temp_dir().join(format!(
            "failed-log-enabled-{:?}-{}",
            std::thread::current().id(),
            std::process::id()
        ));
        let _ = std::fs::remove_file(&path);
        let log = FailedEventLog::new(&path, true);

        log.dump(&[sample_event(), sample_event()]);

        let contents = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 2);

        let record: Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(record["name"], "cpu");
        assert_eq!(record["timestamp"], 1000);
        assert_eq!(record["value"], 42);
        assert_eq!(record["tags"]["host"], "web1");
        assert_eq!(record["ttl"], 60);

        let _ = std::fs::remove_file(&path);
    }
}
