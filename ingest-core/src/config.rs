use envconfig::Envconfig;
use scylla::statement::Consistency;

use crate::handler::BatchHandlerConfig;

#[derive(Envconfig, Clone, Debug)]
pub struct Config {
    #[envconfig(from = "BIND_HOST", default = "::")]
    pub host: String,

    #[envconfig(from = "BIND_PORT", default = "3301")]
    pub port: u16,

    /// Size of the bounded worker pool draining the ingress adapter - this
    /// many batch handler calls can run concurrently.
    #[envconfig(default = "8")]
    pub worker_count: usize,

    #[envconfig(default = "60")]
    pub default_ttl_sec: i64,

    #[envconfig(default = "false")]
    pub align_ttl_with_timestamp: bool,

    #[envconfig(default = "false")]
    pub force_default_ttl: bool,

    #[envconfig(default = "main")]
    pub write_cluster_name: String,

    // three weeks, matching the original KairosDB row width
    #[envconfig(default = "1814400000")]
    pub row_width_ms: i64,

    #[envconfig(default = "500000")]
    pub cache_capacity_row_key: u64,

    #[envconfig(default = "500000")]
    pub cache_capacity_metric_name: u64,

    #[envconfig(default = "10")]
    pub min_batch_limit: usize,

    #[envconfig(from = "SCYLLA_HOSTS", default = "127.0.0.1:9042")]
    pub scylla_hosts: String,

    #[envconfig(from = "SCYLLA_KEYSPACE", default = "ingest")]
    pub scylla_keyspace: String,

    #[envconfig(from = "SCYLLA_CONSISTENCY", default = "local_quorum")]
    pub scylla_consistency: String,

    #[envconfig(from = "SCYLLA_REQUEST_TIMEOUT_MS", default = "10000")]
    pub scylla_request_timeout_ms: u64,

    #[envconfig(default = "/var/log/ingest-core/failed-events.jsonl")]
    pub failed_event_log_path: String,

    #[envconfig(default = "false")]
    pub trace_failed_events: bool,
}

impl Config {
    pub fn row_width_sec(&self) -> i64 {
        self.row_width_ms / 1000
    }

    pub fn scylla_contact_points(&self) -> Vec<String> {
        self.scylla_hosts.split(',').map(|s| s.trim().to_string()).collect()
    }

    pub fn scylla_consistency(&self) -> Result<Consistency, anyhow::Error> {
        match self.scylla_consistency.to_lowercase().as_str() {
            "any" => Ok(Consistency::Any),
            "one" => Ok(Consistency::One),
            "two" => Ok(Consistency::Two),
            "three" => Ok(Consistency::Three),
            "quorum" => Ok(Consistency::Quorum),
            "all" => Ok(Consistency::All),
            "local_quorum" => Ok(Consistency::LocalQuorum),
            "each_quorum" => Ok(Consistency::EachQuorum),
            "local_one" => Ok(Consistency::LocalOne),
            other => Err(anyhow::anyhow!("unknown scylla consistency level: {other}")),
        }
    }

    pub fn batch_handler_config(&self) -> BatchHandlerConfig {
        BatchHandlerConfig {
            default_ttl_sec: self.default_ttl_sec,
            align_ttl_with_timestamp: self.align_ttl_with_timestamp,
            force_default_ttl: self.force_default_ttl,
            write_cluster_name: self.write_cluster_name.clone(),
            row_width_sec: self.row_width_sec(),
            min_batch_limit: self.min_batch_limit,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_config() -> Config {
        Config {
            host: "::".to_string(),
            port: 3301,
            worker_count: 8,
            default_ttl_sec: 60,
            align_ttl_with_timestamp: false,
            force_default_ttl: false,
            write_cluster_name: "main".to_string(),
            row_width_ms: 1_814_400_000,
            cache_capacity_row_key: 500_000,
            cache_capacity_metric_name: 500_000,
            min_batch_limit: 10,
            scylla_hosts: "a:9042, b:9042".to_string(),
            scylla_keyspace: "ingest".to_string(),
            scylla_consistency: "local_quorum".to_string(),
            scylla_request_timeout_ms: 10000,
            failed_event_log_path: "/tmp/failed.jsonl".to_string(),
            trace_failed_events: false,
        }
    }

    #[test]
    fn row_width_sec_divides_ms_down() {
        let config = create_test_config();
        assert_eq!(config.row_width_sec(), 1_814_400);
    }

    #[test]
    fn scylla_contact_points_splits_and_trims() {
        let config = create_test_config();
        assert_eq!(config.scylla_contact_points(), vec!["a:9042", "b:9042"]);
    }

    #[test]
    fn scylla_consistency_parses_known_levels() {
        let mut config = create_test_config();
        config.scylla_consistency = "QUORUM".to_string();
        assert_eq!(config.scylla_consistency().unwrap(), Consistency::Quorum);
    }

    #[test]
    fn scylla_consistency_rejects_unknown_level() {
        let mut config = create_test_config();
        config.scylla_consistency = "bogus".to_string();
        assert!(config.scylla_consistency().is_err());
    }
}
