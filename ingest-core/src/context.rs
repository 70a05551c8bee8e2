use std::sync::Arc;

use anyhow::{Context, Error};
use health::HealthRegistry;
use scylla::SessionBuilder;

use crate::batch::{BatchSubmitter, ScyllaBatchSubmitter};
use crate::cache::BoundedCache;
use crate::config::Config;
use crate::error::UserError;
use crate::handler::{BatchHandler, FailedEventLog};
use crate::model::{RowKey, RowSpec, TimedString};
use crate::publish::IndexEventPublisher;

pub struct AppContext {
    pub config: Config,
    pub health_registry: HealthRegistry,
    pub publisher: Arc<IndexEventPublisher>,
    handler: Arc<BatchHandler>,
}

impl AppContext {
    pub async fn new(config: &Config) -> Result<Self, Error> {
        let health_registry = HealthRegistry::new("liveness");

        let session = SessionBuilder::new()
            .known_nodes(config.scylla_contact_points())
            .use_keyspace(&config.scylla_keyspace, false)
            .request_timeout(Some(std::time::Duration::from_millis(
                config.scylla_request_timeout_ms,
            )))
            .build()
            .await
            .context(UserError::new(
                "could not connect to the storage cluster, check scylla_hosts",
            ))?;
        let session = Arc::new(session);

        let consistency = config.scylla_consistency()?;
        let submitter: Arc<dyn BatchSubmitter> = Arc::new(
            ScyllaBatchSubmitter::new(session, &config.scylla_keyspace, consistency)
                .await
                .context(UserError::new("could not prepare storage statements"))?,
        );

        let publisher = Arc::new(IndexEventPublisher::new());

        let row_key_cache: Arc<BoundedCache<RowKey>> =
            Arc::new(BoundedCache::new(config.cache_capacity_row_key));
        let metric_name_cache: Arc<BoundedCache<TimedString>> =
            Arc::new(BoundedCache::new(config.cache_capacity_metric_name));

        let failed_event_log = Arc::new(FailedEventLog::new(
            &config.failed_event_log_path,
            config.trace_failed_events,
        ));

        let handler = Arc::new(BatchHandler::new(
            config.batch_handler_config(),
            RowSpec::new(config.row_width_ms),
            row_key_cache,
            metric_name_cache,
            submitter,
            publisher.clone(),
            failed_event_log,
        ));

        Ok(Self {
            config: config.clone(),
            health_registry,
            publisher,
            handler,
        })
    }

    pub fn handler(&self) -> Arc<BatchHandler> {
        self.handler.clone()
    }
}
