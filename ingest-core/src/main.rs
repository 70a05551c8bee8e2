use std::future::ready;
use std::sync::Arc;

use anyhow::Error;
use axum::{routing::get, Router};
use envconfig::Envconfig;
use ingest_core::config::Config;
use ingest_core::context::AppContext;
use ingest_core::queue::{IngestBatch, IngressAdapter, IngressReceiver};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

common_alloc::used!();

fn setup_tracing() {
    let log_layer = tracing_subscriber::fmt::layer().with_filter(EnvFilter::from_default_env());
    tracing_subscriber::registry().with(log_layer).init();
}

pub async fn index() -> &'static str {
    "ingest-core"
}

fn start_health_metrics_server(config: &Config, context: Arc<AppContext>) -> JoinHandle<()> {
    let config = config.clone();
    let router = Router::new()
        .route("/", get(index))
        .route("/_readiness", get(index))
        .route(
            "/_liveness",
            get(move || ready(context.health_registry.get_status())),
        );
    let router = common_metrics::setup_metrics_routes(router);
    let bind = format!("{}:{}", config.host, config.port);
    tokio::task::spawn(async move {
        common_metrics::serve(router, &bind)
            .await
            .expect("failed to start serving health/metrics");
    })
}

/// One worker: pulls batches off the shared ingress receiver and runs them
/// through the batch handler until the channel closes.
async fn run_worker(
    worker_id: usize,
    receiver: Arc<Mutex<IngressReceiver>>,
    context: Arc<AppContext>,
    liveness: health::HealthHandle,
) {
    let handler = context.handler();
    loop {
        let batch = {
            let mut receiver = receiver.lock().await;
            receiver.recv().await
        };
        let Some(IngestBatch { events, callback }) = batch else {
            info!(worker_id, "ingress channel closed, worker exiting");
            return;
        };

        liveness.report_healthy().await;
        let event_count = events.len();
        if let Err(err) = handler.handle(events, callback).await {
            warn!(worker_id, event_count, error = %err, "batch handler call did not complete cleanly");
        }
    }
}

#[tokio::main]
pub async fn main() -> Result<(), Error> {
    setup_tracing();
    info!("Starting up...");

    let config = Config::init_from_env()?;
    let context = Arc::new(AppContext::new(&config).await?);

    start_health_metrics_server(&config, context.clone());

    let (_adapter, receiver) = IngressAdapter::bounded(config.worker_count * 4);
    let receiver = Arc::new(Mutex::new(receiver));

    let liveness = context
        .health_registry
        .register("worker_pool".to_string(), std::time::Duration::from_secs(30))
        .await;

    let mut workers = Vec::with_capacity(config.worker_count);
    for worker_id in 0..config.worker_count {
        let receiver = receiver.clone();
        let context = context.clone();
        let liveness = liveness.clone();
        workers.push(tokio::spawn(run_worker(worker_id, receiver, context, liveness)));
    }

    for worker in workers {
        if let Err(err) = worker.await {
            error!(error = %err, "worker task panicked");
        }
    }

    info!("Shutting down");
    Ok(())
}
