use ct_inference::{
    config::AppConfig,
    services::{
        inference::CommandBackend,
        paths::PathResolver,
        queue::JobQueue,
        storage::ObsClient,
        worker::{JobRunner, StageTimeouts, Worker},
    },
};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    // Initialize structured logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    tracing::info!("Starting inference worker");

    // Load configuration
    let config = AppConfig::from_env().expect("Failed to load configuration");

    // Initialize services
    tracing::info!("Initializing services");
    let store = ObsClient::new(
        &config.obs_bucket,
        &config.obs_endpoint,
        &config.obs_region,
        &config.obs_access_key,
        &config.obs_secret_key,
    )
    .expect("Failed to initialize OBS client");

    let paths = PathResolver::new(&config.input_prefix_template, &config.output_prefix_template)
        .expect("Invalid key templates");

    let backend = CommandBackend::new(&config.segment_command, &config.plane_command)
        .expect("Invalid model commands");

    let queue = Arc::new(
        JobQueue::new(&config.redis_url, config.result_ttl_secs)
            .expect("Failed to initialize job queue"),
    );

    // Requeue anything a previous worker left on the processing list.
    let requeued = queue
        .recover()
        .await
        .expect("Failed to recover stranded jobs");
    if requeued > 0 {
        tracing::info!(requeued, "requeued envelopes left by a crashed worker");
    }

    let runner = JobRunner::new(
        store,
        backend,
        paths,
        &config.staging_dir,
        StageTimeouts {
            fetch: Duration::from_secs(config.fetch_timeout_secs),
            compute: Duration::from_secs(config.compute_timeout_secs),
            upload: Duration::from_secs(config.upload_timeout_secs),
        },
    );

    let worker = Worker::new(
        queue,
        runner,
        Duration::from_millis(config.poll_interval_ms),
    );

    tracing::info!("Worker ready, starting job processing loop");
    worker.run().await;
}
