mod config;
mod shutdown;

use crate::config::ServiceConfig;
use async_nats::jetstream::stream::RetentionPolicy;
use common::nats::NatsClient;
use common::telemetry::{init_telemetry, shutdown_telemetry, TelemetryConfig, TelemetryProviders};
use std::time::Duration;
use submission_worker::SubmissionWorker;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

#[tokio::main]
async fn main() {
    let config = match ServiceConfig::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    // Initialize telemetry (JSON logs, optionally OTLP traces and logs)
    let telemetry_providers: Option<TelemetryProviders> = match init_telemetry(&TelemetryConfig {
        service_name: config.otel_service_name.clone(),
        otel_endpoint: config.otel_endpoint.clone(),
        otel_enabled: config.otel_enabled,
        log_level: config.log_level.clone(),
    }) {
        Ok(providers) => providers,
        Err(e) => {
            eprintln!("Failed to initialize telemetry: {}", e);
            std::process::exit(1);
        }
    };

    info!(
        endpoint_url = %config.endpoint_url,
        queue = %config.queue_name,
        stream = %config.stream_name,
        batch_size = config.batch_size,
        poll_interval_secs = config.poll_interval_secs,
        partition_key_source = ?config.partition_key_source,
        otel_enabled = config.otel_enabled,
        "Starting event preprocessor"
    );

    let nats_client = match initialize_nats(&config).await {
        Ok(client) => client,
        Err(e) => {
            error!("Failed to initialize NATS: {:#}", e);
            shutdown_telemetry(telemetry_providers);
            std::process::exit(1);
        }
    };

    let worker = SubmissionWorker::from_nats(&nats_client, config.worker_config());
    let stats = worker.stats();

    let token = CancellationToken::new();
    shutdown::spawn_signal_handler(token.clone());

    let result = worker.run(token).await;
    if let Err(e) = &result {
        error!("Submission worker failed: {:#}", e);
    }
    info!(stats = ?stats.snapshot(), "Worker totals");

    let closers = vec![
        shutdown::closer(move || async move {
            nats_client.close().await;
            Ok(())
        }),
    ];
    shutdown::run_closers(closers, Duration::from_secs(10)).await;

    // Last, so closer logs are still exported
    shutdown_telemetry(telemetry_providers);

    if result.is_err() {
        std::process::exit(1);
    }
}

async fn initialize_nats(config: &ServiceConfig) -> anyhow::Result<NatsClient> {
    info!("Initializing NATS...");
    let client = NatsClient::connect(
        &config.endpoint_url,
        config.credentials(),
        Duration::from_secs(config.startup_timeout_secs),
    )
    .await?;

    if config.ensure_streams {
        client
            .ensure_stream(&config.queue_name, RetentionPolicy::WorkQueue)
            .await?;
        client
            .ensure_stream(&config.stream_name, RetentionPolicy::Limits)
            .await?;
    }

    Ok(client)
}
