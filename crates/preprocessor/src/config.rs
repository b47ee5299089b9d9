use common::nats::NatsCredentials;
use config::{Config, ConfigError, Environment};
use serde::Deserialize;
use std::time::Duration;
use submission_worker::domain::PartitionKeySource;
use submission_worker::SubmissionWorkerConfig;

#[derive(Debug, Deserialize, Clone)]
pub struct ServiceConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    // Transport configuration
    /// NATS server URL hosting both the queue and the event stream
    #[serde(default = "default_endpoint_url")]
    pub endpoint_url: String,

    /// NATS user; empty means anonymous
    #[serde(default)]
    pub access_key_id: String,

    /// NATS password; empty means anonymous
    #[serde(default)]
    pub secret_access_key: String,

    /// Work-queue stream holding submissions
    #[serde(default = "default_queue_name")]
    pub queue_name: String,

    /// Stream receiving enriched events
    #[serde(default = "default_stream_name")]
    pub stream_name: String,

    /// Durable consumer name on the queue stream
    #[serde(default = "default_consumer_name")]
    pub consumer_name: String,

    /// Create missing streams at startup
    #[serde(default = "default_ensure_streams")]
    pub ensure_streams: bool,

    /// Startup timeout for initialization operations in seconds
    #[serde(default = "default_startup_timeout_secs")]
    pub startup_timeout_secs: u64,

    // Worker configuration
    /// Messages fetched per cycle
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Seconds a fetched message stays hidden before redelivery
    #[serde(default = "default_visibility_hold_secs")]
    pub visibility_hold_secs: u64,

    /// Idle seconds between cycles
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,

    /// Longest a fetch blocks waiting for messages, in seconds
    #[serde(default = "default_fetch_wait_secs")]
    pub fetch_wait_secs: u64,

    /// message_id or body_digest
    #[serde(default)]
    pub partition_key_source: PartitionKeySource,

    // OpenTelemetry configuration
    /// Enable OpenTelemetry tracing
    #[serde(default = "default_otel_enabled")]
    pub otel_enabled: bool,

    /// OpenTelemetry OTLP endpoint
    #[serde(default = "default_otel_endpoint")]
    pub otel_endpoint: String,

    /// Service name for OpenTelemetry
    #[serde(default = "default_otel_service_name")]
    pub otel_service_name: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_endpoint_url() -> String {
    "nats://localhost:4222".to_string()
}

fn default_queue_name() -> String {
    "submissions".to_string()
}

fn default_stream_name() -> String {
    "events".to_string()
}

fn default_consumer_name() -> String {
    "preprocessor".to_string()
}

fn default_ensure_streams() -> bool {
    true
}

fn default_startup_timeout_secs() -> u64 {
    10
}

fn default_batch_size() -> usize {
    1
}

fn default_visibility_hold_secs() -> u64 {
    300
}

fn default_poll_interval_secs() -> u64 {
    30
}

fn default_fetch_wait_secs() -> u64 {
    5
}

fn default_otel_enabled() -> bool {
    false
}

fn default_otel_endpoint() -> String {
    "http://localhost:4317".to_string()
}

fn default_otel_service_name() -> String {
    "event-preprocessor".to_string()
}

impl ServiceConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let config: Self = Config::builder()
            .add_source(Environment::with_prefix("PREPROCESSOR"))
            .build()?
            .try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.batch_size == 0 {
            return Err(ConfigError::Message(
                "batch_size must be at least 1".to_string(),
            ));
        }
        if self.access_key_id.is_empty() != self.secret_access_key.is_empty() {
            return Err(ConfigError::Message(
                "access_key_id and secret_access_key must be set together".to_string(),
            ));
        }
        Ok(())
    }

    pub fn credentials(&self) -> Option<NatsCredentials> {
        if self.access_key_id.is_empty() {
            return None;
        }
        Some(NatsCredentials {
            user: self.access_key_id.clone(),
            password: self.secret_access_key.clone(),
        })
    }

    pub fn worker_config(&self) -> SubmissionWorkerConfig {
        SubmissionWorkerConfig {
            queue_name: self.queue_name.clone(),
            stream_name: self.stream_name.clone(),
            batch_size: self.batch_size,
            visibility_hold: Duration::from_secs(self.visibility_hold_secs),
            poll_interval: Duration::from_secs(self.poll_interval_secs),
            fetch_wait: Duration::from_secs(self.fetch_wait_secs),
            partition_key_source: self.partition_key_source,
            consumer_name: self.consumer_name.clone(),
        }
    }
}
