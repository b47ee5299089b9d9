use crate::nats::error::{NatsError, NatsResult};
use crate::nats::trace_context::inject_trace_context;
use crate::nats::traits::{FetchedMessage, JetStreamConsumer, JetStreamPublisher};
use anyhow::{Context, Result};
use async_nats::jetstream::{self, stream::Config as StreamConfig, stream::RetentionPolicy};
use async_nats::HeaderMap;
use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

const NATS_MSG_ID: &str = "Nats-Msg-Id";
const ACK_PAYLOAD: &[u8] = b"+ACK";

/// User/password pair for servers with authentication enabled
#[derive(Clone)]
pub struct NatsCredentials {
    pub user: String,
    pub password: String,
}

impl std::fmt::Debug for NatsCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NatsCredentials")
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .finish()
    }
}

pub struct NatsClient {
    client: async_nats::Client,
    jetstream: jetstream::Context,
}

impl NatsClient {
    pub async fn connect(
        url: &str,
        credentials: Option<NatsCredentials>,
        timeout: Duration,
    ) -> Result<Self> {
        info!(
            url = %url,
            timeout_ms = timeout.as_millis(),
            authenticated = credentials.is_some(),
            "Connecting to NATS"
        );

        let options = match credentials {
            Some(creds) => async_nats::ConnectOptions::with_user_and_password(
                creds.user,
                creds.password,
            ),
            None => async_nats::ConnectOptions::new(),
        };

        let client = options
            .connection_timeout(timeout)
            .connect(url)
            .await
            .context("Failed to connect to NATS")?;

        let jetstream = jetstream::new(client.clone());

        info!("Successfully connected to NATS");
        Ok(Self { client, jetstream })
    }

    /// Create the stream `<name>` capturing `<name>.>` unless it already exists
    pub async fn ensure_stream(&self, stream_name: &str, retention: RetentionPolicy) -> Result<()> {
        info!(stream = %stream_name, ?retention, "Ensuring stream exists");

        match self.jetstream.get_stream(stream_name).await {
            Ok(_) => {
                info!(stream = %stream_name, "Stream already exists");
            }
            Err(_) => {
                let stream_config = StreamConfig {
                    name: stream_name.to_string(),
                    subjects: vec![format!("{}.>", stream_name)],
                    retention,
                    ..Default::default()
                };
                self.jetstream
                    .create_stream(stream_config)
                    .await
                    .context("Failed to create stream")?;
                info!(stream = %stream_name, "Created stream");
            }
        }

        Ok(())
    }

    /// Create a JetStreamConsumer trait object from this client
    pub fn create_consumer_client(&self) -> Arc<dyn JetStreamConsumer> {
        Arc::new(NatsJetStreamConsumer::new(
            self.client.clone(),
            self.jetstream.clone(),
        ))
    }

    /// Create a JetStreamPublisher trait object from this client
    pub fn create_publisher_client(&self) -> Arc<dyn JetStreamPublisher> {
        Arc::new(NatsJetStreamPublisher::new(self.jetstream.clone()))
    }

    pub async fn close(self) {
        info!("Closing NATS connection");
        if let Err(e) = self.client.flush().await {
            warn!(error = %e, "Failed to flush NATS connection on close");
        }
    }
}

/// Concrete implementation of JetStreamConsumer using async-nats
pub struct NatsJetStreamConsumer {
    client: async_nats::Client,
    context: jetstream::Context,
}

impl NatsJetStreamConsumer {
    pub fn new(client: async_nats::Client, context: jetstream::Context) -> Self {
        Self { client, context }
    }
}

#[async_trait]
impl JetStreamConsumer for NatsJetStreamConsumer {
    async fn get_stream(&self, stream_name: &str) -> NatsResult<()> {
        self.context
            .get_stream(stream_name)
            .await
            .map_err(|e| NatsError::from_get_stream(stream_name, e))?;
        Ok(())
    }

    async fn fetch_messages(
        &self,
        stream_name: &str,
        config: jetstream::consumer::pull::Config,
        max_messages: usize,
        expires: Duration,
    ) -> NatsResult<Vec<FetchedMessage>> {
        use futures::StreamExt;

        let stream = self
            .context
            .get_stream(stream_name)
            .await
            .map_err(|e| NatsError::from_get_stream(stream_name, e))?;

        let consumer_name = config.durable_name.clone().unwrap_or_default();
        let consumer = stream
            .get_or_create_consumer(&consumer_name, config)
            .await
            .map_err(|e| NatsError::Rejected(e.to_string()))?;

        let mut messages = consumer
            .fetch()
            .max_messages(max_messages)
            .expires(expires)
            .messages()
            .await
            .map_err(|e| NatsError::Unavailable(e.to_string()))?;

        let mut result = Vec::new();
        while let Some(msg) = messages.next().await {
            match msg {
                Ok(message) => {
                    let stream_sequence = match message.info() {
                        Ok(info) => info.stream_sequence,
                        Err(e) => {
                            warn!(error = %e, subject = %message.subject, "Message has no JetStream metadata");
                            0
                        }
                    };
                    let msg_id = message
                        .headers
                        .as_ref()
                        .and_then(|h| h.get(NATS_MSG_ID))
                        .map(|v| v.as_str().to_string());

                    result.push(FetchedMessage {
                        subject: message.subject.to_string(),
                        reply: message.reply.as_ref().map(|r| r.to_string()),
                        payload: message.payload.clone(),
                        msg_id,
                        stream_sequence,
                    });
                }
                Err(e) => {
                    warn!(error = %e, "Error receiving message from batch");
                }
            }
        }

        debug!(stream = %stream_name, count = result.len(), "Fetched messages");
        Ok(result)
    }

    async fn ack(&self, reply_subject: &str) -> NatsResult<()> {
        self.client
            .publish(reply_subject.to_string(), Bytes::from_static(ACK_PAYLOAD))
            .await
            .map_err(|e| NatsError::Unavailable(e.to_string()))?;
        self.client
            .flush()
            .await
            .map_err(|e| NatsError::Unavailable(e.to_string()))?;
        Ok(())
    }
}

/// Concrete implementation of JetStreamPublisher using async-nats
pub struct NatsJetStreamPublisher {
    context: jetstream::Context,
}

impl NatsJetStreamPublisher {
    pub fn new(context: jetstream::Context) -> Self {
        Self { context }
    }
}

#[async_trait]
impl JetStreamPublisher for NatsJetStreamPublisher {
    #[instrument(skip(self, headers, payload), fields(subject = %subject, payload_size = payload.len()))]
    async fn publish_with_headers(
        &self,
        subject: String,
        mut headers: HeaderMap,
        payload: Bytes,
    ) -> NatsResult<()> {
        // Inject trace context into headers for distributed tracing
        inject_trace_context(&mut headers);

        let ack = self
            .context
            .publish_with_headers(subject, headers, payload)
            .await
            .map_err(NatsError::from_publish)?;

        ack.await.map_err(NatsError::from_publish)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_credentials_debug_redacts_password() {
        let creds = NatsCredentials {
            user: "preprocessor".to_string(),
            password: "hunter2".to_string(),
        };

        let rendered = format!("{:?}", creds);
        assert!(rendered.contains("preprocessor"));
        assert!(!rendered.contains("hunter2"));
    }
}
