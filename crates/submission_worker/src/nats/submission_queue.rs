use crate::domain::{FetchRequest, QueueEndpoint, QueueMessage, SubmissionQueue, TransportResult};
use async_nats::jetstream::consumer::{pull, AckPolicy};
use async_trait::async_trait;
use common::nats::{FetchedMessage, JetStreamConsumer};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tracing::{debug, warn};

/// Submission queue backed by a JetStream work-queue stream
///
/// The stream is named after the queue. A durable pull consumer with
/// explicit acks provides the visibility hold (`ack_wait`); deleting a
/// message acknowledges it through its reply subject.
pub struct NatsSubmissionQueue {
    jetstream: Arc<dyn JetStreamConsumer>,
    consumer_name: String,
}

impl NatsSubmissionQueue {
    pub fn new(jetstream: Arc<dyn JetStreamConsumer>, consumer_name: impl Into<String>) -> Self {
        let consumer_name = consumer_name.into();
        debug!(consumer = %consumer_name, "initialized NatsSubmissionQueue");
        Self {
            jetstream,
            consumer_name,
        }
    }

    fn consumer_config(&self, request: &FetchRequest) -> pull::Config {
        pull::Config {
            name: Some(self.consumer_name.clone()),
            durable_name: Some(self.consumer_name.clone()),
            ack_policy: AckPolicy::Explicit,
            ack_wait: request.visibility_hold,
            ..Default::default()
        }
    }
}

fn to_queue_message(endpoint: &QueueEndpoint, msg: FetchedMessage) -> Option<QueueMessage> {
    let Some(receipt_handle) = msg.reply else {
        warn!(
            subject = %msg.subject,
            stream_sequence = msg.stream_sequence,
            "message without reply subject cannot be acknowledged, skipping"
        );
        return None;
    };

    let message_id = msg
        .msg_id
        .unwrap_or_else(|| format!("{}-{}", endpoint.queue_name, msg.stream_sequence));

    Some(QueueMessage {
        message_id,
        receipt_handle,
        body: String::from_utf8_lossy(&msg.payload).into_owned(),
        body_digest: format!("{:x}", Sha256::digest(&msg.payload)),
    })
}

#[async_trait]
impl SubmissionQueue for NatsSubmissionQueue {
    async fn resolve(&self, queue_name: &str) -> TransportResult<QueueEndpoint> {
        self.jetstream.get_stream(queue_name).await?;
        Ok(QueueEndpoint {
            queue_name: queue_name.to_string(),
            address: queue_name.to_string(),
        })
    }

    async fn fetch(
        &self,
        endpoint: &QueueEndpoint,
        request: FetchRequest,
    ) -> TransportResult<Vec<QueueMessage>> {
        let fetched = self
            .jetstream
            .fetch_messages(
                &endpoint.address,
                self.consumer_config(&request),
                request.max_messages,
                request.wait,
            )
            .await?;

        Ok(fetched
            .into_iter()
            .filter_map(|msg| to_queue_message(endpoint, msg))
            .collect())
    }

    async fn delete(&self, endpoint: &QueueEndpoint, receipt_handle: &str) -> TransportResult<()> {
        debug!(queue = %endpoint.queue_name, "acknowledging message");
        self.jetstream.ack(receipt_handle).await?;
        Ok(())
    }
}
