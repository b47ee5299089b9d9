use crate::nats::error::NatsResult;
use async_nats::jetstream;
use async_nats::HeaderMap;
use async_trait::async_trait;
use bytes::Bytes;
use std::time::Duration;

/// Owned copy of a message delivered by a JetStream pull consumer
///
/// Detached from the async-nats `Message` type so consumers can be exercised
/// in tests without a live server.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchedMessage {
    pub subject: String,
    /// Reply subject used to acknowledge the delivery
    pub reply: Option<String>,
    pub payload: Bytes,
    /// Value of the `Nats-Msg-Id` header, when the publisher set one
    pub msg_id: Option<String>,
    pub stream_sequence: u64,
}

/// Trait for JetStream work-queue consumption
/// Abstracts stream lookup, batch fetch and explicit acknowledgment
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait JetStreamConsumer: Send + Sync {
    /// Check that a stream exists
    async fn get_stream(&self, stream_name: &str) -> NatsResult<()>;

    /// Fetch up to `max_messages` from the durable consumer described by `config`,
    /// creating the consumer on first use. Waits at most `expires`.
    async fn fetch_messages(
        &self,
        stream_name: &str,
        config: jetstream::consumer::pull::Config,
        max_messages: usize,
        expires: Duration,
    ) -> NatsResult<Vec<FetchedMessage>>;

    /// Acknowledge a delivery through its reply subject
    ///
    /// The ack is a plain publish plus flush and is not confirmed by the server;
    /// a lost ack shows up as a redelivery once `ack_wait` expires.
    async fn ack(&self, reply_subject: &str) -> NatsResult<()>;
}

/// Trait for JetStream publisher operations
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait JetStreamPublisher: Send + Sync {
    /// Publish a message with headers and await the stream acknowledgment
    async fn publish_with_headers(
        &self,
        subject: String,
        headers: HeaderMap,
        payload: Bytes,
    ) -> NatsResult<()>;
}
