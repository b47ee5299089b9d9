use crate::domain::error::TransportResult;
use crate::domain::submission::OutboundRecord;
use async_trait::async_trait;
use std::time::Duration;

/// A message as delivered by the submission queue
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueMessage {
    pub message_id: String,
    /// Token that acknowledges (deletes) this delivery
    pub receipt_handle: String,
    pub body: String,
    /// Content hash of the body, supplied by the transport
    pub body_digest: String,
}

/// Resolved address of a queue
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueEndpoint {
    pub queue_name: String,
    pub address: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchRequest {
    pub max_messages: usize,
    /// How long fetched messages stay hidden from other consumers
    pub visibility_hold: Duration,
    /// Longest the fetch may block waiting for messages
    pub wait: Duration,
}

/// Result of a batch publish; individual records may be rejected
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PublishOutcome {
    pub failed_record_count: usize,
}

/// Inbox of submissions
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait SubmissionQueue: Send + Sync {
    /// Resolve a logical queue name to an endpoint
    async fn resolve(&self, queue_name: &str) -> TransportResult<QueueEndpoint>;

    /// Fetch up to `request.max_messages`; an empty vector is a normal outcome
    async fn fetch(
        &self,
        endpoint: &QueueEndpoint,
        request: FetchRequest,
    ) -> TransportResult<Vec<QueueMessage>>;

    /// Remove a delivered message for good
    async fn delete(&self, endpoint: &QueueEndpoint, receipt_handle: &str) -> TransportResult<()>;
}

/// Fan-out bus that receives enriched events
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait EventStream: Send + Sync {
    /// Publish a batch of records in one call
    async fn put_records(
        &self,
        stream_name: &str,
        records: &[OutboundRecord],
    ) -> TransportResult<PublishOutcome>;
}
