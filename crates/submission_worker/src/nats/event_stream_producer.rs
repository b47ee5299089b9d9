use crate::domain::{EventStream, OutboundRecord, PublishOutcome, TransportError, TransportResult};
use async_nats::HeaderMap;
use async_trait::async_trait;
use bytes::Bytes;
use common::nats::JetStreamPublisher;
use std::sync::Arc;
use tracing::{debug, warn};

/// Header carrying the untouched partition key next to the subject-safe form
pub const PARTITION_KEY_HEADER: &str = "Partition-Key";

/// Event stream backed by a JetStream stream
///
/// Each record goes to `<stream>.<partition key>` so consumers can filter or
/// shard by subject.
pub struct NatsEventStreamProducer {
    jetstream: Arc<dyn JetStreamPublisher>,
}

impl NatsEventStreamProducer {
    pub fn new(jetstream: Arc<dyn JetStreamPublisher>) -> Self {
        debug!("initialized NatsEventStreamProducer");
        Self { jetstream }
    }
}

/// Subject tokens cannot contain `.`, `*`, `>` or whitespace
fn subject_token(partition_key: &str) -> String {
    let token: String = partition_key
        .chars()
        .map(|c| match c {
            '.' | '*' | '>' => '_',
            c if c.is_whitespace() => '_',
            c => c,
        })
        .collect();

    if token.is_empty() {
        "_".to_string()
    } else {
        token
    }
}

#[async_trait]
impl EventStream for NatsEventStreamProducer {
    async fn put_records(
        &self,
        stream_name: &str,
        records: &[OutboundRecord],
    ) -> TransportResult<PublishOutcome> {
        let mut failed_record_count = 0;
        let mut last_error: Option<TransportError> = None;

        for record in records {
            let subject = format!("{}.{}", stream_name, subject_token(&record.partition_key));
            let mut headers = HeaderMap::new();
            headers.insert(PARTITION_KEY_HEADER, record.partition_key.as_str());

            if let Err(e) = self
                .jetstream
                .publish_with_headers(subject.clone(), headers, Bytes::from(record.data.clone()))
                .await
            {
                warn!(subject = %subject, error = %e, "failed to publish record");
                failed_record_count += 1;
                last_error = Some(e.into());
            }
        }

        // Nothing got through: report the call itself as failed
        if let Some(err) = last_error {
            if failed_record_count == records.len() {
                return Err(err);
            }
        }

        Ok(PublishOutcome {
            failed_record_count,
        })
    }
}
