use crate::domain::codec;
use crate::domain::error::RecordBuildError;
use crate::domain::submission::{
    EnrichedEvent, EventFields, EventKind, OutboundRecord, Submission,
};
use crate::domain::transport::QueueMessage;
use crate::domain::validation::{is_valid_event_of_kind, is_valid_submission};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

/// Source of fresh event identifiers
pub trait EventIdGenerator: Send + Sync {
    fn next_id(&self) -> String;
}

/// Random UUIDv4 identifiers
#[derive(Debug, Default, Clone, Copy)]
pub struct UuidEventIdGenerator;

impl EventIdGenerator for UuidEventIdGenerator {
    fn next_id(&self) -> String {
        uuid::Uuid::new_v4().to_string()
    }
}

/// Wall-clock used to stamp `time_created`
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Which property of a queue message becomes the stream partition key
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PartitionKeySource {
    #[default]
    MessageId,
    BodyDigest,
}

impl PartitionKeySource {
    pub fn key_for<'a>(&self, message: &'a QueueMessage) -> &'a str {
        match self {
            PartitionKeySource::MessageId => &message.message_id,
            PartitionKeySource::BodyDigest => &message.body_digest,
        }
    }
}

/// Everything a single record needs besides the event itself
pub struct RecordContext<'a> {
    pub partition_key: &'a str,
    pub device_id: &'a Value,
    pub ids: &'a dyn EventIdGenerator,
    pub clock: &'a dyn Clock,
}

/// Turns one queue message into the ordered records for the event stream
///
/// Output order is `new_process` events then `network_connection` events,
/// each in submission order. Invalid events are dropped; an invalid
/// submission yields no records at all.
#[derive(Clone)]
pub struct RecordBuilder {
    partition_key_source: PartitionKeySource,
    ids: Arc<dyn EventIdGenerator>,
    clock: Arc<dyn Clock>,
}

impl RecordBuilder {
    pub fn new(partition_key_source: PartitionKeySource) -> Self {
        Self {
            partition_key_source,
            ids: Arc::new(UuidEventIdGenerator),
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_id_generator(mut self, ids: Arc<dyn EventIdGenerator>) -> Self {
        self.ids = ids;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn build_records(
        &self,
        message: &QueueMessage,
    ) -> Result<Vec<OutboundRecord>, RecordBuildError> {
        let submission: Submission = codec::decode_as(&message.body).map_err(|source| {
            RecordBuildError::MalformedSubmission {
                message_id: message.message_id.clone(),
                source,
            }
        })?;

        if !is_valid_submission(&submission) {
            debug!(
                message_id = %message.message_id,
                submission_id = ?submission.submission_id,
                device_id = ?submission.device_id,
                "dropping submission with invalid identifiers"
            );
            return Ok(Vec::new());
        }

        if !submission.events.other.is_empty() {
            debug!(
                message_id = %message.message_id,
                ignored_types = ?submission.events.other.keys().collect::<Vec<_>>(),
                "submission carries unsupported event types"
            );
        }

        if submission.events.skipped > 0 {
            debug!(
                message_id = %message.message_id,
                skipped = submission.events.skipped,
                "dropping event entries that are not objects"
            );
        }

        // Validated above
        let device_id = submission.device_id.clone().unwrap_or_default();
        let context = RecordContext {
            partition_key: self.partition_key_source.key_for(message),
            device_id: &device_id,
            ids: self.ids.as_ref(),
            clock: self.clock.as_ref(),
        };

        Ok(EventKind::ALL
            .into_iter()
            .flat_map(|kind| records_for_kind(kind, submission.events.of(kind), &context))
            .collect())
    }
}

/// Records for the valid events of one type, in their original order
pub fn records_for_kind(
    kind: EventKind,
    events: &[EventFields],
    context: &RecordContext<'_>,
) -> Vec<OutboundRecord> {
    events
        .iter()
        .filter(|event| is_valid_event_of_kind(event, kind))
        .map(|event| {
            let enriched = EnrichedEvent {
                kind,
                event_id: context.ids.next_id(),
                device_id: context.device_id.clone(),
                time_created: context.clock.now(),
                fields: event.clone(),
            };
            OutboundRecord {
                partition_key: context.partition_key.to_string(),
                data: codec::encode(&enriched.into_json()),
            }
        })
        .collect()
}
