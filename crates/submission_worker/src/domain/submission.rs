use chrono::{DateTime, SecondsFormat, Utc};
use serde::Deserialize;
use serde_json::{Map, Value};
use std::fmt;

/// Identifier value producers send when they could not determine a real one
pub const INVALID_IDENTIFIER: &str = "not-an-uuid";

/// Destination IP value producers send for unresolvable connections
pub const INVALID_IP: &str = "not-an-ip";

/// Free-form fields of a single raw event
pub type EventFields = Map<String, Value>;

/// Event variants this worker knows how to forward
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    NewProcess,
    NetworkConnection,
}

impl EventKind {
    /// Processing order of event types within a submission
    pub const ALL: [EventKind; 2] = [EventKind::NewProcess, EventKind::NetworkConnection];

    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::NewProcess => "new_process",
            EventKind::NetworkConnection => "network_connection",
        }
    }

    pub fn parse(type_name: &str) -> Option<Self> {
        match type_name {
            "new_process" => Some(EventKind::NewProcess),
            "network_connection" => Some(EventKind::NetworkConnection),
            _ => None,
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Decoded body of one queue message
///
/// Fields are kept as raw JSON so that a well-formed body never fails to
/// deserialize; validity is decided later against the sentinels.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Submission {
    #[serde(default)]
    pub submission_id: Option<Value>,
    #[serde(default)]
    pub device_id: Option<Value>,
    #[serde(default)]
    pub time_created: Option<Value>,
    #[serde(default)]
    pub events: SubmissionEvents,
}

/// Events grouped by type name
///
/// Entries of a known type that are not JSON objects are counted in `skipped`
/// and never forwarded; other keys are kept verbatim in `other`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(from = "Value")]
pub struct SubmissionEvents {
    pub new_process: Vec<EventFields>,
    pub network_connection: Vec<EventFields>,
    pub other: Map<String, Value>,
    pub skipped: usize,
}

impl SubmissionEvents {
    pub fn of(&self, kind: EventKind) -> &[EventFields] {
        match kind {
            EventKind::NewProcess => &self.new_process,
            EventKind::NetworkConnection => &self.network_connection,
        }
    }
}

impl From<Value> for SubmissionEvents {
    fn from(value: Value) -> Self {
        let mut events = SubmissionEvents::default();
        let Value::Object(map) = value else {
            return events;
        };

        for (type_name, entries) in map {
            let Some(kind) = EventKind::parse(&type_name) else {
                events.other.insert(type_name, entries);
                continue;
            };

            let list = match entries {
                Value::Array(list) => list,
                Value::Null => Vec::new(),
                _ => {
                    events.skipped += 1;
                    continue;
                }
            };

            for entry in list {
                match entry {
                    Value::Object(fields) => match kind {
                        EventKind::NewProcess => events.new_process.push(fields),
                        EventKind::NetworkConnection => events.network_connection.push(fields),
                    },
                    _ => events.skipped += 1,
                }
            }
        }

        events
    }
}

/// A valid event stamped with processing-time identity
#[derive(Debug, Clone, PartialEq)]
pub struct EnrichedEvent {
    pub kind: EventKind,
    pub event_id: String,
    /// Copied verbatim from the submission
    pub device_id: Value,
    pub time_created: DateTime<Utc>,
    pub fields: EventFields,
}

impl EnrichedEvent {
    /// Original fields first, then the enrichment keys (which win on collision)
    pub fn into_json(self) -> Value {
        let mut fields = self.fields;
        fields.insert("type".to_string(), Value::String(self.kind.as_str().to_string()));
        fields.insert("event_id".to_string(), Value::String(self.event_id));
        fields.insert("device_id".to_string(), self.device_id);
        fields.insert(
            "time_created".to_string(),
            Value::String(self.time_created.to_rfc3339_opts(SecondsFormat::Micros, true)),
        );
        Value::Object(fields)
    }
}

/// A record ready to be handed to the event stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundRecord {
    pub partition_key: String,
    /// Codec-encoded enriched event
    pub data: String,
}
