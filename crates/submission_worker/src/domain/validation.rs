use crate::domain::submission::{EventFields, EventKind, Submission, INVALID_IDENTIFIER, INVALID_IP};
use serde_json::Value;

/// Both identifiers present and neither is the invalid marker
pub fn is_valid_submission(submission: &Submission) -> bool {
    is_valid_identifier(submission.submission_id.as_ref())
        && is_valid_identifier(submission.device_id.as_ref())
}

/// Check the one field each event type requires; unknown types are never valid
pub fn is_valid_event(event: &EventFields, event_type: &str) -> bool {
    match EventKind::parse(event_type) {
        Some(kind) => is_valid_event_of_kind(event, kind),
        None => false,
    }
}

pub(crate) fn is_valid_event_of_kind(event: &EventFields, kind: EventKind) -> bool {
    match kind {
        EventKind::NewProcess => !matches!(event.get("cmdl"), None | Some(Value::Null)),
        EventKind::NetworkConnection => match event.get("destination_ip") {
            None => false,
            Some(Value::String(ip)) => ip != INVALID_IP,
            Some(_) => true,
        },
    }
}

/// Any non-null value other than the marker string; producers are not held to strings
fn is_valid_identifier(id: Option<&Value>) -> bool {
    match id {
        None | Some(Value::Null) => false,
        Some(Value::String(id)) => id != INVALID_IDENTIFIER,
        Some(_) => true,
    }
}
