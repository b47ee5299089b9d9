use crate::domain::TransportError;
use common::nats::NatsError;

impl From<NatsError> for TransportError {
    fn from(err: NatsError) -> Self {
        match err {
            NatsError::StreamNotFound(name) => TransportError::NotFound(name),
            NatsError::Unavailable(msg) => TransportError::Unreachable(msg),
            NatsError::Rejected(msg) => TransportError::AccessDenied(msg),
        }
    }
}
