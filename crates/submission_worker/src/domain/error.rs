use crate::domain::codec::CodecError;
use thiserror::Error;

/// Failure to turn a queue message into records
#[derive(Debug, Error)]
pub enum RecordBuildError {
    #[error("malformed submission in message {message_id}: {source}")]
    MalformedSubmission {
        message_id: String,
        #[source]
        source: CodecError,
    },
}

/// Which way a transport call failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportErrorKind {
    /// Endpoint could not be reached or timed out
    Unreachable,
    /// Request refused by the service (credentials, permissions, limits)
    AccessDenied,
    /// Named queue or stream does not exist
    NotFound,
}

#[derive(Debug, Clone, Error)]
pub enum TransportError {
    #[error("transport unreachable: {0}")]
    Unreachable(String),

    #[error("transport access denied: {0}")]
    AccessDenied(String),

    #[error("transport resource not found: {0}")]
    NotFound(String),
}

impl TransportError {
    pub fn kind(&self) -> TransportErrorKind {
        match self {
            TransportError::Unreachable(_) => TransportErrorKind::Unreachable,
            TransportError::AccessDenied(_) => TransportErrorKind::AccessDenied,
            TransportError::NotFound(_) => TransportErrorKind::NotFound,
        }
    }
}

pub type TransportResult<T> = Result<T, TransportError>;
