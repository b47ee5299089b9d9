use async_nats::jetstream::context::{GetStreamErrorKind, PublishErrorKind};
use async_nats::jetstream::ErrorCode;
use thiserror::Error;

/// Classified failure from a JetStream call
/// Separates a missing stream from an unreachable server or a refused request.
#[derive(Debug, Error)]
pub enum NatsError {
    #[error("stream not found: {0}")]
    StreamNotFound(String),

    #[error("nats unavailable: {0}")]
    Unavailable(String),

    #[error("request rejected by nats: {0}")]
    Rejected(String),
}

pub type NatsResult<T> = Result<T, NatsError>;

impl NatsError {
    pub(crate) fn from_get_stream(
        stream_name: &str,
        err: async_nats::jetstream::context::GetStreamError,
    ) -> Self {
        match err.kind() {
            GetStreamErrorKind::JetStream(js) if js.error_code() == ErrorCode::STREAM_NOT_FOUND => {
                NatsError::StreamNotFound(stream_name.to_string())
            }
            GetStreamErrorKind::Request => NatsError::Unavailable(err.to_string()),
            _ => NatsError::Rejected(err.to_string()),
        }
    }

    pub(crate) fn from_publish(err: async_nats::jetstream::context::PublishError) -> Self {
        match err.kind() {
            PublishErrorKind::StreamNotFound => NatsError::StreamNotFound(err.to_string()),
            PublishErrorKind::TimedOut | PublishErrorKind::BrokenPipe => {
                NatsError::Unavailable(err.to_string())
            }
            _ => NatsError::Rejected(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_includes_context() {
        let err = NatsError::StreamNotFound("submissions".to_string());
        assert_eq!(err.to_string(), "stream not found: submissions");

        let err = NatsError::Unavailable("connection refused".to_string());
        assert!(err.to_string().contains("connection refused"));
    }
}
