use thiserror::Error;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("timeout after {0}ms")]
    Timeout(u64),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("request error: {0}")]
    Request(#[from] reqwest::Error),

    #[error("remote returned status {status}")]
    Status { status: u16, body: String },

    #[error("payload format error: {0}")]
    PayloadFormat(String),

    #[error("remote rejected {action}: {message}")]
    Application { action: String, message: String },

    #[error("persistence error: {0}")]
    Persistence(String),

    #[error("{0}")]
    Other(String),
}

/// Failure categories surfaced to the view alongside a notice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    TransportTimeout,
    TransportError,
    PayloadFormatError,
    ApplicationError,
    PersistenceError,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TransportTimeout => "transport_timeout",
            Self::TransportError => "transport_error",
            Self::PayloadFormatError => "payload_format_error",
            Self::ApplicationError => "application_error",
            Self::PersistenceError => "persistence_error",
        }
    }
}

impl SyncError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Timeout(_) => ErrorKind::TransportTimeout,
            Self::Request(e) if e.is_timeout() => ErrorKind::TransportTimeout,
            Self::Transport(_) | Self::Request(_) | Self::Status { .. } | Self::Other(_) => {
                ErrorKind::TransportError
            }
            Self::PayloadFormat(_) => ErrorKind::PayloadFormatError,
            Self::Application { .. } => ErrorKind::ApplicationError,
            Self::Persistence(_) => ErrorKind::PersistenceError,
        }
    }

    /// Returns true for transient errors that may succeed on retry.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Timeout(_) => true,
            Self::Transport(_) => true,
            Self::Request(_) => true,
            // 5xx only; a 4xx will fail the same way next time
            Self::Status { status, .. } => *status >= 500,
            _ => false,
        }
    }

    /// Message safe to show in the view. Never includes the endpoint URL
    /// or upstream response bodies.
    pub fn user_message(&self) -> String {
        match self {
            Self::Timeout(ms) => format!("remote store did not answer within {ms}ms"),
            Self::Transport(_) | Self::Request(_) => "remote store unreachable".to_string(),
            Self::Status { status, .. } => format!("remote store returned status {status}"),
            Self::PayloadFormat(_) => "remote store sent an unreadable response".to_string(),
            Self::Application { action, message } => {
                format!("remote store rejected {action}: {message}")
            }
            Self::Persistence(_) => "local cache could not be written".to_string(),
            Self::Other(msg) => msg.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_follow_taxonomy() {
        assert_eq!(SyncError::Timeout(8000).kind(), ErrorKind::TransportTimeout);
        assert_eq!(
            SyncError::Transport("refused".into()).kind(),
            ErrorKind::TransportError
        );
        assert_eq!(
            SyncError::Status {
                status: 502,
                body: String::new()
            }
            .kind(),
            ErrorKind::TransportError
        );
        assert_eq!(
            SyncError::PayloadFormat("bad".into()).kind(),
            ErrorKind::PayloadFormatError
        );
        assert_eq!(
            SyncError::Application {
                action: "list".into(),
                message: "Sheet not found: BOB".into()
            }
            .kind(),
            ErrorKind::ApplicationError
        );
        assert_eq!(
            SyncError::Persistence("quota".into()).kind(),
            ErrorKind::PersistenceError
        );
    }

    #[test]
    fn only_transient_errors_are_retryable() {
        assert!(SyncError::Timeout(1).is_retryable());
        assert!(
            SyncError::Status {
                status: 503,
                body: String::new()
            }
            .is_retryable()
        );
        assert!(
            !SyncError::Status {
                status: 404,
                body: String::new()
            }
            .is_retryable()
        );
        assert!(!SyncError::PayloadFormat("x".into()).is_retryable());
    }

    #[test]
    fn user_message_hides_upstream_body() {
        let err = SyncError::Status {
            status: 500,
            body: "<html>https://secret.example/exec</html>".into(),
        };
        let msg = err.user_message();
        assert!(msg.contains("500"));
        assert!(!msg.contains("secret"));
    }
}
