//! Error types for outline sessions
//!
//! Only transport failures are meant to reach people; everything raised by
//! parsing is absorbed further down and never shows up here.

use outline_tree::TreeError;
use std::path::PathBuf;

/// Failures opening or reading a completion stream
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Endpoint answered with a non-success status
    #[error("completion request failed with status {status}: {body}")]
    Status {
        /// HTTP status code
        status: u16,
        /// Response body, possibly truncated
        body: String,
    },

    /// Connection, TLS or body read failure
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Reading a recorded stream failed
    #[error("replay i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// API key environment variable is unset or empty
    #[error("missing credentials: environment variable {0} is not set")]
    MissingCredentials(String),
}

impl TransportError {
    /// Whether another attempt could succeed
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Status { .. } | Self::Network(_))
    }
}

/// Configuration loading errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Config file could not be read
    #[error("failed to read config {path}: {source}")]
    Io {
        /// File that was read
        path: PathBuf,
        /// Underlying error
        source: std::io::Error,
    },

    /// Config file is not valid TOML for this schema
    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),

    /// A value is out of range
    #[error("invalid config value: {0}")]
    Invalid(String),
}

/// Mutation queue errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QueueError {
    /// Drain worker has stopped
    #[error("mutation queue closed")]
    Closed,
}

/// Session operation errors
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// Topic rejected before any request was made
    #[error("invalid topic: {0}")]
    InvalidTopic(String),

    /// Completion stream failed
    #[error("transport failed: {0}")]
    Transport(#[from] TransportError),

    /// Tree operation failed
    #[error("tree error: {0}")]
    Tree(#[from] TreeError),

    /// Mutation queue failed
    #[error("queue error: {0}")]
    Queue(#[from] QueueError),

    /// Configuration failed to load or validate
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// Chat operation without a selected node
    #[error("no node selected")]
    NoSelection,

    /// Blank chat message
    #[error("message is empty")]
    EmptyMessage,

    /// Stream was stopped before it finished
    #[error("cancelled")]
    Cancelled,
}

impl SessionError {
    /// Whether retrying the same operation could succeed
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport(e) => e.is_retryable(),
            _ => false,
        }
    }

    /// Whether this should be shown to the person driving the session
    ///
    /// Cancellation is a normal terminal state; parse anomalies never get
    /// this far.
    #[must_use]
    pub fn is_user_visible(&self) -> bool {
        matches!(self, Self::Transport(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_transport_failures_are_user_visible() {
        let status = SessionError::from(TransportError::Status {
            status: 503,
            body: "busy".into(),
        });
        assert!(status.is_user_visible());
        assert!(status.is_retryable());

        assert!(!SessionError::Cancelled.is_user_visible());
        assert!(!SessionError::NoSelection.is_user_visible());
        assert!(!SessionError::from(QueueError::Closed).is_user_visible());
    }

    #[test]
    fn missing_credentials_is_not_retryable() {
        let e = SessionError::from(TransportError::MissingCredentials("KEY".into()));
        assert!(!e.is_retryable());
        assert!(e.to_string().contains("KEY"));
    }
}
