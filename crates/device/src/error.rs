//! Error types for the device session layer.

use std::time::Duration;

/// Transport-level failures.
///
/// `Timeout` is the normal outcome of a read that saw no data within the
/// read deadline. `Fatal` means the endpoint is gone and the link must be
/// reopened.
#[derive(Debug, Clone, thiserror::Error)]
pub enum TransportError {
    #[error("read timed out")]
    Timeout,

    #[error("transport lost: {0}")]
    Fatal(String),

    #[error("failed to open {endpoint}: {reason}")]
    Open { endpoint: String, reason: String },

    #[error("failed to enumerate endpoints: {0}")]
    Enumerate(String),
}

impl TransportError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout)
    }

    pub(crate) fn from_io(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::TimedOut
            | std::io::ErrorKind::WouldBlock
            | std::io::ErrorKind::Interrupted => Self::Timeout,
            _ => Self::Fatal(err.to_string()),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DiscoveryError {
    #[error("no serial endpoints found")]
    NoEndpoints,

    #[error("no device answered on {tried:?}")]
    NotFound { tried: Vec<String> },

    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// Errors surfaced to callers of a session.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("radio module not ready after {0:?}")]
    NotReady(Duration),

    #[error("not connected to device")]
    NotConnected,

    #[error("write failed: {0}")]
    Write(TransportError),

    #[error("failed to encode command: {0}")]
    Encode(#[from] sb_protocol::ProtocolError),

    #[error(transparent)]
    Open(#[from] TransportError),

    #[error("config: {0}")]
    Config(String),
}

impl SessionError {
    /// Whether retrying the same operation later may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::NotReady(_) | Self::NotConnected | Self::Write(_))
    }
}

/// Failure reported by a received-message sink.
#[derive(Debug, thiserror::Error)]
#[error("sink: {0}")]
pub struct SinkError(pub String);

/// Device configuration that cannot produce a working session.
#[derive(Debug, thiserror::Error)]
#[error("invalid device config: {}", .0.join("; "))]
pub struct ConfigError(pub Vec<String>);
