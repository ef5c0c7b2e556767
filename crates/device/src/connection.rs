//! The capability surface shared by real and mock sessions.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;

use crate::error::SessionError;
use crate::session::DeviceSession;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionKind {
    Serial,
    Mock,
}

impl fmt::Display for ConnectionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Serial => f.write_str("serial"),
            Self::Mock => f.write_str("mock"),
        }
    }
}

/// What the rest of the service needs from the board.
#[async_trait]
pub trait SmsConnection: Send + Sync {
    /// Send an SMS, waking the radio first if it is not ready.
    async fn send(&self, number: &str, content: &str) -> Result<(), SessionError>;

    async fn wakeup(&self) -> Result<(), SessionError>;

    async fn ensure_ready(&self, timeout: Duration) -> Result<(), SessionError>;

    fn is_connected(&self) -> bool;

    fn is_ready(&self) -> bool;

    /// Release the device. Idempotent.
    async fn close(&self);

    fn kind(&self) -> ConnectionKind;

    /// Current endpoint, `None` when there is no hardware behind it.
    fn endpoint(&self) -> Option<String>;
}

#[async_trait]
impl SmsConnection for DeviceSession {
    async fn send(&self, number: &str, content: &str) -> Result<(), SessionError> {
        DeviceSession::send(self, number, content).await
    }

    async fn wakeup(&self) -> Result<(), SessionError> {
        DeviceSession::wakeup(self).await
    }

    async fn ensure_ready(&self, timeout: Duration) -> Result<(), SessionError> {
        DeviceSession::ensure_ready(self, timeout).await
    }

    fn is_connected(&self) -> bool {
        DeviceSession::is_connected(self)
    }

    fn is_ready(&self) -> bool {
        DeviceSession::is_ready(self)
    }

    async fn close(&self) {
        DeviceSession::close(self).await
    }

    fn kind(&self) -> ConnectionKind {
        ConnectionKind::Serial
    }

    fn endpoint(&self) -> Option<String> {
        Some(DeviceSession::endpoint(self))
    }
}
