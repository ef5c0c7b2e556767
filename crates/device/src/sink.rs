//! Hand-off point for SMS received from the device.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::error::SinkError;

/// An SMS received by the board, ready for persistence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceivedMessage {
    pub number: String,
    pub content: String,
    pub received_at: DateTime<Utc>,
    /// Timestamp string exactly as the device reported it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_timestamp: Option<String>,
}

/// Receives every `received` event, once, in wire order.
///
/// Called inline from the session's read loop: implementations must return
/// quickly and move slow work (database writes, network calls) onto their
/// own task. An error is logged by the session and otherwise ignored.
///
/// For slow persistence, wrap a [`ChannelSink`] and drain its receiver on a
/// separate task.
pub trait MessageSink: Send + Sync {
    fn save(&self, message: ReceivedMessage) -> Result<(), SinkError>;
}

/// Sink that drops everything. Used when no persistence is wired up.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl MessageSink for NullSink {
    fn save(&self, message: ReceivedMessage) -> Result<(), SinkError> {
        tracing::debug!(number = %message.number, "no sink configured, dropping SMS");
        Ok(())
    }
}

/// Sink that forwards messages into an unbounded channel.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<ReceivedMessage>,
}

impl ChannelSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<ReceivedMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl MessageSink for ChannelSink {
    fn save(&self, message: ReceivedMessage) -> Result<(), SinkError> {
        self.tx
            .send(message)
            .map_err(|_| SinkError("receiver dropped".into()))
    }
}
