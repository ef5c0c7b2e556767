//! Device → host frames.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::timestamp::parse_device_timestamp;
use crate::ProtocolError;

/// Power state of the board's radio module (the wire `gsm` field).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PowerState {
    Connected,
    Disconnected,
}

impl PowerState {
    pub fn is_connected(self) -> bool {
        matches!(self, Self::Connected)
    }
}

/// Value of the `status` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusKind {
    Ok,
    Error,
    Info,
    Ready,
    /// Any status the firmware adds later. The frame still feeds readiness.
    #[serde(other)]
    Unrecognized,
}

/// An SMS reported by a `received` event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceivedSms {
    pub number: String,
    pub content: String,
    /// Device-local timestamp as sent by the board, if any.
    pub timestamp: Option<String>,
}

impl ReceivedSms {
    /// When the message was received: the device timestamp when it parses,
    /// otherwise `now`.
    pub fn received_at(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        self.timestamp
            .as_deref()
            .and_then(parse_device_timestamp)
            .unwrap_or(now)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameKind {
    /// `{"status": …, "message": …}`
    Status { status: StatusKind, message: String },
    /// `{"event":"received", …}`
    Received(ReceivedSms),
    /// `{"event":"gsm_state"}`: carries only the power state.
    GsmState,
    /// An event name this host does not know.
    UnknownEvent,
}

/// One decoded line from the device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub kind: FrameKind,
    /// Radio power state, present on nearly every frame.
    pub power: Option<PowerState>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
enum EventTag {
    Received,
    GsmState,
    #[serde(other)]
    Other,
}

/// Flat wire shape. Status and event frames share one object layout.
#[derive(Debug, Deserialize)]
struct WireFrame {
    #[serde(default)]
    status: Option<StatusKind>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    event: Option<EventTag>,
    #[serde(default)]
    number: Option<String>,
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    timestamp: Option<String>,
    #[serde(default)]
    gsm: Option<PowerState>,
}

impl Frame {
    /// Decode one trimmed, non-empty line.
    ///
    /// When a frame carries both `event` and `status`, the event wins.
    pub fn decode(line: &str) -> Result<Self, ProtocolError> {
        let wire: WireFrame = serde_json::from_str(line)?;

        let kind = match (wire.event, wire.status) {
            (Some(EventTag::Received), _) => FrameKind::Received(ReceivedSms {
                number: wire.number.ok_or(ProtocolError::MissingField {
                    event: "received",
                    field: "number",
                })?,
                content: wire.content.ok_or(ProtocolError::MissingField {
                    event: "received",
                    field: "content",
                })?,
                timestamp: wire.timestamp.filter(|t| !t.trim().is_empty()),
            }),
            (Some(EventTag::GsmState), _) => FrameKind::GsmState,
            (Some(EventTag::Other), _) => FrameKind::UnknownEvent,
            (None, Some(status)) => FrameKind::Status {
                status,
                message: wire.message.unwrap_or_default(),
            },
            (None, None) => return Err(ProtocolError::Untagged),
        };

        Ok(Self {
            kind,
            power: wire.gsm,
        })
    }
}
