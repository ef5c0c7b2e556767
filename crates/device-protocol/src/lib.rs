//! Device protocol: newline-delimited JSON commands and frames exchanged
//! with the serial SMS modem board.
//!
//! Every message is one JSON object on its own line, UTF-8, in both
//! directions:
//!
//! ```text
//! host → device   {"cmd":"send","number":"+15550001111","content":"hi"}
//!                 {"cmd":"ping"}
//!                 {"cmd":"wakeup"}
//!
//! device → host   {"status":"ok","message":"pong","gsm":"disconnected"}
//!                 {"event":"received","number":"…","content":"…","timestamp":"…","gsm":"connected"}
//!                 {"event":"gsm_state","gsm":"connected"}
//! ```
//!
//! The `gsm` field reports the power state of the board's radio module and
//! may appear on any device frame.

pub mod codec;
pub mod frame;
pub mod timestamp;

pub use codec::{LineCodec, DEFAULT_MAX_FRAME_BYTES};
pub use frame::{Frame, FrameKind, PowerState, ReceivedSms, StatusKind};
pub use timestamp::parse_device_timestamp;

use serde::{Deserialize, Serialize};

/// Host → device command envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "cmd", rename_all = "snake_case")]
pub enum Command {
    /// Send an SMS through the radio module.
    Send { number: String, content: String },

    /// Liveness probe. The board answers with a status frame.
    Ping,

    /// Ask the board to power up its radio module.
    Wakeup,
}

impl Command {
    pub fn send(number: impl Into<String>, content: impl Into<String>) -> Self {
        Self::Send {
            number: number.into(),
            content: content.into(),
        }
    }

    /// Wire name of the command (the `cmd` tag).
    pub fn name(&self) -> &'static str {
        match self {
            Self::Send { .. } => "send",
            Self::Ping => "ping",
            Self::Wakeup => "wakeup",
        }
    }

    /// Serialize to a single newline-terminated JSON line.
    pub fn encode_line(&self) -> Result<Vec<u8>, ProtocolError> {
        let mut line = serde_json::to_vec(self)?;
        line.push(b'\n');
        Ok(line)
    }
}

/// Errors produced while decoding device frames.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("invalid JSON frame: {0}")]
    Json(#[from] serde_json::Error),

    #[error("frame is not valid UTF-8")]
    Utf8(#[from] std::str::Utf8Error),

    #[error("frame has neither `status` nor `event`")]
    Untagged,

    #[error("`{event}` event is missing `{field}`")]
    MissingField {
        event: &'static str,
        field: &'static str,
    },

    #[error("frame exceeds {limit} bytes, discarded")]
    Oversized { limit: usize },
}
