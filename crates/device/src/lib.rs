//! `sb-device`: session manager for a serial-attached SMS modem board.
//!
//! The board speaks newline-delimited JSON over USB serial (see
//! `sb-protocol`). This crate finds the board, keeps a session open to it,
//! and turns its frames into readiness changes and received-SMS records.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │  open_connection(config, connector, sink)                    │
//! │     mode = mock ─────────────────────────────▶ MockSession   │
//! │     mode = auto ─▶ Discovery ─┐                              │
//! │     mode = path ──────────────┴─▶ SessionBuilder::connect    │
//! │                                        │                     │
//! │                                        ▼                     │
//! │   DeviceSession ── read loop ──▶ LineCodec ──▶ dispatch      │
//! │        │                                   ├─▶ ReadinessGate │
//! │        │                                   └─▶ MessageSink   │
//! │        └── on transport loss ──▶ supervisor (single-flight)  │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Sending
//!
//! 1. If the radio is not ready, write `wakeup` and wait (30s by default)
//! 2. Write `send` under the write lock
//!
//! Any failure to find or open the board at startup falls back to
//! [`MockSession`], so the surrounding service always starts.

pub mod builder;
pub mod config;
pub mod connect;
pub mod connection;
pub mod discovery;
pub mod error;
pub mod mock;
pub mod readiness;
pub mod session;
pub mod sink;
mod supervisor;
pub mod transport;

// ── Re-exports for ergonomic imports ─────────────────────────────────

pub use builder::SessionBuilder;
pub use config::{DeviceConfig, DeviceMode};
pub use connect::open_connection;
pub use connection::{ConnectionKind, SmsConnection};
pub use discovery::{Discovery, DEFAULT_PORT_PATTERNS};
pub use error::{ConfigError, DiscoveryError, SessionError, SinkError, TransportError};
pub use mock::MockSession;
pub use readiness::ReadinessGate;
pub use session::{DeviceSession, Phase, SessionOptions};
pub use sink::{ChannelSink, MessageSink, NullSink, ReceivedMessage};
pub use transport::{Connector, LinkSettings, SerialConnector, SerialTransport, Transport};

// Re-export protocol types so callers rarely need sb-protocol directly.
pub use sb_protocol::{Command, PowerState};
