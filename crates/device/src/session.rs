//! Device session. Owns the serial link, runs the read loop, dispatches
//! frames and serializes outbound commands.
//!
//! # Lifecycle
//!
//! 1. Open the endpoint (with boot warm-up) and spawn the read loop
//! 2. Read loop: bounded read → [`LineCodec`] → dispatch each frame in order
//!    - every `gsm` field updates the [`ReadinessGate`]
//!    - `received` events go to the [`MessageSink`]
//! 3. On a fatal read error: mark the link lost, clear readiness and hand
//!    off to the reconnection supervisor
//! 4. [`close`](DeviceSession::close) cancels the loop and the supervisor

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use parking_lot::Mutex;
use sb_protocol::{Command, Frame, FrameKind, LineCodec, StatusKind};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::builder::SessionBuilder;
use crate::discovery::Discovery;
use crate::error::{SessionError, TransportError};
use crate::readiness::ReadinessGate;
use crate::sink::{MessageSink, ReceivedMessage};
use crate::supervisor::{self, SupervisorState};
use crate::transport::{Connector, Transport};

/// Bytes requested per transport read.
const READ_CHUNK: usize = 512;

/// How long `close` waits for the read loop before aborting it.
const READ_LOOP_JOIN_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Disconnected,
    Connected,
}

/// Resolved session settings. Built by [`SessionBuilder`].
#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// Endpoint to open first.
    pub endpoint: String,
    /// Re-run discovery on every reconnect instead of reusing the endpoint.
    pub auto_discover: bool,
    pub discovery: Discovery,
    pub warm_up: Duration,
    pub read_timeout: Duration,
    pub retry_interval: Duration,
    pub ready_timeout: Duration,
    pub max_frame_bytes: usize,
    pub reconnect: bool,
}

pub(crate) struct Link {
    pub(crate) phase: Phase,
    pub(crate) endpoint: String,
    pub(crate) transport: Option<Arc<dyn Transport>>,
}

/// State shared by the session handle, the read loop and the supervisor.
pub(crate) struct Shared {
    /// Phase, endpoint and transport. Swapped only while `write_gate` is held.
    pub(crate) link: Mutex<Link>,
    /// One writer at a time; also held across a transport swap.
    pub(crate) write_gate: tokio::sync::Mutex<()>,
    pub(crate) gate: ReadinessGate,
    pub(crate) connector: Arc<dyn Connector>,
    pub(crate) sink: Arc<dyn MessageSink>,
    pub(crate) options: SessionOptions,
    pub(crate) cancel: CancellationToken,
    pub(crate) supervisor: SupervisorState,
}

impl Shared {
    pub(crate) fn new(
        options: SessionOptions,
        connector: Arc<dyn Connector>,
        sink: Arc<dyn MessageSink>,
        transport: Option<Arc<dyn Transport>>,
    ) -> Self {
        let phase = if transport.is_some() {
            Phase::Connected
        } else {
            Phase::Disconnected
        };
        Self {
            link: Mutex::new(Link {
                phase,
                endpoint: options.endpoint.clone(),
                transport,
            }),
            write_gate: tokio::sync::Mutex::new(()),
            gate: ReadinessGate::new(),
            connector,
            sink,
            options,
            cancel: CancellationToken::new(),
            supervisor: SupervisorState::default(),
        }
    }

    /// The live transport, if the link is up.
    pub(crate) fn connected_transport(&self) -> Option<Arc<dyn Transport>> {
        let link = self.link.lock();
        match link.phase {
            Phase::Connected => link.transport.clone(),
            Phase::Disconnected => None,
        }
    }

    /// Record that `transport` failed. Returns `false` when it had already
    /// been replaced or marked lost.
    fn mark_lost(&self, transport: &Arc<dyn Transport>) -> bool {
        let mut link = self.link.lock();
        let current = matches!(&link.transport, Some(t) if Arc::ptr_eq(t, transport));
        if !current || link.phase == Phase::Disconnected {
            return false;
        }
        link.phase = Phase::Disconnected;
        drop(link);
        self.gate.clear();
        true
    }

    fn reconnect_enabled(&self) -> bool {
        self.options.reconnect && !self.cancel.is_cancelled()
    }
}

/// A live session with the board.
///
/// Create via [`SessionBuilder`] or [`open_connection`](crate::open_connection).
pub struct DeviceSession {
    shared: Arc<Shared>,
    reader: Mutex<Option<JoinHandle<()>>>,
}

impl DeviceSession {
    pub fn builder() -> SessionBuilder {
        SessionBuilder::new()
    }

    /// Open the first endpoint and start the read loop.
    pub(crate) async fn start(
        options: SessionOptions,
        connector: Arc<dyn Connector>,
        sink: Arc<dyn MessageSink>,
    ) -> Result<Self, SessionError> {
        let transport = connector.open(&options.endpoint, options.warm_up).await?;
        let endpoint = options.endpoint.clone();
        let shared = Arc::new(Shared::new(options, connector, sink, Some(transport)));
        let reader = tokio::spawn(read_loop(shared.clone()));

        tracing::info!(endpoint = %endpoint, "connected to device");
        Ok(Self {
            shared,
            reader: Mutex::new(Some(reader)),
        })
    }

    pub fn endpoint(&self) -> String {
        self.shared.link.lock().endpoint.clone()
    }

    pub fn phase(&self) -> Phase {
        self.shared.link.lock().phase
    }

    pub fn is_connected(&self) -> bool {
        self.phase() == Phase::Connected
    }

    pub fn is_ready(&self) -> bool {
        self.shared.gate.is_ready()
    }

    /// Whether a reconnection run is currently active.
    pub fn is_reconnecting(&self) -> bool {
        self.shared.supervisor.is_active()
    }

    pub async fn wait_ready(&self, timeout: Duration) -> bool {
        self.shared.gate.wait_ready(timeout).await
    }

    /// Make sure the radio is up, waking it if needed.
    pub async fn ensure_ready(&self, timeout: Duration) -> Result<(), SessionError> {
        if self.shared.gate.is_ready() {
            return Ok(());
        }

        tracing::info!("radio module not ready, sending wakeup");
        self.wakeup().await?;

        if self.shared.gate.wait_ready(timeout).await {
            tracing::info!("radio module ready");
            Ok(())
        } else {
            tracing::warn!(
                timeout_ms = timeout.as_millis() as u64,
                "radio module did not become ready"
            );
            Err(SessionError::NotReady(timeout))
        }
    }

    /// Send an SMS, waking the radio first if needed.
    pub async fn send(&self, number: &str, content: &str) -> Result<(), SessionError> {
        self.ensure_ready(self.shared.options.ready_timeout).await?;
        self.write_command(&Command::send(number, content)).await?;
        tracing::info!(number = %number, chars = content.chars().count(), "SMS handed to device");
        Ok(())
    }

    pub async fn ping(&self) -> Result<(), SessionError> {
        self.write_command(&Command::Ping).await
    }

    pub async fn wakeup(&self) -> Result<(), SessionError> {
        self.write_command(&Command::Wakeup).await
    }

    async fn write_command(&self, command: &Command) -> Result<(), SessionError> {
        let line = command.encode_line()?;

        let _guard = self.shared.write_gate.lock().await;
        let transport = self
            .shared
            .connected_transport()
            .ok_or(SessionError::NotConnected)?;
        transport.write(&line).await.map_err(SessionError::Write)?;

        tracing::debug!(
            cmd = command.name(),
            endpoint = transport.endpoint(),
            "command written"
        );
        Ok(())
    }

    /// Stop the read loop and supervisor and release the port.
    ///
    /// Safe to call more than once.
    pub async fn close(&self) {
        self.shared.cancel.cancel();

        let reader = self.reader.lock().take();
        if let Some(mut handle) = reader {
            if tokio::time::timeout(READ_LOOP_JOIN_TIMEOUT, &mut handle)
                .await
                .is_err()
            {
                tracing::warn!("read loop did not stop in time, aborting");
                handle.abort();
            }
        }

        let transport = {
            let _guard = self.shared.write_gate.lock().await;
            let mut link = self.shared.link.lock();
            link.phase = Phase::Disconnected;
            link.transport.take()
        };
        self.shared.gate.clear();

        if let Some(transport) = transport {
            transport.close().await;
            tracing::info!(endpoint = transport.endpoint(), "device session closed");
        }
    }
}

impl Drop for DeviceSession {
    fn drop(&mut self) {
        self.shared.cancel.cancel();
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Read loop
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub(crate) async fn read_loop(shared: Arc<Shared>) {
    let mut codec = LineCodec::new(shared.options.max_frame_bytes);
    let mut buf = vec![0u8; READ_CHUNK];

    loop {
        let Some(transport) = shared.connected_transport() else {
            // Link is down. Keep the supervisor alive (no-op while it runs)
            // and idle for one read deadline.
            if shared.reconnect_enabled() {
                supervisor::trigger(&shared);
            }
            tokio::select! {
                _ = tokio::time::sleep(shared.options.read_timeout) => {}
                _ = shared.cancel.cancelled() => break,
            }
            continue;
        };

        let result = tokio::select! {
            r = transport.read(&mut buf) => r,
            _ = shared.cancel.cancelled() => break,
        };

        match result {
            Ok(0) | Err(TransportError::Timeout) => {}
            Ok(n) => {
                tracing::trace!(bytes = n, "read from device");
                for decoded in codec.feed(&buf[..n]) {
                    match decoded {
                        Ok(frame) => dispatch(&shared, frame),
                        Err(e) => tracing::warn!(error = %e, "dropping undecodable frame"),
                    }
                }
            }
            Err(e) => {
                if shared.cancel.is_cancelled() {
                    break;
                }
                if shared.mark_lost(&transport) {
                    tracing::warn!(
                        endpoint = transport.endpoint(),
                        error = %e,
                        "lost connection to device"
                    );
                    codec.clear();
                    if shared.reconnect_enabled() {
                        supervisor::trigger(&shared);
                    }
                }
            }
        }
    }

    tracing::debug!("read loop stopped");
}

fn dispatch(shared: &Shared, frame: Frame) {
    match frame.kind {
        FrameKind::Received(sms) => {
            let message = ReceivedMessage {
                received_at: sms.received_at(Utc::now()),
                number: sms.number,
                content: sms.content,
                device_timestamp: sms.timestamp,
            };
            tracing::info!(number = %message.number, "SMS received");
            let number = message.number.clone();
            if let Err(e) = shared.sink.save(message) {
                tracing::warn!(number = %number, error = %e, "failed to hand off received SMS");
            }
        }
        FrameKind::Status { status, message } => match status {
            StatusKind::Ready => tracing::info!(detail = %message, "device ready"),
            StatusKind::Info => tracing::info!(detail = %message, "device info"),
            StatusKind::Error => tracing::warn!(detail = %message, "device reported error"),
            StatusKind::Ok => tracing::debug!(detail = %message, "device ok"),
            StatusKind::Unrecognized => {
                tracing::debug!(detail = %message, "unrecognized device status")
            }
        },
        FrameKind::GsmState => tracing::debug!(power = ?frame.power, "radio state changed"),
        FrameKind::UnknownEvent => tracing::debug!("ignoring unknown device event"),
    }

    if let Some(power) = frame.power {
        shared.gate.update(power);
    }
}
