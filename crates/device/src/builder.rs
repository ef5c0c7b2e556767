//! Builder pattern for constructing a [`DeviceSession`].

use std::sync::Arc;
use std::time::Duration;

use crate::config::DeviceConfig;
use crate::discovery::Discovery;
use crate::error::SessionError;
use crate::session::{DeviceSession, SessionOptions};
use crate::sink::{MessageSink, NullSink};
use crate::transport::{Connector, SerialConnector};

/// Fluent builder for [`DeviceSession`].
///
/// # Example
///
/// ```rust,no_run
/// # async fn demo() -> Result<(), sb_device::SessionError> {
/// use std::sync::Arc;
/// use sb_device::{ChannelSink, SessionBuilder};
///
/// let (sink, mut received) = ChannelSink::new();
/// let session = SessionBuilder::new()
///     .endpoint("/dev/ttyACM0")
///     .ready_timeout(std::time::Duration::from_secs(30))
///     .sink(Arc::new(sink))
///     .connect()
///     .await?;
///
/// session.send("+15550001111", "hello").await?;
/// # Ok(())
/// # }
/// ```
pub struct SessionBuilder {
    endpoint: Option<String>,
    auto_discover: bool,
    discovery: Discovery,
    warm_up: Duration,
    read_timeout: Duration,
    retry_interval: Duration,
    ready_timeout: Duration,
    max_frame_bytes: usize,
    reconnect: bool,
    connector: Option<Arc<dyn Connector>>,
    sink: Option<Arc<dyn MessageSink>>,
}

impl SessionBuilder {
    pub fn new() -> Self {
        Self::from_config(&DeviceConfig::default())
    }

    /// Seed timings, patterns and the serial connector from `config`.
    ///
    /// The endpoint is not taken from `config.mode`; resolving the mode is
    /// the job of [`open_connection`](crate::open_connection).
    pub fn from_config(config: &DeviceConfig) -> Self {
        Self {
            endpoint: None,
            auto_discover: false,
            discovery: config.discovery(),
            warm_up: config.warm_up(),
            read_timeout: config.read_timeout(),
            retry_interval: config.retry_interval(),
            ready_timeout: config.ready_timeout(),
            max_frame_bytes: config.max_frame_bytes,
            reconnect: config.reconnect,
            connector: Some(Arc::new(SerialConnector::new(config.link_settings()))),
            sink: None,
        }
    }

    // ── Required ─────────────────────────────────────────────────────

    /// Endpoint to open (e.g. `/dev/ttyACM0`, `COM3`).
    pub fn endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    // ── Collaborators ────────────────────────────────────────────────

    /// Replace the serial connector (tests, alternative transports).
    pub fn connector(mut self, connector: Arc<dyn Connector>) -> Self {
        self.connector = Some(connector);
        self
    }

    /// Where received SMS go. Defaults to [`NullSink`].
    pub fn sink(mut self, sink: Arc<dyn MessageSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    // ── Behavior ─────────────────────────────────────────────────────

    /// Re-run discovery on reconnect instead of reusing the endpoint.
    pub fn auto_discover(mut self, on: bool) -> Self {
        self.auto_discover = on;
        self
    }

    pub fn discovery(mut self, discovery: Discovery) -> Self {
        self.discovery = discovery;
        self
    }

    /// Boot delay after opening the port (default 2s).
    pub fn warm_up(mut self, d: Duration) -> Self {
        self.warm_up = d;
        self
    }

    /// Idle interval of the read loop while the link is down (default 100ms).
    pub fn read_timeout(mut self, d: Duration) -> Self {
        self.read_timeout = d;
        self
    }

    /// Delay between reconnect attempts (default 5s).
    pub fn retry_interval(mut self, d: Duration) -> Self {
        self.retry_interval = d;
        self
    }

    /// How long `send` waits for the radio module (default 30s).
    pub fn ready_timeout(mut self, d: Duration) -> Self {
        self.ready_timeout = d;
        self
    }

    pub fn max_frame_bytes(mut self, n: usize) -> Self {
        self.max_frame_bytes = n;
        self
    }

    /// Disable to leave the session disconnected after a transport loss.
    pub fn reconnect(mut self, on: bool) -> Self {
        self.reconnect = on;
        self
    }

    /// Validate the settings without opening anything.
    pub fn build(&self) -> Result<SessionOptions, SessionError> {
        let endpoint = match self.endpoint.as_deref().map(str::trim) {
            Some(e) if !e.is_empty() => e.to_string(),
            _ => return Err(SessionError::Config("endpoint is required".into())),
        };
        if self.read_timeout.is_zero() {
            return Err(SessionError::Config("read_timeout must be positive".into()));
        }
        if self.retry_interval.is_zero() {
            return Err(SessionError::Config("retry_interval must be positive".into()));
        }

        Ok(SessionOptions {
            endpoint,
            auto_discover: self.auto_discover,
            discovery: self.discovery.clone(),
            warm_up: self.warm_up,
            read_timeout: self.read_timeout,
            retry_interval: self.retry_interval,
            ready_timeout: self.ready_timeout,
            max_frame_bytes: self.max_frame_bytes,
            reconnect: self.reconnect,
        })
    }

    /// Open the endpoint and start the session.
    pub async fn connect(self) -> Result<DeviceSession, SessionError> {
        let options = self.build()?;
        let connector = self
            .connector
            .ok_or_else(|| SessionError::Config("connector is required".into()))?;
        let sink = self.sink.unwrap_or_else(|| Arc::new(NullSink));
        DeviceSession::start(options, connector, sink).await
    }
}

impl Default for SessionBuilder {
    fn default() -> Self {
        Self::new()
    }
}
