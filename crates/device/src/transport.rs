//! Transport layer.
//!
//! A [`Connector`] enumerates and opens endpoints; each open endpoint is a
//! [`Transport`]. The serial implementation runs the blocking `serialport`
//! calls on Tokio's blocking pool so that reads never stall the runtime.
//! Reads and writes go through separate cloned port handles, so a write
//! never waits behind a read that is sitting out its deadline.

use std::io::{Read, Write};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serialport::{DataBits, FlowControl, Parity, SerialPort, StopBits};

use crate::error::TransportError;

/// Trait for an open, byte-oriented link to the device.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Read whatever is available, waiting at most the read deadline.
    ///
    /// Returns [`TransportError::Timeout`] (or `Ok(0)`) when nothing
    /// arrived, [`TransportError::Fatal`] when the endpoint is gone.
    async fn read(&self, buf: &mut [u8]) -> Result<usize, TransportError>;

    /// Write all of `bytes`.
    async fn write(&self, bytes: &[u8]) -> Result<(), TransportError>;

    /// Release the endpoint. Reads and writes fail afterwards.
    async fn close(&self);

    /// Endpoint this transport was opened on.
    fn endpoint(&self) -> &str;
}

/// Opens transports and lists the endpoints the host exposes.
#[async_trait]
pub trait Connector: Send + Sync {
    /// All endpoints currently exposed by the host, in enumeration order.
    fn endpoints(&self) -> Result<Vec<String>, TransportError>;

    /// Open `endpoint` and wait `warm_up` before handing it out.
    async fn open(
        &self,
        endpoint: &str,
        warm_up: Duration,
    ) -> Result<Arc<dyn Transport>, TransportError>;
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Serial transport
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Fixed line settings: 8 data bits, no parity, one stop bit, no flow control.
#[derive(Debug, Clone)]
pub struct LinkSettings {
    pub baud_rate: u32,
    pub read_timeout: Duration,
}

impl Default for LinkSettings {
    fn default() -> Self {
        Self {
            baud_rate: 115_200,
            read_timeout: Duration::from_millis(100),
        }
    }
}

/// [`Connector`] for real serial ports.
#[derive(Debug, Clone, Default)]
pub struct SerialConnector {
    settings: LinkSettings,
}

impl SerialConnector {
    pub fn new(settings: LinkSettings) -> Self {
        Self { settings }
    }
}

#[async_trait]
impl Connector for SerialConnector {
    fn endpoints(&self) -> Result<Vec<String>, TransportError> {
        let ports = serialport::available_ports()
            .map_err(|e| TransportError::Enumerate(e.to_string()))?;
        Ok(ports.into_iter().map(|p| p.port_name).collect())
    }

    async fn open(
        &self,
        endpoint: &str,
        warm_up: Duration,
    ) -> Result<Arc<dyn Transport>, TransportError> {
        let open_err = |reason: String| TransportError::Open {
            endpoint: endpoint.to_string(),
            reason,
        };

        let path = endpoint.to_string();
        let settings = self.settings.clone();
        let (reader, writer) = tokio::task::spawn_blocking(move || {
            let port = serialport::new(&path, settings.baud_rate)
                .data_bits(DataBits::Eight)
                .parity(Parity::None)
                .stop_bits(StopBits::One)
                .flow_control(FlowControl::None)
                .timeout(settings.read_timeout)
                .open()?;
            let writer = port.try_clone()?;
            Ok::<_, serialport::Error>((port, writer))
        })
        .await
        .map_err(|e| open_err(format!("open task failed: {e}")))?
        .map_err(|e| open_err(e.to_string()))?;

        tracing::debug!(
            endpoint,
            warm_up_ms = warm_up.as_millis() as u64,
            "serial port opened, waiting for device boot"
        );
        tokio::time::sleep(warm_up).await;

        Ok(Arc::new(SerialTransport {
            endpoint: endpoint.to_string(),
            reader: Arc::new(Mutex::new(Some(reader))),
            writer: Arc::new(Mutex::new(Some(writer))),
        }))
    }
}

type PortSlot = Arc<Mutex<Option<Box<dyn SerialPort>>>>;

/// An open serial port.
pub struct SerialTransport {
    endpoint: String,
    reader: PortSlot,
    writer: PortSlot,
}

#[async_trait]
impl Transport for SerialTransport {
    async fn read(&self, buf: &mut [u8]) -> Result<usize, TransportError> {
        let reader = self.reader.clone();
        let len = buf.len();

        let (chunk, result) = tokio::task::spawn_blocking(move || {
            let mut chunk = vec![0u8; len];
            let result = match reader.lock().as_mut() {
                Some(port) => port.read(&mut chunk).map_err(TransportError::from_io),
                None => Err(TransportError::Fatal("port closed".into())),
            };
            (chunk, result)
        })
        .await
        .map_err(|e| TransportError::Fatal(format!("read task failed: {e}")))?;

        let n = result?;
        buf[..n].copy_from_slice(&chunk[..n]);
        Ok(n)
    }

    async fn write(&self, bytes: &[u8]) -> Result<(), TransportError> {
        let writer = self.writer.clone();
        let bytes = bytes.to_vec();

        tokio::task::spawn_blocking(move || match writer.lock().as_mut() {
            Some(port) => {
                port.write_all(&bytes)?;
                port.flush()
            }
            None => Err(std::io::Error::new(
                std::io::ErrorKind::NotConnected,
                "port closed",
            )),
        })
        .await
        .map_err(|e| TransportError::Fatal(format!("write task failed: {e}")))?
        .map_err(|e| TransportError::Fatal(e.to_string()))
    }

    async fn close(&self) {
        let reader = self.reader.clone();
        let writer = self.writer.clone();
        // Waits out an in-flight read (bounded by the read deadline).
        let result = tokio::task::spawn_blocking(move || {
            writer.lock().take();
            reader.lock().take();
        })
        .await;
        if let Err(e) = result {
            tracing::warn!(endpoint = %self.endpoint, error = %e, "error closing serial port");
        }
    }

    fn endpoint(&self) -> &str {
        &self.endpoint
    }
}
