//! Endpoint discovery: find the port the board is attached to.
//!
//! 1. Enumerate endpoints via the [`Connector`]
//! 2. Probe every endpoint whose name looks like a USB serial device, in
//!    enumeration order: open, send `ping`, wait for any reply
//! 3. If none answers, probe the first enumerated endpoint of any kind
//!
//! Every probe closes its transport before moving on.

use std::time::Duration;

use sb_protocol::Command;

use crate::error::{DiscoveryError, TransportError};
use crate::transport::{Connector, Transport};

/// Name fragments of typical USB serial devices (Linux, Windows, macOS).
pub const DEFAULT_PORT_PATTERNS: &[&str] = &[
    "/dev/ttyACM",
    "/dev/ttyUSB",
    "COM",
    "/dev/cu.usb",
    "/dev/tty.usb",
];

#[derive(Debug, Clone)]
pub struct Discovery {
    /// An endpoint is a candidate when its name contains any of these.
    pub patterns: Vec<String>,
    /// Boot delay after opening a probed endpoint.
    pub warm_up: Duration,
    /// How long to wait for a reply to the probe `ping`.
    pub probe_window: Duration,
}

impl Default for Discovery {
    fn default() -> Self {
        Self {
            patterns: DEFAULT_PORT_PATTERNS.iter().map(|p| p.to_string()).collect(),
            warm_up: Duration::from_millis(500),
            probe_window: Duration::from_secs(2),
        }
    }
}

impl Discovery {
    pub fn is_candidate(&self, endpoint: &str) -> bool {
        self.patterns.iter().any(|p| endpoint.contains(p.as_str()))
    }

    /// Split endpoints into (candidates, others), keeping enumeration order.
    pub fn partition(&self, endpoints: &[String]) -> (Vec<String>, Vec<String>) {
        endpoints
            .iter()
            .cloned()
            .partition(|e| self.is_candidate(e))
    }

    /// Find the first endpoint with a live device behind it.
    pub async fn discover(&self, connector: &dyn Connector) -> Result<String, DiscoveryError> {
        let endpoints = connector.endpoints()?;
        let Some(first) = endpoints.first().cloned() else {
            return Err(DiscoveryError::NoEndpoints);
        };

        let (candidates, _) = self.partition(&endpoints);
        for endpoint in &candidates {
            tracing::info!(endpoint = %endpoint, "probing candidate device");
            if self.probe(connector, endpoint).await {
                return Ok(endpoint.clone());
            }
        }

        if !candidates.contains(&first) {
            tracing::info!(
                endpoint = %first,
                "no candidate answered, probing first available endpoint"
            );
            if self.probe(connector, &first).await {
                return Ok(first);
            }
        }

        Err(DiscoveryError::NotFound { tried: endpoints })
    }

    /// Open `endpoint`, send a ping and report whether anything came back.
    pub async fn probe(&self, connector: &dyn Connector, endpoint: &str) -> bool {
        let transport = match connector.open(endpoint, self.warm_up).await {
            Ok(t) => t,
            Err(e) => {
                tracing::debug!(endpoint, error = %e, "probe: open failed");
                return false;
            }
        };

        let replied = self.ping_and_listen(transport.as_ref()).await;
        transport.close().await;
        replied
    }

    async fn ping_and_listen(&self, transport: &dyn Transport) -> bool {
        let ping = match Command::Ping.encode_line() {
            Ok(line) => line,
            Err(e) => {
                tracing::error!(error = %e, "failed to encode ping");
                return false;
            }
        };
        if let Err(e) = transport.write(&ping).await {
            tracing::debug!(endpoint = transport.endpoint(), error = %e, "probe: write failed");
            return false;
        }

        let listen = async {
            let mut buf = [0u8; 256];
            loop {
                match transport.read(&mut buf).await {
                    Ok(0) | Err(TransportError::Timeout) => continue,
                    Ok(n) => {
                        tracing::info!(
                            endpoint = transport.endpoint(),
                            reply = %String::from_utf8_lossy(&buf[..n]).trim(),
                            "device answered probe"
                        );
                        return true;
                    }
                    Err(e) => {
                        tracing::debug!(
                            endpoint = transport.endpoint(),
                            error = %e,
                            "probe: read failed"
                        );
                        return false;
                    }
                }
            }
        };

        tokio::time::timeout(self.probe_window, listen)
            .await
            .unwrap_or(false)
    }
}
