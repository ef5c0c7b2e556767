//! Composition root: turn a [`DeviceConfig`] into a connection.

use std::sync::Arc;

use crate::builder::SessionBuilder;
use crate::config::{DeviceConfig, DeviceMode};
use crate::connection::SmsConnection;
use crate::error::ConfigError;
use crate::mock::MockSession;
use crate::sink::MessageSink;
use crate::transport::Connector;

/// Open the connection `config.mode` asks for.
///
/// - `mock`: a [`MockSession`]
/// - `auto`: discover the board, then connect with discovery re-run on every
///   reconnect
/// - a path: connect to it, reconnecting to the same path
///
/// When discovery or the initial open fails the service still starts, on a
/// [`MockSession`]. Only an invalid config is an error.
pub async fn open_connection(
    config: &DeviceConfig,
    connector: Arc<dyn Connector>,
    sink: Arc<dyn MessageSink>,
) -> Result<Arc<dyn SmsConnection>, ConfigError> {
    config.check()?;

    let (endpoint, auto_discover) = match &config.mode {
        DeviceMode::Mock => {
            tracing::info!("using mock device connection");
            return Ok(mock(config));
        }
        DeviceMode::Auto => match config.discovery().discover(connector.as_ref()).await {
            Ok(endpoint) => {
                tracing::info!(endpoint = %endpoint, "discovered device");
                (endpoint, true)
            }
            Err(e) => {
                tracing::warn!(error = %e, "device discovery failed, falling back to mock");
                return Ok(mock(config));
            }
        },
        DeviceMode::Port(path) => (path.clone(), false),
    };

    let connected = SessionBuilder::from_config(config)
        .endpoint(endpoint.as_str())
        .auto_discover(auto_discover)
        .connector(connector)
        .sink(sink)
        .connect()
        .await;

    match connected {
        Ok(session) => Ok(Arc::new(session)),
        Err(e) => {
            tracing::warn!(
                endpoint = %endpoint,
                error = %e,
                "failed to connect to device, falling back to mock"
            );
            Ok(mock(config))
        }
    }
}

fn mock(config: &DeviceConfig) -> Arc<dyn SmsConnection> {
    Arc::new(MockSession::new(config.mock_send_delay()))
}
