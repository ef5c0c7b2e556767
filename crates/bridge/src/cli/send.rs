use std::sync::Arc;

use anyhow::Context;
use sb_device::{open_connection, ConnectionKind, DeviceMode, NullSink, SerialConnector};

use crate::config::Config;

/// Send a single SMS, then release the device.
///
/// Fails instead of "sending" through the mock when the configured board
/// could not be reached.
pub async fn send(config: &Config, number: &str, content: &str) -> anyhow::Result<()> {
    let connector = Arc::new(SerialConnector::new(config.device.link_settings()));
    let conn = open_connection(&config.device, connector, Arc::new(NullSink))
        .await
        .context("opening device connection")?;

    if conn.kind() == ConnectionKind::Mock && config.device.mode != DeviceMode::Mock {
        conn.close().await;
        anyhow::bail!("no device available (mode: {})", config.device.mode);
    }

    let result = conn.send(number, content).await;
    conn.close().await;
    result.with_context(|| format!("sending SMS to {number}"))?;

    println!("sent to {number}");
    Ok(())
}
