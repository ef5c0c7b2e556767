use std::io::Write;
use std::sync::Arc;

use anyhow::Context;
use sb_device::{open_connection, ChannelSink, SerialConnector};

use crate::config::Config;
use crate::shutdown_signal;

/// Stream received SMS to stdout, one JSON object per line, until shutdown.
pub async fn listen(config: &Config) -> anyhow::Result<()> {
    let (sink, mut received) = ChannelSink::new();
    let connector = Arc::new(SerialConnector::new(config.device.link_settings()));
    let conn = open_connection(&config.device, connector, Arc::new(sink))
        .await
        .context("opening device connection")?;

    tracing::info!(
        kind = %conn.kind(),
        endpoint = conn.endpoint().as_deref().unwrap_or("-"),
        "listening for SMS"
    );

    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            message = received.recv() => {
                let Some(message) = message else { break };
                let line = serde_json::to_string(&message)?;
                let mut stdout = std::io::stdout().lock();
                writeln!(stdout, "{line}")?;
                stdout.flush()?;
            }
            _ = &mut shutdown => break,
        }
    }

    conn.close().await;
    tracing::info!("shutdown complete");
    Ok(())
}
