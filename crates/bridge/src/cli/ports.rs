use sb_device::{Connector, SerialConnector};

use crate::config::Config;

/// Print every endpoint; `*` marks names that look like a USB board.
pub async fn ports(config: &Config, probe: bool) -> anyhow::Result<()> {
    let connector = SerialConnector::new(config.device.link_settings());
    let discovery = config.device.discovery();

    let endpoints = connector.endpoints()?;
    if endpoints.is_empty() {
        println!("no serial endpoints found");
        return Ok(());
    }
    for endpoint in &endpoints {
        let mark = if discovery.is_candidate(endpoint) { '*' } else { ' ' };
        println!("{mark} {endpoint}");
    }

    if probe {
        match discovery.discover(&connector).await {
            Ok(endpoint) => println!("\ndevice answered on {endpoint}"),
            Err(e) => {
                println!("\n{e}");
                std::process::exit(1);
            }
        }
    }
    Ok(())
}
