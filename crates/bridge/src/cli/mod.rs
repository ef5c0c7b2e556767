pub mod config;
pub mod listen;
pub mod ports;
pub mod send;

use std::path::Path;

use anyhow::Context;
use clap::{Parser, Subcommand};

use crate::config::{Config, CONFIG_ENV, DEVICE_MODE_ENV};

/// sb-bridge: SMS modem board bridge.
#[derive(Debug, Parser)]
#[command(name = "sb-bridge", version, about)]
pub struct Cli {
    /// Log as JSON lines instead of the compact format.
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Connect and print received SMS as JSON lines (default).
    Listen,
    /// Send one SMS and exit.
    Send {
        /// Destination phone number.
        number: String,
        /// Message text.
        content: String,
    },
    /// List serial endpoints, marking likely boards.
    Ports {
        /// Also run discovery and print the endpoint that answers.
        #[arg(long)]
        probe: bool,
    },
    /// Configuration utilities.
    #[command(subcommand)]
    Config(ConfigCommand),
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Parse the config file and report any errors.
    Validate,
    /// Dump the resolved configuration (with defaults) as TOML.
    Show,
}

// ── Config loading helper ─────────────────────────────────────────────

/// Load the configuration from the path in `SB_CONFIG` (or `config.toml`)
/// and apply `SB_DEVICE_MODE`. Returns the config and the path used.
pub fn load_config() -> anyhow::Result<(Config, String)> {
    let config_path = std::env::var(CONFIG_ENV).unwrap_or_else(|_| "config.toml".into());
    let mode = std::env::var(DEVICE_MODE_ENV).ok();
    let config = load_config_from(&config_path, mode.as_deref())?;
    Ok((config, config_path))
}

/// Read `path` (defaults when it does not exist) and apply a mode override.
pub fn load_config_from(path: &str, mode_override: Option<&str>) -> anyhow::Result<Config> {
    let mut config = if Path::new(path).exists() {
        let raw = std::fs::read_to_string(path).with_context(|| format!("reading {path}"))?;
        toml::from_str(&raw).with_context(|| format!("parsing {path}"))?
    } else {
        Config::default()
    };
    config.apply_mode_override(mode_override)?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    use sb_device::DeviceMode;

    #[test]
    fn no_subcommand_means_listen() {
        let cli = Cli::try_parse_from(["sb-bridge"]).unwrap();
        assert!(cli.command.is_none());
        assert!(!cli.json);
    }

    #[test]
    fn send_takes_number_and_content() {
        let args = ["sb-bridge", "send", "+15550001111", "hello there", "--json"];
        let cli = Cli::try_parse_from(args).unwrap();
        assert!(cli.json);
        match cli.command {
            Some(Command::Send { number, content }) => {
                assert_eq!(number, "+15550001111");
                assert_eq!(content, "hello there");
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn send_requires_content() {
        assert!(Cli::try_parse_from(["sb-bridge", "send", "+15550001111"]).is_err());
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.toml");
        let cfg = load_config_from(path.to_str().unwrap(), None).unwrap();
        assert_eq!(cfg.device.mode, DeviceMode::Auto);
    }

    #[test]
    fn file_is_read_and_override_applied() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[device]\nmode = \"COM7\"\nbaud_rate = 57600").unwrap();
        let path = file.path().to_str().unwrap();

        let cfg = load_config_from(path, None).unwrap();
        assert_eq!(cfg.device.mode, DeviceMode::Port("COM7".into()));
        assert_eq!(cfg.device.baud_rate, 57600);

        let cfg = load_config_from(path, Some("mock")).unwrap();
        assert_eq!(cfg.device.mode, DeviceMode::Mock);
    }

    #[test]
    fn parse_errors_name_the_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[device\nmode = ").unwrap();
        let path = file.path().to_str().unwrap().to_string();

        let err = load_config_from(&path, None).unwrap_err();
        assert!(err.to_string().contains(&path));
    }
}
