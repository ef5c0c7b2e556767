use serde::{Deserialize, Serialize};

use sb_device::{DeviceConfig, DeviceMode};

/// Environment variable holding the config file path.
pub const CONFIG_ENV: &str = "SB_CONFIG";
/// Environment variable overriding `device.mode`.
pub const DEVICE_MODE_ENV: &str = "SB_DEVICE_MODE";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub device: DeviceConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Filter used when `RUST_LOG` is unset.
    #[serde(default = "d_level")]
    pub level: String,
    /// Emit JSON log lines instead of the compact format.
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: d_level(),
            json: false,
        }
    }
}

fn d_level() -> String {
    "info".into()
}

impl Config {
    /// Apply an `SB_DEVICE_MODE` value, if one was set.
    pub fn apply_mode_override(&mut self, mode: Option<&str>) -> anyhow::Result<()> {
        if let Some(raw) = mode {
            self.device.mode = raw
                .parse::<DeviceMode>()
                .map_err(|e| anyhow::anyhow!("{DEVICE_MODE_ENV}: {e}"))?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Vec<String> {
        let mut problems = self.device.validate();
        if self.logging.level.trim().is_empty() {
            problems.push("logging.level must not be empty".into());
        }
        problems
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_sections_default() {
        let cfg: Config = toml::from_str("").unwrap();
        assert_eq!(cfg.device.mode, DeviceMode::Auto);
        assert_eq!(cfg.logging.level, "info");
        assert!(!cfg.logging.json);
        assert!(cfg.validate().is_empty());
    }

    #[test]
    fn nested_tables_parse() {
        let cfg: Config = toml::from_str(
            r#"
[device]
mode = "/dev/ttyUSB0"
ready_timeout_secs = 10

[logging]
level = "debug,sb_device=trace"
json = true
"#,
        )
        .unwrap();
        assert_eq!(cfg.device.mode, DeviceMode::Port("/dev/ttyUSB0".into()));
        assert_eq!(cfg.device.ready_timeout_secs, 10);
        assert!(cfg.logging.json);
    }

    #[test]
    fn mode_override_wins() {
        let mut cfg: Config = toml::from_str("[device]\nmode = \"auto\"").unwrap();
        cfg.apply_mode_override(Some("mock")).unwrap();
        assert_eq!(cfg.device.mode, DeviceMode::Mock);

        cfg.apply_mode_override(None).unwrap();
        assert_eq!(cfg.device.mode, DeviceMode::Mock);

        let err = cfg.apply_mode_override(Some("")).unwrap_err();
        assert!(err.to_string().contains(DEVICE_MODE_ENV));
    }
}
