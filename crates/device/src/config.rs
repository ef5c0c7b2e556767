use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::discovery::{Discovery, DEFAULT_PORT_PATTERNS};
use crate::error::ConfigError;
use crate::transport::LinkSettings;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Device mode
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// How to reach the board.
///
/// Serialized as a plain string: `"auto"`, `"mock"`, or an endpoint path.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum DeviceMode {
    /// Run discovery; fall back to the mock when nothing answers.
    #[default]
    Auto,
    /// No hardware.
    Mock,
    /// A fixed endpoint such as `/dev/ttyACM0` or `COM3`.
    Port(String),
}

impl FromStr for DeviceMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        match s.to_ascii_lowercase().as_str() {
            "" => Err("device mode must not be empty".into()),
            "auto" => Ok(Self::Auto),
            "mock" => Ok(Self::Mock),
            _ => Ok(Self::Port(s.to_string())),
        }
    }
}

impl TryFrom<String> for DeviceMode {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<DeviceMode> for String {
    fn from(mode: DeviceMode) -> Self {
        mode.to_string()
    }
}

impl fmt::Display for DeviceMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Auto => f.write_str("auto"),
            Self::Mock => f.write_str("mock"),
            Self::Port(p) => f.write_str(p),
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Device config
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceConfig {
    #[serde(default)]
    pub mode: DeviceMode,
    #[serde(default = "d_115200")]
    pub baud_rate: u32,
    #[serde(default = "d_100")]
    pub read_timeout_ms: u64,
    /// Boot delay after opening the session's port.
    #[serde(default = "d_2000")]
    pub warm_up_ms: u64,
    /// Boot delay after opening a port during discovery.
    #[serde(default = "d_500")]
    pub probe_warm_up_ms: u64,
    #[serde(default = "d_2000")]
    pub probe_window_ms: u64,
    #[serde(default = "d_5000")]
    pub retry_interval_ms: u64,
    #[serde(default = "d_30")]
    pub ready_timeout_secs: u64,
    #[serde(default = "d_100")]
    pub mock_send_delay_ms: u64,
    #[serde(default = "d_4096")]
    pub max_frame_bytes: usize,
    #[serde(default = "d_patterns")]
    pub port_patterns: Vec<String>,
    /// Reopen the link automatically after it is lost.
    #[serde(default = "d_true")]
    pub reconnect: bool,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            mode: DeviceMode::Auto,
            baud_rate: 115_200,
            read_timeout_ms: 100,
            warm_up_ms: 2000,
            probe_warm_up_ms: 500,
            probe_window_ms: 2000,
            retry_interval_ms: 5000,
            ready_timeout_secs: 30,
            mock_send_delay_ms: 100,
            max_frame_bytes: 4096,
            port_patterns: d_patterns(),
            reconnect: true,
        }
    }
}

impl DeviceConfig {
    pub fn link_settings(&self) -> LinkSettings {
        LinkSettings {
            baud_rate: self.baud_rate,
            read_timeout: self.read_timeout(),
        }
    }

    pub fn discovery(&self) -> Discovery {
        Discovery {
            patterns: self.port_patterns.clone(),
            warm_up: Duration::from_millis(self.probe_warm_up_ms),
            probe_window: Duration::from_millis(self.probe_window_ms),
        }
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    pub fn warm_up(&self) -> Duration {
        Duration::from_millis(self.warm_up_ms)
    }

    pub fn retry_interval(&self) -> Duration {
        Duration::from_millis(self.retry_interval_ms)
    }

    pub fn ready_timeout(&self) -> Duration {
        Duration::from_secs(self.ready_timeout_secs)
    }

    pub fn mock_send_delay(&self) -> Duration {
        Duration::from_millis(self.mock_send_delay_ms)
    }

    /// Problems that would make a session misbehave. Empty when valid.
    pub fn validate(&self) -> Vec<String> {
        let mut problems = Vec::new();
        if self.baud_rate == 0 {
            problems.push("device.baud_rate must be positive".to_string());
        }
        if self.read_timeout_ms == 0 {
            problems.push("device.read_timeout_ms must be positive".to_string());
        }
        if self.retry_interval_ms == 0 {
            problems.push("device.retry_interval_ms must be positive".to_string());
        }
        if self.max_frame_bytes < 64 {
            problems.push("device.max_frame_bytes must be at least 64".to_string());
        }
        if self.port_patterns.iter().any(|p| p.is_empty()) {
            problems.push("device.port_patterns must not contain empty patterns".to_string());
        }
        problems
    }

    /// [`validate`](Self::validate) as a `Result`.
    pub fn check(&self) -> Result<(), ConfigError> {
        let problems = self.validate();
        if problems.is_empty() {
            Ok(())
        } else {
            Err(ConfigError(problems))
        }
    }
}

fn d_115200() -> u32 {
    115_200
}
fn d_100() -> u64 {
    100
}
fn d_500() -> u64 {
    500
}
fn d_2000() -> u64 {
    2000
}
fn d_5000() -> u64 {
    5000
}
fn d_30() -> u64 {
    30
}
fn d_4096() -> usize {
    4096
}
fn d_true() -> bool {
    true
}
fn d_patterns() -> Vec<String> {
    DEFAULT_PORT_PATTERNS.iter().map(|p| p.to_string()).collect()
}
