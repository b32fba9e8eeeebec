use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    pub target: TargetConfig,
    #[serde(default)]
    pub poll: PollConfig,
    #[serde(default)]
    pub mock: MockConfig,
}

impl Config {
    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        Ok(config)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetConfig {
    /// Base URL of the service; endpoints live under `/api/`
    pub base_url: String,
    /// Optional request timeout in milliseconds (transport default when unset)
    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

impl Default for TargetConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:3000".to_string(),
            timeout_ms: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollConfig {
    /// Stats polling period in milliseconds
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,
    /// Return to idle when a tick reports the server-side load test has ended
    #[serde(default)]
    pub follow_server_idle: bool,
}

fn default_interval_ms() -> u64 {
    1000
}

impl PollConfig {
    pub fn period(&self) -> Duration {
        Duration::from_millis(self.interval_ms.max(1))
    }
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_interval_ms(),
            follow_server_idle: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MockConfig {
    /// Simulated service latency in milliseconds
    #[serde(default = "default_delay_ms")]
    pub delay_ms: u64,
}

fn default_delay_ms() -> u64 {
    50
}

impl Default for MockConfig {
    fn default() -> Self {
        Self {
            delay_ms: default_delay_ms(),
        }
    }
}
