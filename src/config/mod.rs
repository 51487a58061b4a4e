//! # Configuration Management Module
//!
//! Typed TOML configuration for the proxy. Every routing constant has a default
//! matching the protocol behaviour expected by the other proxies on the mesh, so a
//! minimal file only needs the `[node]` section.
//!
//! ## Configuration File Format
//!
//! ```toml
//! [node]
//! callsign = "DK5EN-99"
//! admin_callsign = "DK5EN"
//! group_responses_enabled = false
//!
//! [transport]
//! bind = "0.0.0.0:1799"
//! node_addr = "192.168.68.69:1799"
//!
//! [logging]
//! level = "info"
//! ```
//!
//! ## Usage
//!
//! ```rust,no_run
//! use mcrouter::config::Config;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load("config.toml").await?;
//!     println!("Node: {}", config.node.callsign);
//!     Ok(())
//! }
//! ```

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::fs;

use crate::validation::{base_callsign, is_callsign};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub node: NodeConfig,
    #[serde(default)]
    pub transport: TransportConfig,
    #[serde(default)]
    pub router: RouterTuning,
    #[serde(default)]
    pub weather: WeatherConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Identity of this proxy instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Own callsign including SSID, e.g. `DK5EN-99`.
    pub callsign: String,
    /// Base callsign (no SSID) allowed to run admin commands.
    pub admin_callsign: String,
    /// Answer commands addressed to a group when they target this node.
    /// Toggled at runtime with `!group on|off`; admins are always answered.
    #[serde(default)]
    pub group_responses_enabled: bool,
    /// Text returned by `!userinfo`.
    #[serde(default)]
    pub userinfo: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportConfig {
    /// Local UDP address the node pushes JSON frames to.
    pub bind: String,
    /// UDP address of the MeshCom node that accepts outbound frames.
    pub node_addr: String,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:1799".to_string(),
            node_addr: "127.0.0.1:1799".to_string(),
        }
    }
}

/// Timing and sizing knobs for the routing core. Defaults are the protocol values;
/// changing them makes this proxy behave differently from its peers on the mesh.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RouterTuning {
    pub dedup_window_secs: u64,
    pub short_cooldown_secs: u64,
    pub long_cooldown_secs: u64,
    pub abuse_window_secs: u64,
    pub abuse_max_failures: usize,
    pub abuse_block_secs: u64,
    pub frame_limit_bytes: usize,
    pub max_frames: usize,
    pub frame_gap_secs: u64,
    pub min_send_gap_ms: u64,
    pub scheduler_max_queue: usize,
    pub ping_ack_timeout_secs: u64,
    pub ping_probe_gap_secs: u64,
    pub ping_test_ceiling_secs: u64,
    pub heard_log_capacity: usize,
}

impl Default for RouterTuning {
    fn default() -> Self {
        Self {
            dedup_window_secs: 300,
            short_cooldown_secs: 5,
            long_cooldown_secs: 300,
            abuse_window_secs: 300,
            abuse_max_failures: 3,
            abuse_block_secs: 25 * 60,
            frame_limit_bytes: 140,
            max_frames: 3,
            frame_gap_secs: 12,
            min_send_gap_ms: 0,
            scheduler_max_queue: 256,
            ping_ack_timeout_secs: 30,
            ping_probe_gap_secs: 20,
            ping_test_ceiling_secs: 300,
            heard_log_capacity: 2000,
        }
    }
}

impl RouterTuning {
    pub fn dedup_window(&self) -> Duration {
        Duration::from_secs(self.dedup_window_secs)
    }
    pub fn short_cooldown(&self) -> Duration {
        Duration::from_secs(self.short_cooldown_secs)
    }
    pub fn long_cooldown(&self) -> Duration {
        Duration::from_secs(self.long_cooldown_secs)
    }
    pub fn abuse_window(&self) -> Duration {
        Duration::from_secs(self.abuse_window_secs)
    }
    pub fn abuse_block(&self) -> Duration {
        Duration::from_secs(self.abuse_block_secs)
    }
    pub fn frame_gap(&self) -> Duration {
        Duration::from_secs(self.frame_gap_secs)
    }
    pub fn ping_ack_timeout(&self) -> Duration {
        Duration::from_secs(self.ping_ack_timeout_secs)
    }
    pub fn ping_probe_gap(&self) -> Duration {
        Duration::from_secs(self.ping_probe_gap_secs)
    }
    pub fn ping_test_ceiling(&self) -> Duration {
        Duration::from_secs(self.ping_test_ceiling_secs)
    }
}

fn default_weather_endpoint() -> String {
    "https://api.openweathermap.org/data/2.5/weather".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeatherConfig {
    /// OpenWeatherMap API key
    pub api_key: String,
    /// Current-weather API URL
    #[serde(default = "default_weather_endpoint")]
    pub endpoint: String,
    /// Location passed to the `q=` parameter (city name, optionally `,CC`)
    pub location: String,
    /// Refresh interval for the cached report, in minutes
    pub refresh_minutes: u32,
    /// Request timeout in seconds
    pub timeout_seconds: u32,
    pub enabled: bool,
}

impl Default for WeatherConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            endpoint: default_weather_endpoint(),
            location: "Munich,DE".to_string(),
            refresh_minutes: 15,
            timeout_seconds: 5,
            enabled: false, // Disabled by default until API key is provided
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub file: Option<String>,
    #[serde(default)]
    pub security_file: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: Some("mcrouter.log".to_string()),
            security_file: Some("mcrouter-security.log".to_string()),
        }
    }
}

impl Config {
    /// Load configuration from a file
    pub async fn load(path: &str) -> Result<Self> {
        let content = fs::read_to_string(path)
            .await
            .map_err(|e| anyhow!("Failed to read config file {}: {}", path, e))?;

        let mut config: Config = toml::from_str(&content)
            .map_err(|e| anyhow!("Failed to parse config file {}: {}", path, e))?;
        config.normalize();
        config.validate()?;
        Ok(config)
    }

    /// Create a default configuration file
    pub async fn create_default(path: &str) -> Result<()> {
        let config = Config::default();
        let content = toml::to_string_pretty(&config)
            .map_err(|e| anyhow!("Failed to serialize default config: {}", e))?;

        fs::write(path, content)
            .await
            .map_err(|e| anyhow!("Failed to write config file {}: {}", path, e))?;

        Ok(())
    }

    /// Uppercase identities so later comparisons can be plain string equality.
    pub fn normalize(&mut self) {
        self.node.callsign = self.node.callsign.trim().to_uppercase();
        self.node.admin_callsign = base_callsign(&self.node.admin_callsign);
    }

    pub fn validate(&self) -> Result<()> {
        if !is_callsign(&self.node.callsign) {
            return Err(anyhow!("node.callsign '{}' is not a valid callsign", self.node.callsign));
        }
        if self.node.admin_callsign.is_empty() {
            return Err(anyhow!("node.admin_callsign must not be empty"));
        }
        if self.router.frame_limit_bytes < 20 {
            return Err(anyhow!("router.frame_limit_bytes must be at least 20"));
        }
        if self.router.max_frames == 0 || self.router.max_frames > 9 {
            return Err(anyhow!("router.max_frames must be between 1 and 9"));
        }
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            node: NodeConfig {
                callsign: "N0CALL-1".to_string(),
                admin_callsign: "N0CALL".to_string(),
                group_responses_enabled: false,
                userinfo: String::new(),
            },
            transport: TransportConfig::default(),
            router: RouterTuning::default(),
            weather: WeatherConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}
