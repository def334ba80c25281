//! # Configuration Management Module
//!
//! TOML configuration for the daemon and the command-line tools.
//!
//! ## Configuration Structure
//!
//! - [`NcpConfig`] - serial link and task engine tuning
//! - [`ScanConfig`] - defaults for `ncpd scan`
//! - [`LoggingConfig`] - log level and optional log file
//!
//! ## Usage
//!
//! ```rust,no_run
//! use ncpd::config::Config;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     Config::create_default("ncpd.toml").await?;
//!     let config = Config::load("ncpd.toml").await?;
//!     println!("NCP port: {}", config.ncp.port);
//!     Ok(())
//! }
//! ```
//!
//! ## Configuration File Format
//!
//! ```toml
//! [ncp]
//! port = "/dev/ttyACM0"
//! baud_rate = 115200
//! interface_id = 0
//! property_timeout_ms = 5000
//! scan_timeout_ms = 30000
//!
//! [scan]
//! channels = [11, 12, 13, 14, 15, 16, 17, 18, 19, 20, 21, 22, 23, 24, 25, 26]
//! delay_ms = 120
//!
//! [logging]
//! level = "info"
//! file = "ncpd.log"
//! ```
//!
//! Timing values left out of the `[ncp]` table fall back to the engine
//! defaults; values that are present are clamped to sane minimums by
//! [`NcpConfig::tuning`] and [`NcpConfig::driver_tuning`].

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::fs;

use crate::ncp::instance::{
    InstanceTuning, DEFAULT_OUTBOUND_HIGH_WATER, DEFAULT_PROPERTY_TIMEOUT, DEFAULT_SCAN_TIMEOUT,
};
use crate::ncp::DriverTuning;

const MIN_TASK_TIMEOUT_MS: u64 = 100;
const MIN_POLL_INTERVAL_MS: u64 = 1;
const MIN_READ_TIMEOUT_MS: u64 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub ncp: NcpConfig,
    #[serde(default)]
    pub scan: ScanConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NcpConfig {
    pub port: String,
    pub baud_rate: u32,
    /// Spinel interface id (0-3) this daemon talks to.
    #[serde(default)]
    pub interface_id: u8,
    /// Serial read timeout (ms). Bounds how long one poll may block.
    #[serde(default)]
    pub read_timeout_ms: Option<u64>,
    /// How often the driver polls the transport (ms).
    #[serde(default)]
    pub poll_interval_ms: Option<u64>,
    #[serde(default)]
    pub property_timeout_ms: Option<u64>,
    #[serde(default)]
    pub scan_timeout_ms: Option<u64>,
    /// Outbound queue depth that triggers a warning. The queue never blocks.
    #[serde(default)]
    pub outbound_high_water: Option<usize>,
    /// Interval (ms) for periodic stats logging.
    #[serde(default)]
    pub stats_interval_ms: Option<u64>,
    /// Exit at startup when the port cannot be opened. When false the daemon
    /// starts with the link down and keeps trying to open the port.
    #[serde(default)]
    pub require_device_at_startup: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanConfig {
    #[serde(default = "default_scan_channels")]
    pub channels: Vec<u8>,
    #[serde(default = "default_scan_delay_ms")]
    pub delay_ms: u32,
}

fn default_scan_channels() -> Vec<u8> {
    (11..=26).collect()
}

fn default_scan_delay_ms() -> u32 {
    120
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            channels: default_scan_channels(),
            delay_ms: default_scan_delay_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub file: Option<String>,
}

impl NcpConfig {
    /// Engine timeouts and queue limits, with defaults and lower bounds applied.
    pub fn tuning(&self) -> InstanceTuning {
        let ms = |v: Option<u64>, default: Duration| {
            v.map(|v| Duration::from_millis(v.max(MIN_TASK_TIMEOUT_MS)))
                .unwrap_or(default)
        };
        InstanceTuning {
            property_timeout: ms(self.property_timeout_ms, DEFAULT_PROPERTY_TIMEOUT),
            scan_timeout: ms(self.scan_timeout_ms, DEFAULT_SCAN_TIMEOUT),
            outbound_high_water: self
                .outbound_high_water
                .unwrap_or(DEFAULT_OUTBOUND_HIGH_WATER)
                .max(1),
        }
    }

    pub fn driver_tuning(&self) -> DriverTuning {
        let defaults = DriverTuning::default();
        DriverTuning {
            poll_interval: self
                .poll_interval_ms
                .map(|v| Duration::from_millis(v.max(MIN_POLL_INTERVAL_MS)))
                .unwrap_or(defaults.poll_interval),
            // zero would make tokio's interval panic
            stats_interval: self
                .stats_interval_ms
                .filter(|v| *v > 0)
                .map(Duration::from_millis)
                .unwrap_or(defaults.stats_interval),
            ..defaults
        }
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms.unwrap_or(20).max(MIN_READ_TIMEOUT_MS))
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub async fn load(path: &str) -> Result<Self> {
        let content = fs::read_to_string(path)
            .await
            .map_err(|e| anyhow!("Failed to read config file {}: {}", path, e))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| anyhow!("Failed to parse config file {}: {}", path, e))?;

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

    pub fn validate(&self) -> Result<()> {
        if self.ncp.port.trim().is_empty() {
            return Err(anyhow!("ncp.port must not be empty"));
        }
        if self.ncp.interface_id > 3 {
            return Err(anyhow!(
                "ncp.interface_id must be 0-3, got {}",
                self.ncp.interface_id
            ));
        }
        if self.scan.channels.is_empty() {
            return Err(anyhow!("scan.channels must list at least one channel"));
        }
        if self.scan.delay_ms > u16::MAX as u32 {
            return Err(anyhow!(
                "scan.delay_ms must be at most {}, got {}",
                u16::MAX,
                self.scan.delay_ms
            ));
        }
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            ncp: NcpConfig {
                port: "/dev/ttyACM0".to_string(),
                baud_rate: 115200,
                interface_id: 0,
                read_timeout_ms: Some(20),
                poll_interval_ms: Some(10),
                property_timeout_ms: Some(DEFAULT_PROPERTY_TIMEOUT.as_millis() as u64),
                scan_timeout_ms: Some(DEFAULT_SCAN_TIMEOUT.as_millis() as u64),
                outbound_high_water: Some(DEFAULT_OUTBOUND_HIGH_WATER),
                stats_interval_ms: Some(60_000),
                require_device_at_startup: false,
            },
            scan: ScanConfig::default(),
            logging: LoggingConfig {
                level: "info".to_string(),
                file: Some("ncpd.log".to_string()),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_file_uses_defaults() {
        let toml = r#"
            [ncp]
            port = "/dev/ttyUSB1"
            baud_rate = 460800

            [logging]
            level = "debug"
        "#;
        let config: Config = toml::from_str(toml).unwrap();
        config.validate().unwrap();
        assert_eq!(config.ncp.interface_id, 0);
        assert!(!config.ncp.require_device_at_startup);
        assert_eq!(config.scan.channels.len(), 16);
        assert_eq!(config.scan.delay_ms, 120);
        assert_eq!(config.ncp.tuning(), InstanceTuning::default());
        assert!(config.logging.file.is_none());
    }

    #[test]
    fn tuning_clamps_tiny_values() {
        let mut config = Config::default();
        config.ncp.property_timeout_ms = Some(1);
        config.ncp.outbound_high_water = Some(0);
        config.ncp.stats_interval_ms = Some(0);
        config.ncp.poll_interval_ms = Some(0);
        let tuning = config.ncp.tuning();
        assert_eq!(tuning.property_timeout, Duration::from_millis(MIN_TASK_TIMEOUT_MS));
        assert_eq!(tuning.outbound_high_water, 1);
        let driver = config.ncp.driver_tuning();
        assert_eq!(driver.stats_interval, DriverTuning::default().stats_interval);
        assert_eq!(driver.poll_interval, Duration::from_millis(1));
    }

    #[test]
    fn validate_rejects_bad_values() {
        let mut config = Config::default();
        config.ncp.interface_id = 4;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.scan.channels.clear();
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.scan.delay_ms = 70_000;
        assert!(config.validate().is_err());
    }

    #[test]
    fn default_config_round_trips_through_toml() {
        let text = toml::to_string_pretty(&Config::default()).unwrap();
        let parsed: Config = toml::from_str(&text).unwrap();
        assert_eq!(parsed.ncp.port, "/dev/ttyACM0");
        assert_eq!(parsed.scan.channels, default_scan_channels());
    }
}
