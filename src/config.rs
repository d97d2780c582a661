//! Configuration loading
//!
//! Settings come from an optional TOML file; command-line flags override
//! individual fields afterwards.

use crate::connection::ConnectionConfig;
use crate::transport::{DeviceHandle, DeviceSelector, RfcommConfig};
use anyhow::{Context, Result};
use led_link_shared::{timing, PayloadEncoding, SPP_UUID};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// Bluetooth transport mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum BluetoothMode {
    /// Use real RFCOMM Bluetooth (requires BlueZ)
    #[default]
    Rfcomm,
    /// Use TCP against the peer simulator (for development)
    TcpSimulation,
}

/// Application configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LinkConfig {
    /// Bluetooth transport mode
    pub mode: BluetoothMode,
    /// Adapter name such as "hci0"; default adapter when unset
    pub adapter: Option<String>,
    /// Bonded device name to connect to, e.g. "HC-05"
    pub target_name: Option<String>,
    /// Bonded device address; wins over `target_name`
    pub target_address: Option<String>,
    /// Wire representation of the on/off commands
    pub encoding: PayloadEncoding,
    pub connect_timeout_ms: u64,
    pub send_timeout_ms: u64,
    pub close_timeout_ms: u64,
    /// Bonded set used in TCP simulation mode
    pub simulated_devices: Vec<DeviceHandle>,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            mode: BluetoothMode::Rfcomm,
            adapter: None,
            target_name: None,
            target_address: None,
            encoding: PayloadEncoding::RawByte,
            connect_timeout_ms: timing::CONNECT_TIMEOUT_MS,
            send_timeout_ms: timing::SEND_TIMEOUT_MS,
            close_timeout_ms: timing::CLOSE_TIMEOUT_MS,
            simulated_devices: vec![DeviceHandle::new("127.0.0.1:9000", Some("HC-05".into()))],
        }
    }
}

impl LinkConfig {
    /// Load configuration from `path`, or defaults when no path is given
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        Self::from_toml(&content).with_context(|| format!("parsing config file {}", path.display()))
    }

    /// Parse configuration from TOML text
    pub fn from_toml(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Target selection derived from the address/name settings
    pub fn target(&self) -> DeviceSelector {
        DeviceSelector::from_settings(self.target_address.as_deref(), self.target_name.as_deref())
    }

    /// Settings for the connection manager
    pub fn connection(&self) -> ConnectionConfig {
        ConnectionConfig {
            target: self.target(),
            service_uuid: SPP_UUID,
            encoding: self.encoding,
            connect_timeout: Duration::from_millis(self.connect_timeout_ms),
            send_timeout: Duration::from_millis(self.send_timeout_ms),
            close_timeout: Duration::from_millis(self.close_timeout_ms),
        }
    }

    /// Settings for the BlueZ connector
    pub fn rfcomm(&self) -> RfcommConfig {
        RfcommConfig {
            adapter_name: self.adapter.clone(),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = LinkConfig::default();
        assert_eq!(config.mode, BluetoothMode::Rfcomm);
        assert_eq!(config.encoding, PayloadEncoding::RawByte);
        assert_eq!(config.target(), DeviceSelector::FirstBonded);
        assert_eq!(config.simulated_devices.len(), 1);
    }

    #[test]
    fn test_load_without_path() {
        let config = LinkConfig::load(None).unwrap();
        assert_eq!(config.connect_timeout_ms, timing::CONNECT_TIMEOUT_MS);
    }

    #[test]
    fn test_parse_toml() {
        let config = LinkConfig::from_toml(
            r#"
            mode = "tcp-simulation"
            target_name = "HC-05"
            encoding = "ascii"
            send_timeout_ms = 500

            [[simulated_devices]]
            name = "HC-05"
            address = "127.0.0.1:9100"
            "#,
        )
        .unwrap();

        assert_eq!(config.mode, BluetoothMode::TcpSimulation);
        assert_eq!(config.encoding, PayloadEncoding::Ascii);
        assert_eq!(config.target(), DeviceSelector::Name("HC-05".into()));
        assert_eq!(config.simulated_devices[0].address, "127.0.0.1:9100");

        let connection = config.connection();
        assert_eq!(connection.send_timeout, Duration::from_millis(500));
        assert_eq!(connection.connect_timeout, Duration::from_millis(timing::CONNECT_TIMEOUT_MS));
        assert_eq!(connection.service_uuid, SPP_UUID);
    }

    #[test]
    fn test_rejects_unknown_encoding() {
        assert!(LinkConfig::from_toml(r#"encoding = "morse""#).is_err());
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let result = LinkConfig::load(Some(Path::new("/nonexistent/led-link.toml")));
        assert!(result.is_err());
    }
}
