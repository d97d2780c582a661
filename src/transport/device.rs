//! Bonded device handles and target selection

use serde::Deserialize;
use std::fmt;

/// A peer previously paired with the local adapter
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DeviceHandle {
    /// Bluetooth MAC address, or `host:port` for simulated devices
    pub address: String,
    /// Name reported by the peer, if any
    #[serde(default)]
    pub name: Option<String>,
}

impl DeviceHandle {
    pub fn new(address: impl Into<String>, name: Option<String>) -> Self {
        Self {
            address: address.into(),
            name,
        }
    }

    /// Name to show the user; falls back to the address
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.address)
    }
}

impl fmt::Display for DeviceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.name {
            Some(name) => write!(f, "{} ({})", name, self.address),
            None => write!(f, "{}", self.address),
        }
    }
}

/// Which bonded device to connect to
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum DeviceSelector {
    /// Exact address, compared case-insensitively
    Address(String),
    /// Exact peer name, e.g. "HC-05"
    Name(String),
    /// Whatever the stack lists first
    #[default]
    FirstBonded,
}

impl DeviceSelector {
    /// Build a selector from optional address/name settings.
    /// An address wins over a name.
    pub fn from_settings(address: Option<&str>, name: Option<&str>) -> Self {
        match (address, name) {
            (Some(addr), _) => DeviceSelector::Address(addr.to_string()),
            (None, Some(name)) => DeviceSelector::Name(name.to_string()),
            (None, None) => DeviceSelector::FirstBonded,
        }
    }

    /// Pick the target out of the bonded set
    pub fn select<'a>(&self, devices: &'a [DeviceHandle]) -> Option<&'a DeviceHandle> {
        match self {
            DeviceSelector::Address(addr) => devices
                .iter()
                .find(|d| d.address.eq_ignore_ascii_case(addr)),
            DeviceSelector::Name(name) => devices
                .iter()
                .find(|d| d.name.as_deref() == Some(name.as_str())),
            DeviceSelector::FirstBonded => devices.first(),
        }
    }
}

impl fmt::Display for DeviceSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceSelector::Address(addr) => write!(f, "address {}", addr),
            DeviceSelector::Name(name) => write!(f, "name {:?}", name),
            DeviceSelector::FirstBonded => write!(f, "first bonded device"),
        }
    }
}
