//! Device resource conditions consulted before a sync.

use serde::Deserialize;
use std::fmt;
use std::str::FromStr;

/// Current network path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NetworkKind {
  #[default]
  Wifi,
  Ethernet,
  Cellular,
  Offline,
}

impl NetworkKind {
  /// Whether this network satisfies a WiFi-only policy.
  pub fn is_unmetered(&self) -> bool {
    matches!(self, NetworkKind::Wifi | NetworkKind::Ethernet)
  }
}

impl fmt::Display for NetworkKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(match self {
      Self::Wifi => "wifi",
      Self::Ethernet => "ethernet",
      Self::Cellular => "cellular",
      Self::Offline => "offline",
    })
  }
}

impl FromStr for NetworkKind {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.to_lowercase().as_str() {
      "wifi" => Ok(Self::Wifi),
      "ethernet" | "wired" => Ok(Self::Ethernet),
      "cellular" | "mobile" => Ok(Self::Cellular),
      "offline" | "none" => Ok(Self::Offline),
      other => Err(format!("unknown network kind: {}", other)),
    }
  }
}

/// Source of battery and network conditions.
pub trait DeviceMonitor: Send + Sync {
  /// Battery charge as a fraction in `[0, 1]`, `None` if unknown.
  fn battery_level(&self) -> Option<f32>;

  fn is_low_power_mode(&self) -> bool;

  fn network(&self) -> NetworkKind;
}

/// Fixed device conditions.
#[derive(Debug, Clone, Copy, Default)]
pub struct StaticDeviceMonitor {
  pub battery_level: Option<f32>,
  pub low_power_mode: bool,
  pub network: NetworkKind,
}

impl DeviceMonitor for StaticDeviceMonitor {
  fn battery_level(&self) -> Option<f32> {
    self.battery_level
  }

  fn is_low_power_mode(&self) -> bool {
    self.low_power_mode
  }

  fn network(&self) -> NetworkKind {
    self.network
  }
}
