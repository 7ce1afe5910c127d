//! YAML configuration for the `vitalsync` binary.

use chrono::Duration;
use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use url::Url;

use crate::cache::CacheConfiguration;
use crate::health::MetricType;
use crate::sync::SyncConfiguration;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
  /// Account the uploaded data belongs to
  pub owner_id: String,
  pub upload: UploadConfig,
  pub source: SourceConfig,
  #[serde(default)]
  pub cache: CacheSection,
  #[serde(default)]
  pub sync: SyncSection,
  /// Metric types to sync, in upload order (defaults to all)
  #[serde(default = "all_metrics", deserialize_with = "deserialize_metrics")]
  pub metrics: Vec<MetricType>,
}

fn all_metrics() -> Vec<MetricType> {
  MetricType::ALL.to_vec()
}

/// Accepts `heart-rate`, `heartRate`, `heart_rate` and friends.
fn deserialize_metrics<'de, D>(deserializer: D) -> Result<Vec<MetricType>, D::Error>
where
  D: serde::Deserializer<'de>,
{
  let names: Vec<String> = Vec::deserialize(deserializer)?;
  let mut metrics = Vec::with_capacity(names.len());
  for name in names {
    let metric = name.parse::<MetricType>().map_err(serde::de::Error::custom)?;
    if !metrics.contains(&metric) {
      metrics.push(metric);
    }
  }
  Ok(metrics)
}

#[derive(Debug, Clone, Deserialize)]
pub struct UploadConfig {
  pub endpoint: Url,
  #[serde(default = "default_timeout_secs")]
  pub timeout_secs: u64,
}

fn default_timeout_secs() -> u64 {
  30
}

impl UploadConfig {
  pub fn timeout(&self) -> std::time::Duration {
    std::time::Duration::from_secs(self.timeout_secs)
  }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SourceConfig {
  /// Directory holding `<metricKey>.json` exports
  pub directory: PathBuf,
}

#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CachePreset {
  /// Pick from the device's battery and power mode
  #[default]
  Auto,
  Default,
  Aggressive,
  Realtime,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CacheSection {
  #[serde(default)]
  pub preset: CachePreset,
  /// Overrides the preset's persistence flag
  pub persist_to_disk: Option<bool>,
  /// Cache mirror directory (default: `<data dir>/vitalsync/cache`)
  pub directory: Option<PathBuf>,
}

impl CacheSection {
  pub fn configuration(&self, battery_level: Option<f32>, low_power_mode: bool) -> CacheConfiguration {
    let mut config = match self.preset {
      CachePreset::Auto => CacheConfiguration::recommended(battery_level, low_power_mode),
      CachePreset::Default => CacheConfiguration::default(),
      CachePreset::Aggressive => CacheConfiguration::aggressive(),
      CachePreset::Realtime => CacheConfiguration::realtime(),
    };
    if let Some(persist) = self.persist_to_disk {
      config.persist_to_disk = persist;
    }
    config
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SyncSection {
  pub max_batch_size: usize,
  pub interval_secs: i64,
  pub wifi_only: bool,
  pub minimum_battery_level: f32,
  pub background_sync_enabled: bool,
}

impl Default for SyncSection {
  fn default() -> Self {
    let defaults = SyncConfiguration::default();
    Self {
      max_batch_size: defaults.max_batch_size,
      interval_secs: defaults.sync_interval.num_seconds(),
      wifi_only: defaults.wifi_only,
      minimum_battery_level: defaults.minimum_battery_level,
      background_sync_enabled: defaults.background_sync_enabled,
    }
  }
}

impl SyncSection {
  pub fn configuration(&self) -> SyncConfiguration {
    SyncConfiguration {
      max_batch_size: self.max_batch_size,
      sync_interval: Duration::seconds(self.interval_secs),
      wifi_only: self.wifi_only,
      minimum_battery_level: self.minimum_battery_level,
      background_sync_enabled: self.background_sync_enabled,
    }
  }
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./vitalsync.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/vitalsync/config.yaml
  pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
    let path = if let Some(p) = explicit_path {
      if p.exists() {
        Some(p.to_path_buf())
      } else {
        return Err(eyre!("Config file not found: {}", p.display()));
      }
    } else {
      Self::find_config_file()
    };

    match path {
      Some(p) => Self::load_from_path(&p),
      None => Err(eyre!(
        "No configuration file found. Create one at ~/.config/vitalsync/config.yaml"
      )),
    }
  }

  fn find_config_file() -> Option<PathBuf> {
    let local = PathBuf::from("vitalsync.yaml");
    if local.exists() {
      return Some(local);
    }

    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("vitalsync").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    Self::parse(&contents).map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))
  }

  pub fn parse(contents: &str) -> Result<Self> {
    let config: Config = serde_yaml::from_str(contents).map_err(|e| eyre!("{}", e))?;
    if config.owner_id.trim().is_empty() {
      return Err(eyre!("owner_id must not be empty"));
    }
    Ok(config)
  }

  /// Get the upload bearer token from `VITALSYNC_UPLOAD_TOKEN`, if set.
  pub fn get_upload_token() -> Option<String> {
    std::env::var("VITALSYNC_UPLOAD_TOKEN")
      .ok()
      .filter(|token| !token.is_empty())
  }
}
