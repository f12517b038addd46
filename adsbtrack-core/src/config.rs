//! Configuration file management for adsbtrack.
//!
//! Reads/writes `~/.adsbtrack/config.yaml` with the pairing window, the
//! region of interest, and decode options.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::cpr::MAX_PAIR_AGE;
use crate::geo::{DistanceModel, GeoFilter, GeoPoint};
use crate::pairing::{PairingEngine, PairingStrategy};
use crate::types::{AdsbError, Result};

/// Full configuration structure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub pairing: PairingConfig,
    pub region: RegionConfig,
    pub decode: DecodeConfig,
    /// Threads used to pair and decode aircraft groups
    pub workers: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PairingConfig {
    pub window_seconds: f64,
    pub strategy: PairingStrategy,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegionConfig {
    pub center_lat: f64,
    pub center_lon: f64,
    pub radius_miles: f64,
    pub distance: DistanceModel,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecodeConfig {
    pub require_crc: bool,
    pub dedup_window_seconds: f64,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            pairing: PairingConfig::default(),
            region: RegionConfig::default(),
            decode: DecodeConfig::default(),
            workers: 1,
        }
    }
}

impl Default for PairingConfig {
    fn default() -> Self {
        PairingConfig {
            window_seconds: MAX_PAIR_AGE,
            strategy: PairingStrategy::default(),
        }
    }
}

impl Default for RegionConfig {
    fn default() -> Self {
        RegionConfig {
            center_lat: 36.2667,
            center_lon: -95.7841,
            radius_miles: 30.0,
            distance: DistanceModel::default(),
        }
    }
}

impl Default for DecodeConfig {
    fn default() -> Self {
        DecodeConfig {
            require_crc: false,
            dedup_window_seconds: 1.0,
        }
    }
}

impl Config {
    /// Reject values the pipeline cannot run with.
    pub fn validate(&self) -> Result<()> {
        let window = self.pairing.window_seconds;
        if !window.is_finite() || window <= 0.0 {
            return Err(AdsbError::Config(format!(
                "pairing window must be positive, got {window}"
            )));
        }
        let dedup = self.decode.dedup_window_seconds;
        if !dedup.is_finite() || dedup < 0.0 {
            return Err(AdsbError::Config(format!(
                "dedup window must be non-negative, got {dedup}"
            )));
        }
        if self.workers == 0 {
            return Err(AdsbError::Config("workers must be at least 1".into()));
        }
        self.geo_filter().map(|_| ())
    }

    pub fn pairing_engine(&self) -> PairingEngine {
        PairingEngine::new(self.pairing.window_seconds, self.pairing.strategy)
    }

    pub fn geo_filter(&self) -> Result<GeoFilter> {
        let center = GeoPoint::new(self.region.center_lat, self.region.center_lon);
        Ok(GeoFilter::new(center, self.region.radius_miles)?.with_model(self.region.distance))
    }
}

/// Get the config directory path (`~/.adsbtrack/`).
pub fn config_dir() -> PathBuf {
    dirs_home().join(".adsbtrack")
}

/// Get the config file path.
pub fn config_file() -> PathBuf {
    config_dir().join("config.yaml")
}

fn dirs_home() -> PathBuf {
    std::env::var("HOME")
        .or_else(|_| std::env::var("USERPROFILE"))
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("."))
}

/// Load config from `~/.adsbtrack/config.yaml`.
///
/// Returns default config if the file doesn't exist.
pub fn load_config() -> Result<Config> {
    let path = config_file();
    if !path.exists() {
        return Ok(Config::default());
    }
    load_config_from(&path)
}

/// Load and validate config from an explicit path.
pub fn load_config_from(path: &Path) -> Result<Config> {
    let text = std::fs::read_to_string(path)?;
    let config: Config = serde_yaml::from_str(&text)?;
    config.validate()?;
    Ok(config)
}

/// Save config to `~/.adsbtrack/config.yaml`.
pub fn save_config(config: &Config) -> Result<PathBuf> {
    let path = config_file();
    save_config_to(config, &path)?;
    Ok(path)
}

/// Save config to an explicit path, creating parent directories.
pub fn save_config_to(config: &Config, path: &Path) -> Result<()> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir)?;
    }
    let text = format!("# adsbtrack configuration\n{}", serde_yaml::to_string(config)?);
    std::fs::write(path, text)?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
