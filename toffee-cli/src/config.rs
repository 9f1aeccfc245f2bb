// SPDX-License-Identifier: MIT
// Copyright (c) 2025 Matthias Bilger <matthias@bilger.info>

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use toffee_module::{DeviceInfo, ProtocolTimings};

pub const CONFIG_FILE_NAME: &str = "toffee.yaml";

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub version: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device: Option<DeviceInfo>,
    #[serde(default)]
    pub timings: ProtocolTimings,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: 1,
            device: None,
            timings: ProtocolTimings::default(),
            logging: LoggingConfig::default(),
            output_dir: default_output_dir(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("toffee-dump")
}

impl Config {
    /// Load configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {:?}", path.as_ref()))?;
        let config: Config =
            serde_yaml::from_str(&content).with_context(|| "Failed to parse YAML config")?;
        Ok(config)
    }

    /// Load the configuration.
    ///
    /// An explicit path must exist. Otherwise the current directory and the
    /// user's config directory are searched, falling back to defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        if let Some(path) = path {
            return Self::from_file(path);
        }

        for candidate in Self::get_config_search_paths(CONFIG_FILE_NAME) {
            if candidate.exists() {
                return Self::from_file(&candidate);
            }
        }

        Ok(Self::default())
    }

    /// Get search paths for configuration file
    fn get_config_search_paths(filename: &str) -> Vec<PathBuf> {
        let mut paths = vec![PathBuf::from(filename)];

        if let Some(config_dir) = dirs::config_dir() {
            paths.push(config_dir.join("toffee").join(filename));
        }

        paths
    }

    /// Device to talk to, with command line overrides applied
    pub fn device_info(&self, vendor_id: Option<u16>, product_id: Option<u16>) -> Result<DeviceInfo> {
        let configured = self.device;
        let vendor_id = vendor_id
            .or(configured.map(|d| d.vendor_id))
            .context("No vendor id configured (set device.vendor_id or pass --vendor-id)")?;
        let product_id = product_id
            .or(configured.map(|d| d.product_id))
            .context("No product id configured (set device.product_id or pass --product-id)")?;

        let info = DeviceInfo::new(vendor_id, product_id);
        Ok(match configured {
            Some(device) => info.with_usage_page(device.usage_page),
            None => info,
        })
    }
}
