use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::savings::DEFAULT_TOP_N;

/// Loaded from `~/.config/azure-savings/config.toml` unless `--config` says otherwise.
#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub report: ReportConfig,
}

#[derive(Debug, Deserialize)]
pub struct ReportConfig {
    #[serde(default = "default_customer_name")]
    pub customer_name: String,
    #[serde(default = "default_currency")]
    pub currency: String,
    #[serde(default = "default_months")]
    pub months: u32,
    #[serde(default = "default_top_n")]
    pub top_n: usize,
    #[serde(default = "default_output_dir")]
    pub output_dir: String,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            customer_name: default_customer_name(),
            currency: default_currency(),
            months: default_months(),
            top_n: default_top_n(),
            output_dir: default_output_dir(),
        }
    }
}

fn default_customer_name() -> String {
    "Customer".to_string()
}

fn default_currency() -> String {
    "USD".to_string()
}

fn default_months() -> u32 {
    3
}

fn default_top_n() -> usize {
    DEFAULT_TOP_N
}

fn default_output_dir() -> String {
    "./reports".to_string()
}

impl Config {
    /// Load from an explicit path, or the standard path when `None`.
    /// A missing file at the standard path means defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(p) => Self::load_from(p),
            None => {
                let default_path = Self::config_path();
                if default_path.exists() {
                    Self::load_from(&default_path)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }

    fn load_from(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let cfg: Config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        Ok(cfg)
    }

    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("azure-savings")
            .join("config.toml")
    }
}
