//! YAML configuration file support.
//!
//! One file describes the projection numerics, the axis strategy and where
//! bundles live:
//!
//! ```yaml
//! version: "1.0"
//! name: "sentiment axis"
//!
//! axis:
//!   epsilon: 1.0e-20
//!   degenerate_policy: epsilon_floor   # or: reject
//!   parallel: false
//!
//! strategy:
//!   kind: discriminant                 # or: centroid
//!   n_components: 1
//!   shrinkage: auto                    # or a number in [0, 1]
//!   priors: [0.5, 0.5]
//!
//! bundle:
//!   root: "./bundles"
//!   compression: zstd                  # or: none
//!   level: 3
//! ```
//!
//! `SEMAXIS_BUNDLE_ROOT` and `SEMAXIS_PARALLEL` override the matching fields
//! when [`SemaxisConfig::apply_env_overrides`] is called.

use std::fs;
use std::path::{Path, PathBuf};

use axis::{AxisConfig, AxisError, AxisModel, BundleConfig, CompressionCodec, StrategyConfig};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const ENV_BUNDLE_ROOT: &str = "SEMAXIS_BUNDLE_ROOT";
pub const ENV_PARALLEL: &str = "SEMAXIS_PARALLEL";

/// Errors that can occur when loading YAML configuration files
#[derive(Debug, Error)]
pub enum ConfigLoadError {
    #[error("failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),

    #[error("failed to parse YAML: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("unsupported config version: {0}")]
    UnsupportedVersion(String),
}

impl From<AxisError> for ConfigLoadError {
    fn from(err: AxisError) -> Self {
        ConfigLoadError::Validation(err.to_string())
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct SemaxisConfig {
    /// Configuration format version
    pub version: String,

    #[serde(default)]
    pub name: Option<String>,

    #[serde(default)]
    pub axis: AxisConfig,

    #[serde(default)]
    pub strategy: StrategyConfig,

    #[serde(default)]
    pub bundle: BundleYamlConfig,
}

impl Default for SemaxisConfig {
    fn default() -> Self {
        Self {
            version: "1.0".to_string(),
            name: None,
            axis: AxisConfig::default(),
            strategy: StrategyConfig::default(),
            bundle: BundleYamlConfig::default(),
        }
    }
}

impl SemaxisConfig {
    /// Load a YAML configuration file from the given path
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigLoadError> {
        let content = fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse YAML configuration from a string
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigLoadError> {
        let config: SemaxisConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_yaml(&self) -> Result<String, ConfigLoadError> {
        Ok(serde_yaml::to_string(self)?)
    }

    fn validate(&self) -> Result<(), ConfigLoadError> {
        match self.version.as_str() {
            "1.0" | "1" => {}
            v => return Err(ConfigLoadError::UnsupportedVersion(v.to_string())),
        }
        // Building the strategy runs the axis and discriminant checks.
        self.strategy.build(&self.axis)?;
        self.bundle.validate()?;
        Ok(())
    }

    /// Override fields from the process environment.
    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigLoadError> {
        self.apply_overrides_from(|key| std::env::var(key).ok())
    }

    /// Override fields from an arbitrary key lookup.
    pub fn apply_overrides_from<F>(&mut self, lookup: F) -> Result<(), ConfigLoadError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(root) = lookup(ENV_BUNDLE_ROOT) {
            self.bundle.root = PathBuf::from(root);
        }
        if let Some(raw) = lookup(ENV_PARALLEL) {
            self.axis.parallel = match raw.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => true,
                "0" | "false" | "no" | "off" => false,
                other => {
                    return Err(ConfigLoadError::Validation(format!(
                        "{ENV_PARALLEL} must be a boolean, got '{other}'"
                    )))
                }
            };
        }
        Ok(())
    }

    /// A fresh, unfitted model with the configured strategy and bundle encoding.
    pub fn build_model(&self) -> Result<AxisModel, ConfigLoadError> {
        let model = AxisModel::from_config(&self.strategy, &self.axis)?;
        Ok(model.with_bundle_config(self.bundle.encoding()))
    }

    /// Resolve a bundle name against `bundle.root`. Absolute names are kept.
    pub fn bundle_path(&self, name: &str) -> PathBuf {
        self.bundle.root.join(name)
    }
}

/// Bundle location and encoding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BundleYamlConfig {
    #[serde(default = "default_root")]
    pub root: PathBuf,

    #[serde(default)]
    pub compression: CompressionCodec,

    #[serde(default = "default_level")]
    pub level: i32,
}

impl BundleYamlConfig {
    fn validate(&self) -> Result<(), ConfigLoadError> {
        if self.compression == CompressionCodec::Zstd && !(1..=22).contains(&self.level) {
            return Err(ConfigLoadError::Validation(format!(
                "bundle.level must be within 1..=22 for zstd, got {}",
                self.level
            )));
        }
        Ok(())
    }

    pub fn encoding(&self) -> BundleConfig {
        BundleConfig::new(self.compression, self.level)
    }
}

impl Default for BundleYamlConfig {
    fn default() -> Self {
        Self {
            root: default_root(),
            compression: CompressionCodec::default(),
            level: default_level(),
        }
    }
}

fn default_root() -> PathBuf {
    PathBuf::from(".")
}

fn default_level() -> i32 {
    3
}
