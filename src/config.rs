//! Configuration management for `cdc-schemas`
//!
//! Supports loading configuration from:
//! - Default values
//! - Config file (cdc-schemas.toml)
//! - Environment variables (CDC_SCHEMAS__*)
//!
//! Command-line flags override every source.
//!
//! ## Example config file (cdc-schemas.toml):
//! ```toml
//! [compare]
//! compatibility = "FULL_TRANSITIVE"
//! ci_mode = true
//! output = "compare-result.json"
//! parallel = true
//! ```

use config_crate::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::compatibility::CompatibilityLevel;

/// Main configuration for the tool
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ToolConfig {
    /// Comparison settings
    #[serde(default)]
    pub compare: CompareConfig,
}

/// Comparison settings shared by `compare` and `compare-files`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompareConfig {
    /// Compatibility level applied when none is given on the command line
    #[serde(default)]
    pub compatibility: CompatibilityLevel,

    /// Fail on any drift, not only on incompatibilities
    #[serde(default)]
    pub ci_mode: bool,

    /// Report file; standard output when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<PathBuf>,

    /// Compare tables on the thread pool
    #[serde(default = "default_true")]
    pub parallel: bool,
}

fn default_true() -> bool {
    true
}

impl Default for CompareConfig {
    fn default() -> Self {
        Self {
            compatibility: CompatibilityLevel::default(),
            ci_mode: false,
            output: None,
            parallel: true,
        }
    }
}

impl ToolConfig {
    /// Load configuration from default locations
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(None)
    }

    /// Load configuration, layering an explicit file over the default locations
    pub fn load_from(config_path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = Config::builder();

        let config_locations = [
            "cdc-schemas.toml",
            ".cdc-schemas.toml",
            "config/cdc-schemas.toml",
        ];

        for location in config_locations {
            builder = builder.add_source(File::with_name(location).required(false));
        }

        // XDG config directory
        if let Some(config_dir) = directories::ProjectDirs::from("io", "cdc", "cdc-schemas") {
            let xdg_config = config_dir.config_dir().join("cdc-schemas.toml");
            if xdg_config.exists() {
                builder = builder.add_source(File::from(xdg_config).required(false));
            }
        }

        if let Some(path) = config_path {
            builder = builder.add_source(File::from(path).required(true));
        }

        // CDC_SCHEMAS__COMPARE__CI_MODE=true and friends
        builder = builder.add_source(
            Environment::with_prefix("CDC_SCHEMAS")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build()?;
        config.try_deserialize()
    }

    /// Save configuration to a file
    pub fn save(&self, path: &Path) -> std::io::Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        std::fs::write(path, content)
    }
}
