//! Updater configuration file
//!
//! Parses updater settings in TOML format:
//!
//! ```toml
//! image_name = "PR1116007_00000002.img"
//! image_dirs = ["/lib/firmware", "."]
//! force = false
//!
//! [timing]
//! poll_interval_us = 50
//! erase_timeout_ms = 5000
//!
//! [sensor_id]
//! first = 2
//! second = 5
//! ```

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::string::String;
use std::vec::Vec;

use crate::bus::DirImageStore;
use crate::flash::Timing;
use crate::session::{SensorIdPins, SessionOptions};

/// Errors that can occur when loading a configuration file
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// File could not be read
    IoError,
    /// File is not valid TOML or has unknown fields
    ParseError(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::IoError => write!(f, "failed to read configuration file"),
            Self::ParseError(msg) => write!(f, "invalid configuration: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Updater settings
#[derive(Debug, Clone, PartialEq, Eq, Default, serde::Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct UpdaterConfig {
    /// Image name for autonomous updates
    pub image_name: Option<String>,
    /// Directories searched for images, in order
    pub image_dirs: Vec<PathBuf>,
    /// Skip vendor and version checks
    pub force: bool,
    /// Poll interval and timeouts
    pub timing: Timing,
    /// Sensor id pins for per-vendor images
    pub sensor_id: Option<SensorIdPins>,
}

impl UpdaterConfig {
    /// Load a configuration from a TOML file
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|_| ConfigError::IoError)?;
        Self::from_toml_str(&content)
    }

    /// Parse a configuration from a TOML string
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::ParseError(e.message().into()))
    }

    /// Session options described by this configuration
    pub fn session_options(&self) -> SessionOptions {
        SessionOptions {
            force: self.force,
            image_name: self.image_name.clone(),
            timing: self.timing,
            sensor_id: self.sensor_id,
        }
    }

    /// Image store over the configured directories
    ///
    /// Falls back to the current directory when none are configured.
    pub fn image_store(&self) -> DirImageStore {
        if self.image_dirs.is_empty() {
            DirImageStore::new(["."])
        } else {
            DirImageStore::new(self.image_dirs.iter().cloned())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_config() {
        let toml = r#"
image_name = "PR1343768_s3202.img"
image_dirs = ["/lib/firmware", "/tmp"]
force = true

[timing]
poll_interval_us = 100
erase_timeout_ms = 8000

[sensor_id]
first = 2
second = 5
"#;
        let config = UpdaterConfig::from_toml_str(toml).unwrap();
        assert_eq!(config.image_name.as_deref(), Some("PR1343768_s3202.img"));
        assert_eq!(config.image_dirs.len(), 2);
        assert!(config.force);
        assert_eq!(config.timing.poll_interval_us, 100);
        assert_eq!(config.timing.erase_timeout_ms, 8000);
        // Unset timing fields keep their defaults
        assert_eq!(config.timing.block_timeout_ms, 3000);
        assert_eq!(config.sensor_id, Some(SensorIdPins { first: 2, second: 5 }));

        let options = config.session_options();
        assert!(options.force);
        assert_eq!(options.timing, config.timing);
    }

    #[test]
    fn test_empty_config() {
        let config = UpdaterConfig::from_toml_str("").unwrap();
        assert_eq!(config, UpdaterConfig::default());
        assert_eq!(config.image_store().dirs(), [PathBuf::from(".")]);
    }

    #[test]
    fn test_unknown_field() {
        assert!(matches!(
            UpdaterConfig::from_toml_str("imagename = \"x\""),
            Err(ConfigError::ParseError(_))
        ));
    }
}
