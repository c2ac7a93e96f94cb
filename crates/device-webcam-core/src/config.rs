//! Service configuration: a TOML file with per-field defaults, plus a small
//! set of environment overrides.

use std::path::{Path, PathBuf};

use device_webcam_redisedge::RedisEdgeConfig;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const DEFAULT_CONFIG_PATH: &str = "res/configuration.toml";

pub const ENV_REDIS_URL: &str = "WEBCAM_REDIS_URL";
pub const ENV_SAMPLE_IMAGE: &str = "WEBCAM_SAMPLE_IMAGE";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed reading configuration '{}': {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed parsing configuration '{}': {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid configuration: {}", .0.join("; "))]
    Invalid(Vec<String>),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub device: DeviceSettings,
    pub redisedge: RedisEdgeConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceSettings {
    /// Still image served as the captured frame.
    pub sample_image: PathBuf,
    /// Report zero counts while object detection is unavailable instead of
    /// failing reads that ask for detections.
    pub placeholder_detections: bool,
}

impl Default for DeviceSettings {
    fn default() -> Self {
        Self {
            sample_image: PathBuf::from("res/sample_dog_416.jpg"),
            placeholder_detections: true,
        }
    }
}

impl ServiceConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn from_toml(raw: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(raw)
    }

    /// Applies `WEBCAM_*` variables from the process environment.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|name| std::env::var(name).ok());
    }

    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup(ENV_REDIS_URL) {
            self.redisedge.server_url = url;
        }
        if let Some(path) = lookup(ENV_SAMPLE_IMAGE) {
            self.device.sample_image = PathBuf::from(path);
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut problems = self.redisedge.validate().err().unwrap_or_default();
        if self.device.sample_image.as_os_str().is_empty() {
            problems.push("device.sample_image must not be empty".to_string());
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Invalid(problems))
        }
    }
}
