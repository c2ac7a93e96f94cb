//! Typed settings for the RedisEdge client.
//!
//! Every field has a default so a partial TOML table is enough; call
//! [`RedisEdgeConfig::validate`] once after all overrides are applied.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

pub const DEFAULT_SERVER_URL: &str = "redis://localhost:6379";

const URL_SCHEMES: &[&str] = &["redis://", "rediss://", "redis+unix://", "unix://"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RedisEdgeConfig {
    pub server_url: String,
    pub model: ModelConfig,
    pub script: ScriptConfig,
    pub pool: PoolOptions,
    /// Module name -> minimum version accepted by the capability check.
    pub required_modules: BTreeMap<String, i64>,
}

impl Default for RedisEdgeConfig {
    fn default() -> Self {
        Self {
            server_url: DEFAULT_SERVER_URL.to_string(),
            model: ModelConfig::default(),
            script: ScriptConfig::default(),
            pool: PoolOptions::default(),
            required_modules: BTreeMap::from([("rg".to_string(), 301), ("ai".to_string(), 200)]),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    pub key: String,
    pub path: PathBuf,
    pub backend: String,
    pub device: String,
    pub inputs: Vec<String>,
    pub outputs: Vec<String>,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            key: "redisai:model:yolo".to_string(),
            path: PathBuf::from("res/models/tiny-yolo-voc.pb"),
            backend: "TF".to_string(),
            device: "CPU".to_string(),
            inputs: vec!["input".to_string()],
            outputs: vec!["output".to_string()],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScriptConfig {
    pub key: String,
    pub path: PathBuf,
    pub device: String,
}

impl Default for ScriptConfig {
    fn default() -> Self {
        Self {
            key: "redisai:script:yolo-boxes".to_string(),
            path: PathBuf::from("res/scripts/yolo-boxes.py"),
            device: "CPU".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolOptions {
    /// Maximum number of connections kept idle in the pool.
    pub max_idle: usize,
    /// Idle connections older than this are closed instead of reused; 0 disables the limit.
    pub idle_timeout_secs: u64,
}

impl PoolOptions {
    pub fn idle_timeout(&self) -> Option<Duration> {
        (self.idle_timeout_secs > 0).then(|| Duration::from_secs(self.idle_timeout_secs))
    }
}

impl Default for PoolOptions {
    fn default() -> Self {
        Self {
            max_idle: 3,
            idle_timeout_secs: 240,
        }
    }
}

impl RedisEdgeConfig {
    /// Returns every problem found, not just the first one.
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut problems = Vec::new();

        if self.server_url.trim().is_empty() {
            problems.push("server_url must not be empty".to_string());
        } else if !URL_SCHEMES
            .iter()
            .any(|scheme| self.server_url.starts_with(scheme))
        {
            problems.push(format!(
                "server_url '{}' must start with one of {}",
                self.server_url,
                URL_SCHEMES.join(", ")
            ));
        }

        require_text(&mut problems, "model.key", &self.model.key);
        require_path(&mut problems, "model.path", &self.model.path);
        require_text(&mut problems, "model.backend", &self.model.backend);
        require_text(&mut problems, "model.device", &self.model.device);
        if self.model.inputs.is_empty() {
            problems.push("model.inputs must name at least one tensor".to_string());
        }
        if self.model.outputs.is_empty() {
            problems.push("model.outputs must name at least one tensor".to_string());
        }

        require_text(&mut problems, "script.key", &self.script.key);
        require_path(&mut problems, "script.path", &self.script.path);
        require_text(&mut problems, "script.device", &self.script.device);

        if self.model.key == self.script.key {
            problems.push(format!(
                "model.key and script.key must differ (both '{}')",
                self.model.key
            ));
        }

        if self.pool.max_idle == 0 {
            problems.push("pool.max_idle must be at least 1".to_string());
        }

        for name in self.required_modules.keys() {
            if name.trim().is_empty() {
                problems.push("required_modules contains an empty module name".to_string());
            }
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(problems)
        }
    }
}

fn require_text(problems: &mut Vec<String>, field: &str, value: &str) {
    if value.trim().is_empty() {
        problems.push(format!("{field} must not be empty"));
    }
}

fn require_path(problems: &mut Vec<String>, field: &str, value: &std::path::Path) {
    if value.as_os_str().is_empty() {
        problems.push(format!("{field} must not be empty"));
    }
}
