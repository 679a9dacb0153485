use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

pub mod loader;
pub mod validation;

pub use loader::ConfigLoader;
pub use validation::ConfigValidator;

/// Run timeout applied when `tool_timeout` is unset or non-positive.
pub const DEFAULT_TOOL_TIMEOUT_SECS: i64 = 1800;

/// Engine configuration loaded from pdk.toml.
///
/// Built once at startup and handed to the backend and validator; nothing
/// mutates it afterwards.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EngineConfig {
    /// Puppet agent version; selects the base image and gem compatibility tier
    pub puppet_version: String,

    /// Execution backend name
    pub backend: String,

    /// Repository of the base image the recipe starts from
    pub base_image: String,

    /// Root holding `<author>/<id>/<version>/prm-config.yml` descriptors
    pub tool_path: PathBuf,

    /// Content under validation, mounted at /code
    pub code_path: PathBuf,

    /// Shared cache, mounted at /cache
    pub cache_path: PathBuf,

    /// Rebuild tool images even when one already exists
    pub always_build: bool,

    /// Per-run timeout in seconds
    pub tool_timeout: i64,

    /// Maximum number of tools run at once
    pub worker_count: usize,

    /// Run tools one at a time
    pub serial: bool,

    /// Logging overrides
    #[serde(skip_serializing_if = "LoggingSettings::is_empty")]
    pub logging: LoggingSettings,
}

/// `[logging]` table of pdk.toml.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct LoggingSettings {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_level: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_dir: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enable_file: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub console_output: Option<String>,
}

impl LoggingSettings {
    pub fn is_empty(&self) -> bool {
        self == &LoggingSettings::default()
    }
}

fn default_puppet_version() -> String {
    "7.14.0".to_string()
}

fn default_backend() -> String {
    "docker".to_string()
}

fn default_base_image() -> String {
    "puppet/puppet-agent".to_string()
}

fn default_tool_path() -> PathBuf {
    dirs_next::config_dir()
        .map(|dir| dir.join("pdk").join("tools"))
        .unwrap_or_else(|| PathBuf::from(".pdk/tools"))
}

fn default_cache_path() -> PathBuf {
    dirs_next::cache_dir()
        .map(|dir| dir.join("pdk"))
        .unwrap_or_else(|| PathBuf::from(".pdk/cache"))
}

fn default_worker_count() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            puppet_version: default_puppet_version(),
            backend: default_backend(),
            base_image: default_base_image(),
            tool_path: default_tool_path(),
            code_path: PathBuf::from("."),
            cache_path: default_cache_path(),
            always_build: false,
            tool_timeout: DEFAULT_TOOL_TIMEOUT_SECS,
            worker_count: default_worker_count(),
            serial: false,
            logging: LoggingSettings::default(),
        }
    }
}

impl EngineConfig {
    /// Concurrency the worker pool should use; `serial` forces one.
    pub fn effective_workers(&self) -> usize {
        if self.serial {
            1
        } else {
            self.worker_count.max(1)
        }
    }

    pub fn run_timeout(&self) -> Duration {
        let seconds = if self.tool_timeout <= 0 {
            DEFAULT_TOOL_TIMEOUT_SECS
        } else {
            self.tool_timeout
        };
        Duration::from_secs(seconds as u64)
    }
}
