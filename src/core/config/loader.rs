#![allow(clippy::result_large_err)]

use super::EngineConfig;
use crate::core::error::AppError;
use crate::core::types::ErrorCategory;
use std::env;
use std::path::{Path, PathBuf};

pub struct ConfigLoader;

impl ConfigLoader {
    /// `<config dir>/pdk/pdk.toml`
    pub fn default_path() -> PathBuf {
        dirs_next::config_dir()
            .map(|dir| dir.join("pdk").join("pdk.toml"))
            .unwrap_or_else(|| PathBuf::from("pdk.toml"))
    }

    /// Load config from `path`, falling back to defaults when the file is absent.
    /// Environment variables override file values.
    pub fn load(path: &Path) -> Result<EngineConfig, AppError> {
        let mut config = Self::load_from_file(path)?.unwrap_or_default();
        Self::apply_env_overrides(&mut config);
        Ok(config)
    }

    /// Returns Ok(None) if the file doesn't exist
    pub fn load_from_file(path: &Path) -> Result<Option<EngineConfig>, AppError> {
        if !path.exists() {
            return Ok(None);
        }

        let content = std::fs::read_to_string(path).map_err(|e| {
            AppError::new(
                ErrorCategory::ConfigurationError,
                format!("Failed to read config file {}: {}", path.display(), e),
            )
            .with_code("CFG-001")
        })?;

        let config: EngineConfig = toml::from_str(&content).map_err(|e| {
            AppError::new(
                ErrorCategory::ConfigurationError,
                format!("Failed to parse config file {}: {}", path.display(), e),
            )
            .with_code("CFG-002")
        })?;

        Ok(Some(config))
    }

    /// Environment variables take precedence over config file values.
    /// Values that fail to parse are ignored.
    fn apply_env_overrides(config: &mut EngineConfig) {
        if let Ok(version) = env::var("PDK_PUPPET_VERSION") {
            config.puppet_version = version;
        }

        if let Ok(backend) = env::var("PDK_BACKEND") {
            config.backend = backend;
        }

        if let Ok(base_image) = env::var("PDK_BASE_IMAGE") {
            config.base_image = base_image;
        }

        if let Ok(tool_path) = env::var("PDK_TOOL_PATH") {
            config.tool_path = PathBuf::from(tool_path);
        }

        if let Ok(code_path) = env::var("PDK_CODE_PATH") {
            config.code_path = PathBuf::from(code_path);
        }

        if let Ok(cache_path) = env::var("PDK_CACHE_PATH") {
            config.cache_path = PathBuf::from(cache_path);
        }

        if let Ok(always_build) = env::var("PDK_ALWAYS_BUILD") {
            if let Ok(always_build) = always_build.parse::<bool>() {
                config.always_build = always_build;
            }
        }

        if let Ok(timeout) = env::var("PDK_TOOL_TIMEOUT") {
            if let Ok(timeout) = timeout.parse::<i64>() {
                config.tool_timeout = timeout;
            }
        }

        if let Ok(workers) = env::var("PDK_WORKER_COUNT") {
            if let Ok(workers) = workers.parse::<usize>() {
                config.worker_count = workers;
            }
        }

        if let Ok(serial) = env::var("PDK_SERIAL") {
            if let Ok(serial) = serial.parse::<bool>() {
                config.serial = serial;
            }
        }
    }

    /// Get documentation for supported environment variables
    pub fn env_var_documentation() -> &'static [&'static str] {
        &[
            "PDK_PUPPET_VERSION - Override the puppet agent version (default: 7.14.0)",
            "PDK_BACKEND - Override the execution backend (default: docker)",
            "PDK_BASE_IMAGE - Override the base image repository (default: puppet/puppet-agent)",
            "PDK_TOOL_PATH - Override the tool installation root",
            "PDK_CODE_PATH - Override the content directory (default: .)",
            "PDK_CACHE_PATH - Override the shared cache directory",
            "PDK_ALWAYS_BUILD - Rebuild tool images on every run (true/false)",
            "PDK_TOOL_TIMEOUT - Override the per-run timeout in seconds (default: 1800)",
            "PDK_WORKER_COUNT - Override the number of concurrent tools",
            "PDK_SERIAL - Run tools one at a time (true/false)",
        ]
    }
}
