#![allow(clippy::result_large_err)]

use super::EngineConfig;
use crate::core::error::AppError;
use crate::core::types::ErrorCategory;

/// Backends this build knows how to construct.
pub const SUPPORTED_BACKENDS: &[&str] = &["docker"];

pub struct ConfigValidator;

impl ConfigValidator {
    /// Validate configuration rules
    pub fn validate(config: &EngineConfig) -> Result<(), AppError> {
        let major = config.puppet_version.split('.').next().unwrap_or("");
        if major.trim().is_empty() || major.parse::<u32>().is_err() {
            return Err(AppError::new(
                ErrorCategory::ConfigurationError,
                format!(
                    "puppet_version '{}' must start with a numeric major version",
                    config.puppet_version
                ),
            )
            .with_code("CFG-003"));
        }

        if !SUPPORTED_BACKENDS.contains(&config.backend.as_str()) {
            return Err(AppError::new(
                ErrorCategory::ConfigurationError,
                format!(
                    "backend '{}' is not supported; expected one of {}",
                    config.backend,
                    SUPPORTED_BACKENDS.join(", ")
                ),
            )
            .with_code("CFG-003"));
        }

        if config.worker_count == 0 {
            return Err(AppError::new(
                ErrorCategory::ConfigurationError,
                "worker_count must be at least 1",
            )
            .with_code("CFG-003"));
        }

        Ok(())
    }
}
