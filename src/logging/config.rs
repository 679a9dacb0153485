use crate::core::config::LoggingSettings;
use crate::logging::layers::console::ConsoleOutput;
use crate::Result;
use anyhow::anyhow;
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use tracing_subscriber::filter::Directive;

const DEFAULT_LEVEL: &str = "info";
const VERBOSE_LEVEL: &str = "debug";

/// Resolved logging configuration after reading config files and env overrides.
#[derive(Debug, Clone, PartialEq)]
pub struct LoggingConfig {
    pub log_dir: Option<PathBuf>,
    pub default_level: String,
    pub enable_file: bool,
    pub console_output: Option<ConsoleOutput>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            log_dir: None,
            default_level: DEFAULT_LEVEL.to_string(),
            enable_file: true,
            console_output: None,
        }
    }
}

impl LoggingConfig {
    /// Load configuration with deterministic precedence: defaults, the
    /// `[logging]` table, env overrides, then `--verbose`.
    pub fn load(settings: &LoggingSettings, verbose: bool) -> Result<Self> {
        let mut config = LoggingConfig::default();
        config.apply(settings)?;
        config.apply_env_overrides();
        if verbose {
            config.default_level = VERBOSE_LEVEL.to_string();
        }
        config.validate()?;
        Ok(config)
    }

    fn apply(&mut self, settings: &LoggingSettings) -> Result<()> {
        if let Some(log_dir) = &settings.log_dir {
            self.log_dir = Some(log_dir.clone());
        }
        if let Some(default_level) = &settings.default_level {
            self.default_level = default_level.clone();
        }
        if let Some(enable_file) = settings.enable_file {
            self.enable_file = enable_file;
        }
        if let Some(console_output) = &settings.console_output {
            self.console_output =
                Some(ConsoleOutput::from_str(console_output).map_err(|err| anyhow!(err))?);
        }
        Ok(())
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(level) = env::var("PDK_LOG_LEVEL") {
            if !level.trim().is_empty() {
                self.default_level = level;
            }
        }
        if let Ok(dir) = env::var("PDK_LOG_DIR") {
            if !dir.trim().is_empty() {
                self.log_dir = Some(PathBuf::from(dir));
            }
        }
    }

    fn validate(&self) -> Result<()> {
        Directive::from_str(&self.default_level)
            .map_err(|_| anyhow!("logging.default_level must be a valid tracing directive"))?;
        Ok(())
    }
}
