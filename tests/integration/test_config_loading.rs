use pdk::core::config::ConfigLoader;
use pdk::core::{ConfigValidator, ErrorCategory, LoggingSettings};
use pdk::logging::{ConsoleOutput, LoggingConfig};
use serial_test::serial;
use std::env;
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

const PDK_VARS: &[&str] = &[
    "PDK_PUPPET_VERSION",
    "PDK_BACKEND",
    "PDK_BASE_IMAGE",
    "PDK_TOOL_PATH",
    "PDK_CODE_PATH",
    "PDK_CACHE_PATH",
    "PDK_ALWAYS_BUILD",
    "PDK_TOOL_TIMEOUT",
    "PDK_WORKER_COUNT",
    "PDK_SERIAL",
    "PDK_LOG_LEVEL",
    "PDK_LOG_DIR",
];

fn clear_pdk_env() {
    for var in PDK_VARS {
        env::remove_var(var);
    }
}

#[test]
#[serial]
fn missing_file_yields_defaults() {
    clear_pdk_env();
    let temp = TempDir::new().unwrap();

    let config = ConfigLoader::load(&temp.path().join("pdk.toml")).unwrap();

    assert_eq!(config.puppet_version, "7.14.0");
    assert_eq!(config.backend, "docker");
    assert_eq!(config.base_image, "puppet/puppet-agent");
    assert_eq!(config.code_path, PathBuf::from("."));
    assert_eq!(config.tool_timeout, 1800);
    assert!(!config.always_build);
    assert!(ConfigValidator::validate(&config).is_ok());
}

#[test]
#[serial]
fn file_values_are_read() {
    clear_pdk_env();
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("pdk.toml");
    fs::write(
        &path,
        r#"
puppet_version = "6.28.0"
tool_path = "/opt/pdk/tools"
worker_count = 3
serial = true

[logging]
default_level = "warn"
console_output = "stdout"
"#,
    )
    .unwrap();

    let config = ConfigLoader::load(&path).unwrap();

    assert_eq!(config.puppet_version, "6.28.0");
    assert_eq!(config.tool_path, PathBuf::from("/opt/pdk/tools"));
    assert_eq!(config.worker_count, 3);
    assert_eq!(config.effective_workers(), 1);
    assert_eq!(config.logging.default_level.as_deref(), Some("warn"));
}

#[test]
#[serial]
fn environment_overrides_file() {
    clear_pdk_env();
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("pdk.toml");
    fs::write(&path, "puppet_version = \"6.28.0\"\ntool_timeout = 60\n").unwrap();

    env::set_var("PDK_PUPPET_VERSION", "5.5.22");
    env::set_var("PDK_ALWAYS_BUILD", "true");
    env::set_var("PDK_TOOL_TIMEOUT", "not-a-number");
    let config = ConfigLoader::load(&path).unwrap();
    clear_pdk_env();

    assert_eq!(config.puppet_version, "5.5.22");
    assert!(config.always_build);
    assert_eq!(config.tool_timeout, 60);
}

#[test]
#[serial]
fn invalid_toml_is_a_configuration_error() {
    clear_pdk_env();
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("pdk.toml");
    fs::write(&path, "puppet_version = [unterminated").unwrap();

    let err = ConfigLoader::load(&path).unwrap_err();

    assert_eq!(err.category, ErrorCategory::ConfigurationError);
    assert_eq!(err.code, "CFG-002");
}

#[test]
#[serial]
fn logging_settings_layer_with_env_and_verbose() {
    clear_pdk_env();
    let settings = LoggingSettings {
        default_level: Some("warn".to_string()),
        log_dir: None,
        enable_file: Some(false),
        console_output: Some("none".to_string()),
    };

    let config = LoggingConfig::load(&settings, false).unwrap();
    assert_eq!(config.default_level, "warn");
    assert!(!config.enable_file);
    assert_eq!(config.console_output, Some(ConsoleOutput::None));

    env::set_var("PDK_LOG_LEVEL", "error");
    env::set_var("PDK_LOG_DIR", "/var/log/pdk");
    let config = LoggingConfig::load(&settings, false).unwrap();
    assert_eq!(config.default_level, "error");
    assert_eq!(config.log_dir, Some(PathBuf::from("/var/log/pdk")));

    let config = LoggingConfig::load(&settings, true).unwrap();
    clear_pdk_env();
    assert_eq!(config.default_level, "debug");
}

#[test]
#[serial]
fn invalid_logging_values_are_rejected() {
    clear_pdk_env();
    let bad_level = LoggingSettings {
        default_level: Some("pdk=loud".to_string()),
        ..Default::default()
    };
    assert!(LoggingConfig::load(&bad_level, false).is_err());

    let bad_output = LoggingSettings {
        console_output: Some("syslog".to_string()),
        ..Default::default()
    };
    let err = LoggingConfig::load(&bad_output, false).unwrap_err();
    assert!(err.to_string().contains("console_output"));
}
