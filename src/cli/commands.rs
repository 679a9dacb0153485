use crate::{
    cli::args::{ConfigArgs, ExecArgs, PathArgs, StatusArgs, ValidateArgs},
    cli::Outcome,
    core::{
        find_tool_configs, Backend, ConfigLoader, ConfigValidator, ContainerBackend,
        DefaultErrorReporter, EngineConfig, ErrorReporter, Namespace, Tool, ToolCatalog,
        Validator, ValidatorOptions,
    },
    logging::{self, LoggingConfig, LoggingGuard},
    utils::render_table,
    Result,
};
use anyhow::anyhow;
use std::io::{self, Write};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, warn};

fn load_config(path: &Path) -> Result<EngineConfig> {
    debug!(path = %path.display(), "loading configuration");
    Ok(ConfigLoader::load(path)?)
}

fn apply_paths(config: &mut EngineConfig, paths: &PathArgs) {
    if let Some(tool_path) = &paths.tool_path {
        config.tool_path = tool_path.clone();
    }
    if let Some(code_path) = &paths.code_path {
        config.code_path = code_path.clone();
    }
    if let Some(cache_path) = &paths.cache_path {
        config.cache_path = cache_path.clone();
    }
}

fn init_logging(config: &EngineConfig, verbose: bool) -> Result<LoggingGuard> {
    let logging_config = LoggingConfig::load(&config.logging, verbose)?;
    logging::init(&logging_config)
}

fn build_backend(config: &EngineConfig) -> Result<Arc<dyn Backend>> {
    match config.backend.as_str() {
        "docker" => Ok(Arc::new(ContainerBackend::docker(config))),
        other => Err(anyhow!("backend '{}' is not supported", other)),
    }
}

fn split_args(raw: Option<&str>) -> Vec<String> {
    raw.unwrap_or_default()
        .split_whitespace()
        .map(str::to_string)
        .collect()
}

pub async fn validate(config_path: &Path, verbose: bool, args: ValidateArgs) -> Result<Outcome> {
    let mut config = load_config(config_path)?;
    apply_paths(&mut config, &args.paths);
    if let Some(workers) = args.workers {
        config.worker_count = workers;
    }
    if args.serial {
        config.serial = true;
    }
    if args.always_build {
        config.always_build = true;
    }
    if let Some(timeout) = args.timeout {
        config.tool_timeout = timeout;
    }
    ConfigValidator::validate(&config)?;
    let _guard = init_logging(&config, verbose)?;

    let mut options = ValidatorOptions::from_config(&config);
    options.tool = args.tool;
    options.group = args.group;
    options.tool_args = args.tool_args.unwrap_or_default();
    let validator = Validator::new(options, build_backend(&config)?);

    if args.list {
        let table = validator.list();
        let mut stdout = io::stdout().lock();
        render_table(&table, &mut stdout)?;
        stdout.flush()?;
        return Ok(Outcome::Passed);
    }

    let summary = validator.run().await?;
    {
        let mut stdout = io::stdout().lock();
        summary.write_output(&mut stdout)?;
        stdout.flush()?;
    }

    for failure in summary.failures() {
        if let Some(error) = &failure.error {
            warn!(
                task = %failure.name,
                code = %error.code,
                error = %error.message,
                "validation failed"
            );
        }
    }

    if summary.passed() {
        Ok(Outcome::Passed)
    } else {
        Ok(Outcome::Failed)
    }
}

pub async fn exec(config_path: &Path, verbose: bool, args: ExecArgs) -> Result<Outcome> {
    let mut config = load_config(config_path)?;
    apply_paths(&mut config, &args.paths);
    if args.always_build {
        config.always_build = true;
    }
    if let Some(timeout) = args.timeout {
        config.tool_timeout = timeout;
    }
    ConfigValidator::validate(&config)?;
    let _guard = init_logging(&config, verbose)?;

    let namespace = Namespace::parse(&args.tool)?;
    let catalog = ToolCatalog::new(&config.tool_path);
    let tool_config = find_tool_configs(catalog.load(false), std::slice::from_ref(&namespace))?
        .into_iter()
        .next()
        .ok_or_else(|| anyhow!("{} tool cannot be found", namespace))?;

    let mut tool = Tool::new(tool_config, split_args(args.tool_args.as_deref()));
    let backend = build_backend(&config)?;

    match backend.exec(&mut tool).await {
        Ok(()) => Ok(Outcome::Passed),
        Err(error) => {
            DefaultErrorReporter::new().report_error(&error);
            Ok(Outcome::Failed)
        }
    }
}

pub async fn status(config_path: &Path, verbose: bool, _args: StatusArgs) -> Result<Outcome> {
    let config = load_config(config_path)?;
    ConfigValidator::validate(&config)?;
    let _guard = init_logging(&config, verbose)?;

    let backend = build_backend(&config)?;
    let status = backend.status().await;

    if status.is_available {
        println!("{} is available", config.backend);
        println!("{}", status.message);
        Ok(Outcome::Passed)
    } else {
        println!("{} is not available", config.backend);
        println!("{}", status.message);
        Ok(Outcome::Failed)
    }
}

pub fn config(config_path: &Path, args: ConfigArgs) -> Result<Outcome> {
    if args.env {
        for line in ConfigLoader::env_var_documentation() {
            println!("{}", line);
        }
        return Ok(Outcome::Passed);
    }

    let config = load_config(config_path)?;
    println!("# {}", config_path.display());
    print!("{}", toml::to_string_pretty(&config)?);
    Ok(Outcome::Passed)
}
