pub mod args;
pub mod commands;

pub use args::{ConfigArgs, ExecArgs, PathArgs, StatusArgs, ValidateArgs};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

const HELP_TEMPLATE: &str = "\
{name} {version}\n\
{about-with-newline}\n\
USAGE:\n    {usage}\n\
\nOPTIONS:\n{options}\n\
COMMANDS:\n{subcommands}\n";

#[derive(Parser, Debug)]
#[command(name = "pdk")]
#[command(version = crate::VERSION)]
#[command(about = "Run Puppet content validators in isolated containers")]
#[command(help_template = HELP_TEMPLATE)]
#[command(
    after_long_help = "Typical flow: list installed validators, run one or a group against your content, then inspect the reported failures."
)]
pub struct Args {
    /// Path to the configuration file (default: <config dir>/pdk/pdk.toml)
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long, short, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    #[command(
        about = "Validate content with one tool or a group of tools",
        long_about = "Validate resolves the requested tools against the installed catalog, runs each in its own container with bounded parallelism, and prints the output of every tool that failed.",
        after_help = "Examples:\n    pdk validate puppetlabs/rubocop --tool-args \"--fail-level E\"\n    pdk validate --group lint --workers 2\n    pdk validate --list"
    )]
    Validate(ValidateArgs),
    #[command(
        about = "Run a single tool with its output streamed to the terminal",
        after_help = "Example:\n    pdk exec puppetlabs/rubocop/0.1.0 --tool-args \"--auto-correct\""
    )]
    Exec(ExecArgs),
    #[command(about = "Report whether the container engine is reachable")]
    Status(StatusArgs),
    #[command(about = "Print the effective configuration")]
    Config(ConfigArgs),
}

/// Result of a command that completed without a fatal error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Passed,
    Failed,
}

pub async fn run(args: Args) -> crate::Result<Outcome> {
    let config_path = args
        .config
        .clone()
        .unwrap_or_else(crate::core::ConfigLoader::default_path);

    match args.command {
        Command::Validate(validate_args) => {
            commands::validate(&config_path, args.verbose, validate_args).await
        }
        Command::Exec(exec_args) => commands::exec(&config_path, args.verbose, exec_args).await,
        Command::Status(status_args) => {
            commands::status(&config_path, args.verbose, status_args).await
        }
        Command::Config(config_args) => commands::config(&config_path, config_args),
    }
}
