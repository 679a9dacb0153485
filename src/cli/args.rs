use clap::Args;
use std::path::PathBuf;

#[derive(Args, Debug, Clone, Default)]
pub struct ValidateArgs {
    /// Tool to run, as author/id or author/id/version
    #[arg(value_name = "TOOL")]
    pub tool: Option<String>,

    /// Run a group of tools defined in validate.yml at the code path
    #[arg(long, value_name = "ID", conflicts_with = "tool")]
    pub group: Option<String>,

    /// Extra arguments for TOOL, replacing its default arguments
    #[arg(long, value_name = "ARGS", allow_hyphen_values = true)]
    pub tool_args: Option<String>,

    /// List installed validators and exit
    #[arg(long)]
    pub list: bool,

    /// Number of tools to run at once
    #[arg(long, value_name = "N", help_heading = "Execution")]
    pub workers: Option<usize>,

    /// Run tools one at a time
    #[arg(long, help_heading = "Execution")]
    pub serial: bool,

    /// Rebuild tool images even when they already exist
    #[arg(long, help_heading = "Execution")]
    pub always_build: bool,

    /// Per-tool timeout in seconds
    #[arg(long, value_name = "SECONDS", help_heading = "Execution")]
    pub timeout: Option<i64>,

    #[command(flatten)]
    pub paths: PathArgs,
}

#[derive(Args, Debug, Clone, Default)]
pub struct ExecArgs {
    /// Tool to run, as author/id or author/id/version
    #[arg(value_name = "TOOL")]
    pub tool: String,

    /// Extra arguments for TOOL, replacing its default arguments
    #[arg(long, value_name = "ARGS", allow_hyphen_values = true)]
    pub tool_args: Option<String>,

    /// Rebuild the tool image even when it already exists
    #[arg(long)]
    pub always_build: bool,

    /// Timeout in seconds
    #[arg(long, value_name = "SECONDS")]
    pub timeout: Option<i64>,

    #[command(flatten)]
    pub paths: PathArgs,
}

/// Directory overrides shared by commands that run tools.
#[derive(Args, Debug, Clone, Default)]
pub struct PathArgs {
    /// Root holding installed tools (<author>/<id>/<version>/prm-config.yml)
    #[arg(long, value_name = "DIR", help_heading = "Paths")]
    pub tool_path: Option<PathBuf>,

    /// Content to validate, mounted at /code
    #[arg(long, value_name = "DIR", help_heading = "Paths")]
    pub code_path: Option<PathBuf>,

    /// Shared cache, mounted at /cache
    #[arg(long, value_name = "DIR", help_heading = "Paths")]
    pub cache_path: Option<PathBuf>,
}

#[derive(Args, Debug, Clone, Default)]
pub struct StatusArgs {}

#[derive(Args, Debug, Clone, Default)]
pub struct ConfigArgs {
    /// Print the supported environment variables instead of the configuration
    #[arg(long)]
    pub env: bool,
}
