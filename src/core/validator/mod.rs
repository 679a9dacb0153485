#![allow(clippy::result_large_err)]

use crate::core::backend::Backend;
use crate::core::config::EngineConfig;
use crate::core::error::AppError;
use crate::core::pool::{Pool, Task, TaskReport};
use crate::core::tool::{
    find_tool_configs, GroupFile, Namespace, Tool, ToolCatalog, GROUP_DESCRIPTOR_FILE,
};
use crate::core::types::ErrorCategory;
use crate::utils::table::TableOptions;
use regex::Regex;
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::{Arc, OnceLock};
use tokio::sync::Mutex;
use tracing::{debug, info};

/// What to validate and how.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatorOptions {
    pub tool_path: PathBuf,
    pub code_path: PathBuf,
    /// Single tool reference, used when no group is selected
    pub tool: Option<String>,
    /// Free-text arguments for `tool`, split on whitespace
    pub tool_args: String,
    /// Group id from `validate.yml` at the code root
    pub group: Option<String>,
    pub worker_count: usize,
}

impl ValidatorOptions {
    pub fn from_config(config: &EngineConfig) -> Self {
        ValidatorOptions {
            tool_path: config.tool_path.clone(),
            code_path: config.code_path.clone(),
            tool: None,
            tool_args: String::new(),
            group: None,
            worker_count: config.effective_workers(),
        }
    }
}

/// A requested tool reference with its arguments, in request order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolRequest {
    pub name: String,
    pub args: Vec<String>,
}

/// Results of one validation run.
#[derive(Debug)]
pub struct ValidationSummary {
    pub tools: Vec<Tool>,
    pub reports: Vec<TaskReport>,
}

impl ValidationSummary {
    pub fn failures(&self) -> impl Iterator<Item = &TaskReport> {
        self.reports.iter().filter(|report| !report.succeeded())
    }

    pub fn passed(&self) -> bool {
        self.failures().next().is_none()
    }

    /// Print the cleaned output of every tool that wrote to stderr or exited
    /// non-zero. A failed tool with no output of its own is reported with its
    /// error message instead.
    pub fn write_output<W: Write>(&self, out: &mut W) -> io::Result<()> {
        for (tool, report) in self.tools.iter().zip(&self.reports) {
            let output = if !tool.stderr.is_empty() {
                tool.stderr.as_str()
            } else if tool.exit_code != 0 {
                tool.stdout.as_str()
            } else {
                ""
            };

            let text = match (&report.error, output.is_empty()) {
                (_, false) => clean_output(output),
                (Some(error), true) => clean_output(&error.message),
                (None, true) => continue,
            };
            writeln!(out, "\n{}: {}", tool.config.display_name(), text)?;
        }
        Ok(())
    }
}

/// Resolves requested tools and runs them through a backend.
pub struct Validator {
    options: ValidatorOptions,
    backend: Arc<dyn Backend>,
}

impl Validator {
    pub fn new(options: ValidatorOptions, backend: Arc<dyn Backend>) -> Self {
        Validator { options, backend }
    }

    pub fn options(&self) -> &ValidatorOptions {
        &self.options
    }

    /// Tool references and their arguments, from the selected group or from
    /// the single requested tool.
    pub fn tool_requests(&self) -> Result<Vec<ToolRequest>, AppError> {
        if let Some(group_id) = self.options.group.as_deref().filter(|g| !g.is_empty()) {
            let path = self.options.code_path.join(GROUP_DESCRIPTOR_FILE);
            let group = GroupFile::load(&path)?.select(group_id)?;
            return Ok(group
                .tools
                .into_iter()
                .map(|tool| ToolRequest {
                    name: tool.name,
                    args: tool.args,
                })
                .collect());
        }

        let name = self
            .options
            .tool
            .as_deref()
            .filter(|t| !t.is_empty())
            .ok_or_else(|| {
                AppError::new(
                    ErrorCategory::ValidationError,
                    "a tool or a group must be selected",
                )
                .with_code("VALIDATE-001")
            })?;

        Ok(vec![ToolRequest {
            name: name.to_string(),
            args: self
                .options
                .tool_args
                .split_whitespace()
                .map(str::to_string)
                .collect(),
        }])
    }

    /// Resolve every request against the catalog. Any malformed reference or
    /// missing tool fails the whole resolution.
    pub fn resolve_tools(&self) -> Result<Vec<Tool>, AppError> {
        let requests = self.tool_requests()?;
        let namespaces = requests
            .iter()
            .map(|request| Namespace::parse(&request.name))
            .collect::<Result<Vec<_>, _>>()?;

        let catalog = ToolCatalog::new(&self.options.tool_path);
        let configs = find_tool_configs(catalog.load(true), &namespaces)?;

        Ok(configs
            .into_iter()
            .zip(requests)
            .map(|(config, request)| Tool::new(config, request.args))
            .collect())
    }

    /// Validate every requested tool at the configured concurrency.
    pub async fn run(&self) -> Result<ValidationSummary, AppError> {
        let tools = self.resolve_tools()?;
        info!(tools = tools.len(), workers = self.options.worker_count, "starting validation");

        let mut shared = Vec::with_capacity(tools.len());
        let mut tasks = Vec::with_capacity(tools.len());
        for tool in tools {
            let name = tool.task_name();
            let tool = Arc::new(Mutex::new(tool));
            let backend = Arc::clone(&self.backend);
            shared.push(Arc::clone(&tool));
            tasks.push(Task::new(name, move || async move {
                let mut tool = tool.lock().await;
                backend.validate(&mut tool).await
            }));
        }

        let reports = Pool::new(tasks, self.options.worker_count).run().await;

        let mut tools = Vec::with_capacity(shared.len());
        for tool in shared {
            let tool = match Arc::try_unwrap(tool) {
                Ok(tool) => tool.into_inner(),
                Err(tool) => tool.lock().await.clone(),
            };
            tools.push(tool);
        }

        let summary = ValidationSummary { tools, reports };
        debug!(failed = summary.failures().count(), "validation finished");
        Ok(summary)
    }

    /// Installed validators as a table.
    pub fn list(&self) -> TableOptions {
        ToolCatalog::new(&self.options.tool_path).table(true)
    }
}

fn escape_sequences() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"\x1B(?:[@-Z\\-_]|\[[0-?]*[ -/]*[@-~])").expect("valid escape pattern")
    })
}

/// Strip terminal escape sequences, one leading and one trailing newline, and
/// the in-container `/code/` prefix.
pub fn clean_output(text: &str) -> String {
    let text = escape_sequences().replace_all(text, "");
    let text = text.strip_prefix('\n').unwrap_or(&text);
    let text = text.strip_suffix('\n').unwrap_or(text);
    text.replace("/code/", "")
}
