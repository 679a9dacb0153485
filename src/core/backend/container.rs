#![allow(clippy::result_large_err)]

use super::docker_cli::DockerCliConnector;
use super::engine::{
    BindMount, BuildRequest, ContainerEngine, ContainerSpec, EngineConnector, EngineError,
    LogChunk,
};
use super::recipe::{self, GENERATED_RECIPE_FILE};
use super::{Backend, BackendStatus};
use crate::core::config::EngineConfig;
use crate::core::error::AppError;
use crate::core::tool::Tool;
use crate::core::types::ErrorCategory;
use async_trait::async_trait;
use futures::{FutureExt, StreamExt};
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::{oneshot, OnceCell};
use tokio::task::JoinHandle;
use tokio::time::{timeout_at, Instant};
use tracing::{debug, error, info, warn};

/// Mount point of the content under validation.
pub const CODE_MOUNT: &str = "/code";
/// Mount point of the shared cache directory.
pub const CACHE_MOUNT: &str = "/cache";

const DAEMON_NOT_RUNNING: &str =
    "error during connect: This error may indicate that the docker daemon is not running.";
const DAEMON_NOT_RUNNING_HINTS: &[&str] = &[DAEMON_NOT_RUNNING, "Is the docker daemon running?"];

/// Settings shared by every run on a backend.
#[derive(Debug, Clone, PartialEq)]
pub struct BackendOptions {
    pub runtime_version: String,
    pub base_image: String,
    pub code_path: PathBuf,
    pub cache_path: PathBuf,
    pub always_build: bool,
    pub run_timeout: Duration,
    /// Time a container is given to stop before it is killed
    pub stop_grace: Duration,
}

impl BackendOptions {
    pub fn from_config(config: &EngineConfig) -> Self {
        BackendOptions {
            runtime_version: config.puppet_version.clone(),
            base_image: config.base_image.clone(),
            code_path: config.code_path.clone(),
            cache_path: config.cache_path.clone(),
            always_build: config.always_build,
            run_timeout: config.run_timeout(),
            stop_grace: Duration::ZERO,
        }
    }
}

/// Where container output goes while a run is attached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OutputSink {
    Capture,
    Mirror,
}

impl OutputSink {
    async fn write(self, tool: &mut Tool, chunk: LogChunk) {
        match (self, chunk) {
            (OutputSink::Capture, LogChunk::Stdout(text)) => tool.stdout.push_str(&text),
            (OutputSink::Capture, LogChunk::Stderr(text)) => tool.stderr.push_str(&text),
            (OutputSink::Mirror, LogChunk::Stdout(text)) => {
                if let Err(err) = mirror(&mut tokio::io::stdout(), &text).await {
                    debug!(error = %err, "failed to mirror stdout");
                }
            }
            (OutputSink::Mirror, LogChunk::Stderr(text)) => {
                if let Err(err) = mirror(&mut tokio::io::stderr(), &text).await {
                    debug!(error = %err, "failed to mirror stderr");
                }
            }
        }
    }
}

async fn mirror<W: AsyncWrite + Unpin>(out: &mut W, text: &str) -> std::io::Result<()> {
    out.write_all(text.as_bytes()).await?;
    out.flush().await
}

/// Runs tools in throwaway containers built from a per-tool recipe.
///
/// The engine client is created on first use and shared by every run
/// afterwards.
pub struct ContainerBackend {
    options: BackendOptions,
    connector: Arc<dyn EngineConnector>,
    client: OnceCell<Arc<dyn ContainerEngine>>,
}

impl ContainerBackend {
    pub fn new(options: BackendOptions, connector: Arc<dyn EngineConnector>) -> Self {
        ContainerBackend {
            options,
            connector,
            client: OnceCell::new(),
        }
    }

    /// Backend talking to the local `docker` client.
    pub fn docker(config: &EngineConfig) -> Self {
        Self::new(
            BackendOptions::from_config(config),
            Arc::new(DockerCliConnector::default()),
        )
    }

    pub fn options(&self) -> &BackendOptions {
        &self.options
    }

    async fn client(&self) -> Result<Arc<dyn ContainerEngine>, EngineError> {
        self.client
            .get_or_try_init(|| self.connector.connect())
            .await
            .cloned()
    }

    pub fn image_name(&self, tool: &Tool) -> String {
        recipe::image_name(&self.options.runtime_version, &tool.config)
    }

    /// Make sure an image for the tool exists, building it when missing or
    /// when `always_build` is set.
    pub async fn provision(&self, tool: &Tool) -> Result<(), AppError> {
        let client = self
            .client()
            .await
            .map_err(|e| engine_error(ErrorCategory::BackendUnavailable, "BACKEND-002", e))?;
        let image = self.image_name(tool);

        let images = client
            .list_images()
            .await
            .map_err(|e| engine_error(ErrorCategory::BuildFailure, "BUILD-002", e))?;
        let existing = images
            .iter()
            .find(|summary| summary.repo_tags.iter().any(|tag| tag == &image))
            .map(|summary| summary.id.clone());

        if let Some(image_id) = existing {
            if !self.options.always_build {
                debug!(image = %image, "using existing image");
                return Ok(());
            }
            info!(image = %image, "Rebuilding image. Please wait...");
            client
                .remove_image(&image_id, true)
                .await
                .map_err(|e| engine_error(ErrorCategory::BuildFailure, "BUILD-002", e))?;
        } else {
            info!(image = %image, "Building image. Please wait...");
        }

        let contents = recipe::synthesize(
            &self.options.base_image,
            &self.options.runtime_version,
            &tool.config,
        )?;
        let recipe_path = tool.config.path.join(GENERATED_RECIPE_FILE);
        tokio::fs::write(&recipe_path, contents).await.map_err(|e| {
            AppError::with_source(
                ErrorCategory::BuildFailure,
                format!("failed to write {}", recipe_path.display()),
                Box::new(e),
            )
            .with_code("BUILD-001")
        })?;

        let request = BuildRequest {
            context_dir: tool.config.path.clone(),
            dockerfile: GENERATED_RECIPE_FILE.to_string(),
            tag: image.clone(),
            remove_intermediate: true,
        };
        let mut progress = client
            .build_image(&request)
            .await
            .map_err(|e| engine_error(ErrorCategory::BuildFailure, "BUILD-003", e))?;

        while let Some(line) = progress.next().await {
            let line =
                line.map_err(|e| engine_error(ErrorCategory::BuildFailure, "BUILD-003", e))?;
            if let Some(text) = build_progress_text(&line) {
                debug!(image = %image, "{}", text);
            }
        }

        Ok(())
    }

    async fn engine_status(&self) -> BackendStatus {
        let client = match self.client().await {
            Ok(client) => client,
            Err(err) => {
                return BackendStatus::unavailable(normalize_status_message(&format!(
                    "unable to initialize the container engine client: {}",
                    err
                )))
            }
        };

        match client.version().await {
            Ok(version) => BackendStatus::available(format!(
                "\tPlatform: {}\n\tVersion: {}\n\tAPI Version: {}",
                version.platform, version.version, version.api_version
            )),
            Err(err) => BackendStatus::unavailable(normalize_status_message(&err.to_string())),
        }
    }

    async fn run_tool(&self, tool: &mut Tool, sink: OutputSink) -> Result<(), AppError> {
        self.provision(tool).await?;

        let status = self.engine_status().await;
        if !status.is_available {
            error!(tool = %tool.task_name(), message = %status.message, "container engine is not available");
            return Err(
                AppError::new(ErrorCategory::BackendUnavailable, status.message)
                    .with_code("BACKEND-001"),
            );
        }

        let client = self
            .client()
            .await
            .map_err(|e| engine_error(ErrorCategory::BackendUnavailable, "BACKEND-002", e))?;

        let code_dir = absolute_path(&self.options.code_path)?;
        let cache_dir = absolute_path(&self.options.cache_path)?;
        tokio::fs::create_dir_all(&cache_dir).await.map_err(|e| {
            AppError::new(
                ErrorCategory::IoError,
                format!("failed to create cache directory {}: {}", cache_dir.display(), e),
            )
        })?;

        let spec = ContainerSpec {
            image: self.image_name(tool),
            cmd: if tool.args.is_empty() {
                None
            } else {
                Some(tool.args.clone())
            },
            mounts: vec![
                BindMount {
                    source: code_dir,
                    target: CODE_MOUNT.to_string(),
                },
                BindMount {
                    source: cache_dir,
                    target: CACHE_MOUNT.to_string(),
                },
            ],
        };

        let deadline = Instant::now() + self.options.run_timeout;
        let container_id = match timeout_at(deadline, client.create_container(&spec)).await {
            Ok(created) => {
                created.map_err(|e| engine_error(ErrorCategory::RunFailure, "RUN-001", e))?
            }
            Err(_) => return Err(self.timeout_error(tool)),
        };
        debug!(container = %container_id, tool = %tool.task_name(), "container created");

        let guard = ContainerGuard::new(client.clone(), container_id.clone(), self.options.stop_grace);
        let attempt = AssertUnwindSafe(timeout_at(
            deadline,
            attach(client, &container_id, tool, sink),
        ))
        .catch_unwind()
        .await;
        guard.release().await;

        match attempt {
            Ok(Ok(result)) => result,
            Ok(Err(_elapsed)) => Err(self.timeout_error(tool)),
            Err(panic) => std::panic::resume_unwind(panic),
        }
    }

    fn timeout_error(&self, tool: &Tool) -> AppError {
        AppError::new(
            ErrorCategory::TimeoutError,
            format!(
                "{} did not finish within {}s",
                tool.task_name(),
                self.options.run_timeout.as_secs()
            ),
        )
        .with_code("RUN-002")
    }
}

#[async_trait]
impl Backend for ContainerBackend {
    async fn validate(&self, tool: &mut Tool) -> Result<(), AppError> {
        self.run_tool(tool, OutputSink::Capture).await
    }

    async fn exec(&self, tool: &mut Tool) -> Result<(), AppError> {
        info!(
            tool = %tool.task_name(),
            code = %self.options.code_path.display(),
            cache = %self.options.cache_path.display(),
            "executing tool"
        );
        self.run_tool(tool, OutputSink::Mirror).await
    }

    async fn status(&self) -> BackendStatus {
        self.engine_status().await
    }
}

/// Start the container and follow it until it exits, routing output through `sink`.
async fn attach(
    client: Arc<dyn ContainerEngine>,
    container_id: &str,
    tool: &mut Tool,
    sink: OutputSink,
) -> Result<(), AppError> {
    client
        .start_container(container_id)
        .await
        .map_err(|e| engine_error(ErrorCategory::RunFailure, "RUN-003", e))?;

    let (exit_tx, mut exit_rx) = oneshot::channel();
    let _listener = WaitListener({
        let client = client.clone();
        let id = container_id.to_string();
        tokio::spawn(async move {
            let _ = exit_tx.send(client.wait_container(&id).await);
        })
    });

    let mut logs = client
        .container_logs(container_id)
        .await
        .map_err(|e| engine_error(ErrorCategory::RunFailure, "RUN-004", e))?;
    let mut logs_open = true;

    let exit = loop {
        tokio::select! {
            exit = &mut exit_rx => break exit,
            chunk = logs.next(), if logs_open => match chunk {
                Some(Ok(chunk)) => sink.write(tool, chunk).await,
                Some(Err(err)) => return Err(engine_error(ErrorCategory::RunFailure, "RUN-004", err)),
                None => logs_open = false,
            },
        }
    };

    let exit_code = exit
        .map_err(|_| {
            AppError::new(
                ErrorCategory::InternalError,
                "container wait listener stopped before reporting an exit code",
            )
        })?
        .map_err(|e| engine_error(ErrorCategory::RunFailure, "RUN-003", e))?;

    while logs_open {
        match logs.next().await {
            Some(Ok(chunk)) => sink.write(tool, chunk).await,
            Some(Err(err)) => {
                return Err(engine_error(ErrorCategory::RunFailure, "RUN-004", err))
            }
            None => logs_open = false,
        }
    }

    tool.exit_code = exit_code;
    if exit_code == tool.config.common.success_exit_code {
        debug!(tool = %tool.task_name(), exit_code, "tool finished");
        return Ok(());
    }

    let message = if tool.stderr.is_empty() {
        format!("tool exited with code: {}", exit_code)
    } else {
        tool.stderr.clone()
    };
    Err(AppError::new(ErrorCategory::RunFailure, message)
        .with_code("RUN-001")
        .with_context(tool.task_name()))
}

/// Aborts the exit-code listener when the run finishes first.
struct WaitListener(JoinHandle<()>);

impl Drop for WaitListener {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Owns a created container until it is stopped and removed.
///
/// `release` tears the container down in place. If the guard is dropped
/// without being released, teardown is spawned onto the current runtime.
struct ContainerGuard {
    client: Arc<dyn ContainerEngine>,
    id: Option<String>,
    grace: Duration,
}

impl ContainerGuard {
    fn new(client: Arc<dyn ContainerEngine>, id: String, grace: Duration) -> Self {
        ContainerGuard {
            client,
            id: Some(id),
            grace,
        }
    }

    async fn release(mut self) {
        if let Some(id) = self.id.take() {
            teardown(self.client.clone(), id, self.grace).await;
        }
    }
}

impl Drop for ContainerGuard {
    fn drop(&mut self) {
        let Some(id) = self.id.take() else {
            return;
        };
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(teardown(self.client.clone(), id, self.grace));
            }
            Err(_) => warn!(container = %id, "no runtime available to remove container"),
        }
    }
}

async fn teardown(client: Arc<dyn ContainerEngine>, id: String, grace: Duration) {
    if let Err(err) = client.stop_container(&id, grace).await {
        error!(error = %cleanup_error(&id, err), "error stopping container");
    }
    if let Err(err) = client.remove_container(&id, true).await {
        error!(error = %cleanup_error(&id, err), "error removing container");
    }
}

fn cleanup_error(container_id: &str, err: EngineError) -> AppError {
    let mut error = engine_error(ErrorCategory::CleanupFailure, "CLEANUP-001", err);
    error.add_context("container", container_id);
    error
}

fn engine_error(category: ErrorCategory, code: &str, err: EngineError) -> AppError {
    AppError::new(category, err.to_string()).with_code(code)
}

fn absolute_path(path: &Path) -> Result<PathBuf, AppError> {
    if path.is_absolute() {
        return Ok(path.to_path_buf());
    }
    let cwd = std::env::current_dir().map_err(|e| {
        AppError::new(
            ErrorCategory::IoError,
            format!("failed to resolve {}: {}", path.display(), e),
        )
    })?;
    let joined = cwd.join(path);
    Ok(joined.canonicalize().unwrap_or(joined))
}

/// Replace daemon connection failures with a single stable message.
fn normalize_status_message(message: &str) -> String {
    if DAEMON_NOT_RUNNING_HINTS
        .iter()
        .any(|hint| message.contains(hint))
    {
        DAEMON_NOT_RUNNING.to_string()
    } else {
        message.to_string()
    }
}

/// Build progress is either `{"stream": "..."}` JSON or plain text.
fn build_progress_text(line: &str) -> Option<String> {
    let text = match serde_json::from_str::<HashMap<String, serde_json::Value>>(line) {
        Ok(message) => match message.get("stream").and_then(|v| v.as_str()) {
            Some(stream) => stream.to_string(),
            None => return None,
        },
        Err(_) => line.to_string(),
    };
    let text = text.trim_end().to_string();
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}
