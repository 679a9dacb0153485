use async_trait::async_trait;
use futures::stream::BoxStream;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Stream of fallible items produced by a long-running engine operation.
pub type EngineStream<T> = BoxStream<'static, Result<T, EngineError>>;

/// Errors raised at the container engine boundary.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("failed to launch container engine: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("failed to read container engine output: {0}")]
    Read(std::io::Error),

    #[error("{command} failed: {stderr}")]
    Command { command: String, stderr: String },

    #[error("unexpected engine output: {0}")]
    Parse(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineVersion {
    pub platform: String,
    pub version: String,
    pub api_version: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageSummary {
    pub id: String,
    pub repo_tags: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildRequest {
    /// Directory sent as the build context
    pub context_dir: PathBuf,
    /// Recipe file name, relative to `context_dir`
    pub dockerfile: String,
    pub tag: String,
    pub remove_intermediate: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindMount {
    pub source: PathBuf,
    pub target: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerSpec {
    pub image: String,
    /// Replaces the image's default command when set
    pub cmd: Option<Vec<String>>,
    pub mounts: Vec<BindMount>,
}

/// One piece of container output, tagged with the stream it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogChunk {
    Stdout(String),
    Stderr(String),
}

/// Operations the container backend needs from an engine.
#[async_trait]
pub trait ContainerEngine: Send + Sync {
    async fn version(&self) -> Result<EngineVersion, EngineError>;

    async fn list_images(&self) -> Result<Vec<ImageSummary>, EngineError>;

    async fn remove_image(&self, image_id: &str, force: bool) -> Result<(), EngineError>;

    /// Build an image; the stream yields raw progress lines and ends with an
    /// error item if the build fails.
    async fn build_image(&self, request: &BuildRequest) -> Result<EngineStream<String>, EngineError>;

    /// Returns the new container id.
    async fn create_container(&self, spec: &ContainerSpec) -> Result<String, EngineError>;

    async fn start_container(&self, id: &str) -> Result<(), EngineError>;

    /// Block until the container stops and return its exit status.
    async fn wait_container(&self, id: &str) -> Result<i64, EngineError>;

    /// Follow the container's stdout and stderr until it exits.
    async fn container_logs(&self, id: &str) -> Result<EngineStream<LogChunk>, EngineError>;

    async fn stop_container(&self, id: &str, grace: Duration) -> Result<(), EngineError>;

    async fn remove_container(&self, id: &str, remove_volumes: bool) -> Result<(), EngineError>;
}

/// Produces an engine client; called lazily, at most once per backend.
#[async_trait]
pub trait EngineConnector: Send + Sync {
    async fn connect(&self) -> Result<Arc<dyn ContainerEngine>, EngineError>;
}
