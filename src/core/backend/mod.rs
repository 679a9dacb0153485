pub mod container;
pub mod docker_cli;
pub mod engine;
pub mod recipe;

pub use container::{BackendOptions, ContainerBackend, CACHE_MOUNT, CODE_MOUNT};
pub use docker_cli::{DockerCli, DockerCliConnector};
pub use engine::{
    BindMount, BuildRequest, ContainerEngine, ContainerSpec, EngineConnector, EngineError,
    EngineStream, EngineVersion, ImageSummary, LogChunk,
};

use crate::core::error::AppError;
use crate::core::tool::Tool;
use async_trait::async_trait;

/// Availability of an execution backend, with a message suitable for users.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendStatus {
    pub is_available: bool,
    pub message: String,
}

impl BackendStatus {
    pub fn available(message: impl Into<String>) -> Self {
        BackendStatus {
            is_available: true,
            message: message.into(),
        }
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        BackendStatus {
            is_available: false,
            message: message.into(),
        }
    }
}

/// Turns a tool descriptor plus arguments into an isolated run.
///
/// Implementations never keep tool state between calls; everything a run
/// produces is written back into the `Tool` it was handed.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Run the tool, capturing its output into `tool.stdout` / `tool.stderr`.
    async fn validate(&self, tool: &mut Tool) -> Result<(), AppError>;

    /// Run the tool with its output mirrored to this process's stdout/stderr.
    async fn exec(&self, tool: &mut Tool) -> Result<(), AppError>;

    async fn status(&self) -> BackendStatus;
}
