pub mod backend;
pub mod config;
pub mod error;
pub mod pool;
pub mod tool;
pub mod types;
pub mod validator;

pub use backend::{Backend, BackendOptions, BackendStatus, ContainerBackend};
pub use config::{ConfigLoader, ConfigValidator, EngineConfig, LoggingSettings};
pub use error::{AppError, DefaultErrorReporter, ErrorReporter};
pub use pool::{Pool, Task, TaskReport};
pub use tool::{find_tool_configs, Namespace, Tool, ToolCatalog, ToolConfig};
pub use types::*;
pub use validator::{clean_output, ValidationSummary, Validator, ValidatorOptions};
