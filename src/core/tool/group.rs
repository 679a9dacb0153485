#![allow(clippy::result_large_err)]

use crate::core::error::AppError;
use crate::core::types::ErrorCategory;
use serde::Deserialize;
use std::fs;
use std::path::Path;
use tracing::error;

/// Group descriptor file name at the code root.
pub const GROUP_DESCRIPTOR_FILE: &str = "validate.yml";

/// A tool invocation inside a group.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct GroupTool {
    pub name: String,
    #[serde(default)]
    pub args: Vec<String>,
}

/// A named bundle of tool invocations.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Group {
    pub id: String,
    #[serde(default)]
    pub tools: Vec<GroupTool>,
}

/// Contents of `validate.yml`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GroupFile {
    #[serde(default)]
    pub groups: Vec<Group>,
}

impl GroupFile {
    pub fn load(path: &Path) -> Result<Self, AppError> {
        let content = fs::read_to_string(path).map_err(|e| {
            error!(path = %path.display(), error = %e, "error reading group file");
            AppError::new(
                ErrorCategory::IoError,
                format!("Failed to read {}: {}", path.display(), e),
            )
            .with_code("GROUP-001")
        })?;

        serde_yaml::from_str(&content).map_err(|e| {
            error!(path = %path.display(), error = %e, "group file is not formatted correctly");
            AppError::new(
                ErrorCategory::ValidationError,
                format!("{} is not formatted correctly: {}", path.display(), e),
            )
            .with_code("GROUP-001")
        })
    }

    pub fn select(self, id: &str) -> Result<Group, AppError> {
        self.groups
            .into_iter()
            .find(|group| group.id == id)
            .ok_or_else(|| {
                AppError::new(
                    ErrorCategory::ValidationError,
                    format!("the selected group '{}' could not be found", id),
                )
                .with_code("GROUP-002")
            })
    }
}
