#![allow(clippy::result_large_err)]

use crate::core::error::AppError;
use crate::core::types::ErrorCategory;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// `author/id[/version]` triple identifying a tool, or a version family when the
/// version is empty.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
pub struct Namespace {
    pub author: String,
    pub id: String,
    #[serde(default)]
    pub version: String,
}

impl Namespace {
    pub fn new(author: impl Into<String>, id: impl Into<String>, version: impl Into<String>) -> Self {
        Namespace {
            author: author.into(),
            id: id.into(),
            version: version.into(),
        }
    }

    /// Parse `author/id` or `author/id/version`.
    pub fn parse(text: &str) -> Result<Self, AppError> {
        let segments: Vec<&str> = text.split('/').collect();
        match segments.as_slice() {
            [author, id] => Ok(Namespace::new(*author, *id, "")),
            [author, id, version] => Ok(Namespace::new(*author, *id, *version)),
            _ => Err(AppError::new(
                ErrorCategory::MalformedNamespace,
                format!(
                    "selected tool '{}' must be in AUTHOR/ID/VERSION format, with VERSION being optional",
                    text
                ),
            )
            .with_code("NS-001")),
        }
    }

    pub fn has_version(&self) -> bool {
        !self.version.is_empty()
    }

    /// True when `self` (a request) selects `candidate`.
    pub fn selects(&self, candidate: &Namespace) -> bool {
        self.author == candidate.author
            && self.id == candidate.id
            && (!self.has_version() || self.version == candidate.version)
    }
}

impl FromStr for Namespace {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Namespace::parse(s)
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.author, self.id, self.version)
    }
}
