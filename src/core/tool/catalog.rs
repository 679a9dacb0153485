use crate::core::error::AppError;
use crate::core::tool::ToolConfig;
use crate::core::types::ErrorCategory;
use crate::utils::table::TableOptions;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Descriptor file name expected at `<root>/<author>/<id>/<version>/`.
pub const TOOL_DESCRIPTOR_FILE: &str = "prm-config.yml";

/// Reads installed tool descriptors from a tool root.
#[derive(Debug, Clone)]
pub struct ToolCatalog {
    root: PathBuf,
}

impl ToolCatalog {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        ToolCatalog { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Load every descriptor three levels below the root.
    ///
    /// Descriptors that cannot be read or parsed are skipped with a warning.
    /// With `validators_only`, entries lacking plugin metadata or `can_validate`
    /// are dropped. Order is unspecified.
    pub fn load(&self, validators_only: bool) -> Vec<ToolConfig> {
        let mut configs = Vec::new();
        for descriptor in self.descriptor_paths() {
            let Some(config) = read_descriptor(&descriptor) else {
                continue;
            };
            if validators_only && !config.is_validator() {
                debug!(path = %descriptor.display(), "skipping non-validator tool");
                continue;
            }
            configs.push(config);
        }
        configs
    }

    /// Rows for `DisplayName, Author, Name, Project_URL, Version`.
    pub fn table(&self, validators_only: bool) -> TableOptions {
        let mut configs = self.load(validators_only);
        configs.sort_by(|a, b| a.namespace().cmp(&b.namespace()));

        let lines = configs
            .iter()
            .filter_map(|config| config.plugin.as_ref())
            .map(|plugin| {
                vec![
                    plugin.display.clone(),
                    plugin.author().to_string(),
                    plugin.id().to_string(),
                    plugin.upstream_url.clone(),
                    plugin.version().to_string(),
                ]
            })
            .collect();

        TableOptions {
            header: ["DisplayName", "Author", "Name", "Project_URL", "Version"]
                .iter()
                .map(|h| h.to_string())
                .collect(),
            lines,
        }
    }

    fn descriptor_paths(&self) -> Vec<PathBuf> {
        let root = glob::Pattern::escape(&self.root.to_string_lossy());
        let pattern = format!("{}/*/*/*/{}", root, TOOL_DESCRIPTOR_FILE);
        match glob::glob(&pattern) {
            Ok(paths) => paths
                .filter_map(|entry| match entry {
                    Ok(path) => Some(path),
                    Err(err) => {
                        warn!(error = %err, "unable to read tool directory");
                        None
                    }
                })
                .collect(),
            Err(err) => {
                warn!(pattern = %pattern, error = %err, "invalid tool path");
                Vec::new()
            }
        }
    }
}

fn read_descriptor(path: &Path) -> Option<ToolConfig> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(err) => {
            warn!(path = %path.display(), error = %err, "unable to read tool config");
            return None;
        }
    };

    match ToolConfig::from_yaml(&content) {
        Ok(mut config) => {
            config.path = path.parent().map(Path::to_path_buf).unwrap_or_default();
            Some(config)
        }
        Err(err) => {
            let warning = AppError::new(
                ErrorCategory::CatalogParseWarning,
                format!("unable to parse {}: {}", path.display(), err),
            )
            .with_code("CAT-001");
            warn!(code = %warning.code, "{}", warning.message);
            None
        }
    }
}
