pub mod catalog;
pub mod group;
pub mod matcher;
pub mod namespace;

pub use catalog::{ToolCatalog, TOOL_DESCRIPTOR_FILE};
pub use group::{Group, GroupFile, GroupTool, GROUP_DESCRIPTOR_FILE};
pub use matcher::{compare_versions, find_tool_configs};
pub use namespace::Namespace;

use serde::de::Error as _;
use serde::{Deserialize, Deserializer};
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;

/// Identity and display metadata of a tool.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PluginConfig {
    #[serde(flatten)]
    pub namespace: Namespace,
    #[serde(default)]
    pub display: String,
    #[serde(default, rename = "upstream_project_url")]
    pub upstream_url: String,
}

impl PluginConfig {
    pub fn author(&self) -> &str {
        &self.namespace.author
    }

    pub fn id(&self) -> &str {
        &self.namespace.id
    }

    pub fn version(&self) -> &str {
        &self.namespace.version
    }
}

/// Ruby gems installed into the image, optionally pinned per runtime tier.
#[derive(Debug, Clone, PartialEq, Deserialize, Default)]
pub struct GemConfig {
    #[serde(default, rename = "name")]
    pub names: Vec<String>,
    #[serde(default)]
    pub executable: String,
    #[serde(default)]
    pub build_tools: bool,
    /// runtime tier (e.g. `"2.7"`) -> gem name -> version constraint
    #[serde(default, deserialize_with = "deserialize_compatibility")]
    pub compatibility: HashMap<String, HashMap<String, String>>,
}

impl GemConfig {
    pub fn pinned_version(&self, tier: &str, gem: &str) -> Option<&str> {
        self.compatibility
            .get(tier)
            .and_then(|gems| gems.get(gem))
            .map(String::as_str)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Default)]
pub struct ContainerConfig {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub tag: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Default)]
pub struct InstallSteps {
    #[serde(default)]
    pub windows: String,
    #[serde(default)]
    pub darwin: String,
    #[serde(default)]
    pub linux: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Default)]
pub struct BinaryConfig {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub install_steps: Option<InstallSteps>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Default)]
pub struct PuppetConfig {
    #[serde(default)]
    pub enabled: bool,
}

/// How the tool's execution environment is assembled.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolRuntime {
    Gem(GemConfig),
    Container(ContainerConfig),
    Binary(BinaryConfig),
    Puppet(PuppetConfig),
}

#[derive(Debug, Clone, PartialEq, Deserialize, Default)]
pub struct OutputModes {
    #[serde(default)]
    pub json: String,
    #[serde(default)]
    pub yaml: String,
    #[serde(default)]
    pub junit: String,
}

/// Runtime policy shared by every variant.
#[derive(Debug, Clone, PartialEq, Deserialize, Default)]
#[serde(default)]
pub struct CommonConfig {
    pub can_validate: bool,
    pub needs_write_access: bool,
    pub use_script: Option<String>,
    pub requires_git: bool,
    pub default_args: Vec<String>,
    pub help_arg: Option<String>,
    pub success_exit_code: i64,
    #[serde(rename = "interleave_stdout")]
    pub interleave_std_out_err: bool,
    pub output_mode: Option<OutputModes>,
    pub env: BTreeMap<String, String>,
}

/// On-disk shape of a tool descriptor.
#[derive(Debug, Deserialize)]
pub struct ToolDescriptor {
    plugin: Option<PluginConfig>,
    gem: Option<GemConfig>,
    container: Option<ContainerConfig>,
    binary: Option<BinaryConfig>,
    puppet: Option<PuppetConfig>,
    #[serde(default)]
    common: CommonConfig,
}

/// A parsed tool descriptor. `path` is the directory the descriptor was loaded from.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(try_from = "ToolDescriptor")]
pub struct ToolConfig {
    pub plugin: Option<PluginConfig>,
    pub runtime: Option<ToolRuntime>,
    pub common: CommonConfig,
    pub path: PathBuf,
}

impl TryFrom<ToolDescriptor> for ToolConfig {
    type Error = String;

    fn try_from(raw: ToolDescriptor) -> Result<Self, Self::Error> {
        let mut runtimes: Vec<ToolRuntime> = Vec::new();
        if let Some(gem) = raw.gem {
            runtimes.push(ToolRuntime::Gem(gem));
        }
        if let Some(container) = raw.container {
            runtimes.push(ToolRuntime::Container(container));
        }
        if let Some(binary) = raw.binary {
            runtimes.push(ToolRuntime::Binary(binary));
        }
        if let Some(puppet) = raw.puppet {
            runtimes.push(ToolRuntime::Puppet(puppet));
        }
        if runtimes.len() > 1 {
            return Err(format!(
                "tool descriptor declares {} runtime sections; expected at most one of gem, container, binary, puppet",
                runtimes.len()
            ));
        }

        Ok(ToolConfig {
            plugin: raw.plugin,
            runtime: runtimes.pop(),
            common: raw.common,
            path: PathBuf::new(),
        })
    }
}

impl ToolConfig {
    pub fn from_yaml(text: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(text)
    }

    /// Usable for validation iff it has plugin metadata and opts in via `can_validate`.
    pub fn is_validator(&self) -> bool {
        self.plugin.is_some() && self.common.can_validate
    }

    pub fn gem(&self) -> Option<&GemConfig> {
        match &self.runtime {
            Some(ToolRuntime::Gem(gem)) => Some(gem),
            _ => None,
        }
    }

    pub fn namespace(&self) -> Option<&Namespace> {
        self.plugin.as_ref().map(|plugin| &plugin.namespace)
    }

    pub fn display_name(&self) -> String {
        match &self.plugin {
            Some(plugin) if !plugin.display.is_empty() => plugin.display.clone(),
            Some(plugin) => format!("{}/{}", plugin.author(), plugin.id()),
            None => self.path.display().to_string(),
        }
    }
}

/// One invocation of a tool, filled in by the backend while it runs.
#[derive(Debug, Clone)]
pub struct Tool {
    pub config: ToolConfig,
    pub args: Vec<String>,
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i64,
}

impl Tool {
    pub fn new(config: ToolConfig, args: Vec<String>) -> Self {
        Tool {
            config,
            args,
            stdout: String::new(),
            stderr: String::new(),
            exit_code: 0,
        }
    }

    /// `author/id/version`, plus the argument list when one was supplied.
    pub fn task_name(&self) -> String {
        let base = match self.config.namespace() {
            Some(ns) => ns.to_string(),
            None => self.config.display_name(),
        };
        if self.args.is_empty() {
            base
        } else {
            format!("{}, args=[{}]", base, self.args.join(" "))
        }
    }
}

fn deserialize_compatibility<'de, D>(
    deserializer: D,
) -> Result<HashMap<String, HashMap<String, String>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<HashMap<serde_yaml::Value, HashMap<String, serde_yaml::Value>>> =
        Option::deserialize(deserializer)?;

    let mut matrix = HashMap::new();
    for (tier, gems) in raw.unwrap_or_default() {
        let tier = runtime_tier_key(&tier)
            .ok_or_else(|| D::Error::custom(format!("invalid compatibility key {:?}", tier)))?;
        let mut pins = HashMap::new();
        for (gem, constraint) in gems {
            let constraint = scalar_to_string(&constraint).ok_or_else(|| {
                D::Error::custom(format!("invalid version constraint for gem {}", gem))
            })?;
            pins.insert(gem, constraint);
        }
        matrix.insert(tier, pins);
    }
    Ok(matrix)
}

/// Key for a runtime tier. String keys are kept as written; numeric keys
/// such as `2.7` are rendered with one decimal place.
pub(crate) fn runtime_tier_key(value: &serde_yaml::Value) -> Option<String> {
    match value {
        serde_yaml::Value::Number(n) => Some(format!("{:.1}", n.as_f64()?)),
        serde_yaml::Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        _ => None,
    }
}

fn scalar_to_string(value: &serde_yaml::Value) -> Option<String> {
    match value {
        serde_yaml::Value::String(s) => Some(s.clone()),
        serde_yaml::Value::Number(n) => Some(n.to_string()),
        serde_yaml::Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}
