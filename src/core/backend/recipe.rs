#![allow(clippy::result_large_err)]

use crate::core::error::AppError;
use crate::core::tool::ToolConfig;
use crate::core::types::ErrorCategory;

/// Name of the recipe written next to each tool descriptor before a build.
pub const GENERATED_RECIPE_FILE: &str = "generated.Dockerfile";

const PUPPET_BIN: &str = "/opt/puppetlabs/puppet/bin";
const LEGACY_APT_KEY: &str = "4528B6CD9E61EF26";

/// Image tag for a tool under a runtime version:
/// `pdk:puppet-<runtime>_<author>-<id>_<version>`.
pub fn image_name(runtime_version: &str, config: &ToolConfig) -> String {
    match config.namespace() {
        Some(ns) => format!(
            "pdk:puppet-{}_{}-{}_{}",
            runtime_version, ns.author, ns.id, ns.version
        ),
        None => format!("pdk:puppet-{}_unnamed", runtime_version),
    }
}

fn major_version(runtime_version: &str) -> Result<u32, AppError> {
    runtime_version
        .split('.')
        .next()
        .and_then(|major| major.trim().parse::<u32>().ok())
        .ok_or_else(|| {
            AppError::new(
                ErrorCategory::BuildFailure,
                format!(
                    "unable to determine the major version of puppet '{}'",
                    runtime_version
                ),
            )
            .with_code("BUILD-001")
        })
}

/// Ruby tier bundled with a puppet major version.
pub fn runtime_tier(runtime_version: &str) -> Result<&'static str, AppError> {
    Ok(match major_version(runtime_version)? {
        7 => "2.7",
        6 => "2.5",
        5 => "2.4",
        _ => "2.5",
    })
}

/// Render the build recipe for a tool. Output is deterministic for a given
/// descriptor and runtime.
pub fn synthesize(
    base_image: &str,
    runtime_version: &str,
    config: &ToolConfig,
) -> Result<String, AppError> {
    let major = major_version(runtime_version)?;
    let gem = config.gem();
    let needs_build_tools = gem.map(|g| g.build_tools).unwrap_or(false);

    let mut lines = vec![format!("FROM {}:{}", base_image, runtime_version)];

    if major == 5 {
        lines.push(format!(
            "RUN apt-key adv --keyserver keyserver.ubuntu.com --recv-keys {}",
            LEGACY_APT_KEY
        ));
    }

    if config.common.requires_git || needs_build_tools {
        lines.push("RUN apt update".to_string());
    }
    if config.common.requires_git {
        lines.push("RUN apt install git -y".to_string());
    }

    if let Some(gem) = gem {
        if gem.build_tools {
            lines.push("RUN apt install build-essential -y".to_string());
        }
        lines.push(format!("RUN {}/gem install bundler --no-document", PUPPET_BIN));

        let tier = runtime_tier(runtime_version)?;
        for name in &gem.names {
            match gem.pinned_version(tier, name) {
                Some(constraint) => lines.push(format!(
                    "RUN {}/gem install {} -f --conservative --minimal-deps -v '{}' --no-document",
                    PUPPET_BIN, name, constraint
                )),
                None => lines.push(format!(
                    "RUN {}/gem install {} -f --conservative --minimal-deps --no-document",
                    PUPPET_BIN, name
                )),
            }
        }
    }

    for (key, value) in &config.common.env {
        let quoted = serde_json::to_string(value).map_err(|e| {
            AppError::new(
                ErrorCategory::BuildFailure,
                format!("invalid value for environment variable {}: {}", key, e),
            )
            .with_code("BUILD-001")
        })?;
        lines.push(format!("ENV {}={}", key, quoted));
    }

    if config.path.join("content").is_dir() {
        lines.push("COPY ./content/* /tmp/".to_string());
    }

    lines.push(r#"VOLUME ["/code", "/cache"]"#.to_string());
    lines.push("WORKDIR /code".to_string());

    match config.common.use_script.as_deref().filter(|s| !s.is_empty()) {
        Some(script) => lines.push(format!(r#"ENTRYPOINT ["/tmp/{}.sh"]"#, script)),
        None => {
            if let Some(exe) = gem.map(|g| g.executable.as_str()).filter(|e| !e.is_empty()) {
                lines.push(format!(r#"ENTRYPOINT ["{}/{}"]"#, PUPPET_BIN, exe));
            }
        }
    }

    if !config.common.default_args.is_empty() {
        let cmd = serde_json::to_string(&config.common.default_args).map_err(|e| {
            AppError::new(
                ErrorCategory::BuildFailure,
                format!("invalid default arguments: {}", e),
            )
            .with_code("BUILD-001")
        })?;
        lines.push(format!("CMD {}", cmd));
    }

    let mut recipe = lines.join("\n");
    recipe.push('\n');
    Ok(recipe)
}
