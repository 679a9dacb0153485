use super::engine::{
    BuildRequest, ContainerEngine, ContainerSpec, EngineConnector, EngineError, EngineStream,
    EngineVersion, ImageSummary, LogChunk,
};
use async_trait::async_trait;
use serde::Deserialize;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio_stream::{Stream, StreamExt};
use tracing::debug;

/// Container engine driven through the `docker` command line client.
#[derive(Debug, Clone)]
pub struct DockerCli {
    binary: PathBuf,
}

impl Default for DockerCli {
    fn default() -> Self {
        DockerCli::new("docker")
    }
}

#[derive(Debug, Deserialize)]
struct VersionReport {
    #[serde(rename = "Server")]
    server: Option<ServerVersion>,
}

#[derive(Debug, Deserialize)]
struct ServerVersion {
    #[serde(rename = "Platform", default)]
    platform: Option<PlatformName>,
    #[serde(rename = "Version", default)]
    version: String,
    #[serde(rename = "ApiVersion", default)]
    api_version: String,
}

#[derive(Debug, Deserialize)]
struct PlatformName {
    #[serde(rename = "Name", default)]
    name: String,
}

#[derive(Debug, Deserialize)]
struct ImageRow {
    #[serde(rename = "ID")]
    id: String,
    #[serde(rename = "Repository", default)]
    repository: String,
    #[serde(rename = "Tag", default)]
    tag: String,
}

impl DockerCli {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        DockerCli {
            binary: binary.into(),
        }
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.binary);
        cmd.stdin(Stdio::null());
        cmd.kill_on_drop(true);
        cmd
    }

    /// Run a docker subcommand to completion and return its stdout.
    async fn output(&self, args: &[String]) -> Result<String, EngineError> {
        let subcommand = args.first().map(String::as_str).unwrap_or_default();
        debug!(command = %subcommand, "running docker");

        let output = self
            .command()
            .args(args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await?;

        if !output.status.success() {
            return Err(EngineError::Command {
                command: format!("docker {}", subcommand),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    fn spawn_piped(&self, args: &[String]) -> Result<Child, EngineError> {
        Ok(self
            .command()
            .args(args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?)
    }
}

fn args<I, S>(parts: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    parts.into_iter().map(Into::into).collect()
}

/// Newline-delimited output of a pipe. Bytes that are not UTF-8 are replaced
/// rather than ending the stream.
fn byte_lines<R>(reader: R) -> impl Stream<Item = std::io::Result<String>> + Send + 'static
where
    R: AsyncRead + Unpin + Send + 'static,
{
    async_stream::stream! {
        let mut reader = BufReader::new(reader);
        let mut buf = Vec::new();
        loop {
            buf.clear();
            match reader.read_until(b'\n', &mut buf).await {
                Ok(0) => break,
                Ok(_) => {
                    if buf.last() == Some(&b'\n') {
                        buf.pop();
                        if buf.last() == Some(&b'\r') {
                            buf.pop();
                        }
                    }
                    yield Ok(String::from_utf8_lossy(&buf).into_owned());
                }
                Err(err) => {
                    yield Err(err);
                    break;
                }
            }
        }
    }
}

/// Interleave a child's stdout and stderr line by line, tagged by stream.
fn tagged_lines(
    child: &mut Child,
) -> Result<impl Stream<Item = std::io::Result<LogChunk>> + Send + Unpin + 'static, EngineError> {
    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| EngineError::Parse("child stdout was not captured".to_string()))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| EngineError::Parse("child stderr was not captured".to_string()))?;

    let out = Box::pin(byte_lines(stdout))
        .map(|line| line.map(|l| LogChunk::Stdout(format!("{}\n", l))));
    let err = Box::pin(byte_lines(stderr))
        .map(|line| line.map(|l| LogChunk::Stderr(format!("{}\n", l))));
    Ok(out.merge(err))
}

#[async_trait]
impl ContainerEngine for DockerCli {
    async fn version(&self) -> Result<EngineVersion, EngineError> {
        let raw = self
            .output(&args(["version", "--format", "{{json .}}"]))
            .await?;
        let report: VersionReport =
            serde_json::from_str(raw.trim()).map_err(|e| EngineError::Parse(e.to_string()))?;
        let server = report.server.ok_or_else(|| EngineError::Command {
            command: "docker version".to_string(),
            stderr: "Is the docker daemon running?".to_string(),
        })?;

        Ok(EngineVersion {
            platform: server.platform.map(|p| p.name).unwrap_or_default(),
            version: server.version,
            api_version: server.api_version,
        })
    }

    async fn list_images(&self) -> Result<Vec<ImageSummary>, EngineError> {
        let raw = self
            .output(&args(["image", "ls", "--no-trunc", "--format", "{{json .}}"]))
            .await?;

        raw.lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| {
                let row: ImageRow =
                    serde_json::from_str(line).map_err(|e| EngineError::Parse(e.to_string()))?;
                let repo_tags = if row.repository == "<none>" || row.tag == "<none>" {
                    Vec::new()
                } else {
                    vec![format!("{}:{}", row.repository, row.tag)]
                };
                Ok(ImageSummary {
                    id: row.id,
                    repo_tags,
                })
            })
            .collect()
    }

    async fn remove_image(&self, image_id: &str, force: bool) -> Result<(), EngineError> {
        let mut cmd = args(["image", "rm"]);
        if force {
            cmd.push("--force".to_string());
        }
        cmd.push(image_id.to_string());
        self.output(&cmd).await.map(|_| ())
    }

    async fn build_image(&self, request: &BuildRequest) -> Result<EngineStream<String>, EngineError> {
        let mut cmd = args(["build"]);
        if request.remove_intermediate {
            cmd.push("--rm".to_string());
        }
        cmd.push("--file".to_string());
        cmd.push(
            request
                .context_dir
                .join(&request.dockerfile)
                .to_string_lossy()
                .into_owned(),
        );
        cmd.push("--tag".to_string());
        cmd.push(request.tag.clone());
        cmd.push(request.context_dir.to_string_lossy().into_owned());

        let mut child = self.spawn_piped(&cmd)?;
        let mut lines = tagged_lines(&mut child)?;

        let stream = async_stream::stream! {
            let mut last_error = String::new();
            while let Some(chunk) = lines.next().await {
                match chunk {
                    Ok(LogChunk::Stdout(line)) => yield Ok(line),
                    Ok(LogChunk::Stderr(line)) => {
                        last_error = line.trim_end().to_string();
                        yield Ok(line);
                    }
                    Err(err) => {
                        yield Err(EngineError::Read(err));
                        return;
                    }
                }
            }
            match child.wait().await {
                Ok(status) if status.success() => {}
                Ok(_) => {
                    yield Err(EngineError::Command {
                        command: "docker build".to_string(),
                        stderr: last_error,
                    });
                }
                Err(err) => {
                    yield Err(EngineError::Read(err));
                }
            }
        };
        Ok(Box::pin(stream))
    }

    async fn create_container(&self, spec: &ContainerSpec) -> Result<String, EngineError> {
        let mut cmd = args(["create"]);
        for mount in &spec.mounts {
            cmd.push("--mount".to_string());
            cmd.push(format!(
                "type=bind,source={},target={}",
                mount.source.display(),
                mount.target
            ));
        }
        cmd.push(spec.image.clone());
        if let Some(extra) = &spec.cmd {
            cmd.extend(extra.iter().cloned());
        }

        let id = self.output(&cmd).await?.trim().to_string();
        if id.is_empty() {
            return Err(EngineError::Parse(
                "docker create returned no container id".to_string(),
            ));
        }
        Ok(id)
    }

    async fn start_container(&self, id: &str) -> Result<(), EngineError> {
        self.output(&args(["start", id])).await.map(|_| ())
    }

    async fn wait_container(&self, id: &str) -> Result<i64, EngineError> {
        let raw = self.output(&args(["wait", id])).await?;
        raw.trim()
            .parse::<i64>()
            .map_err(|e| EngineError::Parse(format!("exit code '{}': {}", raw.trim(), e)))
    }

    async fn container_logs(&self, id: &str) -> Result<EngineStream<LogChunk>, EngineError> {
        let mut child = self.spawn_piped(&args(["logs", "--follow", id]))?;
        let mut lines = tagged_lines(&mut child)?;

        let stream = async_stream::stream! {
            while let Some(chunk) = lines.next().await {
                match chunk {
                    Ok(chunk) => yield Ok(chunk),
                    Err(err) => {
                        yield Err(EngineError::Read(err));
                        return;
                    }
                }
            }
            if let Err(err) = child.wait().await {
                yield Err(EngineError::Read(err));
            }
        };
        Ok(Box::pin(stream))
    }

    async fn stop_container(&self, id: &str, grace: Duration) -> Result<(), EngineError> {
        let seconds = grace.as_secs().to_string();
        self.output(&args(["stop", "--time", seconds.as_str(), id]))
            .await
            .map(|_| ())
    }

    async fn remove_container(&self, id: &str, remove_volumes: bool) -> Result<(), EngineError> {
        let mut cmd = args(["rm"]);
        if remove_volumes {
            cmd.push("--volumes".to_string());
        }
        cmd.push(id.to_string());
        self.output(&cmd).await.map(|_| ())
    }
}

/// Connects by checking that the docker client can be launched.
#[derive(Debug, Clone, Default)]
pub struct DockerCliConnector {
    cli: DockerCli,
}

impl DockerCliConnector {
    pub fn new(cli: DockerCli) -> Self {
        DockerCliConnector { cli }
    }
}

#[async_trait]
impl EngineConnector for DockerCliConnector {
    async fn connect(&self) -> Result<Arc<dyn ContainerEngine>, EngineError> {
        self.cli.output(&args(["--version"])).await?;
        Ok(Arc::new(self.cli.clone()))
    }
}
