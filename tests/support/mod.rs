#![allow(dead_code)]

use async_trait::async_trait;
use futures::stream;
use pdk::core::backend::{
    BuildRequest, ContainerEngine, ContainerSpec, EngineConnector, EngineError, EngineStream,
    EngineVersion, ImageSummary, LogChunk,
};
use pdk::core::tool::ToolConfig;
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// How the mock answers `wait_container`.
#[derive(Debug, Clone)]
pub enum WaitBehavior {
    Exit(i64),
    Error(String),
    Never,
}

#[derive(Debug, Default)]
pub struct CallCounts {
    pub version: AtomicUsize,
    pub list_images: AtomicUsize,
    pub remove_image: AtomicUsize,
    pub build: AtomicUsize,
    pub create: AtomicUsize,
    pub start: AtomicUsize,
    pub stop: AtomicUsize,
    pub remove: AtomicUsize,
}

impl CallCounts {
    pub fn get(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }
}

/// In-memory container engine that records every call.
pub struct MockEngine {
    pub available: bool,
    pub start_error: Option<String>,
    pub wait: WaitBehavior,
    pub logs: Vec<LogChunk>,
    pub images: Mutex<Vec<ImageSummary>>,
    pub specs: Mutex<Vec<ContainerSpec>>,
    pub calls: CallCounts,
}

impl MockEngine {
    pub fn new(wait: WaitBehavior) -> Self {
        MockEngine {
            available: true,
            start_error: None,
            wait,
            logs: Vec::new(),
            images: Mutex::new(Vec::new()),
            specs: Mutex::new(Vec::new()),
            calls: CallCounts::default(),
        }
    }

    pub fn unavailable(mut self) -> Self {
        self.available = false;
        self
    }

    pub fn failing_start(mut self, message: &str) -> Self {
        self.start_error = Some(message.to_string());
        self
    }

    pub fn with_logs(mut self, logs: Vec<LogChunk>) -> Self {
        self.logs = logs;
        self
    }

    pub fn with_image(self, tag: &str) -> Self {
        self.images.lock().unwrap().push(ImageSummary {
            id: format!("sha256:{}", tag.len()),
            repo_tags: vec![tag.to_string()],
        });
        self
    }

    pub fn created(&self) -> usize {
        CallCounts::get(&self.calls.create)
    }

    pub fn stopped(&self) -> usize {
        CallCounts::get(&self.calls.stop)
    }

    pub fn removed(&self) -> usize {
        CallCounts::get(&self.calls.remove)
    }
}

#[async_trait]
impl ContainerEngine for MockEngine {
    async fn version(&self) -> Result<EngineVersion, EngineError> {
        self.calls.version.fetch_add(1, Ordering::SeqCst);
        if self.available {
            Ok(EngineVersion {
                platform: "Mock Engine".to_string(),
                version: "24.0.7".to_string(),
                api_version: "1.43".to_string(),
            })
        } else {
            Err(EngineError::Command {
                command: "docker version".to_string(),
                stderr: "Cannot connect to the Docker daemon at unix:///var/run/docker.sock. Is the docker daemon running?".to_string(),
            })
        }
    }

    async fn list_images(&self) -> Result<Vec<ImageSummary>, EngineError> {
        self.calls.list_images.fetch_add(1, Ordering::SeqCst);
        Ok(self.images.lock().unwrap().clone())
    }

    async fn remove_image(&self, image_id: &str, _force: bool) -> Result<(), EngineError> {
        self.calls.remove_image.fetch_add(1, Ordering::SeqCst);
        self.images.lock().unwrap().retain(|image| image.id != image_id);
        Ok(())
    }

    async fn build_image(&self, request: &BuildRequest) -> Result<EngineStream<String>, EngineError> {
        self.calls.build.fetch_add(1, Ordering::SeqCst);
        self.images.lock().unwrap().push(ImageSummary {
            id: format!("sha256:built-{}", request.tag),
            repo_tags: vec![request.tag.clone()],
        });
        let lines: Vec<Result<String, EngineError>> = vec![
            Ok(r#"{"stream":"Step 1/3 : FROM puppet/puppet-agent"}"#.to_string()),
            Ok("not json at all".to_string()),
        ];
        Ok(Box::pin(stream::iter(lines)))
    }

    async fn create_container(&self, spec: &ContainerSpec) -> Result<String, EngineError> {
        self.calls.create.fetch_add(1, Ordering::SeqCst);
        self.specs.lock().unwrap().push(spec.clone());
        Ok("container-1".to_string())
    }

    async fn start_container(&self, _id: &str) -> Result<(), EngineError> {
        self.calls.start.fetch_add(1, Ordering::SeqCst);
        match &self.start_error {
            Some(message) => Err(EngineError::Command {
                command: "docker start".to_string(),
                stderr: message.clone(),
            }),
            None => Ok(()),
        }
    }

    async fn wait_container(&self, _id: &str) -> Result<i64, EngineError> {
        match &self.wait {
            WaitBehavior::Exit(code) => Ok(*code),
            WaitBehavior::Error(message) => Err(EngineError::Command {
                command: "docker wait".to_string(),
                stderr: message.clone(),
            }),
            WaitBehavior::Never => std::future::pending().await,
        }
    }

    async fn container_logs(&self, _id: &str) -> Result<EngineStream<LogChunk>, EngineError> {
        let chunks: Vec<Result<LogChunk, EngineError>> =
            self.logs.iter().cloned().map(Ok).collect();
        Ok(Box::pin(stream::iter(chunks)))
    }

    async fn stop_container(&self, _id: &str, _grace: Duration) -> Result<(), EngineError> {
        self.calls.stop.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn remove_container(&self, _id: &str, _remove_volumes: bool) -> Result<(), EngineError> {
        self.calls.remove.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Hands out one shared mock engine and counts connections.
pub struct MockConnector {
    pub engine: Arc<MockEngine>,
    pub connects: AtomicUsize,
}

impl MockConnector {
    pub fn new(engine: Arc<MockEngine>) -> Self {
        MockConnector {
            engine,
            connects: AtomicUsize::new(0),
        }
    }

    pub fn connections(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EngineConnector for MockConnector {
    async fn connect(&self) -> Result<Arc<dyn ContainerEngine>, EngineError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        let engine: Arc<dyn ContainerEngine> = self.engine.clone();
        Ok(engine)
    }
}

/// Write `<root>/<author>/<id>/<version>/prm-config.yml` for a gem validator.
pub fn install_tool(root: &Path, author: &str, id: &str, version: &str, display: &str) {
    let dir = root.join(author).join(id).join(version);
    fs::create_dir_all(&dir).unwrap();
    fs::write(dir.join("prm-config.yml"), tool_descriptor(author, id, version, display)).unwrap();
}

pub fn tool_descriptor(author: &str, id: &str, version: &str, display: &str) -> String {
    format!(
        r#"---
plugin:
  author: {author}
  id: {id}
  version: "{version}"
  display: {display}
  upstream_project_url: https://example.com/{id}
gem:
  name: [{id}]
  executable: {id}
common:
  can_validate: true
"#
    )
}

/// A parsed validator descriptor rooted at `dir`.
pub fn tool_config(dir: &Path, author: &str, id: &str, version: &str) -> ToolConfig {
    let mut config = ToolConfig::from_yaml(&tool_descriptor(author, id, version, id)).unwrap();
    config.path = dir.to_path_buf();
    config
}
