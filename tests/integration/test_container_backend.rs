#[path = "../support/mod.rs"]
mod support;

use pdk::core::backend::{Backend, BackendOptions, ContainerBackend, LogChunk};
use pdk::core::tool::Tool;
use pdk::core::ErrorCategory;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use support::{tool_config, MockConnector, MockEngine, WaitBehavior};
use tempfile::TempDir;

const IMAGE: &str = "pdk:puppet-7.14.0_puppetlabs-rubocop_0.1.0";

struct Fixture {
    _workspace: TempDir,
    tool_dir: std::path::PathBuf,
    engine: Arc<MockEngine>,
    connector: Arc<MockConnector>,
    backend: ContainerBackend,
}

fn fixture(engine: MockEngine, always_build: bool, run_timeout: Duration) -> Fixture {
    let workspace = TempDir::new().unwrap();
    let tool_dir = workspace.path().join("tools/puppetlabs/rubocop/0.1.0");
    let code_dir = workspace.path().join("code");
    std::fs::create_dir_all(&tool_dir).unwrap();
    std::fs::create_dir_all(&code_dir).unwrap();

    let engine = Arc::new(engine);
    let connector = Arc::new(MockConnector::new(engine.clone()));
    let options = BackendOptions {
        runtime_version: "7.14.0".to_string(),
        base_image: "puppet/puppet-agent".to_string(),
        code_path: code_dir,
        cache_path: workspace.path().join("cache"),
        always_build,
        run_timeout,
        stop_grace: Duration::ZERO,
    };
    let backend = ContainerBackend::new(options, connector.clone());

    Fixture {
        _workspace: workspace,
        tool_dir,
        engine,
        connector,
        backend,
    }
}

fn rubocop(fixture: &Fixture, args: &[&str]) -> Tool {
    Tool::new(
        tool_config(&fixture.tool_dir, "puppetlabs", "rubocop", "0.1.0"),
        args.iter().map(|a| a.to_string()).collect(),
    )
}

fn cached(wait: WaitBehavior) -> MockEngine {
    MockEngine::new(wait).with_image(IMAGE)
}

#[tokio::test]
async fn unavailable_engine_fails_before_creating_a_container() {
    let fx = fixture(
        cached(WaitBehavior::Exit(0)).unavailable(),
        false,
        Duration::from_secs(5),
    );
    let mut tool = rubocop(&fx, &[]);

    let err = fx.backend.validate(&mut tool).await.unwrap_err();

    assert_eq!(err.category, ErrorCategory::BackendUnavailable);
    assert_eq!(
        err.message,
        "error during connect: This error may indicate that the docker daemon is not running."
    );
    assert_eq!(fx.engine.created(), 0);
    assert_eq!(fx.engine.stopped(), 0);
    assert_eq!(fx.engine.removed(), 0);
}

#[tokio::test]
async fn successful_run_captures_output_and_cleans_up_once() {
    let engine = cached(WaitBehavior::Exit(0)).with_logs(vec![
        LogChunk::Stdout("Inspecting 3 files\n".to_string()),
        LogChunk::Stdout("3 files inspected, no offenses detected\n".to_string()),
    ]);
    let fx = fixture(engine, false, Duration::from_secs(5));
    let mut tool = rubocop(&fx, &[]);

    fx.backend.validate(&mut tool).await.unwrap();

    assert_eq!(tool.exit_code, 0);
    assert_eq!(
        tool.stdout,
        "Inspecting 3 files\n3 files inspected, no offenses detected\n"
    );
    assert!(tool.stderr.is_empty());
    assert_eq!(fx.engine.created(), 1);
    assert_eq!(fx.engine.stopped(), 1);
    assert_eq!(fx.engine.removed(), 1);
}

#[tokio::test]
async fn non_zero_exit_fails_with_captured_stderr() {
    let engine = cached(WaitBehavior::Exit(1)).with_logs(vec![
        LogChunk::Stdout("Inspecting 1 file\n".to_string()),
        LogChunk::Stderr("/code/manifests/init.pp:1:1: C: Missing comment\n".to_string()),
    ]);
    let fx = fixture(engine, false, Duration::from_secs(5));
    let mut tool = rubocop(&fx, &[]);

    let err = fx.backend.validate(&mut tool).await.unwrap_err();

    assert_eq!(err.category, ErrorCategory::RunFailure);
    assert_eq!(err.message, "/code/manifests/init.pp:1:1: C: Missing comment\n");
    assert_eq!(tool.exit_code, 1);
    assert_eq!(tool.stdout, "Inspecting 1 file\n");
    assert_eq!(fx.engine.stopped(), 1);
    assert_eq!(fx.engine.removed(), 1);
}

#[tokio::test]
async fn non_zero_exit_without_stderr_reports_exit_code() {
    let fx = fixture(cached(WaitBehavior::Exit(3)), false, Duration::from_secs(5));
    let mut tool = rubocop(&fx, &[]);

    let err = fx.backend.validate(&mut tool).await.unwrap_err();

    assert_eq!(err.message, "tool exited with code: 3");
    assert_eq!(tool.exit_code, 3);
}

#[tokio::test]
async fn configured_success_code_is_honoured() {
    let fx = fixture(cached(WaitBehavior::Exit(2)), false, Duration::from_secs(5));
    let mut tool = rubocop(&fx, &[]);
    tool.config.common.success_exit_code = 2;

    fx.backend.validate(&mut tool).await.unwrap();
    assert_eq!(tool.exit_code, 2);
}

#[tokio::test]
async fn wait_error_fails_the_run_and_still_cleans_up() {
    let fx = fixture(
        cached(WaitBehavior::Error("container vanished".to_string())),
        false,
        Duration::from_secs(5),
    );
    let mut tool = rubocop(&fx, &[]);

    let err = fx.backend.validate(&mut tool).await.unwrap_err();

    assert_eq!(err.category, ErrorCategory::RunFailure);
    assert!(err.message.contains("container vanished"));
    assert_eq!(fx.engine.stopped(), 1);
    assert_eq!(fx.engine.removed(), 1);
}

#[tokio::test]
async fn timed_out_run_is_cleaned_up_exactly_once() {
    let fx = fixture(cached(WaitBehavior::Never), false, Duration::from_millis(50));
    let mut tool = rubocop(&fx, &[]);

    let err = fx.backend.validate(&mut tool).await.unwrap_err();

    assert_eq!(err.category, ErrorCategory::TimeoutError);
    assert_eq!(fx.engine.created(), 1);
    assert_eq!(fx.engine.stopped(), 1);
    assert_eq!(fx.engine.removed(), 1);
}

#[tokio::test]
async fn failed_start_still_removes_the_container() {
    let engine = cached(WaitBehavior::Exit(0)).failing_start("OCI runtime create failed");
    let fx = fixture(engine, false, Duration::from_secs(5));
    let mut tool = rubocop(&fx, &[]);

    let err = fx.backend.validate(&mut tool).await.unwrap_err();

    assert_eq!(err.category, ErrorCategory::RunFailure);
    assert_eq!(err.code, "RUN-003");
    assert!(err.message.contains("OCI runtime create failed"));
    assert_eq!(fx.engine.created(), 1);
    assert_eq!(fx.engine.stopped(), 1);
    assert_eq!(fx.engine.removed(), 1);
}

#[tokio::test]
async fn cancelled_run_is_torn_down() {
    let fx = fixture(cached(WaitBehavior::Never), false, Duration::from_secs(60));
    let mut tool = rubocop(&fx, &[]);

    let cancelled =
        tokio::time::timeout(Duration::from_millis(50), fx.backend.validate(&mut tool)).await;
    assert!(cancelled.is_err());
    assert_eq!(fx.engine.created(), 1);

    for _ in 0..100 {
        if fx.engine.removed() == 1 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(fx.engine.stopped(), 1);
    assert_eq!(fx.engine.removed(), 1);
}

#[tokio::test]
async fn extra_args_replace_the_default_command() {
    let fx = fixture(cached(WaitBehavior::Exit(0)), false, Duration::from_secs(5));

    let mut with_args = rubocop(&fx, &["--fail-level", "E"]);
    fx.backend.validate(&mut with_args).await.unwrap();
    let mut without_args = rubocop(&fx, &[]);
    fx.backend.validate(&mut without_args).await.unwrap();

    let specs = fx.engine.specs.lock().unwrap().clone();
    assert_eq!(specs.len(), 2);
    assert_eq!(specs[0].image, IMAGE);
    assert_eq!(
        specs[0].cmd,
        Some(vec!["--fail-level".to_string(), "E".to_string()])
    );
    assert_eq!(specs[1].cmd, None);

    let targets: Vec<&str> = specs[0].mounts.iter().map(|m| m.target.as_str()).collect();
    assert_eq!(targets, vec!["/code", "/cache"]);
    assert!(specs[0].mounts.iter().all(|m| m.source.is_absolute()));
    assert_eq!(fx.engine.stopped(), 2);
    assert_eq!(fx.engine.removed(), 2);
}

#[tokio::test]
async fn cached_image_is_reused() {
    let fx = fixture(cached(WaitBehavior::Exit(0)), false, Duration::from_secs(5));
    let mut tool = rubocop(&fx, &[]);

    fx.backend.validate(&mut tool).await.unwrap();

    assert_eq!(fx.engine.calls.build.load(Ordering::SeqCst), 0);
    assert_eq!(fx.engine.calls.remove_image.load(Ordering::SeqCst), 0);
    assert!(!fx.tool_dir.join("generated.Dockerfile").exists());
}

#[tokio::test]
async fn always_build_replaces_the_cached_image() {
    let fx = fixture(cached(WaitBehavior::Exit(0)), true, Duration::from_secs(5));
    let mut tool = rubocop(&fx, &[]);

    fx.backend.validate(&mut tool).await.unwrap();

    assert_eq!(fx.engine.calls.remove_image.load(Ordering::SeqCst), 1);
    assert_eq!(fx.engine.calls.build.load(Ordering::SeqCst), 1);
    let recipe = std::fs::read_to_string(fx.tool_dir.join("generated.Dockerfile")).unwrap();
    assert!(recipe.starts_with("FROM puppet/puppet-agent:7.14.0\n"));
}

#[tokio::test]
async fn missing_image_is_built() {
    let fx = fixture(
        MockEngine::new(WaitBehavior::Exit(0)),
        false,
        Duration::from_secs(5),
    );
    let mut tool = rubocop(&fx, &[]);

    fx.backend.validate(&mut tool).await.unwrap();

    assert_eq!(fx.engine.calls.build.load(Ordering::SeqCst), 1);
    assert_eq!(fx.engine.calls.remove_image.load(Ordering::SeqCst), 0);
    assert!(fx.tool_dir.join("generated.Dockerfile").exists());
}

#[tokio::test]
async fn status_connects_lazily_and_once() {
    let fx = fixture(cached(WaitBehavior::Exit(0)), false, Duration::from_secs(5));
    assert_eq!(fx.connector.connections(), 0);

    let first = fx.backend.status().await;
    let second = fx.backend.status().await;

    assert!(first.is_available);
    assert!(first.message.contains("Platform: Mock Engine"));
    assert!(first.message.contains("API Version: 1.43"));
    assert_eq!(first, second);
    assert_eq!(fx.connector.connections(), 1);
}

#[tokio::test]
async fn unavailable_status_uses_the_short_daemon_message() {
    let fx = fixture(
        cached(WaitBehavior::Exit(0)).unavailable(),
        false,
        Duration::from_secs(5),
    );

    let status = fx.backend.status().await;

    assert!(!status.is_available);
    assert_eq!(
        status.message,
        "error during connect: This error may indicate that the docker daemon is not running."
    );
}
