use super::*;
use std::fs;
use tempfile::TempDir;

fn write_config(dir: &TempDir, filename: &str, content: &str) -> PathBuf {
    let path = dir.path().join(filename);
    fs::write(&path, content).unwrap();
    path
}

#[tokio::test]
async fn test_load_per_task_toml() {
    let temp_dir = TempDir::new().unwrap();
    let path = write_config(
        &temp_dir,
        "engine.toml",
        r#"
engine = "per_task"
parallelism = 4
task_timeout = "2s 500ms"
task_retries = 2

[isolation_backend]
kind = "program"
program = "/usr/local/bin/my-worker"
args = ["worker"]
"#,
    );

    let config = load_engine_config(&path).await.unwrap();

    let EngineConfig::PerTask(config) = config else {
        panic!("expected per-task configuration");
    };
    assert_eq!(config.parallelism, 4);
    assert_eq!(config.task_timeout, Duration::from_millis(2500));
    assert_eq!(config.task_retries, 2);
    assert_eq!(
        config.isolation_backend,
        IsolationBackend::program("/usr/local/bin/my-worker", &["worker"])
    );
    assert_eq!(config.failure_order, FailureOrder::Input);
}

#[tokio::test]
async fn test_load_shared_pool_yaml() {
    let temp_dir = TempDir::new().unwrap();
    let path = write_config(
        &temp_dir,
        "engine.yml",
        r#"
engine: shared_pool
parallelism: 8
worker_recycle_limit: 100
total_timeout: 5m
failure_order: completion
"#,
    );

    let config = load_engine_config(&path).await.unwrap();

    assert_eq!(
        config,
        EngineConfig::SharedPool(SharedPoolConfig {
            parallelism: 8,
            worker_recycle_limit: Some(100),
            task_retries: 0,
            total_timeout: Some(Duration::from_secs(300)),
            isolation_backend: IsolationBackend::default(),
            failure_order: FailureOrder::Completion,
        })
    );
}

#[tokio::test]
async fn test_load_rejects_invalid_values() {
    let temp_dir = TempDir::new().unwrap();
    let path = write_config(
        &temp_dir,
        "engine.toml",
        r#"
engine = "per_task"
parallelism = 0
task_timeout = "1s"
"#,
    );

    let err = load_engine_config(&path).await.unwrap_err();
    assert!(matches!(
        err,
        EngineError::InvalidConfiguration { ref field, .. } if field == "parallelism"
    ));
}

#[tokio::test]
async fn test_load_reports_parse_errors_with_code() {
    let temp_dir = TempDir::new().unwrap();
    let path = write_config(&temp_dir, "engine.yaml", "engine: [unterminated");

    let err = load_engine_config(&path).await.unwrap_err();
    assert_eq!(err.code(), crate::error::ErrorCode::CONFIG_INVALID_YAML);
}

#[tokio::test]
async fn test_load_missing_file() {
    let temp_dir = TempDir::new().unwrap();
    let err = load_engine_config(&temp_dir.path().join("absent.toml"))
        .await
        .unwrap_err();
    assert_eq!(err.code(), crate::error::ErrorCode::CONFIG_NOT_FOUND);
}

#[tokio::test]
async fn test_load_unknown_extension() {
    let temp_dir = TempDir::new().unwrap();
    let path = write_config(&temp_dir, "engine.json", "{}");
    assert!(load_engine_config(&path).await.is_err());
}

#[test]
fn test_shared_pool_validation() {
    assert!(SharedPoolConfig::new(2).validate().is_ok());
    assert!(SharedPoolConfig::new(0).validate().is_err());
    assert!(SharedPoolConfig::new(2)
        .with_recycle_limit(0)
        .validate()
        .is_err());
    assert!(SharedPoolConfig::new(2)
        .with_total_timeout(Duration::ZERO)
        .validate()
        .is_err());
}

#[test]
fn test_per_task_validation() {
    let config = ProcessPerTaskConfig::new(1, Duration::from_secs(1));
    assert!(config.validate().is_ok());
    assert!(ProcessPerTaskConfig::new(1, Duration::ZERO)
        .validate()
        .is_err());
    assert!(config
        .with_backend(IsolationBackend::program("", &[]))
        .validate()
        .is_err());
}

#[test]
fn test_current_exe_backend_resolves() {
    let (program, args) = IsolationBackend::CurrentExe {
        args: vec!["worker".to_string()],
    }
    .command_line()
    .unwrap();
    assert!(program.is_absolute());
    assert_eq!(args, vec!["worker".to_string()]);
}
