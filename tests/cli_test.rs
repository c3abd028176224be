use std::process::{Command, Stdio};
use serde_json::Value;

/// Run the ragfuse binary with `args` in an empty working directory.
fn run(args: &[&str], envs: &[(&str, &str)]) -> std::process::Output {
    let dir = std::env::temp_dir().join(format!("ragfuse-cli-{}", std::process::id()));
    std::fs::create_dir_all(&dir).expect("Failed to create temp dir");

    let mut command = Command::new(env!("CARGO_BIN_EXE_ragfuse"));
    command
        .args(args)
        .current_dir(&dir)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::null()); // Suppress log output in tests
    for (key, value) in envs {
        command.env(key, value);
    }
    command.output().expect("Failed to spawn ragfuse binary")
}

#[test]
fn test_config_prints_defaults_as_json() {
    let output = run(&["config"], &[]);
    assert!(output.status.success());

    let config: Value = serde_json::from_slice(&output.stdout).expect("stdout should be JSON");
    assert_eq!(config["retrieval"]["top_k"], 3);
    assert_eq!(config["retrieval"]["hybrid_fallback"], true);
    assert_eq!(config["embedding"]["provider"], "local");
    assert_eq!(config["reranking"]["provider"], "none");
}

#[test]
fn test_config_honors_env_overrides() {
    let output = run(
        &["config"],
        &[("RAGFUSE_RETRIEVAL__TOP_K", "9"), ("RAGFUSE_RERANKING__PROVIDER", "http")],
    );
    assert!(output.status.success());

    let config: Value = serde_json::from_slice(&output.stdout).expect("stdout should be JSON");
    assert_eq!(config["retrieval"]["top_k"], 9);
    assert_eq!(config["reranking"]["provider"], "http");
}

#[test]
fn test_search_requires_query() {
    let output = run(&["search", "--corpus", "corpus.json", "--collection", "docs"], &[]);
    assert!(!output.status.success());
}

#[test]
fn test_unknown_embedding_provider_fails_search() {
    let dir = std::env::temp_dir().join(format!("ragfuse-cli-{}", std::process::id()));
    std::fs::create_dir_all(&dir).expect("Failed to create temp dir");
    std::fs::write(dir.join("corpus.json"), r#"{"docs": [{"text": "hello"}]}"#).expect("Failed to write corpus");

    let output = run(
        &["search", "--corpus", "corpus.json", "--collection", "docs", "--query", "hello"],
        &[("RAGFUSE_EMBEDDING__PROVIDER", "nonsense")],
    );
    assert!(!output.status.success());
    assert!(output.stdout.is_empty());
}

#[test]
fn test_log_file_receives_json_lines() {
    let log_path = std::env::temp_dir()
        .join(format!("ragfuse-cli-log-{}", std::process::id()))
        .join("ragfuse.log");
    let _ = std::fs::remove_file(&log_path);

    let output = run(
        &["config"],
        &[("RAGFUSE_LOG_FILE", log_path.to_str().unwrap()), ("RUST_LOG", "debug")],
    );
    assert!(output.status.success());

    let contents = std::fs::read_to_string(&log_path).expect("log file should exist");
    let lines: Vec<Value> = contents
        .lines()
        .map(|line| serde_json::from_str(line).expect("log lines should be JSON"))
        .collect();
    assert!(lines.iter().any(|line| line["fields"]["message"] == "File logging enabled"));
}
