#![allow(deprecated)]

mod common;

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn docbatch(home: &TempDir) -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin("docbatch"));
    cmd.env("DOCBATCH_HOME", home.path())
        .env("NO_COLOR", "1")
        .env_remove("OPENAI_API_KEY")
        .env_remove("OPENAI_API_BASE")
        .env_remove("RUST_LOG");
    cmd
}

#[test]
fn test_default_logging_is_human_readable() {
    let base_url = common::spawn_mock_openai();
    let temp = TempDir::new().unwrap();

    docbatch(&temp)
        .args(["generate", "--prompt", "Hi", "-n", "2", "--api-key", "sk-test"])
        .args(["--base-url", &base_url])
        .arg("-o")
        .arg(temp.path().join("docs.txt"))
        .assert()
        .success()
        .stdout(predicate::str::contains("[100%] 2 of 2 documents done"))
        .stdout(predicate::str::contains("\"level\":").not());
}

#[test]
fn test_missing_api_key_is_reported() {
    let temp = TempDir::new().unwrap();

    docbatch(&temp)
        .args(["generate", "--prompt", "Hi"])
        .assert()
        .failure()
        .stdout(predicate::str::contains("Command failed"))
        .stdout(predicate::str::contains("Missing API key"));
}

#[test]
fn test_api_key_is_read_from_home_env_file() {
    let base_url = common::spawn_mock_openai();
    let temp = TempDir::new().unwrap();
    std::fs::write(temp.path().join(".env"), "export OPENAI_API_KEY=\"sk-from-file\"\n").unwrap();

    docbatch(&temp)
        .args(["preview", "--prompt", "Hi", "--base-url", &base_url])
        .assert()
        .success()
        .stdout(predicate::str::contains("Generated: Hi"));
}

#[test]
fn test_json_logging_flag_emits_json() {
    let temp = TempDir::new().unwrap();

    docbatch(&temp)
        .args(["--log-json", "generate", "--prompt", "Hi"])
        .assert()
        .failure()
        .stdout(predicate::str::contains("\"level\":"));
}

#[test]
fn test_verbose_logging_adds_timestamps() {
    let base_url = common::spawn_mock_openai();
    let temp = TempDir::new().unwrap();

    docbatch(&temp)
        .args(["-v", "generate", "--prompt", "Hi", "-n", "1", "--api-key", "sk-test"])
        .args(["--base-url", &base_url])
        .arg("-o")
        .arg(temp.path().join("docs.txt"))
        .assert()
        .success()
        .stdout(predicate::str::contains(" INFO "))
        .stdout(predicate::str::contains(" DEBUG "));
}

#[test]
fn test_pretty_logging_is_formatted() {
    let temp = TempDir::new().unwrap();

    docbatch(&temp)
        .args(["--log-json", "--pretty", "generate", "--prompt", "Hi"])
        .args(["--config", "/nonexistent/docbatch.yaml"])
        .assert()
        .failure()
        .stdout(predicate::str::contains("{\n"))
        .stdout(predicate::str::contains("  \"message\": \"Command failed:"));
}

#[test]
fn test_file_logging_captures_events() {
    let temp = TempDir::new().unwrap();

    docbatch(&temp)
        .args(["generate", "--prompt", "Hi", "--api-key", "sk-test"])
        .args(["--model", "   "])
        .assert()
        .failure();

    let logs_dir = temp.path().join(".docbatch").join("logs");
    assert!(
        logs_dir.exists(),
        "Logs directory should be created at {logs_dir:?}"
    );

    let mut found_log = false;
    for entry in std::fs::read_dir(logs_dir).unwrap() {
        let path = entry.unwrap().path();
        let name = path.file_name().unwrap().to_string_lossy().to_string();
        if name.starts_with("run-") && name.ends_with(".log") {
            found_log = true;
            let content = std::fs::read_to_string(&path).unwrap();
            assert!(
                content.contains("\"level\":"),
                "Log file should be in JSON format"
            );
            assert!(
                content.contains("Command failed"),
                "Log file should capture the error event"
            );
        }
    }
    assert!(found_log, "Should have found at least one run log file");
}

#[test]
fn test_models_command_writes_no_run_log() {
    let temp = TempDir::new().unwrap();

    docbatch(&temp)
        .args(["models", "--api-key", "sk-test", "--base-url", "http://127.0.0.1:9/v1"])
        .assert()
        .success();

    assert!(!temp.path().join(".docbatch").join("logs").exists());
}
