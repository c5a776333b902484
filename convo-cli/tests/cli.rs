use std::path::Path;
use std::process::{Command, Output};

use tempfile::TempDir;

const KEY_VARS: [&str; 4] = [
    "OPENAI_API_KEY",
    "ANTHROPIC_API_KEY",
    "DEEPSEEK_API_KEY",
    "OPENROUTER_API_KEY",
];

/// Run the binary against an isolated config dir, database and log dir
fn convo(dir: &Path, args: &[&str]) -> Output {
    let mut command = Command::new(env!("CARGO_BIN_EXE_convo"));
    command
        .current_dir(dir)
        .arg("--config-dir")
        .arg(dir.join("config"))
        .args(args)
        .env("CONVO_DB_PATH", dir.join("conversations.db"))
        .env("CONVO__LOGGING__DIR", dir.join("logs"))
        .env("RUST_LOG", "warn");
    for key in KEY_VARS {
        command.env_remove(key);
    }
    command.output().expect("run convo binary")
}

#[test]
fn status_reports_defaults_without_creating_database() {
    let dir = TempDir::new().unwrap();
    let output = convo(dir.path(), &["status"]);

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));
    assert!(stdout.contains("Model: gpt-4"));
    assert!(stdout.contains("no database yet"));
    assert!(stdout.contains("openai: not configured (serves current model)"));
    assert!(!dir.path().join("conversations.db").exists());
}

#[test]
fn sessions_on_fresh_database_is_empty() {
    let dir = TempDir::new().unwrap();
    let output = convo(dir.path(), &["sessions"]);

    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains("No sessions."));
}

#[test]
fn chat_without_api_key_fails_with_hint() {
    let dir = TempDir::new().unwrap();
    let output = convo(dir.path(), &["chat", "--message", "hi"]);

    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("OPENAI_API_KEY"));
}

#[test]
fn invalid_config_is_rejected() {
    let dir = TempDir::new().unwrap();
    std::fs::create_dir_all(dir.path().join("config")).unwrap();
    std::fs::write(
        dir.path().join("config").join("config.json"),
        r#"{"agent":{"temperature":5.0}}"#,
    )
    .unwrap();

    let output = convo(dir.path(), &["status"]);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("agent.temperature"));
}
