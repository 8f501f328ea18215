//! End-to-end tests for the devlink binary.

use std::path::Path;

use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::json;

/// Write definitions and a config that points at them.
fn setup(dir: &Path) -> std::path::PathBuf {
    let commands = dir.join("robot.json");
    std::fs::write(
        &commands,
        json!({
            "robot": {
                "jump": {
                    "parameters": {
                        "height": {"type": "integer", "minimum": 0, "maximum": 100},
                        "_jumpType": {"enum": ["_withKick", "_plain"], "default": "_plain"}
                    }
                }
            }
        })
        .to_string(),
    )
    .unwrap();

    let state = dir.join("base.json");
    std::fs::write(
        &state,
        json!({"base": {"volume": {"type": "integer", "minimum": 0, "maximum": 10}, "mode": ["eco", "boost"]}})
            .to_string(),
    )
    .unwrap();

    let config = dir.join("devlink.toml");
    std::fs::write(
        &config,
        format!(
            "command_id_prefix = \"cli-\"\ncommand_sources = [{:?}]\nstate_sources = [{:?}]\n",
            commands.display().to_string(),
            state.display().to_string()
        ),
    )
    .unwrap();
    config
}

fn devlink(config: &Path) -> Command {
    let mut cmd = Command::cargo_bin("devlink").unwrap();
    cmd.env_remove("RUST_LOG").arg("--config").arg(config);
    cmd
}

#[test]
fn test_cli_help() {
    let mut cmd = Command::cargo_bin("devlink").unwrap();
    cmd.arg("--help");

    cmd.assert()
        .success()
        .stdout(predicate::str::contains("commands"))
        .stdout(predicate::str::contains("submit"))
        .stdout(predicate::str::contains("state"));
}

#[test]
fn test_list_commands() {
    let dir = tempfile::tempdir().unwrap();
    let config = setup(dir.path());

    devlink(&config)
        .arg("commands")
        .assert()
        .success()
        .stdout(predicate::str::contains("robot.jump"));
}

#[test]
fn test_submit_valid_payload() {
    let dir = tempfile::tempdir().unwrap();
    let config = setup(dir.path());

    devlink(&config)
        .args(["submit", r#"{"name": "robot.jump", "parameters": {"height": 53}}"#])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"cli-1\""))
        .stdout(predicate::str::contains("\"queued\""))
        .stdout(predicate::str::contains("_plain"));
}

#[test]
fn test_submit_invalid_payload_reports_field() {
    let dir = tempfile::tempdir().unwrap();
    let config = setup(dir.path());

    devlink(&config)
        .args(["submit", r#"{"name": "robot.jump", "parameters": {"height": 101}}"#])
        .assert()
        .failure()
        .stderr(predicate::str::contains("out_of_range"))
        .stderr(predicate::str::contains("height"));
}

#[test]
fn test_state_batch_partial_success() {
    let dir = tempfile::tempdir().unwrap();
    let config = setup(dir.path());

    devlink(&config)
        .args(["state", "--set", "base.volume=4", "--set", "base.mode=turbo"])
        .assert()
        .failure()
        .stdout(predicate::str::contains("\"volume\": 4"))
        .stderr(predicate::str::contains("batch_failed"))
        .stderr(predicate::str::contains("base.mode"));
}
