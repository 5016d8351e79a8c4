//! Binary smoke tests

use assert_cmd::Command;
use predicates::prelude::*;

fn agentchat() -> Command {
    let mut cmd = Command::cargo_bin("agentchat").expect("binary built");
    cmd.env_remove("AGENTCHAT_ENDPOINT")
        .env_remove("AGENTCHAT_SESSION_ID")
        .env_remove("AGENTCHAT_AUTH_TOKEN")
        .env("AGENTCHAT_LOG_LEVEL", "error");
    cmd
}

#[test]
fn test_help_lists_commands() {
    agentchat()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("chat"))
        .stdout(predicate::str::contains("send"));
}

#[test]
fn test_send_empty_prompt_fails_without_network() {
    let dir = tempfile::TempDir::new().expect("tempdir");
    agentchat()
        .current_dir(dir.path())
        .args(["--endpoint", "http://127.0.0.1:9/invocations"])
        .args(["send", "--prompt", "   "])
        .assert()
        .failure()
        .stderr(predicate::str::contains("validation").or(predicate::str::contains("empty")));
}

#[test]
fn test_invalid_endpoint_is_rejected() {
    let dir = tempfile::TempDir::new().expect("tempdir");
    agentchat()
        .current_dir(dir.path())
        .args(["--endpoint", "not a url"])
        .args(["send", "--prompt", "hi"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("runtime.endpoint"));
}
