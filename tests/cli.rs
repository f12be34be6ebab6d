//! Binary-level tests for the `delve-rs` command line.

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

/// A command with no ambient credentials or directories leaking in.
fn delve(profile_dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("delve-rs").unwrap_or_else(|_| unreachable!());
    cmd.current_dir(profile_dir.path())
        .env_remove("DASHSCOPE_API_KEY")
        .env_remove("DELVE_LLM_API_KEY")
        .env_remove("BOCHAAI_API_KEY")
        .env_remove("DELVE_SEARCH_API_KEY")
        .env_remove("DELVE_MAX_ITERATIONS")
        .env_remove("RUST_LOG")
        .env("DELVE_PROFILE_DIR", profile_dir.path());
    cmd
}

fn tempdir() -> TempDir {
    TempDir::new().unwrap_or_else(|_| unreachable!())
}

#[test]
fn test_profile_list_shows_builtins() {
    let dir = tempdir();
    delve(&dir)
        .args(["profile", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("deepResearch"))
        .stdout(predicate::str::contains("finance"))
        .stdout(predicate::str::contains("tech"));
}

#[test]
fn test_profile_list_json() {
    let dir = tempdir();
    delve(&dir)
        .args(["--format", "json", "profile", "list"])
        .assert()
        .success()
        .stdout(predicate::str::starts_with("["))
        .stdout(predicate::str::contains("\"id\": \"finance\""));
}

#[test]
fn test_profile_init_then_list_picks_up_edits() {
    let dir = tempdir();
    let target = dir.path().join("profiles");
    delve(&dir)
        .args(["profile", "init", "--dir"])
        .arg(&target)
        .assert()
        .success()
        .stdout(predicate::str::contains("3 profile file(s)"));

    let tech = target.join("tech.json");
    let edited = std::fs::read_to_string(&tech)
        .unwrap_or_default()
        .replacen("\"name\": \"", "\"name\": \"Edited ", 1);
    std::fs::write(&tech, edited).unwrap_or_else(|_| unreachable!());

    delve(&dir)
        .args(["profile", "list", "--profile-dir"])
        .arg(&target)
        .assert()
        .success()
        .stdout(predicate::str::contains("Edited "));
}

#[test]
fn test_research_without_keys_fails() {
    let dir = tempdir();
    delve(&dir)
        .args(["research", "半导体"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("API key not configured"));
}

#[test]
fn test_research_rejects_empty_query() {
    let dir = tempdir();
    delve(&dir)
        .env("DASHSCOPE_API_KEY", "sk-test")
        .env("BOCHAAI_API_KEY", "sk-test")
        .args(["research", "   "])
        .assert()
        .failure()
        .stderr(predicate::str::contains("query is empty"));
}

#[test]
fn test_research_rejects_unknown_profile() {
    let dir = tempdir();
    delve(&dir)
        .env("DASHSCOPE_API_KEY", "sk-test")
        .env("BOCHAAI_API_KEY", "sk-test")
        .args(["--format", "json", "research", "半导体", "--profile", "nope"])
        .assert()
        .failure()
        .stdout(predicate::str::contains("\"status\": \"failed\""))
        .stderr(predicate::str::contains("unknown profile: nope"));
}
