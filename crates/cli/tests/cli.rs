//! Binary-level tests: argument parsing, configuration errors and the
//! verifier health check. None of these reach a model.

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use tempfile::TempDir;

fn project(config: &str) -> TempDir {
    let dir = tempfile::tempdir().expect("temp dir");
    let config_dir = dir.path().join(".verikit");
    fs::create_dir_all(&config_dir).expect("config dir");
    fs::write(config_dir.join("config.toml"), config).expect("config file");
    dir
}

fn verikit(root: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("verikit").expect("binary built");
    cmd.arg("--root").arg(root.path());
    for key in [
        "VERIKIT_MODEL",
        "VERIKIT_MODEL_URL",
        "VERIKIT_VERIFIER_URL",
        "VERIKIT_MAX_ITERATIONS",
        "VERIKIT_MAX_GLOBAL_ITERATIONS",
    ] {
        cmd.env_remove(key);
    }
    cmd
}

#[test]
fn test_help_lists_subcommands() {
    Command::cargo_bin("verikit")
        .expect("binary built")
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("run"))
        .stdout(predicate::str::contains("check"))
        .stdout(predicate::str::contains("chat"));
}

#[test]
fn test_run_requires_a_message() {
    let root = project("");
    verikit(&root).arg("run").assert().failure();
}

#[test]
fn test_invalid_budget_is_reported() {
    let root = project("[budget]\nmax_iterations = 10\nmax_global_iterations = 5\n");

    verikit(&root)
        .arg("check")
        .assert()
        .failure()
        .stderr(predicate::str::contains("max_global_iterations"));
}

#[test]
fn test_unparsable_override_is_reported() {
    let root = project("");

    verikit(&root)
        .env("VERIKIT_MAX_ITERATIONS", "many")
        .arg("check")
        .assert()
        .failure()
        .stderr(predicate::str::contains("VERIKIT_MAX_ITERATIONS"));
}

#[test]
fn test_check_fails_for_missing_verifier_program() {
    let root = project(
        "[verifier]\nkind = \"command\"\nprogram = \"verikit-no-such-verifier\"\n",
    );

    verikit(&root)
        .arg("check")
        .assert()
        .failure()
        .stdout(predicate::str::contains("verifier: verikit-no-such-verifier"))
        .stderr(predicate::str::contains("verifier unreachable"));
}

#[test]
fn test_command_verifier_requires_program() {
    let root = project("[verifier]\nkind = \"command\"\n");

    verikit(&root)
        .arg("check")
        .assert()
        .failure()
        .stderr(predicate::str::contains("verifier.program"));
}
