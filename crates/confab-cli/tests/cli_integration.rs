//! End-to-end tests for the confab binary over a temporary model layout

use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::json;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

fn library_extension() -> &'static str {
    if cfg!(target_os = "windows") {
        "dll"
    } else if cfg!(target_os = "macos") {
        "dylib"
    } else {
        "so"
    }
}

/// Lay out a model directory with a config document and a CPU library
/// stub next to it, then return the workspace root.
fn model_workspace() -> TempDir {
    let dir = TempDir::new().unwrap();
    let model = dir.path().join("vicuna");
    fs::create_dir_all(&model).unwrap();

    let document = json!({
        "model_lib": "vicuna-q4f32_0",
        "conv_template": "vicuna_v1.1",
        "temperature": 0.7,
        "top_p": 0.95,
        "conv_config": {
            "roles": ["Human", "Assistant"],
            "system": "Be concise."
        }
    });
    fs::write(
        model.join("chat-config.json"),
        serde_json::to_vec_pretty(&document).unwrap(),
    )
    .unwrap();
    fs::write(
        model.join(format!("vicuna-q4f32_0-cpu.{}", library_extension())),
        b"stub",
    )
    .unwrap();

    dir
}

fn confab(dir: &Path) -> Command {
    let mut cmd = Command::cargo_bin("confab").unwrap();
    cmd.current_dir(dir)
        .arg("--config")
        .arg(dir.join("confab.toml"));
    cmd
}

#[test]
fn test_help_lists_subcommands() {
    Command::cargo_bin("confab")
        .unwrap()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("chat"))
        .stdout(predicate::str::contains("generate"))
        .stdout(predicate::str::contains("bench"));
}

#[test]
fn test_generate_echoes_prompt() {
    let dir = model_workspace();
    confab(dir.path())
        .args(["generate", "hello echo backend", "--model", "vicuna"])
        .assert()
        .success()
        .stdout(predicate::str::contains("hello echo backend"));
}

#[test]
fn test_generate_json_output() {
    let dir = model_workspace();
    let output = confab(dir.path())
        .args(["--json", "generate", "round trip", "--model", "vicuna"])
        .output()
        .unwrap();

    assert!(output.status.success());
    let value: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(value["response"], "round trip");
    assert_eq!(value["device"], "cpu:0");
}

#[test]
fn test_generate_rejects_blank_prompt() {
    let dir = model_workspace();
    confab(dir.path())
        .args(["generate", "   ", "--model", "vicuna"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Prompt cannot be empty"));
}

#[test]
fn test_info_json_reports_override() {
    let dir = model_workspace();
    let output = confab(dir.path())
        .args(["--json", "info", "--model", "vicuna", "--temperature", "0.1"])
        .output()
        .unwrap();

    assert!(output.status.success());
    let value: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(value["config"]["temperature"], 0.1);
    assert_eq!(value["config"]["conv_template"], "vicuna_v1.1");
    assert!(value["library_path"]
        .as_str()
        .unwrap()
        .contains("vicuna-q4f32_0-cpu"));
}

#[test]
fn test_unknown_model_fails_with_search_report() {
    let dir = model_workspace();
    confab(dir.path())
        .args(["info", "--model", "missing-model"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("MODEL_DIR_NOT_FOUND"));
}

#[test]
fn test_unknown_device_rejected() {
    let dir = model_workspace();
    confab(dir.path())
        .args(["info", "--model", "vicuna", "--device", "warp"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("DEVICE_UNKNOWN"));
}

#[test]
fn test_bench_json_reports_iterations() {
    let dir = model_workspace();
    let output = confab(dir.path())
        .args([
            "--json",
            "bench",
            "--model",
            "vicuna",
            "--token-len",
            "32",
            "--gen-len",
            "16",
            "--iterations",
            "2",
            "--warmup",
            "1",
        ])
        .output()
        .unwrap();

    assert!(output.status.success());
    let value: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(value["iterations"], 2);
    assert_eq!(value["token_len"], 32);
    assert_eq!(value["iteration_ms"].as_array().unwrap().len(), 2);
}

#[test]
fn test_chat_session_over_piped_input() {
    let dir = model_workspace();
    confab(dir.path())
        .args(["chat", "--model", "vicuna"])
        .write_stdin("hi there\n/stats\n/exit\n")
        .assert()
        .success()
        .stdout(predicate::str::contains("hi there"))
        .stdout(predicate::str::contains("tok/s"))
        .stdout(predicate::str::contains("Goodbye!"));
}

#[test]
fn test_default_model_from_config_file() {
    let dir = model_workspace();
    let config_toml = r#"
default_model = "vicuna"
model_dirs = []

[session]
device = "auto"
device_id = 0

[stream]
poll_interval = 1

[bench]
token_len = 64
gen_len = 128
iterations = 3
warmup_iterations = 1
"#;
    fs::write(dir.path().join("confab.toml"), config_toml).unwrap();

    confab(dir.path())
        .args(["generate", "default model run"])
        .assert()
        .success()
        .stdout(predicate::str::contains("default model run"));
}
