// crates/objfun-cli/tests/worker_commands.rs
// ============================================================================
// Module: Worker Command Tests
// Description: End-to-end tests of the objfun binary against SQLite.
// Purpose: Validate JSON outputs and exit codes of the worker protocol.
// Dependencies: objfun-cli binary, serde_json, tempfile
// ============================================================================

//! ## Overview
//! Runs the compiled `objfun` binary with a temporary configuration and
//! database, playing both the optimizer and the worker side.

#![allow(
    clippy::panic,
    clippy::print_stdout,
    clippy::print_stderr,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    clippy::dbg_macro,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    clippy::float_cmp,
    reason = "Test-only assertions and helpers are permitted."
)]

use std::fs;
use std::path::Path;
use std::path::PathBuf;
use std::process::Command;

use serde_json::Value;
use serde_json::json;
use tempfile::TempDir;

// ============================================================================
// SECTION: Helpers
// ============================================================================

const PARAMS: &str = r#"{"a": 0.5, "n": 3}"#;

/// Writes a configuration for `kind` into `dir` and returns its path.
fn write_config(dir: &Path, kind: &str) -> PathBuf {
    let path = dir.join("objfun.toml");
    let content = format!(
        r#"
[setup]
basedir = '{}'
study = "S"
scenario = "sc"

[objective]
kind = "{kind}"

[parameters.a]
type = "float"
min = -1.0
max = 1.0

[parameters.n]
type = "integer"
min = 0
max = 10

[parameters.k]
type = "float"
min = 0.0
max = 5.0
constant = true
value = 2.0
"#,
        dir.display()
    );
    fs::write(&path, content).unwrap();
    path
}

/// Runs the binary and returns its exit code and parsed stdout.
fn objfun(config: &Path, args: &[&str]) -> (i32, Value) {
    let output = Command::new(env!("CARGO_BIN_EXE_objfun"))
        .arg("--config")
        .arg(config)
        .args(args)
        .env("OBJFUN_LOG", "off")
        .output()
        .unwrap();
    let stdout = String::from_utf8(output.stdout).unwrap();
    let value = serde_json::from_str(stdout.trim()).unwrap_or(Value::Null);
    (output.status.code().unwrap(), value)
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[test]
fn misfit_worker_round_trip() {
    let dir = TempDir::new().unwrap();
    let config = write_config(dir.path(), "misfit");

    let (code, init) = objfun(&config, &["init"]);
    assert_eq!(code, 0);
    assert_eq!(init["study"], "S");
    assert_eq!(init["scenario"], "sc");
    assert_eq!(init["parameters"], json!(["a", "k", "n"]));

    let (code, out) = objfun(&config, &["lookup", "--params", PARAMS]);
    assert_eq!((code, &out["outcome"]), (10, &json!("preliminary_run")));
    let (code, out) = objfun(&config, &["lookup", "--params", PARAMS]);
    assert_eq!((code, &out["outcome"]), (11, &json!("new_run")));

    let (code, claimed) = objfun(&config, &["claim"]);
    assert_eq!(code, 0);
    assert_eq!(claimed["parameters"]["n"], 3.0);
    assert!((claimed["parameters"]["k"].as_f64().unwrap() - 2.0).abs() < 1e-9);
    let run_id = claimed["run_id"].as_u64().unwrap();

    let (code, out) = objfun(&config, &["state", "--params", PARAMS]);
    assert_eq!(code, 0);
    assert_eq!(out["state"], "active");

    let (code, out) = objfun(&config, &["lookup", "--params", PARAMS]);
    assert_eq!(code, 0);
    assert_eq!(out["outcome"], "placeholder");

    let (code, out) = objfun(&config, &["deposit", "--params", PARAMS, "--value", "2.5"]);
    assert_eq!(code, 0);
    assert_eq!(out["run_id"].as_u64(), Some(run_id));

    let (code, out) = objfun(&config, &["lookup", "--params", PARAMS]);
    assert_eq!(code, 0);
    assert_eq!(out, json!({ "outcome": "value", "value": 2.5 }));

    let (code, out) = objfun(&config, &["claim"]);
    assert_eq!((code, &out["outcome"]), (13, &json!("no_pending_work")));
}

#[test]
fn missing_runs_map_to_not_found() {
    let dir = TempDir::new().unwrap();
    let config = write_config(dir.path(), "misfit");

    let (code, out) = objfun(&config, &["state", "--params", PARAMS]);
    assert_eq!((code, &out["outcome"]), (14, &json!("not_found")));
    let (code, _) = objfun(&config, &["deposit", "--params", PARAMS, "--value", "1.0"]);
    assert_eq!(code, 14);
    let (code, _) = objfun(&config, &["set-state", "--run-id", "999", "--state", "new"]);
    assert_eq!(code, 14);
}

#[test]
fn deposit_requires_an_active_run_unless_forced() {
    let dir = TempDir::new().unwrap();
    let config = write_config(dir.path(), "misfit");
    objfun(&config, &["lookup", "--params", PARAMS]);
    objfun(&config, &["lookup", "--params", PARAMS]);

    let (code, _) = objfun(&config, &["deposit", "--params", PARAMS, "--value", "1.0"]);
    assert_eq!(code, 1);
    let (code, _) = objfun(&config, &["deposit", "--params", PARAMS, "--value", "1.0", "--force"]);
    assert_eq!(code, 0);
}

#[test]
fn set_state_reschedules_a_run() {
    let dir = TempDir::new().unwrap();
    let config = write_config(dir.path(), "misfit");
    objfun(&config, &["lookup", "--params", PARAMS]);
    objfun(&config, &["lookup", "--params", PARAMS]);
    let (_, claimed) = objfun(&config, &["claim"]);
    let run_id = claimed["run_id"].as_u64().unwrap().to_string();

    let (code, out) = objfun(&config, &["set-state", "--run-id", &run_id, "--state", "new"]);
    assert_eq!(code, 0);
    assert_eq!(out["state"], "new");
    let (code, again) = objfun(&config, &["claim", "--from", "new", "--to", "configuring"]);
    assert_eq!(code, 0);
    assert_eq!(again["run_id"], claimed["run_id"]);
    let (_, out) = objfun(&config, &["state", "--params", PARAMS]);
    assert_eq!(out["state"], "configuring");
}

#[test]
fn residual_results_are_read_from_files() {
    let dir = TempDir::new().unwrap();
    let config = write_config(dir.path(), "residual");
    objfun(&config, &["lookup", "--params", PARAMS]);
    objfun(&config, &["lookup", "--params", PARAMS]);
    let (_, claimed) = objfun(&config, &["claim"]);
    let run_id = claimed["run_id"].as_u64().unwrap();

    let payload = dir.path().join("worker_output.json");
    fs::write(&payload, "[0.5, 1.5, 2.5]").unwrap();
    let (code, _) =
        objfun(&config, &["deposit", "--params", PARAMS, "--result", payload.to_str().unwrap()]);
    assert_eq!(code, 0);
    assert!(dir.path().join(format!("residuals_{run_id}.json")).is_file());

    let (code, out) = objfun(&config, &["lookup", "--params", PARAMS]);
    assert_eq!(code, 0);
    assert_eq!(out["value"], json!([0.5, 1.5, 2.5]));
}

#[test]
fn inspection_commands_report_scenarios_and_bounds() {
    let dir = TempDir::new().unwrap();
    let config = write_config(dir.path(), "misfit");

    let (code, scenarios) = objfun(&config, &["scenarios"]);
    assert_eq!(code, 0);
    assert_eq!(scenarios, json!(["sc"]));

    let (code, bounds) = objfun(&config, &["bounds"]);
    assert_eq!(code, 0);
    assert_eq!(bounds["names"], json!(["a", "n"]));
    assert_eq!(bounds["kinds"], json!(["continuous", "integer"]));
    assert_eq!(bounds["lower"], json!([-1.0, 0.0]));
    assert_eq!(bounds["upper"], json!([1.0, 10.0]));
    assert_eq!(bounds["num_residuals"], 1);
}

#[test]
fn invalid_configuration_exits_with_failure() {
    let dir = TempDir::new().unwrap();
    let config = dir.path().join("objfun.toml");
    fs::write(&config, "[setup]\nbasedir = '/tmp'\nstudy = \"S\"\n").unwrap();
    let output = Command::new(env!("CARGO_BIN_EXE_objfun"))
        .arg("--config")
        .arg(&config)
        .arg("init")
        .env("OBJFUN_LOG", "off")
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8(output.stderr).unwrap();
    assert!(stderr.contains("at least one parameter"));
}
