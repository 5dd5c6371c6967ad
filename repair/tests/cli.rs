//! CLI tests for the `repair` binary.
//!
//! Spawns the binary and checks stdout and exit codes.

use std::fs;
use std::io::Write;
use std::process::{Command, Stdio};

use repair::exit_codes;
use repair::io::config::{RepairConfig, load_config};
use repair::test_support::python3_available;

fn parse(input: &str) -> String {
    let mut child = Command::new(env!("CARGO_BIN_EXE_repair"))
        .arg("parse")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .spawn()
        .expect("spawn repair parse");
    child
        .stdin
        .take()
        .expect("stdin")
        .write_all(input.as_bytes())
        .expect("write stdin");
    let output = child.wait_with_output().expect("wait");
    assert_eq!(output.status.code(), Some(exit_codes::OK));
    String::from_utf8(output.stdout).expect("utf8")
}

#[test]
fn parse_prints_last_directive() {
    let out = parse("TOOL: run_python\n<think>TOOL: set_code</think>\nTOOL: inspect_traceback\n");
    assert_eq!(out, "TOOL: inspect_traceback\n");
}

#[test]
fn parse_defaults_without_directive() {
    assert_eq!(parse("no idea"), "TOOL: run_python\n");
}

#[test]
fn init_writes_default_config() {
    let temp = tempfile::tempdir().expect("tempdir");
    let status = Command::new(env!("CARGO_BIN_EXE_repair"))
        .current_dir(temp.path())
        .arg("init")
        .status()
        .expect("repair init");

    assert_eq!(status.code(), Some(exit_codes::OK));
    let cfg = load_config(&temp.path().join("repair.toml")).expect("load");
    assert_eq!(cfg, RepairConfig::default());
}

#[test]
fn exec_exit_code_reflects_verdict() {
    if !python3_available() {
        eprintln!("skipping: python3 not available");
        return;
    }
    let temp = tempfile::tempdir().expect("tempdir");
    let tests = temp.path().join("tests.py");
    fs::write(&tests, "def test_f():\n    assert f() == 1\n").expect("write");

    for (body, expected) in [
        ("def f():\n    return 1\n", exit_codes::OK),
        ("def f():\n    return 2\n", exit_codes::FAILED),
    ] {
        let code = temp.path().join("code.py");
        fs::write(&code, body).expect("write");
        let output = Command::new(env!("CARGO_BIN_EXE_repair"))
            .current_dir(temp.path())
            .arg("exec")
            .arg("--code")
            .arg(&code)
            .arg("--tests")
            .arg(&tests)
            .output()
            .expect("repair exec");
        assert_eq!(output.status.code(), Some(expected));
        let verdict: serde_json::Value = serde_json::from_slice(&output.stdout).expect("json");
        assert_eq!(verdict["passed"], expected == exit_codes::OK);
    }
}

#[test]
fn run_without_provider_command_is_invalid() {
    let temp = tempfile::tempdir().expect("tempdir");
    let task = temp.path().join("task.json");
    fs::write(
        &task,
        r#"{"task_id":"t","code":"x = 1","tests":"def test_x(): pass"}"#,
    )
    .expect("write");

    let output = Command::new(env!("CARGO_BIN_EXE_repair"))
        .current_dir(temp.path())
        .arg("run")
        .arg("--task")
        .arg(&task)
        .output()
        .expect("repair run");

    assert_eq!(output.status.code(), Some(exit_codes::INVALID));
    assert!(String::from_utf8_lossy(&output.stderr).contains("provider.command"));
}

#[test]
fn run_with_command_provider_reports_pass() {
    if !python3_available() {
        eprintln!("skipping: python3 not available");
        return;
    }
    let temp = tempfile::tempdir().expect("tempdir");
    let task = temp.path().join("task.json");
    fs::write(
        &task,
        r#"{"task_id":"t","code":"def f():\n    return 2\n","tests":"def test_f():\n    assert f() == 1\n"}"#,
    )
    .expect("write");
    fs::write(
        temp.path().join("repair.toml"),
        "[provider]\ncommand = [\"sh\", \"-c\", \"cat >/dev/null; printf 'TOOL: set_code\\\\n<code>def f():\\\\n    return 1</code>'\"]\n",
    )
    .expect("write config");

    let output = Command::new(env!("CARGO_BIN_EXE_repair"))
        .current_dir(temp.path())
        .arg("run")
        .arg("--task")
        .arg(&task)
        .arg("--log-dir")
        .arg("logs")
        .output()
        .expect("repair run");

    assert_eq!(
        output.status.code(),
        Some(exit_codes::OK),
        "{}",
        String::from_utf8_lossy(&output.stderr)
    );
    let result: serde_json::Value = serde_json::from_slice(&output.stdout).expect("json");
    assert_eq!(result["passed"], true);
    assert_eq!(result["steps"], 1);
    assert!(temp.path().join("logs/t/final_code.py").is_file());
}
