use assert_cmd::Command;
use tempfile::TempDir;

fn write_book(dir: &TempDir, name: &str, contents: &str) -> String {
    let path = dir.path().join(name);
    std::fs::write(&path, contents).expect("write");
    path.to_string_lossy().into_owned()
}

fn runbook() -> Command {
    Command::cargo_bin("runbook").unwrap()
}

const PASSING: &str = r#"
desc: echo check
vars:
  who: world
steps:
  greet:
    exec:
      command: echo hello {{ vars.who }}
    test: current.stdout == "hello world\n"
"#;

const FAILING: &str = r#"
steps:
  - exec:
      command: "exit 1"
    test: current.exit_code == 0
"#;

#[test]
fn run_command_returns_0_when_every_step_passes() {
    let dir = TempDir::new().unwrap();
    let book = write_book(&dir, "ok.yml", PASSING);

    let out = runbook().args(["run", book.as_str()]).assert().success();
    let stdout = String::from_utf8_lossy(&out.get_output().stdout).into_owned();
    assert!(stdout.starts_with("ok"), "{stdout}");
}

#[test]
fn run_command_returns_3_when_a_step_fails() {
    let dir = TempDir::new().unwrap();
    let book = write_book(&dir, "fail.yml", FAILING);

    runbook().args(["run", book.as_str()]).assert().code(3); // RUN_FAILED
}

#[test]
fn skip_test_flag_ignores_assertions() {
    let dir = TempDir::new().unwrap();
    let book = write_book(&dir, "fail.yml", FAILING);

    runbook()
        .args(["run", "--skip-test", book.as_str()])
        .assert()
        .success();
}

#[test]
fn var_flag_overrides_runbook_vars() {
    let dir = TempDir::new().unwrap();
    let book = write_book(&dir, "ok.yml", PASSING);

    runbook()
        .args(["run", "--var", "who=moon", book.as_str()])
        .assert()
        .code(3);
}

#[test]
fn invalid_runbook_returns_2() {
    let dir = TempDir::new().unwrap();
    let book = write_book(&dir, "bad.yml", "steps:\n  - {}\n");

    runbook().args(["run", book.as_str()]).assert().code(2); // VALIDATION_FAILED
}

#[test]
fn unknown_runner_returns_2() {
    let dir = TempDir::new().unwrap();
    let book = write_book(&dir, "bad.yml", "steps:\n  - api:\n      /x:\n        get: {}\n");

    runbook().args(["run", book.as_str()]).assert().code(2);
}

#[test]
fn json_format_prints_run_results() {
    let dir = TempDir::new().unwrap();
    let ok = write_book(&dir, "ok.yml", PASSING);
    let fail = write_book(&dir, "fail.yml", FAILING);

    let out = runbook()
        .args(["run", "--format", "json", ok.as_str(), fail.as_str()])
        .assert()
        .code(3);
    let results: serde_json::Value = serde_json::from_slice(&out.get_output().stdout).unwrap();
    assert_eq!(results.as_array().unwrap().len(), 2);
    assert_eq!(results[0]["succeeded"], serde_json::json!(true));
    assert_eq!(results[0]["steps"][0]["key"], serde_json::json!("greet"));
    assert_eq!(results[1]["succeeded"], serde_json::json!(false));
    assert_eq!(results[1]["steps"][0]["status"], serde_json::json!("failed"));
}

#[test]
fn list_command_prints_steps() {
    let dir = TempDir::new().unwrap();
    let book = write_book(&dir, "ok.yml", PASSING);

    let out = runbook().args(["list", book.as_str()]).assert().success();
    let stdout = String::from_utf8_lossy(&out.get_output().stdout).into_owned();
    assert!(stdout.contains("echo check"));
    assert!(stdout.contains("greet"));
    assert!(stdout.contains("exec"));
}

#[test]
fn glob_patterns_run_every_match_and_skip_included_books() {
    let dir = TempDir::new().unwrap();
    write_book(&dir, "main.yml", "steps:\n  - include: child.yml\n");
    write_book(&dir, "child.yml", PASSING);
    let pattern = format!("{}/*.yml", dir.path().display());

    let out = runbook()
        .args(["run", "--format", "json", pattern.as_str()])
        .assert()
        .success();
    let results: serde_json::Value = serde_json::from_slice(&out.get_output().stdout).unwrap();
    assert_eq!(results.as_array().unwrap().len(), 2);

    let out = runbook()
        .args(["run", "--skip-included", "--format", "json", pattern.as_str()])
        .assert()
        .success();
    let results: serde_json::Value = serde_json::from_slice(&out.get_output().stdout).unwrap();
    assert_eq!(results.as_array().unwrap().len(), 1);
    assert!(results[0]["path"].as_str().unwrap().ends_with("main.yml"));
}

#[test]
fn pattern_matching_nothing_returns_2() {
    let dir = TempDir::new().unwrap();
    let pattern = format!("{}/*.yml", dir.path().display());

    runbook().args(["run", pattern.as_str()]).assert().code(2);
}
