use std::fs;
use std::path::PathBuf;

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::tempdir;

fn fixture(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("../paraloop-analysis/tests/fixtures")
        .join(name)
}

fn paraloop() -> Command {
    let mut cmd = Command::cargo_bin("paraloop").expect("paraloop バイナリが見つかりません");
    cmd.arg("--no-color");
    cmd
}

#[test]
fn test_analyze_reports_shared_variable() {
    paraloop()
        .arg("analyze")
        .arg(fixture("sum.pir"))
        .assert()
        .success()
        .stdout(predicate::str::contains("並列化不可"))
        .stdout(predicate::str::contains("[PL0101]"))
        .stdout(predicate::str::contains("/work/sum.c:4"));
}

#[test]
fn test_deny_hazards_passes_on_parallel_loop() {
    paraloop()
        .args(["analyze", "--deny-hazards"])
        .arg(fixture("scale.pir"))
        .assert()
        .success()
        .stdout(predicate::str::contains("並列化可能"));
}

#[test]
fn test_deny_hazards_fails_on_array_hazard() {
    paraloop()
        .args(["analyze", "--deny-hazards"])
        .arg(fixture("shift.pir"))
        .assert()
        .code(1)
        .stdout(predicate::str::contains("[PL0102]"));
}

#[test]
fn test_directory_input_as_json() {
    let output = paraloop()
        .args(["analyze", "--format", "json"])
        .arg(fixture(""))
        .output()
        .unwrap();
    assert!(output.status.success(), "終了コードが0ではありません");

    let json: serde_json::Value = serde_json::from_slice(&output.stdout).expect("JSONではありません");
    let modules = json.as_array().expect("配列のはずです");
    assert_eq!(modules.len(), 6);
    // ディレクトリ内のファイルは名前順に解析される
    assert_eq!(modules[0]["module"], "locals");
    assert_eq!(modules[5]["module"], "sum");
}

#[test]
fn test_single_function_selection() {
    let output = paraloop()
        .args(["analyze", "--format", "json", "--function", "no_preheader"])
        .arg(fixture("mixed.pir"))
        .output()
        .unwrap();
    assert!(output.status.success());

    let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let functions = json[0]["functions"].as_array().unwrap();
    assert_eq!(functions.len(), 1);
    let l = &functions[0]["loops"][0];
    assert_eq!(l["status"]["state"], "skipped");
    assert_eq!(l["status"]["reason"], "missing_preheader");
}

#[test]
fn test_unknown_function_is_error() {
    paraloop()
        .args(["analyze", "--function", "missing"])
        .arg(fixture("mixed.pir"))
        .assert()
        .code(2)
        .stderr(predicate::str::contains("missing"));
}

#[test]
fn test_nested_flag_analyzes_inner_loops() {
    let output = paraloop()
        .args(["analyze", "--format", "json", "--nested"])
        .arg(fixture("nested.pir"))
        .output()
        .unwrap();
    let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(json[0]["functions"][0]["loops"].as_array().unwrap().len(), 2);
}

#[test]
fn test_config_file_enables_strict_indices() {
    let dir = tempdir().unwrap();
    let config = dir.path().join("paraloop.toml");
    fs::write(&config, "strict_indices = true\n").unwrap();

    paraloop()
        .arg("analyze")
        .arg("--config")
        .arg(&config)
        .arg(fixture("nested.pir"))
        .assert()
        .success()
        .stdout(predicate::str::contains("[PL0104]"));
}

#[test]
fn test_invalid_config_is_error() {
    let dir = tempdir().unwrap();
    let config = dir.path().join("paraloop.toml");
    fs::write(&config, "threads = 0\n").unwrap();

    paraloop()
        .arg("analyze")
        .arg("--config")
        .arg(&config)
        .arg(fixture("sum.pir"))
        .assert()
        .code(2);
}

#[test]
fn test_parse_error_reports_line() {
    let dir = tempdir().unwrap();
    let input = dir.path().join("broken.pir");
    fs::write(&input, "define void @f() {\nentry:\n  br label %nowhere\n}\n").unwrap();

    paraloop()
        .arg("analyze")
        .arg(&input)
        .assert()
        .code(2)
        .stderr(predicate::str::contains("3行目"));
}

#[test]
fn test_empty_directory_is_error() {
    let dir = tempdir().unwrap();
    paraloop().arg("analyze").arg(dir.path()).assert().code(2);
}

#[test]
fn test_dump_shows_loop_structure() {
    paraloop()
        .arg("dump")
        .arg(fixture("nested.pir"))
        .assert()
        .success()
        .stdout(predicate::str::contains("define @clear(%n)"))
        .stdout(predicate::str::contains("ヘッダ outer / プリヘッダ entry / 深さ 1"))
        .stdout(predicate::str::contains("ヘッダ inner / プリヘッダ outer.body / 深さ 2"));
}
