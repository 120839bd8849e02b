//! Tests that exercise the `qv` binary end to end: source management,
//! config persistence, querying, and exit codes.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use tempfile::TempDir;

fn qv_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("qv");
    path
}

fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let config_path = tmp.path().join("qv.toml");

    fs::write(
        tmp.path().join("people.csv"),
        "name,age,city\nada,36,london\ngrace,45,arlington\nalan,41,wilmslow\n",
    )
    .unwrap();

    (tmp, config_path)
}

fn run_qv(config_path: &Path, args: &[&str]) -> (String, String, Option<i32>) {
    let binary = qv_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .stdin(Stdio::null())
        .output()
        .unwrap_or_else(|e| panic!("failed to run qv binary at {binary:?}: {e}"));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    (stdout, stderr, output.status.code())
}

#[test]
fn src_add_ls_rm_round_trip() {
    let (tmp, config_path) = setup_test_env();
    let csv = tmp.path().join("people.csv");

    let (stdout, stderr, code) = run_qv(
        &config_path,
        &["src", "add", csv.to_str().unwrap(), "--handle", "@people"],
    );
    assert_eq!(code, Some(0), "add failed: {stdout} {stderr}");
    assert!(config_path.exists(), "config not persisted");

    let (stdout, _, code) = run_qv(&config_path, &["src", "ls"]);
    assert_eq!(code, Some(0));
    assert!(stdout.contains("@people"));
    assert!(stdout.contains("csv"));

    let (_, _, code) = run_qv(&config_path, &["src", "rm", "@people"]);
    assert_eq!(code, Some(0));
    let (stdout, _, _) = run_qv(&config_path, &["src", "ls"]);
    assert!(!stdout.contains("@people"));
}

#[test]
fn query_csv_source_as_csv() {
    let (tmp, config_path) = setup_test_env();
    let csv = tmp.path().join("people.csv");

    run_qv(
        &config_path,
        &[
            "src",
            "add",
            csv.to_str().unwrap(),
            "--handle",
            "@people",
            "--opts",
            "header=true",
        ],
    );

    let (stdout, stderr, code) = run_qv(
        &config_path,
        &["--format", "csv", "@people | .data | .name"],
    );
    assert_eq!(code, Some(0), "query failed: {stderr}");
    assert_eq!(stdout.lines().collect::<Vec<_>>(), ["ada", "grace", "alan"]);
}

#[test]
fn first_added_source_becomes_active() {
    let (tmp, config_path) = setup_test_env();
    let csv = tmp.path().join("people.csv");

    run_qv(
        &config_path,
        &[
            "src",
            "add",
            csv.to_str().unwrap(),
            "--handle",
            "@people",
            "--opts",
            "header=true",
        ],
    );

    // A bare query (no @handle) resolves against the active source.
    let (stdout, stderr, code) = run_qv(
        &config_path,
        &["--format", "csv", ".data | .count"],
    );
    assert_eq!(code, Some(0), "query failed: {stderr}");
    assert_eq!(stdout.trim(), "3");
}

#[test]
fn unknown_handle_exits_2() {
    let (_tmp, config_path) = setup_test_env();
    let (_, stderr, code) = run_qv(&config_path, &["@nope | .t"]);
    assert_eq!(code, Some(2), "stderr: {stderr}");
    assert!(stderr.contains("@nope"));
}

#[test]
fn parse_error_exits_2() {
    let (tmp, config_path) = setup_test_env();
    let csv = tmp.path().join("people.csv");
    run_qv(
        &config_path,
        &["src", "add", csv.to_str().unwrap(), "--handle", "@people"],
    );

    let (_, _, code) = run_qv(&config_path, &["@people | | .data"]);
    assert_eq!(code, Some(2));
}

#[test]
fn piped_stdin_becomes_the_query_source() {
    use std::io::Write;

    let (tmp, config_path) = setup_test_env();
    let csv_bytes = fs::read(tmp.path().join("people.csv")).unwrap();

    // `cat people.csv | qv` with no query text: the pipe registers as
    // @stdin, becomes active, and the query defaults to its `data` table.
    let mut child = Command::new(qv_binary())
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(["--format", "csv", "--src-opts", "header=true"])
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .unwrap();
    child
        .stdin
        .take()
        .unwrap()
        .write_all(&csv_bytes)
        .unwrap();
    let output = child.wait_with_output().unwrap();

    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(output.status.success(), "stderr: {stderr}");
    assert_eq!(
        stdout.lines().collect::<Vec<_>>(),
        ["ada,36,london", "grace,45,arlington", "alan,41,wilmslow"]
    );
}

#[test]
fn ping_reports_ok_for_existing_file() {
    let (tmp, config_path) = setup_test_env();
    let csv = tmp.path().join("people.csv");
    run_qv(
        &config_path,
        &["src", "add", csv.to_str().unwrap(), "--handle", "@people"],
    );

    let (stdout, stderr, code) = run_qv(&config_path, &["ping", "@people"]);
    assert_eq!(code, Some(0), "ping failed: {stderr}");
    assert!(stdout.contains("ok"));
}
