//! Driver integration tests: spawn the built `japl` binary and check
//! output, tracebacks, exit codes, and the stdin protocol.

use std::fs;
use std::io::Write;
use std::process::{Command, Output, Stdio};

fn japl() -> Command {
    Command::new(env!("CARGO_BIN_EXE_japl"))
}

fn run_piped(input: &[u8]) -> Output {
    let mut child = japl()
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("failed to spawn japl");
    child
        .stdin
        .take()
        .expect("piped stdin")
        .write_all(input)
        .expect("write to child stdin");
    child.wait_with_output().expect("wait for child")
}

fn stdout_of(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

fn stderr_of(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}

#[test]
fn test_run_script_file() {
    let dir = tempfile::tempdir().unwrap();
    let script = dir.path().join("arith.jpl");
    fs::write(&script, "print 1 + 2 * 3;\n").unwrap();

    let output = japl().arg(&script).output().unwrap();
    assert!(output.status.success());
    assert_eq!(stdout_of(&output), "7\n");
}

#[test]
fn test_inline_command() {
    let output = japl().arg("-c").arg("print \"hi\" * 2;").output().unwrap();
    assert!(output.status.success());
    assert_eq!(stdout_of(&output), "hihi\n");
}

#[test]
fn test_compile_error_exit_code() {
    let output = japl().arg("-c").arg("1 +;").output().unwrap();
    assert_eq!(output.status.code(), Some(65));
    let stderr = stderr_of(&output);
    assert!(stderr.contains("SyntaxError"));
    assert!(stderr.contains("Traceback"));
}

#[test]
fn test_runtime_error_exit_code_and_traceback() {
    let output = japl().arg("-c").arg("undefinedName;").output().unwrap();
    assert_eq!(output.status.code(), Some(70));
    let stderr = stderr_of(&output);
    assert!(stderr.contains("Traceback (most recent call last):"));
    assert!(stderr.contains("[line 1 in '<command>']"));
    assert!(stderr.contains("ReferenceError: undefined name 'undefinedName'"));
}

#[test]
fn test_missing_file_exit_code() {
    let output = japl().arg("definitely-absent.jpl").output().unwrap();
    assert_eq!(output.status.code(), Some(74));
    assert!(stderr_of(&output).contains("cannot read"));
}

#[test]
fn test_version_flags() {
    for flag in ["-v", "--version"] {
        let output = japl().arg(flag).output().unwrap();
        assert!(output.status.success());
        assert!(stdout_of(&output).contains(env!("CARGO_PKG_VERSION")));
    }
}

#[test]
fn test_help_flag() {
    let output = japl().arg("--help").output().unwrap();
    assert!(output.status.success());
    assert!(stdout_of(&output).contains("japl"));
}

#[test]
fn test_stdin_protocol_splits_at_eot() {
    // Source up to EOT executes; the rest is the stdin payload.
    let output = run_piped(b"print \"ok\";\x04anything after the marker");
    assert!(output.status.success());
    assert_eq!(stdout_of(&output), "ok\n");
}

#[test]
fn test_stdin_without_eot_is_all_source() {
    let output = run_piped(b"print 2 ** 8;");
    assert!(output.status.success());
    assert_eq!(stdout_of(&output), "256\n");
}

#[test]
fn test_directive_runner_passes() {
    let dir = tempfile::tempdir().unwrap();
    let script = dir.path().join("pass.jpl");
    fs::write(
        &script,
        "print 1 + 2;      //stdout: 3\n\
         print \"a\" * 2;  //stdout: aa\n",
    )
    .unwrap();

    let output = japl().arg("--test").arg(dir.path()).output().unwrap();
    assert!(output.status.success(), "stderr: {}", stderr_of(&output));
    assert!(stdout_of(&output).contains("1 passed, 0 failed"));
}

#[test]
fn test_directive_runner_regex_and_stderr() {
    let dir = tempfile::tempdir().unwrap();
    let script = dir.path().join("error.jpl");
    fs::write(
        &script,
        "missing;\n\
         //stderr: Traceback (most recent call last):\n\
         //stderrre: .*line 1.*\n\
         //stderrre: ReferenceError: undefined name 'missing'\n",
    )
    .unwrap();

    let output = japl().arg("--test").arg(&script).output().unwrap();
    assert!(output.status.success(), "stderr: {}", stderr_of(&output));
}

#[test]
fn test_directive_runner_fails_on_mismatch() {
    let dir = tempfile::tempdir().unwrap();
    let script = dir.path().join("fail.jpl");
    fs::write(&script, "print 2;  //stdout: 3\n").unwrap();

    let output = japl().arg("--test").arg(&script).output().unwrap();
    assert_eq!(output.status.code(), Some(1));
    assert!(stdout_of(&output).contains("FAILED"));
}

#[test]
fn test_directive_runner_no_tests_found() {
    let dir = tempfile::tempdir().unwrap();
    let output = japl().arg("--test").arg(dir.path()).output().unwrap();
    assert_eq!(output.status.code(), Some(2));
}
