use std::io::Write;
use std::path::PathBuf;
use std::process::{Command, Stdio};

fn run_shell(lines: &[&str]) -> std::process::Output {
    let mut child = Command::new(env!("CARGO_BIN_EXE_jobsh"))
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("spawn jobsh");

    {
        let stdin = child.stdin.as_mut().expect("stdin");
        for line in lines {
            writeln!(stdin, "{line}").expect("write line");
        }
    }

    child.wait_with_output().expect("wait output")
}

struct TempDir(PathBuf);

impl TempDir {
    fn new(label: &str) -> Self {
        let dir = std::env::temp_dir().join(format!("jobsh_it_{label}_{}", std::process::id()));
        std::fs::create_dir_all(&dir).expect("create temp dir");
        TempDir(dir)
    }

    fn file(&self, name: &str) -> String {
        self.0.join(name).display().to_string()
    }
}

impl Drop for TempDir {
    fn drop(&mut self) {
        let _ = std::fs::remove_dir_all(&self.0);
    }
}

#[test]
fn single_command_output() {
    let output = run_shell(&["echo hi"]);
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("hi\n"), "stdout was: {stdout}");
    assert!(output.status.success());
}

#[test]
fn three_stage_pipeline_streams_data() {
    let output = run_shell(&["printf 'a\\nb\\nc\\n' | cat | wc -l"]);
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(
        stdout.lines().any(|line| line.trim_start().ends_with('3')),
        "stdout was: {stdout}"
    );
}

#[test]
fn quoted_words_keep_spacing() {
    let output = run_shell(&["echo 'a  b' \"c | d\""]);
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("a  b c | d\n"), "stdout was: {stdout}");
}

#[test]
fn connectors_gate_on_status() {
    let output = run_shell(&[
        "false && echo NOT_RUN",
        "false || echo OR_RAN",
        "true && echo AND_RAN",
        "false ; echo SEMI_RAN",
    ]);
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(!stdout.contains("NOT_RUN"), "stdout was: {stdout}");
    assert!(stdout.contains("OR_RAN"), "stdout was: {stdout}");
    assert!(stdout.contains("AND_RAN"), "stdout was: {stdout}");
    assert!(stdout.contains("SEMI_RAN"), "stdout was: {stdout}");
}

#[test]
fn redirections_write_append_and_read() {
    let dir = TempDir::new("redirect");
    let path = dir.file("out.txt");
    let output = run_shell(&[
        &format!("echo first > {path}"),
        &format!("echo second >> {path}"),
        &format!("cat < {path} | wc -l"),
    ]);
    let contents = std::fs::read_to_string(&path).expect("read redirect target");
    assert_eq!(contents, "first\nsecond\n");
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(
        stdout.lines().any(|line| line.trim_start().ends_with('2')),
        "stdout was: {stdout}"
    );
}

#[test]
fn missing_input_file_aborts_line_only() {
    let output = run_shell(&[
        "cat < /nonexistent/jobsh/input.txt && echo NOT_RUN",
        "echo AFTER",
    ]);
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("/nonexistent/jobsh/input.txt"), "stderr was: {stderr}");
    assert!(!stdout.contains("NOT_RUN"), "stdout was: {stdout}");
    assert!(stdout.contains("AFTER"), "stdout was: {stdout}");
}

#[test]
fn unknown_command_is_reported() {
    let output = run_shell(&["jobsh-definitely-not-a-command", "echo AFTER"]);
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("command not found"), "stderr was: {stderr}");
    assert!(stdout.contains("AFTER"), "stdout was: {stdout}");
}

#[test]
fn syntax_error_sets_status_two() {
    let output = run_shell(&["| echo nope"]);
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("syntax error"), "stderr was: {stderr}");
    assert_eq!(output.status.code(), Some(2));
}

#[test]
fn exit_status_follows_last_pipeline() {
    let output = run_shell(&["true", "false"]);
    assert_eq!(output.status.code(), Some(1));

    let output = run_shell(&["sh -c 'exit 3' | sh -c 'exit 9'"]);
    assert_eq!(output.status.code(), Some(9));
}

#[test]
fn exit_builtin_ends_session() {
    let output = run_shell(&["exit 7", "echo NOT_RUN"]);
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(!stdout.contains("NOT_RUN"), "stdout was: {stdout}");
    assert_eq!(output.status.code(), Some(7));
}

#[test]
fn cd_changes_directory_for_later_commands() {
    let dir = TempDir::new("cd");
    let output = run_shell(&[&format!("cd {}", dir.0.display()), "pwd"]);
    let stdout = String::from_utf8_lossy(&output.stdout);
    let name = dir.0.file_name().unwrap().to_string_lossy().into_owned();
    assert!(stdout.contains(&name), "stdout was: {stdout}");
}
