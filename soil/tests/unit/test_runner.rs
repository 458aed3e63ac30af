//! Command runner tests against a real bash

use soil::argv;
use soil::errors::SoilError;
use soil::process::{CommandRunner, ExecPolicy, Executor, JsonRunner};
use tokio_test::{assert_err, assert_ok};

fn runner() -> CommandRunner {
    CommandRunner::default()
}

#[tokio::test]
async fn test_stdout_only_capture() {
    let output = runner()
        .run(
            &argv!["printf A;", "printf B;", "printf C >&2"],
            ExecPolicy::EXEC_OUTPUT,
        )
        .await;
    assert_eq!(assert_ok!(output), "AB");
}

#[tokio::test]
async fn test_lines_keep_terminators() {
    let output = runner()
        .run(&argv!["echo first;", "echo second"], ExecPolicy::EXEC_SILENT)
        .await;
    assert_eq!(assert_ok!(output), "first\nsecond\n");
}

#[tokio::test]
async fn test_exec_captures_nothing() {
    let output = runner()
        .run(&argv!["echo", "hello"], ExecPolicy::EXEC)
        .await;
    assert_eq!(assert_ok!(output), "");
}

#[tokio::test]
async fn test_combined_capture_holds_both_streams() {
    let output = runner()
        .run(
            &argv!["echo out;", "echo err >&2;", "echo out2"],
            ExecPolicy::SHELL_COMBINED,
        )
        .await;
    let output = assert_ok!(output);
    let mut lines: Vec<&str> = output.lines().collect();
    lines.sort();
    assert_eq!(lines, vec!["err", "out", "out2"]);

    // Order within one stream is preserved
    let out = output.find("out\n").unwrap();
    let out2 = output.find("out2\n").unwrap();
    assert!(out < out2);
}

#[tokio::test]
async fn test_large_output_on_both_streams() {
    let output = runner()
        .run(
            &argv!["seq 1 20000;", "seq 1 20000 >&2"],
            ExecPolicy::SHELL_COMBINED,
        )
        .await;
    assert_eq!(assert_ok!(output).lines().count(), 40000);
}

#[tokio::test]
async fn test_nonzero_exit_carries_code_and_output() {
    let result = runner()
        .run(
            &argv!["echo partial;", "echo broken >&2;", "exit 3"],
            ExecPolicy::EXEC_OUTPUT,
        )
        .await;
    match assert_err!(result) {
        SoilError::Command {
            command,
            code,
            output,
        } => {
            assert_eq!(command, "echo partial; echo broken >&2; exit 3");
            assert_eq!(code, Some(3));
            assert_eq!(output, "partial\nbroken\n");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn test_failed_exec_reports_stderr() {
    let result = runner()
        .run(
            &argv!["echo 'Error: provider not found' >&2;", "exit 1"],
            ExecPolicy::EXEC,
        )
        .await;
    let err = assert_err!(result);
    match &err {
        SoilError::Command { code, output, .. } => {
            assert_eq!(*code, Some(1));
            assert_eq!(output, "Error: provider not found\n");
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(err.to_string().contains("provider not found"));
}

#[tokio::test]
async fn test_successful_run_drops_uncaptured_stderr() {
    let output = runner()
        .run(&argv!["echo out;", "echo warn >&2"], ExecPolicy::EXEC_OUTPUT)
        .await;
    assert_eq!(assert_ok!(output), "out\n");
}

#[tokio::test]
async fn test_missing_shell_is_launch_error() {
    let result = CommandRunner::new("/nonexistent/soil-shell")
        .run(&argv!["true"], ExecPolicy::EXEC)
        .await;
    let err = assert_err!(result);
    assert!(matches!(err, SoilError::Launch { .. }));
    assert!(err.is_command_failure());
}

#[tokio::test]
async fn test_run_json_parses_object() {
    let result = runner()
        .run_json(
            &argv!["echo", r#"'{"status": {"token": "abc"}}'"#],
            ExecPolicy::EXEC,
        )
        .await;
    let map = assert_ok!(result);
    assert_eq!(map["status"]["token"], "abc");
}

#[tokio::test]
async fn test_run_json_invalid_output_is_parse_error() {
    let result = runner()
        .run_json(&argv!["echo", "not-json"], ExecPolicy::EXEC_SILENT)
        .await;
    assert!(matches!(assert_err!(result), SoilError::Parse { .. }));
}

#[tokio::test]
async fn test_run_json_failed_command_is_not_parsed() {
    let result = runner()
        .run_json(&argv!["echo '{}';", "exit 1"], ExecPolicy::EXEC_SILENT)
        .await;
    match assert_err!(result) {
        SoilError::Command { code, output, .. } => {
            assert_eq!(code, Some(1));
            assert_eq!(output, "{}\n");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn test_interactive_exit_code() {
    let result = runner().run_interactive(&argv!["exit", "4"]).await;
    assert!(matches!(
        assert_err!(result),
        SoilError::Command { code: Some(4), .. }
    ));
}
