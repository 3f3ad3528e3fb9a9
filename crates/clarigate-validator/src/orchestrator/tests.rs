//! Unit tests for validation orchestration.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;

use rstest::{fixture, rstest};
use tempfile::TempDir;

use super::*;
use crate::tests::support::{FnExecutor, StaticProvider, not_found};

#[fixture]
fn temp() -> TempDir {
    TempDir::new().expect("temp dir")
}

fn unit() -> SourceUnit {
    SourceUnit::new("counter", "(define-data-var n uint u0)").expect("valid source")
}

fn entries(dir: &Path) -> usize {
    fs::read_dir(dir).map_or(0, Iterator::count)
}

#[rstest]
#[case::clean(Some(0), "", "", true, vec![])]
#[case::stderr_is_auxiliary(Some(0), "ok\n", "warning: unused\n\nnote: x\n", true, vec!["warning: unused", "note: x"])]
#[case::stdout_first(Some(1), "error: bad\n", "trace", false, vec!["error: bad\n"])]
#[case::stderr_second(Some(1), "  \n", "panic\n", false, vec!["panic\n"])]
#[case::status_last(Some(2), "", "", false, vec!["compiler exited with status 2"])]
#[case::signal(None, "", "", false, vec!["compiler terminated by a signal"])]
#[case::json_message(Some(1), r#"{"message":"unresolved","error":"x"}"#, "", false, vec!["unresolved"])]
#[case::json_error(Some(1), r#"{"error":"bad token"}"#, "", false, vec!["bad token"])]
#[case::json_non_string(Some(1), r#"{"message":42}"#, "", false, vec![r#"{"message":42}"#])]
#[case::broken_json(Some(1), r#"{"message": "#, "", false, vec![r#"{"message": "#])]
#[case::plain_text_kept_verbatim(Some(1), "  line one\n  line two\n", "", false, vec!["  line one\n  line two\n"])]
#[case::padded_json(Some(1), "\n{\"error\":\"bad token\"}\n", "", false, vec!["bad token"])]
fn classifies_process_output(
    #[case] status: Option<i32>,
    #[case] stdout: &str,
    #[case] stderr: &str,
    #[case] success: bool,
    #[case] errors: Vec<&str>,
) {
    let verdict = ExternalVerdict::classify(Ok(ProcessOutput::new(status, stdout, stderr)));
    assert_eq!(verdict.success(), success);
    assert_eq!(verdict.normalized_errors(), errors.as_slice());
}

#[test]
fn invocation_errors_become_failures() {
    let verdict = ExternalVerdict::classify(Err(ProcessError::Timeout {
        program: String::from("clarinet"),
        timeout: Duration::from_secs(30),
    }));
    assert!(!verdict.success());
    assert_eq!(verdict.normalized_errors(), ["'clarinet' timed out after 30s"]);
}

#[test]
fn success_response_defaults_output() {
    let response = ExternalVerdict::classify(Ok(ProcessOutput::new(Some(0), " \n", ""))).into_response();
    assert_eq!(
        response,
        ValidationResponse {
            success: true,
            output: String::from(VALIDATION_SUCCESSFUL),
            errors: None,
        }
    );
}

#[test]
fn success_response_surfaces_stderr() {
    let response =
        ExternalVerdict::classify(Ok(ProcessOutput::new(Some(0), "1 contract checked\n", "warning\n")))
            .into_response();
    assert!(response.success);
    assert_eq!(response.output, "1 contract checked");
    assert_eq!(response.errors.as_deref(), Some("warning"));
}

#[test]
fn failure_response_has_empty_output() {
    let response = ExternalVerdict::unavailable().into_response();
    assert!(!response.success);
    assert_eq!(response.output, "");
    assert_eq!(response.errors.as_deref(), Some(COMPILER_UNAVAILABLE));

    let json = serde_json::to_value(&response).expect("serialise");
    assert_eq!(json["errors"], COMPILER_UNAVAILABLE);
}

#[rstest]
fn unavailable_compiler_writes_nothing(temp: TempDir) {
    let root = temp.path().join("work");
    let executor = FnExecutor::new(not_found);
    let orchestrator = ValidationOrchestrator::new(
        StaticProvider::unavailable(),
        executor,
        WorkspaceStager::new(&root),
        OrchestratorSettings::default(),
    );

    let verdict = orchestrator.validate(&unit());
    assert!(!verdict.success());
    assert_eq!(verdict.normalized_errors(), [COMPILER_UNAVAILABLE]);
    assert!(!root.exists());
    assert!(orchestrator.executor.calls().is_empty());
}

#[rstest]
fn runs_check_from_workspace_root(temp: TempDir) {
    let executor = FnExecutor::new(|request| {
        let cwd = request.cwd().expect("cwd set");
        assert!(cwd.join("Clarinet.toml").is_file());
        assert!(cwd.join("contracts/counter.clar").is_file());
        Ok(ProcessOutput::new(Some(0), "checked\n", ""))
    });
    let orchestrator = ValidationOrchestrator::new(
        StaticProvider::available("/opt/clarinet"),
        executor,
        WorkspaceStager::new(temp.path()),
        OrchestratorSettings::new(Duration::from_secs(7), 4096),
    );

    let verdict = orchestrator.validate(&unit());
    assert!(verdict.success(), "{verdict:?}");

    let calls = orchestrator.executor.calls();
    assert_eq!(calls.len(), 1);
    let call = &calls[0];
    assert_eq!(call.program(), Path::new("/opt/clarinet"));
    assert_eq!(call.args(), [std::ffi::OsString::from("check")]);
    assert_eq!(call.timeout_duration(), Duration::from_secs(7));
    assert_eq!(call.output_limit(), 4096);
    assert_eq!(entries(temp.path()), 0, "workspace must be removed");
}

#[rstest]
fn spawn_failure_invalidates_binary(temp: TempDir) {
    let orchestrator = ValidationOrchestrator::new(
        StaticProvider::available("/opt/clarinet"),
        FnExecutor::new(not_found),
        WorkspaceStager::new(temp.path()),
        OrchestratorSettings::default(),
    );

    let verdict = orchestrator.validate(&unit());
    assert!(!verdict.success());
    assert_eq!(orchestrator.provider.invalidations(), 1);
    assert_eq!(entries(temp.path()), 0);
}

#[rstest]
fn non_zero_exit_keeps_binary(temp: TempDir) {
    let orchestrator = ValidationOrchestrator::new(
        StaticProvider::available("/opt/clarinet"),
        FnExecutor::new(|_| Ok(ProcessOutput::new(Some(1), "error: x", ""))),
        WorkspaceStager::new(temp.path()),
        OrchestratorSettings::default(),
    );

    let verdict = orchestrator.validate(&unit());
    assert_eq!(verdict.normalized_errors(), ["error: x"]);
    assert_eq!(orchestrator.provider.invalidations(), 0);
}

#[rstest]
fn staging_failure_is_a_verdict(temp: TempDir) {
    let blocker = temp.path().join("file");
    fs::write(&blocker, b"x").expect("write blocker");
    let orchestrator = ValidationOrchestrator::new(
        StaticProvider::available("/opt/clarinet"),
        FnExecutor::new(not_found),
        WorkspaceStager::new(&blocker),
        OrchestratorSettings::default(),
    );

    let verdict = orchestrator.validate(&unit());
    assert!(!verdict.success());
    assert!(verdict.normalized_errors()[0].contains("failed to create workspace directory"));
    assert!(orchestrator.executor.calls().is_empty());
}

#[rstest]
fn pre_cancelled_call_does_nothing(temp: TempDir) {
    let orchestrator = ValidationOrchestrator::new(
        StaticProvider::available("/opt/clarinet"),
        FnExecutor::new(not_found),
        WorkspaceStager::new(temp.path().join("work")),
        OrchestratorSettings::default(),
    );
    let cancel = CancellationToken::new();
    cancel.cancel();

    let verdict = orchestrator.validate_with_cancel(&unit(), &cancel);
    assert!(!verdict.success());
    assert!(!temp.path().join("work").exists());
}

#[rstest]
fn cancellation_still_cleans_up(temp: TempDir) {
    let executor = FnExecutor::new(|request| {
        Err(ProcessError::Cancelled {
            program: request.program().display().to_string(),
        })
    });
    let orchestrator = ValidationOrchestrator::new(
        StaticProvider::available("/opt/clarinet"),
        executor,
        WorkspaceStager::new(temp.path()),
        OrchestratorSettings::default(),
    );

    let verdict = orchestrator.validate(&unit());
    assert!(verdict.normalized_errors()[0].contains("cancelled"));
    assert_eq!(entries(temp.path()), 0);
}

#[rstest]
fn concurrent_calls_use_distinct_workspaces(temp: TempDir) {
    let seen = Arc::new(std::sync::Mutex::new(Vec::<PathBuf>::new()));
    let recorder = Arc::clone(&seen);
    let executor = FnExecutor::new(move |request| {
        let cwd = request.cwd().expect("cwd set").to_path_buf();
        recorder.lock().expect("seen lock").push(cwd);
        thread::sleep(Duration::from_millis(20));
        Ok(ProcessOutput::new(Some(0), "", ""))
    });
    let orchestrator = ValidationOrchestrator::new(
        StaticProvider::available("/opt/clarinet"),
        executor,
        WorkspaceStager::new(temp.path()),
        OrchestratorSettings::default(),
    );

    thread::scope(|scope| {
        for _ in 0..6 {
            scope.spawn(|| assert!(orchestrator.validate(&unit()).success()));
        }
    });

    let seen = seen.lock().expect("seen lock");
    let distinct: HashSet<_> = seen.iter().collect();
    assert_eq!(seen.len(), 6);
    assert_eq!(distinct.len(), 6);
    assert_eq!(entries(temp.path()), 0);
}

#[cfg(unix)]
mod unix {
    use std::os::unix::fs::PermissionsExt;

    use super::*;
    use crate::process::SystemExecutor;

    fn script(dir: &Path, body: &str) -> PathBuf {
        let path = dir.join("clarinet");
        fs::write(&path, format!("#!/bin/sh\n{body}\n")).expect("write script");
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).expect("chmod");
        path
    }

    #[rstest]
    fn hung_compiler_times_out_and_cleans_up(temp: TempDir) {
        let bin_dir = temp.path().join("bin");
        let work = temp.path().join("work");
        fs::create_dir_all(&bin_dir).expect("bin dir");
        let binary = script(&bin_dir, "exec sleep 5");

        let orchestrator = ValidationOrchestrator::new(
            StaticProvider::available(&binary),
            SystemExecutor,
            WorkspaceStager::new(&work),
            OrchestratorSettings::new(Duration::from_millis(200), 1024),
        );

        let started = Instant::now();
        let verdict = orchestrator.validate(&unit());
        assert!(started.elapsed() < Duration::from_secs(3), "took {:?}", started.elapsed());
        assert!(!verdict.success());
        assert!(
            verdict.normalized_errors()[0].contains("timed out"),
            "{verdict:?}"
        );
        assert_eq!(entries(&work), 0);
    }

    #[rstest]
    fn real_check_sees_staged_project(temp: TempDir) {
        let bin_dir = temp.path().join("bin");
        let work = temp.path().join("work");
        fs::create_dir_all(&bin_dir).expect("bin dir");
        let binary = script(
            &bin_dir,
            r#"[ "$1" = check ] && [ -f Clarinet.toml ] && cat contracts/counter.clar"#,
        );

        let orchestrator = ValidationOrchestrator::new(
            StaticProvider::available(&binary),
            SystemExecutor,
            WorkspaceStager::new(&work),
            OrchestratorSettings::default(),
        );

        let response = orchestrator.validate(&unit()).into_response();
        assert!(response.success, "{response:?}");
        assert_eq!(response.output, "(define-data-var n uint u0)");
        assert_eq!(entries(&work), 0);
    }
}
