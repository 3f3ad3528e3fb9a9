//! End-to-end validation against the external compiler.
//!
//! [`ValidationOrchestrator`] acquires a binary, stages a workspace, runs
//! `check` from the workspace root under a timeout and output cap, and folds
//! every outcome into an [`ExternalVerdict`]. Nothing raised below this layer
//! escapes it: provisioning, staging, and subprocess failures all become
//! failure verdicts.

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::ProcessError;
use crate::process::{
    CancellationToken, DEFAULT_MAX_OUTPUT_BYTES, DEFAULT_TIMEOUT, ProcessExecutor, ProcessOutput,
    ProcessRequest,
};
use crate::provision::BinaryProvider;
use crate::source::SourceUnit;
use crate::workspace::WorkspaceStager;

/// Tracing target for orchestration.
const ORCHESTRATOR_TARGET: &str = "clarigate_validator::orchestrator";

/// Compiler subcommand that type-checks a project.
const CHECK_SUBCOMMAND: &str = "check";

/// Normalised error reported when no binary could be provisioned.
pub const COMPILER_UNAVAILABLE: &str = "compiler unavailable";

/// Output reported for a successful check that printed nothing.
pub const VALIDATION_SUCCESSFUL: &str = "validation successful";

/// Limits applied to each `check` run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrchestratorSettings {
    check_timeout: Duration,
    max_output_bytes: usize,
}

impl OrchestratorSettings {
    /// Creates settings with explicit limits.
    #[must_use]
    pub const fn new(check_timeout: Duration, max_output_bytes: usize) -> Self {
        Self {
            check_timeout,
            max_output_bytes,
        }
    }

    /// Returns the wall-clock limit for `check`.
    #[must_use]
    pub const fn check_timeout(&self) -> Duration {
        self.check_timeout
    }

    /// Returns the per-stream capture limit.
    #[must_use]
    pub const fn max_output_bytes(&self) -> usize {
        self.max_output_bytes
    }
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self::new(DEFAULT_TIMEOUT, DEFAULT_MAX_OUTPUT_BYTES)
    }
}

/// Classified outcome of one compiler invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalVerdict {
    success: bool,
    stdout: String,
    stderr: String,
    normalized_errors: Vec<String>,
}

impl ExternalVerdict {
    /// Verdict for a run where no compiler binary was available.
    #[must_use]
    pub fn unavailable() -> Self {
        Self::failure(COMPILER_UNAVAILABLE)
    }

    /// Failure verdict carrying a single message and no captured output.
    #[must_use]
    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            stdout: String::new(),
            stderr: String::new(),
            normalized_errors: vec![message.into()],
        }
    }

    /// Classifies the result of a `check` invocation.
    ///
    /// The exit code decides success. A zero exit with error-stream output
    /// stays successful and reports each non-blank stderr line as a
    /// diagnostic. Otherwise the failure text is the first non-blank of
    /// stdout, stderr, and the invocation error, with JSON `message` or
    /// `error` fields preferred when present.
    #[must_use]
    pub fn classify(outcome: Result<ProcessOutput, ProcessError>) -> Self {
        match outcome {
            Ok(output) if output.success() => Self {
                success: true,
                normalized_errors: output
                    .stderr()
                    .lines()
                    .map(str::trim)
                    .filter(|line| !line.is_empty())
                    .map(str::to_owned)
                    .collect(),
                stdout: output.stdout().to_owned(),
                stderr: output.stderr().to_owned(),
            },
            Ok(output) => {
                let text = [output.stdout(), output.stderr()]
                    .into_iter()
                    .find(|text| !text.trim().is_empty())
                    .map_or_else(|| exit_description(output.status()), preferred_message);
                Self {
                    success: false,
                    stdout: output.stdout().to_owned(),
                    stderr: output.stderr().to_owned(),
                    normalized_errors: vec![text],
                }
            }
            Err(err) => Self::failure(preferred_message(&err.to_string())),
        }
    }

    /// Returns `true` if the compiler accepted the contract.
    #[must_use]
    pub const fn success(&self) -> bool {
        self.success
    }

    /// Returns captured standard output.
    #[must_use]
    pub fn stdout(&self) -> &str {
        &self.stdout
    }

    /// Returns captured standard error.
    #[must_use]
    pub fn stderr(&self) -> &str {
        &self.stderr
    }

    /// Returns the normalised error messages, in order.
    #[must_use]
    pub fn normalized_errors(&self) -> &[String] {
        &self.normalized_errors
    }

    /// Converts the verdict into the caller-facing response.
    #[must_use]
    pub fn into_response(self) -> ValidationResponse {
        if self.success {
            let output = match self.stdout.trim() {
                "" => VALIDATION_SUCCESSFUL.to_owned(),
                text => text.to_owned(),
            };
            let diagnostics = self.stderr.trim();
            ValidationResponse {
                success: true,
                output,
                errors: (!diagnostics.is_empty()).then(|| diagnostics.to_owned()),
            }
        } else {
            ValidationResponse {
                success: false,
                output: String::new(),
                errors: Some(self.normalized_errors.join("\n")),
            }
        }
    }
}

/// Caller-facing result of a validation.
///
/// ```
/// use clarigate_validator::ValidationResponse;
///
/// let response = ValidationResponse {
///     success: true,
///     output: "ok".into(),
///     errors: None,
/// };
/// assert_eq!(
///     serde_json::to_string(&response)?,
///     r#"{"success":true,"output":"ok"}"#
/// );
/// # Ok::<(), serde_json::Error>(())
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationResponse {
    /// Whether the compiler accepted the contract.
    pub success: bool,
    /// Informational compiler output; empty on failure.
    pub output: String,
    /// Failure text, or auxiliary diagnostics on success.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub errors: Option<String>,
}

/// Runs contracts through the external compiler.
///
/// Calls are independent: each stages its own workspace and nothing but the
/// provisioned binary is shared between them, so `validate` may be called
/// from many threads at once.
#[derive(Debug)]
pub struct ValidationOrchestrator<P, E> {
    provider: P,
    executor: E,
    stager: WorkspaceStager,
    settings: OrchestratorSettings,
}

impl<P, E> ValidationOrchestrator<P, E>
where
    P: BinaryProvider,
    E: ProcessExecutor,
{
    /// Creates an orchestrator.
    #[must_use]
    pub const fn new(
        provider: P,
        executor: E,
        stager: WorkspaceStager,
        settings: OrchestratorSettings,
    ) -> Self {
        Self {
            provider,
            executor,
            stager,
            settings,
        }
    }

    /// Validates `source` to completion.
    #[must_use]
    pub fn validate(&self, source: &SourceUnit) -> ExternalVerdict {
        self.validate_with_cancel(source, &CancellationToken::new())
    }

    /// Validates `source`, aborting the compiler run if `cancel` fires.
    ///
    /// The workspace is removed on every path, cancellation included.
    #[must_use]
    pub fn validate_with_cancel(
        &self,
        source: &SourceUnit,
        cancel: &CancellationToken,
    ) -> ExternalVerdict {
        let started = Instant::now();
        if cancel.is_cancelled() {
            return ExternalVerdict::failure("validation cancelled");
        }

        let binary = match self.provider.ensure() {
            Ok(binary) => binary,
            Err(err) => {
                warn!(
                    target: ORCHESTRATOR_TARGET,
                    contract = source.name(),
                    error = %err,
                    "compiler unavailable"
                );
                return ExternalVerdict::unavailable();
            }
        };

        let workspace = match self.stager.stage(source) {
            Ok(workspace) => workspace,
            Err(err) => {
                warn!(
                    target: ORCHESTRATOR_TARGET,
                    contract = source.name(),
                    error = %err,
                    "workspace staging failed"
                );
                return ExternalVerdict::failure(err.to_string());
            }
        };

        let request = ProcessRequest::new(binary.path())
            .arg(CHECK_SUBCOMMAND)
            .current_dir(workspace.root_dir())
            .timeout(self.settings.check_timeout)
            .max_output_bytes(self.settings.max_output_bytes);
        debug!(
            target: ORCHESTRATOR_TARGET,
            binary = %binary.path().display(),
            root = %workspace.root_dir().display(),
            "running compiler check"
        );
        let outcome = self.executor.execute(&request, cancel);
        WorkspaceStager::cleanup(workspace);

        match &outcome {
            Err(err) if err.is_spawn_failure() => self.provider.invalidate(),
            Ok(output) if output.truncated() => warn!(
                target: ORCHESTRATOR_TARGET,
                limit = self.settings.max_output_bytes,
                "compiler output truncated"
            ),
            _ => {}
        }

        let verdict = ExternalVerdict::classify(outcome);
        info!(
            target: ORCHESTRATOR_TARGET,
            contract = source.name(),
            success = verdict.success(),
            elapsed_ms = started.elapsed().as_millis(),
            "validation finished"
        );
        verdict
    }
}

/// Extracts the human-readable message from JSON error text, falling back
/// to the text exactly as captured.
fn preferred_message(text: &str) -> String {
    serde_json::from_str::<serde_json::Value>(text)
        .ok()
        .and_then(|value| {
            ["message", "error"]
                .into_iter()
                .find_map(|key| value.get(key)?.as_str().map(str::to_owned))
        })
        .unwrap_or_else(|| text.to_owned())
}

fn exit_description(status: Option<i32>) -> String {
    status.map_or_else(
        || String::from("compiler terminated by a signal"),
        |code| format!("compiler exited with status {code}"),
    )
}

#[cfg(test)]
mod tests;
