//! Diagnostic and verdict types produced by the linter.

use serde::Serialize;

/// Severity attached to a [`Diagnostic`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// The source is structurally broken and will not compile.
    Error,
    /// The source is suspicious but may still compile.
    Warning,
}

impl Severity {
    /// Returns the canonical string representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Error => "error",
            Self::Warning => "warning",
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single finding anchored to a 1-based line.
///
/// Only `line` and `message` are serialised; the severity is implied by the
/// verdict list the diagnostic lives in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    line: usize,
    message: String,
    #[serde(skip)]
    severity: Severity,
}

impl Diagnostic {
    /// Creates an error-severity diagnostic.
    #[must_use]
    pub fn error(line: usize, message: impl Into<String>) -> Self {
        Self {
            line,
            message: message.into(),
            severity: Severity::Error,
        }
    }

    /// Creates a warning-severity diagnostic.
    #[must_use]
    pub fn warning(line: usize, message: impl Into<String>) -> Self {
        Self {
            line,
            message: message.into(),
            severity: Severity::Warning,
        }
    }

    /// Returns the 1-based line number.
    #[must_use]
    pub const fn line(&self) -> usize {
        self.line
    }

    /// Returns the human-readable message.
    #[must_use]
    pub const fn message(&self) -> &str {
        self.message.as_str()
    }

    /// Returns the severity.
    #[must_use]
    pub const fn severity(&self) -> Severity {
        self.severity
    }
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "line {}: {}: {}", self.line, self.severity, self.message)
    }
}

/// Outcome of linting one source document.
///
/// # Example
///
/// ```
/// use clarigate_lint::{Diagnostic, LintVerdict};
///
/// let verdict = LintVerdict::from_diagnostics(vec![
///     Diagnostic::warning(2, "suspicious"),
/// ]);
/// assert!(verdict.is_valid());
/// assert_eq!(verdict.warnings().len(), 1);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LintVerdict {
    is_valid: bool,
    errors: Vec<Diagnostic>,
    warnings: Vec<Diagnostic>,
}

impl LintVerdict {
    /// Splits diagnostics by severity, preserving their relative order.
    #[must_use]
    pub fn from_diagnostics(diagnostics: Vec<Diagnostic>) -> Self {
        let (errors, warnings): (Vec<_>, Vec<_>) = diagnostics
            .into_iter()
            .partition(|diagnostic| diagnostic.severity == Severity::Error);
        Self {
            is_valid: errors.is_empty(),
            errors,
            warnings,
        }
    }

    /// Returns `true` when no error-severity diagnostic was produced.
    #[must_use]
    pub const fn is_valid(&self) -> bool {
        self.is_valid
    }

    /// Returns the error diagnostics in scan order.
    #[must_use]
    pub fn errors(&self) -> &[Diagnostic] {
        &self.errors
    }

    /// Returns the warning diagnostics in scan order.
    #[must_use]
    pub fn warnings(&self) -> &[Diagnostic] {
        &self.warnings
    }
}
