//! Rendering of lint verdicts and validation responses.

use std::io::{self, Write};

use clap::ValueEnum;
use clarigate_lint::LintVerdict;
use clarigate_validator::ValidationResponse;
use serde::Serialize;

/// Output format selection for command results.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, ValueEnum)]
pub enum OutputFormat {
    /// Selects `human` for terminal output and `json` for redirected output.
    #[default]
    Auto,
    /// Always render human-readable output.
    Human,
    /// Always emit JSON documents.
    Json,
}

/// Output format after terminal detection.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ResolvedOutputFormat {
    /// Human-readable text.
    Human,
    /// One JSON document per result.
    Json,
}

impl OutputFormat {
    /// Resolves the output format based on whether stdout is a terminal.
    #[must_use]
    pub const fn resolve(self, stdout_is_terminal: bool) -> ResolvedOutputFormat {
        match self {
            Self::Auto => {
                if stdout_is_terminal {
                    ResolvedOutputFormat::Human
                } else {
                    ResolvedOutputFormat::Json
                }
            }
            Self::Human => ResolvedOutputFormat::Human,
            Self::Json => ResolvedOutputFormat::Json,
        }
    }
}

/// Writes a lint verdict.
///
/// # Errors
///
/// Returns any error raised by the writer.
pub fn render_lint<W: Write>(
    out: &mut W,
    verdict: &LintVerdict,
    format: ResolvedOutputFormat,
) -> io::Result<()> {
    if format == ResolvedOutputFormat::Json {
        return write_json(out, verdict);
    }
    for diagnostic in verdict.errors().iter().chain(verdict.warnings()) {
        writeln!(out, "{diagnostic}")?;
    }
    if verdict.errors().is_empty() && verdict.warnings().is_empty() {
        writeln!(out, "no structural issues found")
    } else {
        writeln!(
            out,
            "{} error(s), {} warning(s)",
            verdict.errors().len(),
            verdict.warnings().len()
        )
    }
}

/// Writes a validation response.
///
/// # Errors
///
/// Returns any error raised by the writer.
pub fn render_validation<W: Write>(
    out: &mut W,
    response: &ValidationResponse,
    format: ResolvedOutputFormat,
) -> io::Result<()> {
    if format == ResolvedOutputFormat::Json {
        return write_json(out, response);
    }
    if response.success {
        writeln!(out, "validation succeeded")?;
        writeln!(out, "{}", response.output)?;
        if let Some(diagnostics) = &response.errors {
            writeln!(out, "diagnostics:")?;
            writeln!(out, "{diagnostics}")?;
        }
        Ok(())
    } else {
        writeln!(
            out,
            "validation failed: {}",
            response.errors.as_deref().unwrap_or_default()
        )
    }
}

fn write_json<W: Write, T: Serialize>(out: &mut W, value: &T) -> io::Result<()> {
    serde_json::to_writer(&mut *out, value).map_err(io::Error::other)?;
    writeln!(out)
}
