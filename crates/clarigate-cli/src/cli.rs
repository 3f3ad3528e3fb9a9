//! CLI argument definitions.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::output::OutputFormat;

/// Structural linting and compiler validation for Clarity contracts.
#[derive(Parser, Debug)]
#[command(name = "clarigate", version, disable_help_subcommand = true)]
pub(crate) struct Cli {
    /// Controls how results are rendered.
    #[arg(long, value_enum, default_value_t = OutputFormat::Auto)]
    pub(crate) output: OutputFormat,
    /// The operation to run.
    #[command(subcommand)]
    pub(crate) command: CliCommand,
}

/// Operations supported by the CLI.
#[derive(Subcommand, Debug, Clone)]
pub(crate) enum CliCommand {
    /// Runs the structural linter over a contract file.
    Lint {
        /// Contract source file.
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },
    /// Type-checks a contract file with the external compiler.
    Check {
        /// Contract source file.
        #[arg(value_name = "FILE")]
        file: PathBuf,
        /// Contract name; defaults to the file stem.
        #[arg(long)]
        name: Option<String>,
    },
}
