//! Command-line runtime for the `clarigate` contract checker.
//!
//! The runtime owns argument parsing, configuration bootstrapping, telemetry,
//! and result rendering. Configuration loading and compiler validation sit
//! behind traits so tests can exercise the runner without touching the
//! environment or spawning the compiler.

use std::ffi::OsString;
use std::fs;
use std::io::{self, IsTerminal, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use clap::error::ErrorKind;
use clarigate_config::ConfigError;
use clarigate_validator::{FetchError, InputError, SourceUnit};
use thiserror::Error;
use tracing::info;

mod cli;
mod config;
pub mod output;
pub mod telemetry;
mod validation;


use cli::{Cli, CliCommand};
use config::{ConfigArgumentSplit, ConfigLoader, OrthoConfigLoader, split_config_arguments};
pub use output::{OutputFormat, ResolvedOutputFormat, render_lint, render_validation};
use telemetry::TelemetryError;
use validation::{ContractValidator, SystemValidator};

/// CLI flags recognised by the configuration loader.
///
/// MAINTENANCE: keep in sync with the fields of `clarigate_config::Config`.
const CONFIG_CLI_FLAGS: &[&str] = &[
    "--config-path",
    "--log-filter",
    "--log-format",
    "--compiler-version",
    "--release-base-url",
    "--cache-dir",
    "--hosted-env-var",
    "--hosted-binary-path",
    "--workspace-root",
    "--check-timeout-secs",
    "--probe-timeout-secs",
    "--download-timeout-secs",
    "--max-output-bytes",
    "--download-policy",
];

const CLI_TARGET: &str = "clarigate_cli";

#[derive(Debug, Error)]
enum AppError {
    #[error("failed to load configuration: {0}")]
    LoadConfiguration(Arc<ortho_config::OrthoError>),
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(#[from] ConfigError),
    #[error("{0}")]
    CliUsage(clap::Error),
    #[error(transparent)]
    Telemetry(#[from] TelemetryError),
    #[error("failed to read {path}: {source}")]
    ReadSource { path: PathBuf, source: io::Error },
    #[error(transparent)]
    Input(#[from] InputError),
    #[error("failed to prepare compiler download client: {0}")]
    Downloader(#[from] FetchError),
    #[error("failed to write output: {0}")]
    WriteOutput(io::Error),
}

struct CliRunner<'a, W: Write, E: Write, L: ConfigLoader, V: ContractValidator> {
    stdout: &'a mut W,
    stderr: &'a mut E,
    stdout_is_terminal: bool,
    loader: &'a L,
    validator: &'a V,
}

impl<W, E, L, V> CliRunner<'_, W, E, L, V>
where
    W: Write,
    E: Write,
    L: ConfigLoader,
    V: ContractValidator,
{
    fn run<I>(&mut self, args: I) -> ExitCode
    where
        I: IntoIterator<Item = OsString>,
    {
        let args: Vec<OsString> = args.into_iter().collect();
        let split = split_config_arguments(&args);
        let cli_arguments = prepare_cli_arguments(&args, &split);

        let result = match Cli::try_parse_from(cli_arguments) {
            Ok(cli) => self.execute(cli, &split.config_arguments),
            Err(error)
                if matches!(error.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) =>
            {
                let _ = write!(self.stdout, "{error}");
                return ExitCode::SUCCESS;
            }
            Err(error) => Err(AppError::CliUsage(error)),
        };

        match result {
            Ok(exit_code) => exit_code,
            Err(error) => {
                let _ = writeln!(self.stderr, "{error}");
                ExitCode::FAILURE
            }
        }
    }

    fn execute(&mut self, cli: Cli, config_arguments: &[OsString]) -> Result<ExitCode, AppError> {
        let config = self.loader.load(config_arguments)?;
        telemetry::initialise(&config)?;
        let format = cli.output.resolve(self.stdout_is_terminal);

        match cli.command {
            CliCommand::Lint { file } => self.lint(&file, format),
            CliCommand::Check { file, name } => {
                let name = name.unwrap_or_else(|| contract_name_from(&file));
                let source = read_source(&file)?;
                let unit = SourceUnit::new(name, source)?;
                let response = self.validator.validate(&config, &unit)?;
                render_validation(self.stdout, &response, format).map_err(AppError::WriteOutput)?;
                Ok(exit_code(response.success))
            }
        }
    }

    fn lint(&mut self, file: &Path, format: ResolvedOutputFormat) -> Result<ExitCode, AppError> {
        let source = read_source(file)?;
        let verdict = clarigate_lint::lint(&source);
        info!(
            target: CLI_TARGET,
            file = %file.display(),
            errors = verdict.errors().len(),
            warnings = verdict.warnings().len(),
            "lint finished"
        );
        render_lint(self.stdout, &verdict, format).map_err(AppError::WriteOutput)?;
        Ok(exit_code(verdict.is_valid()))
    }
}

/// Runs the CLI using the provided arguments and IO handles.
#[must_use]
pub fn run<I, W, E>(args: I, stdout: &mut W, stderr: &mut E) -> ExitCode
where
    I: IntoIterator<Item = OsString>,
    W: Write,
    E: Write,
{
    let mut runner = CliRunner {
        stdout,
        stderr,
        stdout_is_terminal: io::stdout().is_terminal(),
        loader: &OrthoConfigLoader,
        validator: &SystemValidator,
    };
    runner.run(args)
}

fn prepare_cli_arguments(args: &[OsString], split: &ConfigArgumentSplit) -> Vec<OsString> {
    args.first()
        .into_iter()
        .chain(args.iter().skip(split.command_start))
        .cloned()
        .collect()
}

/// Derives a contract name from the file stem; blank when there is none so
/// input validation rejects it.
fn contract_name_from(file: &Path) -> String {
    file.file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn read_source(path: &Path) -> Result<String, AppError> {
    fs::read_to_string(path).map_err(|source| AppError::ReadSource {
        path: path.to_path_buf(),
        source,
    })
}

fn exit_code(success: bool) -> ExitCode {
    if success {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}
