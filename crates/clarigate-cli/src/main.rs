//! CLI entrypoint for the `clarigate` contract checker.
//!
//! Delegates to [`clarigate_cli::run`], which loads configuration, parses the
//! command, and runs the linter or the compiler check.

use std::io::{self, StderrLock, StdoutLock};
use std::process::ExitCode;

fn main() -> ExitCode {
    let mut stdout: StdoutLock<'_> = io::stdout().lock();
    let mut stderr: StderrLock<'_> = io::stderr().lock();
    clarigate_cli::run(std::env::args_os(), &mut stdout, &mut stderr)
}
