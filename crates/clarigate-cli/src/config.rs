//! Configuration loading helpers for the CLI.
//!
//! Leading configuration flags are split off for `ortho-config` so the loader
//! only receives flags it understands while clap parses the command tokens.

use std::ffi::{OsStr, OsString};

use clarigate_config::Config;
use ortho_config::OrthoConfig;

use crate::{AppError, CONFIG_CLI_FLAGS};

pub(crate) trait ConfigLoader {
    /// Loads configuration for the CLI.
    ///
    /// Configuration flags (listed in `CONFIG_CLI_FLAGS`) must appear before
    /// the subcommand; later occurrences are treated as command arguments.
    fn load(&self, args: &[OsString]) -> Result<Config, AppError>;
}

pub(crate) struct OrthoConfigLoader;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FlagAction {
    Include { needs_value: bool },
    Skip,
}

impl ConfigLoader for OrthoConfigLoader {
    fn load(&self, args: &[OsString]) -> Result<Config, AppError> {
        let config =
            Config::load_from_iter(args.iter().cloned()).map_err(AppError::LoadConfiguration)?;
        config.validate()?;
        Ok(config)
    }
}

fn process_config_flag(argument: &OsStr) -> FlagAction {
    let argument_text = argument.to_string_lossy();
    if !argument_text.starts_with("--") {
        return FlagAction::Skip;
    }

    let (flag, has_inline_value) = match argument_text.split_once('=') {
        Some((flag, _)) => (flag, true),
        None => (&*argument_text, false),
    };

    if CONFIG_CLI_FLAGS.contains(&flag) {
        FlagAction::Include {
            needs_value: !has_inline_value,
        }
    } else {
        FlagAction::Skip
    }
}

pub(crate) struct ConfigArgumentSplit {
    pub(crate) config_arguments: Vec<OsString>,
    pub(crate) command_start: usize,
}

pub(crate) fn split_config_arguments(args: &[OsString]) -> ConfigArgumentSplit {
    let Some(program) = args.first() else {
        return ConfigArgumentSplit {
            config_arguments: Vec::new(),
            command_start: 0,
        };
    };

    let mut config_arguments = vec![program.clone()];
    let mut command_start = 1usize;
    let mut pending_value = false;

    for argument in args.iter().skip(1) {
        if pending_value {
            pending_value = false;
        } else {
            match process_config_flag(argument) {
                FlagAction::Include { needs_value } => pending_value = needs_value,
                FlagAction::Skip => break,
            }
        }
        config_arguments.push(argument.clone());
        command_start += 1;
    }

    ConfigArgumentSplit {
        config_arguments,
        command_start,
    }
}
