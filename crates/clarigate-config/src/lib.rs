//! Layered configuration for the `clarigate` tools.
//!
//! [`Config`] merges built-in defaults, an optional TOML file
//! (`--config-path` or `CLARIGATE_CONFIG_PATH`), `CLARIGATE_*` environment
//! variables, and command-line flags, in increasing order of precedence.

mod defaults;
mod logging;
mod policy;


use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};
use ortho_config::OrthoConfig;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use self::defaults::{
    DEFAULT_CHECK_TIMEOUT_SECS, DEFAULT_COMPILER_VERSION, DEFAULT_DOWNLOAD_TIMEOUT_SECS,
    DEFAULT_HOSTED_BINARY_PATH, DEFAULT_HOSTED_ENV_VAR, DEFAULT_LOG_FILTER,
    DEFAULT_MAX_OUTPUT_BYTES, DEFAULT_PROBE_TIMEOUT_SECS, DEFAULT_RELEASE_BASE_URL,
    default_cache_dir, default_compiler_version, default_download_policy,
    default_hosted_binary_path, default_hosted_env_var, default_log_filter,
    default_log_filter_string, default_log_format, default_release_base_url,
    default_workspace_root,
};
pub use self::logging::LogFormat;
pub use self::policy::{DownloadPolicy, DownloadPolicyParseError};

/// Resolved settings for linting and validation.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, OrthoConfig)]
#[ortho_config(prefix = "CLARIGATE")]
pub struct Config {
    /// Tracing filter expression.
    #[ortho_config(default = default_log_filter_string())]
    log_filter: String,
    /// Tracing output format.
    #[ortho_config(default = default_log_format())]
    log_format: LogFormat,
    /// Compiler release downloaded when no binary is found.
    #[ortho_config(default = default_compiler_version())]
    compiler_version: String,
    /// Release download base URL.
    #[ortho_config(default = default_release_base_url())]
    release_base_url: String,
    /// Compiler cache directory; defaults to the per-user cache.
    cache_dir: Option<Utf8PathBuf>,
    /// Environment variable marking the hosted build environment.
    #[ortho_config(default = default_hosted_env_var())]
    hosted_env_var: String,
    /// Binary placed by the hosted build step.
    #[ortho_config(default = default_hosted_binary_path())]
    hosted_binary_path: Utf8PathBuf,
    /// Directory workspaces are staged under; defaults to the temp dir.
    workspace_root: Option<Utf8PathBuf>,
    /// Wall-clock limit for `check`, in seconds.
    #[ortho_config(default = DEFAULT_CHECK_TIMEOUT_SECS)]
    check_timeout_secs: u64,
    /// Wall-clock limit for version probes, in seconds.
    #[ortho_config(default = DEFAULT_PROBE_TIMEOUT_SECS)]
    probe_timeout_secs: u64,
    /// Wall-clock limit for each download step, in seconds.
    #[ortho_config(default = DEFAULT_DOWNLOAD_TIMEOUT_SECS)]
    download_timeout_secs: u64,
    /// Per-stream capture limit for compiler output.
    #[ortho_config(default = DEFAULT_MAX_OUTPUT_BYTES)]
    max_output_bytes: usize,
    /// When the compiler may be downloaded.
    #[ortho_config(default = default_download_policy())]
    download_policy: DownloadPolicy,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_filter: default_log_filter_string(),
            log_format: default_log_format(),
            compiler_version: default_compiler_version(),
            release_base_url: default_release_base_url(),
            cache_dir: None,
            hosted_env_var: default_hosted_env_var(),
            hosted_binary_path: default_hosted_binary_path(),
            workspace_root: None,
            check_timeout_secs: DEFAULT_CHECK_TIMEOUT_SECS,
            probe_timeout_secs: DEFAULT_PROBE_TIMEOUT_SECS,
            download_timeout_secs: DEFAULT_DOWNLOAD_TIMEOUT_SECS,
            max_output_bytes: DEFAULT_MAX_OUTPUT_BYTES,
            download_policy: default_download_policy(),
        }
    }
}

/// Semantic problems in an otherwise well-formed configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// A timeout was configured as zero seconds.
    #[error("{field} must be greater than zero")]
    ZeroTimeout {
        /// Offending field.
        field: &'static str,
    },
    /// The output capture limit was zero.
    #[error("max_output_bytes must be greater than zero")]
    ZeroOutputLimit,
    /// A required text setting was blank.
    #[error("{field} must not be empty")]
    Blank {
        /// Offending field.
        field: &'static str,
    },
}

impl Config {
    /// Checks values the type system cannot.
    ///
    /// # Errors
    ///
    /// Returns the first [`ConfigError`] found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (field, secs) in [
            ("check_timeout_secs", self.check_timeout_secs),
            ("probe_timeout_secs", self.probe_timeout_secs),
            ("download_timeout_secs", self.download_timeout_secs),
        ] {
            if secs == 0 {
                return Err(ConfigError::ZeroTimeout { field });
            }
        }
        if self.max_output_bytes == 0 {
            return Err(ConfigError::ZeroOutputLimit);
        }
        for (field, value) in [
            ("compiler_version", &self.compiler_version),
            ("release_base_url", &self.release_base_url),
            ("hosted_env_var", &self.hosted_env_var),
        ] {
            if value.trim().is_empty() {
                return Err(ConfigError::Blank { field });
            }
        }
        Ok(())
    }

    /// Returns the tracing filter expression.
    #[must_use]
    pub fn log_filter(&self) -> &str {
        &self.log_filter
    }

    /// Returns the tracing output format.
    #[must_use]
    pub const fn log_format(&self) -> LogFormat {
        self.log_format
    }

    /// Returns the compiler version to download.
    #[must_use]
    pub fn compiler_version(&self) -> &str {
        &self.compiler_version
    }

    /// Returns the release base URL.
    #[must_use]
    pub fn release_base_url(&self) -> &str {
        &self.release_base_url
    }

    /// Returns the compiler cache directory.
    #[must_use]
    pub fn cache_dir(&self) -> Utf8PathBuf {
        self.cache_dir.clone().unwrap_or_else(default_cache_dir)
    }

    /// Returns the hosted-environment flag name.
    #[must_use]
    pub fn hosted_env_var(&self) -> &str {
        &self.hosted_env_var
    }

    /// Returns the hosted build binary location.
    #[must_use]
    pub fn hosted_binary_path(&self) -> &Utf8Path {
        &self.hosted_binary_path
    }

    /// Returns the workspace staging root.
    #[must_use]
    pub fn workspace_root(&self) -> Utf8PathBuf {
        self.workspace_root
            .clone()
            .unwrap_or_else(default_workspace_root)
    }

    /// Returns the `check` timeout.
    #[must_use]
    pub const fn check_timeout(&self) -> Duration {
        Duration::from_secs(self.check_timeout_secs)
    }

    /// Returns the version-probe timeout.
    #[must_use]
    pub const fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }

    /// Returns the per-step download timeout.
    #[must_use]
    pub const fn download_timeout(&self) -> Duration {
        Duration::from_secs(self.download_timeout_secs)
    }

    /// Returns the per-stream output capture limit.
    #[must_use]
    pub const fn max_output_bytes(&self) -> usize {
        self.max_output_bytes
    }

    /// Returns the download policy.
    #[must_use]
    pub const fn download_policy(&self) -> DownloadPolicy {
        self.download_policy
    }

    /// Returns `true` if the hosted-environment flag is set in the process
    /// environment.
    #[must_use]
    pub fn hosted_environment_detected(&self) -> bool {
        std::env::var_os(&self.hosted_env_var).is_some()
    }
}
