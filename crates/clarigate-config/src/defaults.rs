use std::env;

use camino::Utf8PathBuf;

use crate::logging::LogFormat;
use crate::policy::DownloadPolicy;

/// Default log filter expression.
pub const DEFAULT_LOG_FILTER: &str = "info";

/// Compiler release installed when no binary is found.
pub const DEFAULT_COMPILER_VERSION: &str = "2.11.2";

/// Where compiler releases are published.
pub const DEFAULT_RELEASE_BASE_URL: &str = "https://github.com/hirosystems/clarinet/releases/download";

/// Environment variable whose presence marks the hosted build environment.
pub const DEFAULT_HOSTED_ENV_VAR: &str = "VERCEL";

/// Binary placed by the hosted build step, relative to the working directory.
pub const DEFAULT_HOSTED_BINARY_PATH: &str = "bin/clarinet";

/// Wall-clock limit for `check`, in seconds.
pub const DEFAULT_CHECK_TIMEOUT_SECS: u64 = 30;

/// Wall-clock limit for a version probe, in seconds.
pub const DEFAULT_PROBE_TIMEOUT_SECS: u64 = 5;

/// Wall-clock limit for each download step, in seconds.
pub const DEFAULT_DOWNLOAD_TIMEOUT_SECS: u64 = 20;

/// Per-stream capture limit for compiler output.
pub const DEFAULT_MAX_OUTPUT_BYTES: usize = 1024 * 1024;

/// Default log filter expression.
#[must_use]
pub const fn default_log_filter() -> &'static str {
    DEFAULT_LOG_FILTER
}

/// Owned log filter value used where allocation is required (e.g. serde).
#[must_use]
pub fn default_log_filter_string() -> String {
    DEFAULT_LOG_FILTER.to_owned()
}

/// Default logging format.
#[must_use]
pub const fn default_log_format() -> LogFormat {
    LogFormat::Json
}

/// Default download policy.
#[must_use]
pub const fn default_download_policy() -> DownloadPolicy {
    DownloadPolicy::HostedOnly
}

/// Default compiler version.
#[must_use]
pub fn default_compiler_version() -> String {
    DEFAULT_COMPILER_VERSION.to_owned()
}

/// Default release base URL.
#[must_use]
pub fn default_release_base_url() -> String {
    DEFAULT_RELEASE_BASE_URL.to_owned()
}

/// Default hosted-environment flag.
#[must_use]
pub fn default_hosted_env_var() -> String {
    DEFAULT_HOSTED_ENV_VAR.to_owned()
}

/// Default hosted binary location.
#[must_use]
pub fn default_hosted_binary_path() -> Utf8PathBuf {
    Utf8PathBuf::from(DEFAULT_HOSTED_BINARY_PATH)
}

/// Computes the default compiler cache directory.
///
/// Uses the per-user cache directory when one exists and is valid UTF-8,
/// otherwise a directory under the system temporary directory.
#[must_use]
pub fn default_cache_dir() -> Utf8PathBuf {
    let base = dirs::cache_dir()
        .and_then(|path| Utf8PathBuf::from_path_buf(path).ok())
        .unwrap_or_else(fallback_base_directory);
    base.join("clarigate").join("bin")
}

/// Computes the default workspace root.
#[must_use]
pub fn default_workspace_root() -> Utf8PathBuf {
    fallback_base_directory()
}

fn fallback_base_directory() -> Utf8PathBuf {
    Utf8PathBuf::from_path_buf(env::temp_dir()).unwrap_or_else(|_| Utf8PathBuf::from("/tmp"))
}
