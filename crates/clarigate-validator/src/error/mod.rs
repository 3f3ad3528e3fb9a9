//! Domain errors raised while provisioning, staging, and running the
//! external compiler.
//!
//! All errors use `thiserror`-derived enums with structured context so callers
//! can inspect the failure programmatically. I/O errors are wrapped in `Arc`
//! to keep the enums cheap to move and `Send + Sync`.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

/// Input rejected before any filesystem or process work begins.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InputError {
    /// The contract source text was missing or blank.
    #[error("source text must be provided")]
    MissingSource,

    /// The contract name was missing or blank.
    #[error("contract name must be provided")]
    MissingName,
}

/// Errors arising while running a subprocess.
///
/// A non-zero exit status is not an error at this layer; it is reported as
/// data in [`ProcessOutput`](crate::process::ProcessOutput).
#[derive(Debug, Clone, Error)]
pub enum ProcessError {
    /// The process could not be spawned.
    #[error("failed to start '{program}': {source}")]
    SpawnFailed {
        /// Program that was launched.
        program: String,
        /// Underlying I/O error.
        #[source]
        source: Arc<std::io::Error>,
    },

    /// The process did not complete within the configured timeout.
    #[error("'{program}' timed out after {timeout:?}")]
    Timeout {
        /// Program that was launched.
        program: String,
        /// Configured wall-clock limit.
        timeout: Duration,
    },

    /// The caller cancelled the run before the process finished.
    #[error("'{program}' was cancelled")]
    Cancelled {
        /// Program that was launched.
        program: String,
    },

    /// An I/O error occurred while supervising the process.
    #[error("I/O error while running '{program}': {source}")]
    Io {
        /// Program that was launched.
        program: String,
        /// Underlying I/O error.
        #[source]
        source: Arc<std::io::Error>,
    },
}

impl ProcessError {
    /// Returns `true` when the program itself could not be started.
    #[must_use]
    pub const fn is_spawn_failure(&self) -> bool {
        matches!(self, Self::SpawnFailed { .. })
    }
}

/// The compiler binary could not be located or installed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProvisionError {
    /// Every resolution step failed.
    #[error("binary unavailable")]
    Unavailable {
        /// One note per attempted step, in resolution order.
        attempts: Vec<String>,
    },
}

/// Errors raised while downloading a release artifact.
#[derive(Debug, Error)]
pub enum FetchError {
    /// The artifact URL could not be constructed.
    #[error("invalid artifact url '{url}': {source}")]
    InvalidUrl {
        /// Text that failed to parse.
        url: String,
        /// Underlying parse error.
        #[source]
        source: url::ParseError,
    },

    /// The HTTP request failed before a response arrived.
    #[error("request to {url} failed: {source}")]
    Request {
        /// Requested URL.
        url: String,
        /// Underlying client error.
        #[source]
        source: reqwest::Error,
    },

    /// The server answered with a non-success status.
    #[error("request to {url} returned HTTP {status}")]
    Status {
        /// Requested URL.
        url: String,
        /// HTTP status code.
        status: u16,
    },

    /// Writing the downloaded artifact failed.
    #[error("failed to write artifact to {path}: {source}")]
    Io {
        /// Destination path.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: Arc<std::io::Error>,
    },
}

/// Errors raised while staging an ephemeral workspace.
#[derive(Debug, Error)]
pub enum StagingError {
    /// The workspace directory (or a subdirectory) could not be created.
    #[error("failed to create workspace directory {path}: {source}")]
    CreateDirectory {
        /// Directory that could not be created.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: Arc<std::io::Error>,
    },

    /// The manifest could not be rendered.
    #[error("failed to render project manifest: {0}")]
    RenderManifest(#[source] toml::ser::Error),

    /// A file inside the workspace could not be written.
    #[error("failed to write {path}: {source}")]
    WriteFile {
        /// File that could not be written.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: Arc<std::io::Error>,
    },
}
