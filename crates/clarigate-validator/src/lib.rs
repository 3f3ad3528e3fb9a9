//! Contract validation against the external Clarity compiler.
//!
//! This crate owns everything between a contract's source text and the
//! compiler's verdict:
//!
//! - [`SourceUnit`] validates input and sanitises the contract name.
//! - [`BinaryProvisioner`] finds or installs the compiler binary and caches
//!   the result process-wide.
//! - [`WorkspaceStager`] lays out a throwaway project directory per call.
//! - [`ValidationOrchestrator`] ties them together, runs `check` under a
//!   timeout through the [`ProcessExecutor`] seam, and classifies the result.
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use clarigate_validator::{
//!     BinaryCache, BinaryProvisioner, HostPlatform, HttpFetcher, OrchestratorSettings,
//!     ProvisionerSettings, SourceUnit, SystemExecutor, ValidationOrchestrator, WorkspaceStager,
//! };
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let provisioner = BinaryProvisioner::new(
//!     ProvisionerSettings::new(HostPlatform::current(false), "/tmp/clarigate/bin"),
//!     SystemExecutor,
//!     HttpFetcher::new()?,
//!     Arc::new(BinaryCache::new()),
//! );
//! let orchestrator = ValidationOrchestrator::new(
//!     provisioner,
//!     SystemExecutor,
//!     WorkspaceStager::system(),
//!     OrchestratorSettings::default(),
//! );
//! let unit = SourceUnit::new("counter", "(define-data-var n uint u0)")?;
//! let response = orchestrator.validate(&unit).into_response();
//! println!("{}", response.output);
//! # Ok(()) }
//! ```

mod error;
mod orchestrator;
mod platform;
pub mod process;
mod provision;
mod source;
mod workspace;

#[cfg(test)]
mod tests;

pub use self::error::{FetchError, InputError, ProcessError, ProvisionError, StagingError};
pub use self::orchestrator::{
    COMPILER_UNAVAILABLE, ExternalVerdict, OrchestratorSettings, VALIDATION_SUCCESSFUL,
    ValidationOrchestrator, ValidationResponse,
};
pub use self::platform::{HostPlatform, release_target};
pub use self::process::{CancellationToken, ProcessExecutor, ProcessOutput, SystemExecutor};
pub use self::provision::{
    ArtifactFetcher, BinaryCache, BinaryHandle, BinaryProvider, BinaryProvisioner,
    DEFAULT_COMPILER_VERSION, DEFAULT_DOWNLOAD_TIMEOUT, DEFAULT_HOSTED_BINARY,
    DEFAULT_PROBE_TIMEOUT, DEFAULT_RELEASE_BASE_URL, HttpFetcher, ProvisionerSettings,
    ReleaseSource,
};
pub use self::source::{SourceUnit, sanitize_contract_name};
pub use self::workspace::{CONTRACTS_DIR, MANIFEST_FILE, Workspace, WorkspaceStager};
