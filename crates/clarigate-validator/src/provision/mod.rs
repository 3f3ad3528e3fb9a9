//! Compiler binary discovery, installation, and caching.
//!
//! [`BinaryProvisioner`] resolves a runnable compiler through an ordered
//! chain of steps, each probed independently under a short timeout:
//!
//! 1. the local cache directory,
//! 2. the binary placed by the hosted build step (hosted environment only),
//! 3. the process search path (`PATH` entries, then the bare command name),
//! 4. a release download into the cache directory (when permitted).
//!
//! The first candidate that answers `--version` with a zero exit wins. The
//! result is stored in an injectable [`BinaryCache`]; the cache lock is held
//! for the whole resolution so concurrent first-time callers wait for one
//! provisioning run instead of racing.

mod fetch;

use std::env;
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tracing::{debug, info, warn};
use url::Url;

use crate::error::{FetchError, ProvisionError};
use crate::platform::HostPlatform;
use crate::process::{CancellationToken, ProcessExecutor, ProcessRequest};

pub use self::fetch::{ArtifactFetcher, HttpFetcher};

/// Tracing target for provisioning.
const PROVISION_TARGET: &str = "clarigate_validator::provision";

/// Flag used to ask a candidate binary for its version.
const VERSION_FLAG: &str = "--version";

/// Archive extraction tool.
const TAR_PROGRAM: &str = "tar";

/// Capture limit for probe and extraction output.
const PROBE_OUTPUT_LIMIT: usize = 64 * 1024;

/// Default release base URL.
pub const DEFAULT_RELEASE_BASE_URL: &str = "https://github.com/hirosystems/clarinet/releases/download";

/// Default release version downloaded when no binary is found.
pub const DEFAULT_COMPILER_VERSION: &str = "2.11.2";

/// Default per-probe timeout.
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Default per-step download timeout.
pub const DEFAULT_DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(20);

/// Default location of the binary installed by the hosted build step,
/// relative to the working directory.
pub const DEFAULT_HOSTED_BINARY: &str = "bin/clarinet";

/// A compiler binary and whether it last answered a version probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BinaryHandle {
    path: PathBuf,
    verified: bool,
}

impl BinaryHandle {
    /// Creates a handle for a binary that just passed verification.
    #[must_use]
    pub fn verified(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            verified: true,
        }
    }

    /// Returns the filesystem path or bare command name.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns `true` if the binary passed its most recent probe.
    #[must_use]
    pub const fn is_verified(&self) -> bool {
        self.verified
    }
}

/// Process-wide store for the provisioned binary.
///
/// Populated once by [`BinaryProvisioner::ensure`]; [`invalidate`] marks the
/// stored handle unverified so the next call re-probes it, and [`clear`]
/// forgets it entirely.
///
/// [`invalidate`]: BinaryCache::invalidate
/// [`clear`]: BinaryCache::clear
#[derive(Debug, Default)]
pub struct BinaryCache {
    slot: Mutex<Option<BinaryHandle>>,
}

impl BinaryCache {
    /// Creates an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the stored handle, if any.
    #[must_use]
    pub fn get(&self) -> Option<BinaryHandle> {
        self.lock().clone()
    }

    /// Stores `handle`, replacing any previous entry.
    pub fn store(&self, handle: BinaryHandle) {
        *self.lock() = Some(handle);
    }

    /// Marks the stored handle as needing re-verification.
    pub fn invalidate(&self) {
        if let Some(handle) = self.lock().as_mut() {
            handle.verified = false;
        }
    }

    /// Forgets the stored handle.
    pub fn clear(&self) {
        *self.lock() = None;
    }

    fn lock(&self) -> MutexGuard<'_, Option<BinaryHandle>> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Trait abstracting binary acquisition for the orchestrator.
pub trait BinaryProvider: Send + Sync {
    /// Returns a runnable compiler binary.
    ///
    /// # Errors
    ///
    /// Returns [`ProvisionError::Unavailable`] when no binary can be found
    /// or installed.
    fn ensure(&self) -> Result<BinaryHandle, ProvisionError>;

    /// Reports that the last handle failed to run.
    fn invalidate(&self);
}

/// Where release artifacts are published.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleaseSource {
    base_url: String,
    version: String,
}

impl ReleaseSource {
    /// Creates a release source.
    #[must_use]
    pub fn new(base_url: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            version: version.into(),
        }
    }

    /// Builds the artifact URL for a platform target.
    ///
    /// ```
    /// use clarigate_validator::ReleaseSource;
    ///
    /// let source = ReleaseSource::new("https://example.com/releases/", "2.0.0");
    /// let url = source.artifact_url("linux-x64-glibc")?;
    /// assert_eq!(
    ///     url.as_str(),
    ///     "https://example.com/releases/v2.0.0/clarinet-linux-x64-glibc.tar.gz"
    /// );
    /// # Ok::<(), clarigate_validator::FetchError>(())
    /// ```
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::InvalidUrl`] if the result does not parse.
    pub fn artifact_url(&self, target: &str) -> Result<Url, FetchError> {
        let raw = format!(
            "{}/v{}/clarinet-{target}.tar.gz",
            self.base_url.trim_end_matches('/'),
            self.version.trim_start_matches('v'),
        );
        Url::parse(&raw).map_err(|source| FetchError::InvalidUrl { url: raw, source })
    }
}

impl Default for ReleaseSource {
    fn default() -> Self {
        Self::new(DEFAULT_RELEASE_BASE_URL, DEFAULT_COMPILER_VERSION)
    }
}

/// Inputs to the resolution chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisionerSettings {
    platform: HostPlatform,
    cache_dir: PathBuf,
    hosted_binary: PathBuf,
    allow_download: bool,
    release: ReleaseSource,
    probe_timeout: Duration,
    download_timeout: Duration,
    search_path: Option<OsString>,
}

impl ProvisionerSettings {
    /// Creates settings with default timeouts and release source.
    ///
    /// Downloads are permitted only in the hosted environment unless
    /// overridden with [`with_download`](Self::with_download).
    #[must_use]
    pub fn new(platform: HostPlatform, cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            platform,
            cache_dir: cache_dir.into(),
            hosted_binary: PathBuf::from(DEFAULT_HOSTED_BINARY),
            allow_download: platform.is_hosted(),
            release: ReleaseSource::default(),
            probe_timeout: DEFAULT_PROBE_TIMEOUT,
            download_timeout: DEFAULT_DOWNLOAD_TIMEOUT,
            search_path: None,
        }
    }

    /// Overrides where the hosted build step places the binary.
    #[must_use]
    pub fn with_hosted_binary(mut self, path: impl Into<PathBuf>) -> Self {
        self.hosted_binary = path.into();
        self
    }

    /// Enables or disables the download step.
    #[must_use]
    pub const fn with_download(mut self, allow: bool) -> Self {
        self.allow_download = allow;
        self
    }

    /// Overrides the release source.
    #[must_use]
    pub fn with_release(mut self, release: ReleaseSource) -> Self {
        self.release = release;
        self
    }

    /// Overrides the version-probe timeout.
    #[must_use]
    pub const fn with_probe_timeout(mut self, timeout: Duration) -> Self {
        self.probe_timeout = timeout;
        self
    }

    /// Overrides the per-step download timeout.
    #[must_use]
    pub const fn with_download_timeout(mut self, timeout: Duration) -> Self {
        self.download_timeout = timeout;
        self
    }

    /// Overrides the directory list searched for the compiler. Without an
    /// override the process `PATH` is read at resolution time.
    #[must_use]
    pub fn with_search_path(mut self, search_path: impl Into<OsString>) -> Self {
        self.search_path = Some(search_path.into());
        self
    }

    /// Returns the host family.
    #[must_use]
    pub const fn platform(&self) -> HostPlatform {
        self.platform
    }

    /// Returns the cache directory.
    #[must_use]
    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    /// Returns `true` if the download step may run.
    #[must_use]
    pub const fn allows_download(&self) -> bool {
        self.allow_download
    }

    /// Returns the path of the cached binary.
    #[must_use]
    pub fn cached_binary(&self) -> PathBuf {
        self.cache_dir.join(self.platform.executable_name())
    }
}

/// Resolution step, used in logs and attempt notes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    Reverify,
    Cache,
    Hosted,
    SearchPath,
    Download,
}

impl std::fmt::Display for Step {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Reverify => "reverify",
            Self::Cache => "cache",
            Self::Hosted => "hosted build",
            Self::SearchPath => "search path",
            Self::Download => "download",
        })
    }
}

/// Locates or installs the compiler binary.
///
/// # Example
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use clarigate_validator::{
///     BinaryCache, BinaryProvider, BinaryProvisioner, HostPlatform, HttpFetcher,
///     ProvisionerSettings, SystemExecutor,
/// };
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let settings = ProvisionerSettings::new(HostPlatform::current(false), "/tmp/clarigate/bin");
/// let provisioner = BinaryProvisioner::new(
///     settings,
///     SystemExecutor,
///     HttpFetcher::new()?,
///     Arc::new(BinaryCache::new()),
/// );
/// let handle = provisioner.ensure()?;
/// println!("using {}", handle.path().display());
/// # Ok(()) }
/// ```
#[derive(Debug)]
pub struct BinaryProvisioner<E, F> {
    settings: ProvisionerSettings,
    executor: E,
    fetcher: F,
    cache: Arc<BinaryCache>,
}

impl<E, F> BinaryProvisioner<E, F> {
    /// Creates a provisioner backed by `cache`.
    #[must_use]
    pub const fn new(
        settings: ProvisionerSettings,
        executor: E,
        fetcher: F,
        cache: Arc<BinaryCache>,
    ) -> Self {
        Self {
            settings,
            executor,
            fetcher,
            cache,
        }
    }

    /// Returns the settings in use.
    #[must_use]
    pub const fn settings(&self) -> &ProvisionerSettings {
        &self.settings
    }

    /// Returns the shared cache.
    #[must_use]
    pub fn cache(&self) -> &Arc<BinaryCache> {
        &self.cache
    }
}

impl<E, F> BinaryProvider for BinaryProvisioner<E, F>
where
    E: ProcessExecutor,
    F: ArtifactFetcher,
{
    fn ensure(&self) -> Result<BinaryHandle, ProvisionError> {
        let mut slot = self.cache.lock();

        if let Some(handle) = slot.clone() {
            if handle.is_verified() {
                return Ok(handle);
            }
            match self.verify(Step::Reverify, handle.path()) {
                Ok(fresh) => {
                    *slot = Some(fresh.clone());
                    return Ok(fresh);
                }
                Err(note) => debug!(target: PROVISION_TARGET, %note, "cached binary failed re-verification"),
            }
        }

        match self.resolve() {
            Ok(handle) => {
                *slot = Some(handle.clone());
                Ok(handle)
            }
            Err(err) => {
                *slot = None;
                Err(err)
            }
        }
    }

    fn invalidate(&self) {
        self.cache.invalidate();
    }
}

impl<E, F> BinaryProvisioner<E, F>
where
    E: ProcessExecutor,
    F: ArtifactFetcher,
{
    fn resolve(&self) -> Result<BinaryHandle, ProvisionError> {
        let mut attempts = Vec::new();

        match self.try_file(Step::Cache, &self.settings.cached_binary()) {
            Ok(handle) => return Ok(handle),
            Err(note) => attempts.push(note),
        }

        if self.settings.platform.is_hosted() {
            match self.try_file(Step::Hosted, &self.settings.hosted_binary) {
                Ok(handle) => return Ok(handle),
                Err(note) => attempts.push(note),
            }
        }

        match self.search_path() {
            Ok(handle) => return Ok(handle),
            Err(note) => attempts.push(note),
        }

        if self.settings.allow_download {
            match self.download() {
                Ok(handle) => return Ok(handle),
                Err(note) => attempts.push(note),
            }
        } else {
            attempts.push(format!("{}: disabled", Step::Download));
        }

        warn!(
            target: PROVISION_TARGET,
            platform = %self.settings.platform,
            ?attempts,
            "no usable compiler binary"
        );
        Err(ProvisionError::Unavailable { attempts })
    }

    /// Probes a file candidate. Relative paths are anchored to the current
    /// directory because the check runs from inside the workspace.
    fn try_file(&self, step: Step, path: &Path) -> Result<BinaryHandle, String> {
        if !path.is_file() {
            return Err(format!("{step}: {} not present", path.display()));
        }
        let absolute = std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf());
        self.verify(step, &absolute)
    }

    /// Probes the first matching `PATH` entry, then the bare command name.
    fn search_path(&self) -> Result<BinaryHandle, String> {
        let name = self.settings.platform.executable_name();
        if let Some(found) = self.lookup_on_path(name) {
            match self.verify(Step::SearchPath, &found) {
                Ok(handle) => return Ok(handle),
                Err(note) => debug!(target: PROVISION_TARGET, %note, "search path candidate rejected"),
            }
        }
        self.verify(Step::SearchPath, Path::new(name))
    }

    fn lookup_on_path(&self, name: &str) -> Option<PathBuf> {
        let search = self
            .settings
            .search_path
            .clone()
            .or_else(|| env::var_os("PATH"))?;
        env::split_paths(&search)
            .filter(|dir| !dir.as_os_str().is_empty())
            .map(|dir| dir.join(name))
            .find(|candidate| candidate.is_file())
            .map(|candidate| std::path::absolute(&candidate).unwrap_or(candidate))
    }

    /// Runs `<path> --version` under the probe timeout.
    fn verify(&self, step: Step, path: &Path) -> Result<BinaryHandle, String> {
        let request = ProcessRequest::new(path)
            .arg(VERSION_FLAG)
            .timeout(self.settings.probe_timeout)
            .max_output_bytes(PROBE_OUTPUT_LIMIT);

        match self.executor.execute(&request, &CancellationToken::new()) {
            Ok(output) if output.success() => {
                info!(
                    target: PROVISION_TARGET,
                    %step,
                    path = %path.display(),
                    version = output.stdout().lines().next().unwrap_or_default().trim(),
                    "compiler binary verified"
                );
                Ok(BinaryHandle::verified(path))
            }
            Ok(output) => Err(format!(
                "{step}: {} {VERSION_FLAG} exited with status {:?}",
                path.display(),
                output.status()
            )),
            Err(err) => Err(format!("{step}: {err}")),
        }
    }

    /// Downloads the release archive, unpacks it into the cache, and
    /// verifies the result.
    fn download(&self) -> Result<BinaryHandle, String> {
        let step = Step::Download;
        let target = self
            .settings
            .platform
            .release_target()
            .ok_or_else(|| format!("{step}: no release artifact for this host"))?;
        let url = self
            .settings
            .release
            .artifact_url(target)
            .map_err(|err| format!("{step}: {err}"))?;

        let cache_dir = self.settings.cache_dir.as_path();
        fs::create_dir_all(cache_dir)
            .map_err(|err| format!("{step}: cannot create {}: {err}", cache_dir.display()))?;

        let archive = cache_dir.join(format!("clarinet-{target}.tar.gz"));
        info!(target: PROVISION_TARGET, url = %url, "downloading compiler release");
        self.fetcher
            .fetch(&url, &archive, self.settings.download_timeout)
            .map_err(|err| format!("{step}: {err}"))?;

        let extract = ProcessRequest::new(TAR_PROGRAM)
            .arg("-xzf")
            .arg(archive.as_os_str())
            .arg("-C")
            .arg(cache_dir.as_os_str())
            .timeout(self.settings.download_timeout)
            .max_output_bytes(PROBE_OUTPUT_LIMIT);
        let outcome = self.executor.execute(&extract, &CancellationToken::new());
        remove_archive(&archive);
        match outcome {
            Ok(output) if output.success() => {}
            Ok(output) => {
                return Err(format!(
                    "{step}: {TAR_PROGRAM} exited with status {:?}: {}",
                    output.status(),
                    output.stderr().trim()
                ));
            }
            Err(err) => return Err(format!("{step}: {err}")),
        }

        let binary = self.settings.cached_binary();
        mark_executable(&binary)
            .map_err(|err| format!("{step}: cannot mark {} executable: {err}", binary.display()))?;
        self.verify(step, &binary)
    }
}

fn remove_archive(archive: &Path) {
    if let Err(err) = fs::remove_file(archive) {
        debug!(
            target: PROVISION_TARGET,
            archive = %archive.display(),
            error = %err,
            "failed to remove downloaded archive"
        );
    }
}

#[cfg(unix)]
fn mark_executable(path: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;

    fs::set_permissions(path, fs::Permissions::from_mode(0o755))
}

#[cfg(not(unix))]
fn mark_executable(path: &Path) -> std::io::Result<()> {
    fs::metadata(path).map(drop)
}

#[cfg(test)]
mod tests;
