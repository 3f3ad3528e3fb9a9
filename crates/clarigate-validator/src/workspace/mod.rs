//! Ephemeral project workspaces for a single compiler run.
//!
//! Each call to [`WorkspaceStager::stage`] creates a fresh directory named
//! `clarigate-<unix-millis>-<random>` under the stager root and lays out the
//! project the compiler expects:
//!
//! ```text
//! clarigate-1718000000000-Ab3xYz/
//! ├── Clarinet.toml
//! └── contracts/
//!     └── <name>.clar
//! ```
//!
//! The returned [`Workspace`] owns the directory and removes it when dropped,
//! so no exit path can leak it.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::Serialize;
use tempfile::TempDir;
use tracing::{debug, warn};

use crate::error::StagingError;
use crate::source::SourceUnit;

/// Tracing target for workspace staging.
const WORKSPACE_TARGET: &str = "clarigate_validator::workspace";

/// Project descriptor file name.
pub const MANIFEST_FILE: &str = "Clarinet.toml";

/// Directory holding contract sources, relative to the workspace root.
pub const CONTRACTS_DIR: &str = "contracts";

/// Source file extension.
const SOURCE_EXTENSION: &str = "clar";

/// Compiler cache directory recorded in the manifest.
const MANIFEST_CACHE_DIR: &str = "./.cache";

#[derive(Serialize)]
struct Manifest<'a> {
    project: ProjectSection<'a>,
    contracts: BTreeMap<&'a str, ContractEntry>,
}

#[derive(Serialize)]
struct ProjectSection<'a> {
    name: &'a str,
    authors: Vec<String>,
    telemetry: bool,
    cache_dir: &'a str,
}

#[derive(Serialize)]
struct ContractEntry {
    path: String,
}

/// Renders the manifest declaring `name` as the only contract.
fn render_manifest(name: &str) -> Result<String, StagingError> {
    let mut contracts = BTreeMap::new();
    contracts.insert(
        name,
        ContractEntry {
            path: format!("{CONTRACTS_DIR}/{name}.{SOURCE_EXTENSION}"),
        },
    );
    let manifest = Manifest {
        project: ProjectSection {
            name,
            authors: Vec::new(),
            telemetry: false,
            cache_dir: MANIFEST_CACHE_DIR,
        },
        contracts,
    };
    toml::to_string(&manifest).map_err(StagingError::RenderManifest)
}

/// A staged project directory.
///
/// Removed recursively on drop; failures are logged, never raised.
#[derive(Debug)]
pub struct Workspace {
    dir: Option<TempDir>,
    root_dir: PathBuf,
    manifest_path: PathBuf,
    source_file_path: PathBuf,
}

impl Workspace {
    /// Returns the workspace root.
    #[must_use]
    pub fn root_dir(&self) -> &Path {
        &self.root_dir
    }

    /// Returns the manifest path.
    #[must_use]
    pub fn manifest_path(&self) -> &Path {
        &self.manifest_path
    }

    /// Returns the contract source path.
    #[must_use]
    pub fn source_file_path(&self) -> &Path {
        &self.source_file_path
    }

    /// Removes the directory, reporting any failure.
    ///
    /// # Errors
    ///
    /// Returns the I/O error raised during recursive removal.
    pub fn close(mut self) -> io::Result<()> {
        self.dir.take().map_or(Ok(()), TempDir::close)
    }
}

impl Drop for Workspace {
    fn drop(&mut self) {
        if let Some(dir) = self.dir.take() {
            let root = dir.path().to_path_buf();
            if let Err(err) = dir.close() {
                warn!(
                    target: WORKSPACE_TARGET,
                    root = %root.display(),
                    error = %err,
                    "failed to remove workspace"
                );
            }
        }
    }
}

/// Creates isolated workspaces under a root directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkspaceStager {
    root: PathBuf,
}

impl WorkspaceStager {
    /// Creates a stager that places workspaces under `root`.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Creates a stager rooted at the platform temporary directory.
    #[must_use]
    pub fn system() -> Self {
        Self::new(std::env::temp_dir())
    }

    /// Returns the directory workspaces are created under.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Stages `source` into a new workspace.
    ///
    /// # Errors
    ///
    /// Returns a [`StagingError`] if the directory, manifest, or source file
    /// cannot be created. Any partially staged directory is removed first.
    pub fn stage(&self, source: &SourceUnit) -> Result<Workspace, StagingError> {
        fs::create_dir_all(&self.root).map_err(|err| create_error(&self.root, err))?;

        let dir = tempfile::Builder::new()
            .prefix(&format!("clarigate-{}-", unix_millis()))
            .tempdir_in(&self.root)
            .map_err(|err| create_error(&self.root, err))?;
        let root_dir = dir.path().to_path_buf();
        let mut workspace = Workspace {
            dir: Some(dir),
            manifest_path: root_dir.join(MANIFEST_FILE),
            source_file_path: root_dir
                .join(CONTRACTS_DIR)
                .join(format!("{}.{SOURCE_EXTENSION}", source.name())),
            root_dir,
        };

        if let Err(err) = populate(&workspace, source) {
            if let Some(dir) = workspace.dir.take() {
                discard_partial(dir);
            }
            return Err(err);
        }

        debug!(
            target: WORKSPACE_TARGET,
            root = %workspace.root_dir.display(),
            contract = source.name(),
            "workspace staged"
        );
        Ok(workspace)
    }

    /// Removes `workspace`, logging and swallowing any failure.
    pub fn cleanup(workspace: Workspace) {
        let root = workspace.root_dir.clone();
        match workspace.close() {
            Ok(()) => debug!(target: WORKSPACE_TARGET, root = %root.display(), "workspace removed"),
            Err(err) => warn!(
                target: WORKSPACE_TARGET,
                root = %root.display(),
                error = %err,
                "failed to remove workspace"
            ),
        }
    }
}

impl Default for WorkspaceStager {
    fn default() -> Self {
        Self::system()
    }
}

fn populate(workspace: &Workspace, source: &SourceUnit) -> Result<(), StagingError> {
    let contracts = workspace.root_dir.join(CONTRACTS_DIR);
    fs::create_dir(&contracts).map_err(|err| create_error(&contracts, err))?;

    let manifest = render_manifest(source.name())?;
    write_file(&workspace.manifest_path, manifest.as_bytes())?;
    write_file(&workspace.source_file_path, source.body().as_bytes())
}

fn write_file(path: &Path, contents: &[u8]) -> Result<(), StagingError> {
    fs::write(path, contents).map_err(|err| StagingError::WriteFile {
        path: path.to_path_buf(),
        source: Arc::new(err),
    })
}

fn create_error(path: &Path, err: io::Error) -> StagingError {
    StagingError::CreateDirectory {
        path: path.to_path_buf(),
        source: Arc::new(err),
    }
}

fn discard_partial(dir: TempDir) {
    let root = dir.path().to_path_buf();
    if let Err(err) = dir.close() {
        warn!(
            target: WORKSPACE_TARGET,
            root = %root.display(),
            error = %err,
            "failed to remove partially staged workspace"
        );
    }
}

fn unix_millis() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis())
        .unwrap_or_default()
}
