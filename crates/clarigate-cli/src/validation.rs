//! Wiring from configuration to the validation orchestrator.

use std::sync::Arc;

use clarigate_config::Config;
use clarigate_validator::{
    BinaryCache, BinaryProvisioner, FetchError, HostPlatform, HttpFetcher, OrchestratorSettings,
    ProvisionerSettings, ReleaseSource, SourceUnit, SystemExecutor, ValidationOrchestrator,
    ValidationResponse, WorkspaceStager,
};
use once_cell::sync::Lazy;
use tracing::debug;

/// Provisioned binary shared by every validation in this process.
static BINARY_CACHE: Lazy<Arc<BinaryCache>> = Lazy::new(|| Arc::new(BinaryCache::new()));

const VALIDATION_TARGET: &str = "clarigate_cli::validation";

/// Seam between the CLI and the compiler-backed validator.
pub(crate) trait ContractValidator {
    /// Validates `unit` under `config`.
    fn validate(&self, config: &Config, unit: &SourceUnit) -> Result<ValidationResponse, FetchError>;
}

/// Validator backed by the real compiler.
pub(crate) struct SystemValidator;

impl ContractValidator for SystemValidator {
    fn validate(&self, config: &Config, unit: &SourceUnit) -> Result<ValidationResponse, FetchError> {
        let hosted = config.hosted_environment_detected();
        let platform = HostPlatform::current(hosted);
        debug!(target: VALIDATION_TARGET, %platform, "resolved host platform");

        let settings = provisioner_settings(config, platform);
        let provisioner = BinaryProvisioner::new(
            settings,
            SystemExecutor,
            HttpFetcher::new()?,
            Arc::clone(&BINARY_CACHE),
        );
        let orchestrator = ValidationOrchestrator::new(
            provisioner,
            SystemExecutor,
            WorkspaceStager::new(config.workspace_root()),
            OrchestratorSettings::new(config.check_timeout(), config.max_output_bytes()),
        );
        Ok(orchestrator.validate(unit).into_response())
    }
}

pub(crate) fn provisioner_settings(config: &Config, platform: HostPlatform) -> ProvisionerSettings {
    ProvisionerSettings::new(platform, config.cache_dir())
        .with_hosted_binary(config.hosted_binary_path())
        .with_download(config.download_policy().permits(platform.is_hosted()))
        .with_release(ReleaseSource::new(
            config.release_base_url(),
            config.compiler_version(),
        ))
        .with_probe_timeout(config.probe_timeout())
        .with_download_timeout(config.download_timeout())
}
