//! When the provisioner may fetch a compiler release over the network.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Download permission for the compiler release step.
#[derive(
    Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq, EnumString, Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum DownloadPolicy {
    /// Download only inside the hosted build environment.
    #[default]
    HostedOnly,
    /// Download on any host when no binary is found.
    Always,
    /// Never download.
    Never,
}

impl DownloadPolicy {
    /// Returns `true` if downloading is allowed on this host.
    ///
    /// ```
    /// use clarigate_config::DownloadPolicy;
    ///
    /// assert!(DownloadPolicy::HostedOnly.permits(true));
    /// assert!(!DownloadPolicy::HostedOnly.permits(false));
    /// assert!(DownloadPolicy::Always.permits(false));
    /// ```
    #[must_use]
    pub const fn permits(self, hosted: bool) -> bool {
        match self {
            Self::HostedOnly => hosted,
            Self::Always => true,
            Self::Never => false,
        }
    }
}

/// Errors encountered while parsing a [`DownloadPolicy`] from text.
pub type DownloadPolicyParseError = strum::ParseError;
