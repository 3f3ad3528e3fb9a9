//! Host platform families and their compiler binary conventions.

use std::env::consts;

/// Executable name on Unix-like hosts.
const UNIX_EXECUTABLE: &str = "clarinet";

/// Executable name on Windows hosts.
const WINDOWS_EXECUTABLE: &str = "clarinet.exe";

/// The three host families the provisioner distinguishes.
///
/// # Example
///
/// ```
/// use clarigate_validator::HostPlatform;
///
/// assert_eq!(HostPlatform::Windows.executable_name(), "clarinet.exe");
/// assert_eq!(HostPlatform::HostedLinux.executable_name(), "clarinet");
/// assert!(HostPlatform::HostedLinux.is_hosted());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HostPlatform {
    /// The hosted Linux build environment, signalled by an environment flag.
    HostedLinux,
    /// Desktop Windows.
    Windows,
    /// Any other Unix-like host (local Linux, macOS, BSD).
    Unix,
}

impl HostPlatform {
    /// Detects the current host family.
    ///
    /// `hosted` reports whether the hosted build environment flag is set; it
    /// only takes effect on Linux.
    #[must_use]
    pub fn current(hosted: bool) -> Self {
        Self::classify(consts::OS, hosted)
    }

    /// Classifies an operating-system name as reported by
    /// [`std::env::consts::OS`].
    #[must_use]
    pub fn classify(os: &str, hosted: bool) -> Self {
        match os {
            "windows" => Self::Windows,
            "linux" if hosted => Self::HostedLinux,
            _ => Self::Unix,
        }
    }

    /// Returns `true` inside the hosted build environment.
    #[must_use]
    pub const fn is_hosted(self) -> bool {
        matches!(self, Self::HostedLinux)
    }

    /// Returns the compiler executable name for this family.
    #[must_use]
    pub const fn executable_name(self) -> &'static str {
        match self {
            Self::Windows => WINDOWS_EXECUTABLE,
            Self::HostedLinux | Self::Unix => UNIX_EXECUTABLE,
        }
    }

    /// Returns the release artifact target for the running host, if one is
    /// published.
    #[must_use]
    pub fn release_target(self) -> Option<&'static str> {
        let os = match self {
            Self::Windows => "windows",
            Self::HostedLinux => "linux",
            Self::Unix => consts::OS,
        };
        release_target(os, consts::ARCH)
    }
}

impl std::fmt::Display for HostPlatform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::HostedLinux => "hosted-linux",
            Self::Windows => "windows",
            Self::Unix => "unix",
        })
    }
}

/// Maps an OS/architecture pair to the published artifact target.
#[must_use]
pub fn release_target(os: &str, arch: &str) -> Option<&'static str> {
    match (os, arch) {
        ("linux", "x86_64") => Some("linux-x64-glibc"),
        ("linux", "aarch64") => Some("linux-arm64-glibc"),
        ("macos", "x86_64") => Some("macos-x64"),
        ("macos", "aarch64") => Some("macos-arm64"),
        ("windows", "x86_64") => Some("windows-x64"),
        _ => None,
    }
}
