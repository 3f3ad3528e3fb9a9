//! Unit tests for binary provisioning.

use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;

use mockall::mock;
use rstest::{fixture, rstest};
use tempfile::TempDir;

use super::*;
use crate::error::ProcessError;
use crate::process::ProcessOutput;
use crate::tests::support::{FnExecutor, not_found, version_output};

mock! {
    Executor {}
    impl ProcessExecutor for Executor {
        fn execute(
            &self,
            request: &ProcessRequest,
            cancel: &CancellationToken,
        ) -> Result<ProcessOutput, ProcessError>;
    }
}

/// Fetcher that always fails with HTTP 404.
struct MissingFetcher;

impl ArtifactFetcher for MissingFetcher {
    fn fetch(&self, url: &Url, _destination: &Path, _timeout: Duration) -> Result<u64, FetchError> {
        Err(FetchError::Status {
            url: url.to_string(),
            status: 404,
        })
    }
}

/// Fetcher that writes a placeholder archive and records requested URLs.
#[derive(Default)]
struct WritingFetcher {
    urls: Mutex<Vec<String>>,
}

impl ArtifactFetcher for WritingFetcher {
    fn fetch(&self, url: &Url, destination: &Path, _timeout: Duration) -> Result<u64, FetchError> {
        self.urls.lock().expect("urls lock").push(url.to_string());
        fs::write(destination, b"archive").expect("write archive");
        Ok(7)
    }
}

#[fixture]
fn temp() -> TempDir {
    TempDir::new().expect("temp dir")
}

fn cache_dir(temp: &TempDir) -> PathBuf {
    temp.path().join("bin")
}

fn touch(path: &Path) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("create parent");
    }
    fs::write(path, b"#!/bin/sh\n").expect("write binary");
}

fn is_version_probe(request: &ProcessRequest) -> bool {
    request.args() == [OsString::from(VERSION_FLAG)]
}

#[rstest]
fn cached_binary_is_verified_and_returned(temp: TempDir) {
    let settings = ProvisionerSettings::new(HostPlatform::Unix, cache_dir(&temp));
    let cached = settings.cached_binary();
    touch(&cached);

    let expected = cached.clone();
    let mut executor = MockExecutor::new();
    executor
        .expect_execute()
        .withf(move |request, _| request.program() == expected && is_version_probe(request))
        .times(1)
        .returning(|_, _| version_output());

    let provisioner =
        BinaryProvisioner::new(settings, executor, MissingFetcher, Arc::new(BinaryCache::new()));
    let handle = provisioner.ensure().expect("binary available");
    assert_eq!(handle.path(), cached);
    assert!(handle.is_verified());
}

#[rstest]
fn verified_handle_is_served_from_cache(temp: TempDir) {
    let settings = ProvisionerSettings::new(HostPlatform::Unix, cache_dir(&temp));
    touch(&settings.cached_binary());

    let mut executor = MockExecutor::new();
    executor
        .expect_execute()
        .times(1)
        .returning(|_, _| version_output());

    let provisioner =
        BinaryProvisioner::new(settings, executor, MissingFetcher, Arc::new(BinaryCache::new()));
    let first = provisioner.ensure().expect("first ensure");
    let second = provisioner.ensure().expect("second ensure");
    assert_eq!(first, second);
}

#[rstest]
fn invalidated_handle_is_reverified(temp: TempDir) {
    let settings = ProvisionerSettings::new(HostPlatform::Unix, cache_dir(&temp));
    touch(&settings.cached_binary());

    let mut executor = MockExecutor::new();
    executor
        .expect_execute()
        .times(2)
        .returning(|_, _| version_output());

    let cache = Arc::new(BinaryCache::new());
    let provisioner =
        BinaryProvisioner::new(settings, executor, MissingFetcher, Arc::clone(&cache));
    provisioner.ensure().expect("first ensure");
    provisioner.invalidate();
    assert_eq!(cache.get().map(|handle| handle.is_verified()), Some(false));

    provisioner.ensure().expect("reverified");
    assert_eq!(cache.get().map(|handle| handle.is_verified()), Some(true));
}

#[rstest]
fn failed_reverification_falls_back_to_full_resolution(temp: TempDir) {
    let settings = ProvisionerSettings::new(HostPlatform::Unix, cache_dir(&temp))
        .with_search_path("");
    let probes = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&probes);
    let executor = FnExecutor::new(move |request| {
        if counter.fetch_add(1, Ordering::SeqCst) == 0 {
            version_output()
        } else {
            not_found(request)
        }
    });

    let cache = Arc::new(BinaryCache::new());
    let provisioner =
        BinaryProvisioner::new(settings, executor, MissingFetcher, Arc::clone(&cache));
    let handle = provisioner.ensure().expect("found on search path");
    assert_eq!(handle.path(), Path::new("clarinet"));

    provisioner.invalidate();
    let err = provisioner.ensure().expect_err("binary vanished");
    assert!(matches!(err, ProvisionError::Unavailable { .. }));
    assert!(cache.get().is_none());
}

#[rstest]
fn bare_command_name_is_probed_without_path_match(temp: TempDir) {
    let settings = ProvisionerSettings::new(HostPlatform::Unix, cache_dir(&temp))
        .with_search_path("");
    let executor = FnExecutor::new(|request| {
        if request.program() == Path::new("clarinet") {
            version_output()
        } else {
            not_found(request)
        }
    });

    let provisioner =
        BinaryProvisioner::new(settings, executor, MissingFetcher, Arc::new(BinaryCache::new()));
    let handle = provisioner.ensure().expect("found on search path");
    assert_eq!(handle.path(), Path::new("clarinet"));
}

#[rstest]
fn path_entry_is_resolved_to_a_real_file(temp: TempDir) {
    let empty = temp.path().join("empty");
    let tools = temp.path().join("tools");
    fs::create_dir_all(&empty).expect("empty dir");
    touch(&tools.join("clarinet"));
    let search = env::join_paths([empty, tools.clone()]).expect("join paths");
    let settings =
        ProvisionerSettings::new(HostPlatform::Unix, cache_dir(&temp)).with_search_path(search);

    let expected = tools.join("clarinet");
    let probed = expected.clone();
    let executor = FnExecutor::new(move |request| {
        if request.program() == probed {
            version_output()
        } else {
            not_found(request)
        }
    });
    let provisioner =
        BinaryProvisioner::new(settings, executor, MissingFetcher, Arc::new(BinaryCache::new()));
    let handle = provisioner.ensure().expect("found on search path");
    assert_eq!(handle.path(), expected);
    assert!(handle.path().is_absolute());
}

#[rstest]
fn rejected_path_entry_falls_back_to_command_name(temp: TempDir) {
    let tools = temp.path().join("tools");
    touch(&tools.join("clarinet"));
    let settings = ProvisionerSettings::new(HostPlatform::Unix, cache_dir(&temp))
        .with_search_path(tools.into_os_string());

    let executor = FnExecutor::new(|request| {
        if request.program() == Path::new("clarinet") {
            version_output()
        } else {
            not_found(request)
        }
    });
    let provisioner =
        BinaryProvisioner::new(settings, executor, MissingFetcher, Arc::new(BinaryCache::new()));
    let handle = provisioner.ensure().expect("bare name answers");
    assert_eq!(handle.path(), Path::new("clarinet"));
}

#[rstest]
fn windows_probes_exe_name(temp: TempDir) {
    let settings = ProvisionerSettings::new(HostPlatform::Windows, cache_dir(&temp))
        .with_search_path("");
    assert!(settings.cached_binary().ends_with("clarinet.exe"));

    let executor = FnExecutor::new(|request| {
        if request.program() == Path::new("clarinet.exe") {
            version_output()
        } else {
            not_found(request)
        }
    });
    let provisioner =
        BinaryProvisioner::new(settings, executor, MissingFetcher, Arc::new(BinaryCache::new()));
    let handle = provisioner.ensure().expect("found on search path");
    assert_eq!(handle.path(), Path::new("clarinet.exe"));
}

#[rstest]
fn hosted_build_binary_is_used_in_hosted_environment(temp: TempDir) {
    let hosted = temp.path().join("build/bin/clarinet");
    touch(&hosted);
    let settings = ProvisionerSettings::new(HostPlatform::HostedLinux, cache_dir(&temp))
        .with_hosted_binary(&hosted)
        .with_download(false);

    let expected = hosted.clone();
    let executor = FnExecutor::new(move |request| {
        if request.program() == expected {
            version_output()
        } else {
            not_found(request)
        }
    });
    let provisioner =
        BinaryProvisioner::new(settings, executor, MissingFetcher, Arc::new(BinaryCache::new()));
    let handle = provisioner.ensure().expect("hosted binary");
    assert_eq!(handle.path(), hosted);
}

#[rstest]
fn hosted_build_binary_is_ignored_elsewhere(temp: TempDir) {
    let hosted = temp.path().join("build/bin/clarinet");
    touch(&hosted);
    let settings =
        ProvisionerSettings::new(HostPlatform::Unix, cache_dir(&temp)).with_hosted_binary(&hosted);

    let executor = FnExecutor::new(not_found);
    let provisioner =
        BinaryProvisioner::new(settings, executor, MissingFetcher, Arc::new(BinaryCache::new()));
    let err = provisioner.ensure().expect_err("nothing available");

    let ProvisionError::Unavailable { attempts } = err;
    assert!(attempts.iter().all(|note| !note.starts_with("hosted build")));
}

#[rstest]
fn exhausted_chain_reports_every_attempt(temp: TempDir) {
    let settings = ProvisionerSettings::new(HostPlatform::Unix, cache_dir(&temp));
    let provisioner = BinaryProvisioner::new(
        settings,
        FnExecutor::new(not_found),
        MissingFetcher,
        Arc::new(BinaryCache::new()),
    );

    let err = provisioner.ensure().expect_err("nothing available");
    assert_eq!(err.to_string(), "binary unavailable");
    let ProvisionError::Unavailable { attempts } = err;
    assert_eq!(attempts.len(), 3, "attempts: {attempts:?}");
    assert!(attempts[0].starts_with("cache:"));
    assert!(attempts[1].starts_with("search path:"));
    assert_eq!(attempts[2], "download: disabled");
}

#[rstest]
fn non_zero_version_probe_is_rejected(temp: TempDir) {
    let settings = ProvisionerSettings::new(HostPlatform::Unix, cache_dir(&temp));
    touch(&settings.cached_binary());
    let executor = FnExecutor::new(|_| Ok(ProcessOutput::new(Some(126), "", "cannot execute")));
    let provisioner =
        BinaryProvisioner::new(settings, executor, MissingFetcher, Arc::new(BinaryCache::new()));

    let ProvisionError::Unavailable { attempts } =
        provisioner.ensure().expect_err("probe rejected");
    assert!(attempts[0].contains("126"), "attempts: {attempts:?}");
}

#[rstest]
fn probes_use_short_timeout(temp: TempDir) {
    let settings = ProvisionerSettings::new(HostPlatform::Unix, cache_dir(&temp))
        .with_probe_timeout(Duration::from_millis(750));
    let executor = FnExecutor::new(not_found);
    let provisioner =
        BinaryProvisioner::new(settings, executor, MissingFetcher, Arc::new(BinaryCache::new()));
    drop(provisioner.ensure());

    let calls = provisioner.executor.calls();
    assert!(!calls.is_empty());
    assert!(
        calls
            .iter()
            .all(|call| call.timeout_duration() == Duration::from_millis(750))
    );
}

#[rstest]
fn download_failure_is_recoverable(temp: TempDir) {
    let settings =
        ProvisionerSettings::new(HostPlatform::Unix, cache_dir(&temp)).with_download(true);
    let provisioner = BinaryProvisioner::new(
        settings,
        FnExecutor::new(not_found),
        MissingFetcher,
        Arc::new(BinaryCache::new()),
    );

    let ProvisionError::Unavailable { attempts } =
        provisioner.ensure().expect_err("download fails");
    let last = attempts.last().expect("download attempt");
    assert!(last.starts_with("download:"), "attempts: {attempts:?}");
}

#[rstest]
fn download_installs_into_cache(temp: TempDir) {
    let Some(target) = HostPlatform::Unix.release_target() else {
        return;
    };
    let settings =
        ProvisionerSettings::new(HostPlatform::Unix, cache_dir(&temp)).with_download(true);
    let cached = settings.cached_binary();
    let archive = cache_dir(&temp).join(format!("clarinet-{target}.tar.gz"));

    let installed = cached.clone();
    let executor = FnExecutor::new(move |request| {
        if request.program() == Path::new(TAR_PROGRAM) {
            touch(&installed);
            return Ok(ProcessOutput::new(Some(0), "", ""));
        }
        if request.program() == installed && installed.is_file() {
            return version_output();
        }
        not_found(request)
    });

    let fetcher = WritingFetcher::default();
    let provisioner =
        BinaryProvisioner::new(settings, executor, fetcher, Arc::new(BinaryCache::new()));
    let handle = provisioner.ensure().expect("downloaded binary");

    assert_eq!(handle.path(), cached);
    assert!(!archive.exists(), "archive should be removed after extraction");
    let urls = provisioner.fetcher.urls.lock().expect("urls lock").clone();
    assert_eq!(urls.len(), 1);
    assert!(urls[0].ends_with(&format!("/v{DEFAULT_COMPILER_VERSION}/clarinet-{target}.tar.gz")));

    let extract = provisioner
        .executor
        .calls()
        .into_iter()
        .find(|call| call.program() == Path::new(TAR_PROGRAM))
        .expect("tar invoked");
    assert_eq!(extract.args()[0], OsString::from("-xzf"));
    assert_eq!(extract.args()[1], archive.into_os_string());
}

#[rstest]
fn concurrent_first_calls_provision_once(temp: TempDir) {
    let settings = ProvisionerSettings::new(HostPlatform::Unix, cache_dir(&temp));
    touch(&settings.cached_binary());
    let executor = FnExecutor::new(|_| {
        thread::sleep(Duration::from_millis(50));
        version_output()
    });
    let provisioner =
        BinaryProvisioner::new(settings, executor, MissingFetcher, Arc::new(BinaryCache::new()));

    let handles: Vec<BinaryHandle> = thread::scope(|scope| {
        let workers: Vec<_> = (0..8)
            .map(|_| scope.spawn(|| provisioner.ensure().expect("ensure")))
            .collect();
        workers
            .into_iter()
            .map(|worker| worker.join().expect("worker"))
            .collect()
    });

    assert_eq!(provisioner.executor.calls().len(), 1);
    assert!(handles.windows(2).all(|pair| pair[0] == pair[1]));
}

#[rstest]
#[case::trailing_slash("https://example.com/dl/", "2.1.0")]
#[case::prefixed_version("https://example.com/dl", "v2.1.0")]
fn artifact_url_is_normalised(#[case] base: &str, #[case] version: &str) {
    let url = ReleaseSource::new(base, version)
        .artifact_url("macos-arm64")
        .expect("valid url");
    assert_eq!(
        url.as_str(),
        "https://example.com/dl/v2.1.0/clarinet-macos-arm64.tar.gz"
    );
}

#[test]
fn malformed_base_url_is_rejected() {
    let err = ReleaseSource::new("not a url", "1.0.0")
        .artifact_url("linux-x64-glibc")
        .expect_err("invalid url");
    assert!(matches!(err, FetchError::InvalidUrl { .. }));
}

#[test]
fn downloads_default_to_hosted_only() {
    assert!(ProvisionerSettings::new(HostPlatform::HostedLinux, "/c").allow_download);
    assert!(!ProvisionerSettings::new(HostPlatform::Unix, "/c").allow_download);
    assert!(!ProvisionerSettings::new(HostPlatform::Windows, "/c").allow_download);
}
