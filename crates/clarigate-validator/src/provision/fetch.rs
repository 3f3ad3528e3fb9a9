//! Release artifact download.

use std::fs::{self, File};
use std::io::{self, Read};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use reqwest::blocking::Client;
use tracing::debug;
use url::Url;

use crate::error::FetchError;

/// Tracing target for artifact downloads.
const FETCH_TARGET: &str = "clarigate_validator::provision::fetch";

/// Trait abstracting artifact download for testability.
pub trait ArtifactFetcher: Send + Sync {
    /// Downloads `url` into `destination`, replacing any existing file, and
    /// returns the number of bytes written.
    ///
    /// # Errors
    ///
    /// Returns a [`FetchError`] when the request fails, the server answers
    /// with a non-success status, or the file cannot be written.
    fn fetch(&self, url: &Url, destination: &Path, timeout: Duration) -> Result<u64, FetchError>;
}

/// Downloads artifacts over HTTPS with a blocking `reqwest` client.
///
/// The body is streamed into `<destination>.partial` and renamed into place
/// once complete, so concurrent or interrupted downloads never leave a
/// half-written archive at the destination path.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    /// Builds a fetcher with a fresh client.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::Request`] if the TLS backend cannot be
    /// initialised.
    pub fn new() -> Result<Self, FetchError> {
        let client = Client::builder()
            .build()
            .map_err(|source| FetchError::Request {
                url: String::new(),
                source,
            })?;
        Ok(Self { client })
    }
}

impl ArtifactFetcher for HttpFetcher {
    fn fetch(&self, url: &Url, destination: &Path, timeout: Duration) -> Result<u64, FetchError> {
        let request_error = |source| FetchError::Request {
            url: url.to_string(),
            source,
        };
        let mut response = self
            .client
            .get(url.as_str())
            .timeout(timeout)
            .send()
            .map_err(request_error)?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let written = install_body(&mut response, destination)?;

        debug!(
            target: FETCH_TARGET,
            url = %url,
            bytes = written,
            destination = %destination.display(),
            "downloaded artifact"
        );
        Ok(written)
    }
}

/// Streams `body` into `<destination>.partial`, then renames it into place.
///
/// The partial file is removed on any failure.
fn install_body<R: Read>(body: &mut R, destination: &Path) -> Result<u64, FetchError> {
    let partial = destination.with_extension("partial");
    let result = write_partial(body, &partial).and_then(|written| {
        fs::rename(&partial, destination).map_err(|source| FetchError::Io {
            path: destination.to_path_buf(),
            source: Arc::new(source),
        })?;
        Ok(written)
    });
    if result.is_err() {
        drop(fs::remove_file(&partial));
    }
    result
}

fn write_partial<R: Read>(body: &mut R, partial: &Path) -> Result<u64, FetchError> {
    let io_error = |source| FetchError::Io {
        path: partial.to_path_buf(),
        source: Arc::new(source),
    };
    let mut file = File::create(partial).map_err(io_error)?;
    let written = io::copy(body, &mut file).map_err(io_error)?;
    file.sync_all().map_err(io_error)?;
    Ok(written)
}
