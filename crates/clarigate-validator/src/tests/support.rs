//! Test doubles shared across the crate's unit and behaviour tests.

use std::io;
use std::path::Path;
use std::sync::{Arc, Mutex};

use crate::error::{ProcessError, ProvisionError};
use crate::process::{CancellationToken, ProcessExecutor, ProcessOutput, ProcessRequest};
use crate::provision::{BinaryHandle, BinaryProvider};

type Handler = dyn Fn(&ProcessRequest) -> Result<ProcessOutput, ProcessError> + Send + Sync;

/// Executor that answers every request with a closure and records requests.
pub(crate) struct FnExecutor {
    handler: Box<Handler>,
    calls: Mutex<Vec<ProcessRequest>>,
}

impl FnExecutor {
    pub(crate) fn new<H>(handler: H) -> Self
    where
        H: Fn(&ProcessRequest) -> Result<ProcessOutput, ProcessError> + Send + Sync + 'static,
    {
        Self {
            handler: Box::new(handler),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn calls(&self) -> Vec<ProcessRequest> {
        self.calls.lock().expect("calls lock").clone()
    }
}

impl ProcessExecutor for FnExecutor {
    fn execute(
        &self,
        request: &ProcessRequest,
        _cancel: &CancellationToken,
    ) -> Result<ProcessOutput, ProcessError> {
        self.calls.lock().expect("calls lock").push(request.clone());
        (self.handler)(request)
    }
}

/// Successful `--version` style output.
pub(crate) fn version_output() -> Result<ProcessOutput, ProcessError> {
    Ok(ProcessOutput::new(Some(0), "clarinet 2.11.2\n", ""))
}

/// Spawn failure for a missing program.
pub(crate) fn not_found(request: &ProcessRequest) -> Result<ProcessOutput, ProcessError> {
    Err(ProcessError::SpawnFailed {
        program: request.program().display().to_string(),
        source: Arc::new(io::Error::from(io::ErrorKind::NotFound)),
    })
}

/// Provider with a fixed answer that counts invalidations.
pub(crate) struct StaticProvider {
    handle: Option<BinaryHandle>,
    invalidations: Mutex<usize>,
}

impl StaticProvider {
    pub(crate) fn available(path: impl AsRef<Path>) -> Self {
        Self {
            handle: Some(BinaryHandle::verified(path.as_ref())),
            invalidations: Mutex::new(0),
        }
    }

    pub(crate) fn unavailable() -> Self {
        Self {
            handle: None,
            invalidations: Mutex::new(0),
        }
    }

    pub(crate) fn invalidations(&self) -> usize {
        *self.invalidations.lock().expect("invalidations lock")
    }
}

impl BinaryProvider for StaticProvider {
    fn ensure(&self) -> Result<BinaryHandle, ProvisionError> {
        self.handle.clone().ok_or_else(|| ProvisionError::Unavailable {
            attempts: vec![String::from("cache: not present")],
        })
    }

    fn invalidate(&self) {
        *self.invalidations.lock().expect("invalidations lock") += 1;
    }
}
