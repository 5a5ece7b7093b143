//! Application state for the API server

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::{Mutex, OwnedMutexGuard};
use tokio_util::sync::CancellationToken;

use crate::api::identity::IdentityClient;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::pipeline::Pipeline;

/// Shared application state accessible to all route handlers
///
/// Cloned for each request; everything inside is behind an `Arc` or is a
/// cheap handle.
#[derive(Clone)]
pub struct AppState {
    /// Configuration
    pub config: Arc<Config>,

    /// Pipeline used for triggered runs
    pub pipeline: Pipeline,

    /// Identity endpoint client, absent when `UserUrl` is not configured
    pub identity: Option<IdentityClient>,

    /// Batch input for triggered runs
    pub data_file: Option<PathBuf>,

    /// Cancelled on shutdown; also cancels any in-flight run
    pub shutdown: CancellationToken,

    run_lock: Arc<Mutex<()>>,
}

impl AppState {
    /// Create a new AppState
    pub fn new(
        config: Arc<Config>,
        pipeline: Pipeline,
        shutdown: CancellationToken,
    ) -> Result<Self> {
        let identity = match &config.user_url {
            Some(url) => Some(IdentityClient::new(url.clone(), config.http.timeout())?),
            None => None,
        };
        let data_file = config.api.data_file.clone();

        Ok(Self {
            config,
            pipeline,
            identity,
            data_file,
            shutdown,
            run_lock: Arc::new(Mutex::new(())),
        })
    }

    /// Override the batch input file
    pub fn with_data_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.data_file = Some(path.into());
        self
    }

    /// Claim the single run slot, failing with [`Error::Busy`] if it is taken
    ///
    /// The slot is released when the guard is dropped.
    pub fn try_begin_run(&self) -> Result<OwnedMutexGuard<()>> {
        Arc::clone(&self.run_lock)
            .try_lock_owned()
            .map_err(|_| Error::Busy)
    }
}
