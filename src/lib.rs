//! # recmailer
//!
//! Concurrent batch mailer: for every `(subject id, address)` row of an input
//! file it fetches personalized suggestions, renders them into a message and
//! submits the message over SMTP.
//!
//! The core is [`pipeline::Pipeline`], a bounded producer/worker/collector
//! arrangement that processes records in parallel while keeping an exact
//! count of outcomes. [`processor`] supplies the fetch-render-send step and
//! [`api`] exposes an HTTP trigger for on-demand runs.
//!
//! ## Quick Start
//!
//! ```no_run
//! use recmailer::{Config, run_batch};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::load("recmailer.json")?;
//!     let cancel = CancellationToken::new();
//!
//!     let summary = run_batch(config, "subscribers.csv", "message.tmpl", &cancel).await?;
//!     println!("{} succeeded, {} failed", summary.succeeded, summary.failed);
//!
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

use std::path::Path;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

/// Trigger API
pub mod api;
/// Configuration types
pub mod config;
/// Error types
pub mod error;
/// Concurrent batch pipeline
pub mod pipeline;
/// Fetch-render-send record processing
pub mod processor;
/// Core data types
pub mod types;

// Re-export commonly used types
pub use config::{Config, PipelineConfig, SmtpSecurity};
pub use error::{ApiError, Error, ErrorDetail, ProcessError, Result, ToHttpStatus};
pub use pipeline::{
    CsvRecordSource, MemoryRecordSource, Pipeline, PipelineOptions, ProcessorFactory,
    RecordSource, UnitProcessor,
};
pub use processor::{MailTransport, RecProcessor, RecProcessorFactory, Renderer};
pub use types::{BatchTally, Outcome, OutcomeKind, Record, RunSummary};

/// Run one batch from a CSV file through SMTP.
///
/// Loads the template, builds the pipeline from `config` and processes every
/// row of `data_file`. Setup problems (unparsable template, unreadable input)
/// are returned as errors; per-record failures only show up in the summary.
pub async fn run_batch(
    config: Config,
    data_file: impl AsRef<Path>,
    template_file: impl AsRef<Path>,
    cancel: &CancellationToken,
) -> Result<RunSummary> {
    let data_file = data_file.as_ref();
    if !data_file.is_file() {
        return Err(Error::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("unable to open {}", data_file.display()),
        )));
    }

    let renderer = Arc::new(Renderer::from_file(template_file)?);
    let pipeline = RecProcessorFactory::new(Arc::new(config), renderer).into_pipeline();

    pipeline
        .run(CsvRecordSource::new(data_file), None, cancel)
        .await
}

/// Cancel `token` once SIGTERM or SIGINT (Ctrl+C elsewhere) arrives.
///
/// Returns without cancelling if the token is cancelled by someone else first.
/// A signal that cannot be registered is logged and never fires.
///
/// # Example
///
/// ```no_run
/// use recmailer::cancel_on_signal;
/// use tokio_util::sync::CancellationToken;
///
/// #[tokio::main]
/// async fn main() {
///     let token = CancellationToken::new();
///     tokio::spawn(cancel_on_signal(token.clone()));
///
///     token.cancelled().await;
/// }
/// ```
pub async fn cancel_on_signal(token: CancellationToken) {
    tokio::select! {
        signal = shutdown_signal() => {
            tracing::info!(signal, "Shutdown signal received, cancelling run");
            token.cancel();
        }
        _ = token.cancelled() => {}
    }
}

#[cfg(unix)]
async fn shutdown_signal() -> &'static str {
    use tokio::signal::unix::{SignalKind, signal};

    let terminate = async {
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "SIGTERM handler unavailable");
                std::future::pending::<()>().await;
            }
        }
    };
    let interrupt = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "SIGINT handler unavailable");
            std::future::pending::<()>().await;
        }
    };

    tokio::select! {
        _ = terminate => "SIGTERM",
        _ = interrupt => "SIGINT",
    }
}

#[cfg(not(unix))]
async fn shutdown_signal() -> &'static str {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "Ctrl+C handler unavailable");
        std::future::pending::<()>().await;
    }
    "Ctrl+C"
}
