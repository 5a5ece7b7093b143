//! Concurrent batch pipeline.
//!
//! One run wires together:
//! - [`source`] - a [`RecordSource`] feeding a bounded record queue
//! - [`worker`] - a pool of executors, each with its own [`UnitProcessor`]
//! - [`collector`] - the single consumer of the bounded outcome queue
//!
//! The producer delivers the number of records it queued through a
//! single-assignment completion cell, and the collector ends the run once that
//! many outcomes have been tallied. Every run gets fresh queues and its own
//! cancellation token, and all executors are joined before [`Pipeline::run`]
//! returns.

mod collector;
mod source;
mod worker;


pub use source::{CsvRecordSource, MemoryRecordSource, RecordSource};
pub use worker::{ProcessorFactory, UnitProcessor};

use std::sync::Arc;
use std::time::Instant;

use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

use crate::config::PipelineConfig;
use crate::error::{Error, Result};
use crate::types::{Record, RunSummary};

use collector::Collector;
use worker::WorkerPool;

/// Sizing for one pipeline
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PipelineOptions {
    /// Number of concurrent executors
    pub workers: usize,
    /// Capacity of the record queue
    pub record_queue: usize,
    /// Capacity of the outcome queue
    pub outcome_queue: usize,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        PipelineConfig::default().into()
    }
}

impl From<PipelineConfig> for PipelineOptions {
    fn from(config: PipelineConfig) -> Self {
        Self {
            workers: config.workers,
            record_queue: config.record_queue,
            outcome_queue: config.outcome_queue,
        }
    }
}

impl From<&PipelineConfig> for PipelineOptions {
    fn from(config: &PipelineConfig) -> Self {
        config.clone().into()
    }
}

/// Runs batches through a worker pool.
///
/// Holds no per-run state, so one `Pipeline` can serve many sequential or
/// concurrent runs.
#[derive(Clone)]
pub struct Pipeline {
    options: PipelineOptions,
    factory: Arc<dyn ProcessorFactory>,
}

impl Pipeline {
    /// Create a pipeline
    ///
    /// Zero sizes are raised to 1.
    pub fn new(options: PipelineOptions, factory: Arc<dyn ProcessorFactory>) -> Self {
        let options = PipelineOptions {
            workers: options.workers.max(1),
            record_queue: options.record_queue.max(1),
            outcome_queue: options.outcome_queue.max(1),
        };
        Self { options, factory }
    }

    /// Pipeline sizing
    pub fn options(&self) -> PipelineOptions {
        self.options
    }

    /// Process every record from `source` and return the run summary.
    ///
    /// If `confirmation` is given, it is queued after the source is exhausted
    /// and the run also waits for its outcome; it is counted in the summary.
    ///
    /// Returns an error when the source fails, when `cancel` fires, or when
    /// the executors go away before every outcome is in.
    pub async fn run<S>(
        &self,
        source: S,
        confirmation: Option<Record>,
        cancel: &CancellationToken,
    ) -> Result<RunSummary>
    where
        S: RecordSource + 'static,
    {
        let started = Instant::now();
        let run_token = cancel.child_token();

        let (record_tx, record_rx) = mpsc::channel(self.options.record_queue);
        let (outcome_tx, outcome_rx) = mpsc::channel(self.options.outcome_queue);
        let (completion_tx, completion_rx) = oneshot::channel();

        tracing::info!(
            workers = self.options.workers,
            record_queue = self.options.record_queue,
            outcome_queue = self.options.outcome_queue,
            "Starting batch run"
        );

        let pool = WorkerPool::spawn(
            self.options.workers,
            Arc::clone(&self.factory),
            record_rx,
            outcome_tx,
            run_token.clone(),
        );

        let producer = tokio::spawn(feed_records(
            source,
            confirmation,
            record_tx,
            completion_tx,
            run_token.clone(),
        ));

        let collected = Collector::new(outcome_rx, completion_rx, run_token.clone())
            .run()
            .await;

        run_token.cancel();
        let all_degraded = pool.all_degraded();
        let workers = pool.size();
        pool.shutdown().await;

        let produced = match producer.await {
            Ok(result) => result,
            Err(e) => Err(Error::Other(format!("record producer task failed: {}", e))),
        };

        match (collected, produced) {
            (Ok(tally), Ok(_)) => {
                let summary = RunSummary::from_tally(tally, started.elapsed());
                tracing::info!(
                    total = summary.total_processed,
                    succeeded = summary.succeeded,
                    failed = summary.failed,
                    elapsed_seconds = summary.elapsed_seconds,
                    "Batch run complete"
                );
                Ok(summary)
            }
            (Err(collect_error), produced) => {
                let tally = collect_error.tally();
                tracing::warn!(
                    succeeded = tally.succeeded,
                    failed = tally.failed,
                    "Batch run ended before all outcomes were collected"
                );
                if cancel.is_cancelled() {
                    return Err(Error::Cancelled);
                }
                if all_degraded {
                    return Err(Error::NoHealthyExecutors { workers });
                }
                match (collect_error, produced) {
                    (_, Err(e)) if !matches!(e, Error::Cancelled | Error::QueueClosed) => Err(e),
                    (collect_error, _) => Err(collect_error.into_error()),
                }
            }
            // Collector finished, so the producer already delivered its total
            (Ok(_), Err(e)) => Err(e),
        }
    }
}

/// Producer task: drain the source, append the confirmation, publish the total.
///
/// The total is published before the record sender is released so that
/// executors cannot all exit (closing the outcome queue) ahead of it.
async fn feed_records<S>(
    mut source: S,
    confirmation: Option<Record>,
    queue: mpsc::Sender<Record>,
    completion: oneshot::Sender<usize>,
    cancel: CancellationToken,
) -> Result<usize>
where
    S: RecordSource,
{
    let produced = source.produce(&queue, &cancel).await?;
    let mut total = produced;

    if let Some(record) = confirmation {
        tracing::debug!(subject_id = %record.subject_id, "Queueing confirmation record");
        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(Error::Cancelled),
            sent = queue.send(record) => sent.map_err(|_| Error::QueueClosed)?,
        }
        total += 1;
    }

    tracing::info!(produced, expected = total, "Finished queueing records");
    // The collector may already be gone if the run was cancelled
    let _ = completion.send(total);
    drop(queue);
    Ok(produced)
}
