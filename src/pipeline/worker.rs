//! Worker pool of N executors turning records into outcomes.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use futures::FutureExt;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::error::Result;
use crate::types::{Outcome, OutcomeKind, Record};

/// Processes one record at a time with executor-owned resources.
///
/// Implementations never fail: every error is logged and reported as
/// [`OutcomeKind::Failure`].
#[async_trait::async_trait]
pub trait UnitProcessor: Send {
    /// Fetch, render and send for one record
    async fn process(&mut self, record: &Record) -> OutcomeKind;
}

/// Builds the per-executor [`UnitProcessor`].
///
/// Called once per executor at startup, so connection state (HTTP client,
/// SMTP session) is reused for every record that executor handles. An error
/// leaves that executor degraded for the rest of the run.
#[async_trait::async_trait]
pub trait ProcessorFactory: Send + Sync {
    /// Create the processor for executor `executor_id`
    async fn create(&self, executor_id: usize) -> Result<Box<dyn UnitProcessor>>;
}

/// Record queue receiver shared by all executors
pub(crate) type SharedRecords = Arc<Mutex<mpsc::Receiver<Record>>>;

/// Fixed-size set of executors bound to one run's queues
pub(crate) struct WorkerPool {
    size: usize,
    tasks: JoinSet<()>,
    degraded: Arc<AtomicUsize>,
}

impl WorkerPool {
    /// Spawn `size` executors.
    ///
    /// The pool does not retain the queue endpoints: once every executor has
    /// exited, the record queue receiver and the outcome queue senders are
    /// dropped, which the producer and collector observe as closed queues.
    pub(crate) fn spawn(
        size: usize,
        factory: Arc<dyn ProcessorFactory>,
        records: mpsc::Receiver<Record>,
        outcomes: mpsc::Sender<Outcome>,
        cancel: CancellationToken,
    ) -> Self {
        let records: SharedRecords = Arc::new(Mutex::new(records));
        let degraded = Arc::new(AtomicUsize::new(0));
        let mut tasks = JoinSet::new();

        for executor_id in 0..size {
            let executor = Executor {
                id: executor_id,
                records: Arc::clone(&records),
                outcomes: outcomes.clone(),
                cancel: cancel.clone(),
            };
            let factory = Arc::clone(&factory);
            let degraded = Arc::clone(&degraded);
            tasks.spawn(async move { executor.run(factory, degraded).await });
        }

        tracing::debug!(workers = size, "Worker pool started");
        Self {
            size,
            tasks,
            degraded,
        }
    }

    /// Whether every executor failed to start
    pub(crate) fn all_degraded(&self) -> bool {
        self.degraded.load(Ordering::SeqCst) >= self.size
    }

    /// Configured number of executors
    pub(crate) fn size(&self) -> usize {
        self.size
    }

    /// Wait for every executor to exit.
    ///
    /// Callers cancel the run token first; executors observe it at every
    /// suspension point.
    pub(crate) async fn shutdown(mut self) {
        while let Some(joined) = self.tasks.join_next().await {
            if let Err(e) = joined {
                if e.is_panic() {
                    tracing::error!(error = %e, "Executor task panicked");
                }
            }
        }
        tracing::debug!(workers = self.size, "Worker pool stopped");
    }
}

struct Executor {
    id: usize,
    records: SharedRecords,
    outcomes: mpsc::Sender<Outcome>,
    cancel: CancellationToken,
}

impl Executor {
    async fn run(self, factory: Arc<dyn ProcessorFactory>, degraded: Arc<AtomicUsize>) {
        let created = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return,
            created = factory.create(self.id) => created,
        };
        let mut processor = match created {
            Ok(processor) => processor,
            Err(e) => {
                degraded.fetch_add(1, Ordering::SeqCst);
                tracing::error!(
                    executor = self.id,
                    error = %e,
                    "Executor failed to establish its session, leaving it idle"
                );
                return;
            }
        };

        let mut handled = 0usize;
        loop {
            let record = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                record = next_record(&self.records) => match record {
                    Some(record) => record,
                    None => break,
                },
            };

            let kind = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                processed = AssertUnwindSafe(processor.process(&record)).catch_unwind() => match processed {
                    Ok(kind) => kind,
                    Err(_) => {
                        tracing::error!(
                            executor = self.id,
                            subject_id = %record.subject_id,
                            "Processor panicked, counting record as failed"
                        );
                        OutcomeKind::Failure
                    }
                },
            };

            if kind.is_success() {
                tracing::info!(
                    subject_id = %record.subject_id,
                    destination = %record.destination,
                    "Success"
                );
            }

            let outcome = Outcome::new(record, kind);
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                sent = self.outcomes.send(outcome) => {
                    if sent.is_err() {
                        break;
                    }
                }
            }
            handled += 1;
        }

        tracing::debug!(executor = self.id, handled, "Executor stopped");
    }
}

async fn next_record(records: &SharedRecords) -> Option<Record> {
    let mut rx = records.lock().await;
    rx.recv().await
}
