//! Outcome collector: tallies outcomes and decides when a run is complete.

use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

use crate::error::Error;
use crate::types::{BatchTally, Outcome};

/// Why the collector stopped without completing
#[derive(Debug)]
pub(crate) enum CollectError {
    /// The run token was cancelled
    Cancelled(BatchTally),
    /// The completion cell was dropped without a total (the producer failed)
    SourceAborted(BatchTally),
    /// Every outcome sender went away before the expected total was reached
    OutcomesClosed {
        tally: BatchTally,
        expected: Option<usize>,
    },
}

impl CollectError {
    /// Outcomes tallied before the collector stopped
    pub(crate) fn tally(&self) -> BatchTally {
        match self {
            CollectError::Cancelled(tally) | CollectError::SourceAborted(tally) => *tally,
            CollectError::OutcomesClosed { tally, .. } => *tally,
        }
    }

    pub(crate) fn into_error(self) -> Error {
        match self {
            CollectError::Cancelled(_) => Error::Cancelled,
            CollectError::SourceAborted(tally) => Error::Incomplete {
                received: tally.total(),
                expected: None,
            },
            CollectError::OutcomesClosed { tally, expected } => Error::Incomplete {
                received: tally.total(),
                expected,
            },
        }
    }
}

enum Step {
    Cancelled,
    Signal(Option<usize>),
    Outcome(Option<Outcome>),
}

/// Single consumer of the outcome queue.
///
/// The run is complete exactly when the total from the completion cell is
/// known and at least that many outcomes have been tallied. The cell is
/// checked without blocking on every iteration and is also awaited next to
/// the outcome queue, so the total may arrive before, between, or after the
/// final outcomes.
pub(crate) struct Collector {
    outcomes: mpsc::Receiver<Outcome>,
    completion: oneshot::Receiver<usize>,
    cancel: CancellationToken,
}

impl Collector {
    pub(crate) fn new(
        outcomes: mpsc::Receiver<Outcome>,
        completion: oneshot::Receiver<usize>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            outcomes,
            completion,
            cancel,
        }
    }

    pub(crate) async fn run(mut self) -> std::result::Result<BatchTally, CollectError> {
        let mut tally = BatchTally::default();
        let mut total: Option<usize> = None;

        loop {
            if total.is_none() {
                total = self.poll_completion(tally)?;
            }
            if let Some(expected) = total {
                if tally.total() >= expected {
                    tracing::info!(
                        succeeded = tally.succeeded,
                        failed = tally.failed,
                        total = expected,
                        "All outcomes collected"
                    );
                    return Ok(tally);
                }
            }

            let step = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => Step::Cancelled,
                signal = &mut self.completion, if total.is_none() => Step::Signal(signal.ok()),
                outcome = self.outcomes.recv() => Step::Outcome(outcome),
            };

            match step {
                Step::Cancelled => return Err(CollectError::Cancelled(tally)),
                Step::Signal(Some(expected)) => {
                    tracing::debug!(expected, collected = tally.total(), "Record count known");
                    total = Some(expected);
                }
                Step::Signal(None) => return Err(CollectError::SourceAborted(tally)),
                Step::Outcome(Some(outcome)) => {
                    tracing::debug!(
                        subject_id = %outcome.record.subject_id,
                        outcome = ?outcome.kind,
                        "Outcome received"
                    );
                    tally.record(outcome.kind);
                }
                Step::Outcome(None) => {
                    // The producer signals before releasing the record queue, so
                    // a total sent ahead of the last executor exiting is visible here
                    if total.is_none() {
                        total = self.poll_completion(tally)?;
                    }
                    match total {
                        Some(expected) if tally.total() >= expected => continue,
                        _ => {
                            return Err(CollectError::OutcomesClosed {
                                tally,
                                expected: total,
                            });
                        }
                    }
                }
            }
        }
    }

    /// Non-blocking look at the completion cell
    fn poll_completion(
        &mut self,
        tally: BatchTally,
    ) -> std::result::Result<Option<usize>, CollectError> {
        match self.completion.try_recv() {
            Ok(expected) => {
                tracing::debug!(expected, collected = tally.total(), "Record count known");
                Ok(Some(expected))
            }
            Err(oneshot::error::TryRecvError::Empty) => Ok(None),
            Err(oneshot::error::TryRecvError::Closed) => Err(CollectError::SourceAborted(tally)),
        }
    }
}
