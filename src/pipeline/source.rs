//! Record sources feeding the bounded record queue in input order.

use std::path::{Path, PathBuf};

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};
use crate::types::Record;

/// Produces records into the record queue.
///
/// Implementations push every record in order and return how many they
/// produced. That count becomes the completion signal, so a record that is
/// skipped must not be counted. Pushing suspends while the queue is full.
#[async_trait::async_trait]
pub trait RecordSource: Send {
    /// Push all records into `queue` and return the number produced
    async fn produce(
        &mut self,
        queue: &mpsc::Sender<Record>,
        cancel: &CancellationToken,
    ) -> Result<usize>;
}

/// Reads `(subject_id, destination)` rows from a comma-separated file.
///
/// No header row is expected and fields are trimmed. Rows with fewer than
/// two fields, or with an empty id or destination, are skipped with a warning
/// and not counted. Any CSV read error aborts the source.
pub struct CsvRecordSource {
    path: PathBuf,
}

impl CsvRecordSource {
    /// Create a source for the given file
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait::async_trait]
impl RecordSource for CsvRecordSource {
    async fn produce(
        &mut self,
        queue: &mpsc::Sender<Record>,
        cancel: &CancellationToken,
    ) -> Result<usize> {
        let file = std::fs::File::open(&self.path).map_err(|e| {
            tracing::error!(path = %self.path.display(), error = %e, "Unable to open data file");
            Error::Io(e)
        })?;

        let path = self.path.clone();
        let queue = queue.clone();
        let cancel = cancel.clone();

        // csv is synchronous; blocking_send gives backpressure from the bounded queue
        tokio::task::spawn_blocking(move || read_rows(file, &path, &queue, &cancel))
            .await
            .map_err(|e| Error::Other(format!("record source task failed: {}", e)))?
    }
}

fn read_rows<R: std::io::Read>(
    input: R,
    path: &Path,
    queue: &mpsc::Sender<Record>,
    cancel: &CancellationToken,
) -> Result<usize> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(input);

    let mut produced = 0;
    for row in reader.records() {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        let row = row.map_err(|e| {
            let line = e.position().map(|p| p.line());
            tracing::error!(path = %path.display(), line = ?line, error = %e, "Error reading data file");
            Error::Csv(e)
        })?;
        // Line where the row starts; quoted fields may span several lines
        let line = row.position().map(|p| p.line());

        let (Some(subject_id), Some(destination)) = (row.get(0), row.get(1)) else {
            tracing::warn!(path = %path.display(), line = ?line, "Skipping row with fewer than two fields");
            continue;
        };
        if subject_id.is_empty() || destination.is_empty() {
            tracing::warn!(path = %path.display(), line = ?line, "Skipping row with empty field");
            continue;
        }

        queue
            .blocking_send(Record::new(subject_id, destination))
            .map_err(|_| Error::QueueClosed)?;
        produced += 1;
    }

    tracing::debug!(path = %path.display(), produced, "Finished reading data file");
    Ok(produced)
}

/// Yields a fixed list of records.
pub struct MemoryRecordSource {
    records: Vec<Record>,
}

impl MemoryRecordSource {
    /// Create a source over the given records
    pub fn new(records: Vec<Record>) -> Self {
        Self { records }
    }
}

impl From<Vec<Record>> for MemoryRecordSource {
    fn from(records: Vec<Record>) -> Self {
        Self::new(records)
    }
}

#[async_trait::async_trait]
impl RecordSource for MemoryRecordSource {
    async fn produce(
        &mut self,
        queue: &mpsc::Sender<Record>,
        cancel: &CancellationToken,
    ) -> Result<usize> {
        let mut produced = 0;
        for record in self.records.drain(..) {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(Error::Cancelled),
                sent = queue.send(record) => sent.map_err(|_| Error::QueueClosed)?,
            }
            produced += 1;
        }
        Ok(produced)
    }
}
