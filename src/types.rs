//! Core types for recmailer

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// One input unit: the subject to fetch recommendations for and where to send them
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Record {
    /// Identifier substituted into the payload URL
    pub subject_id: String,
    /// Recipient address
    pub destination: String,
}

impl Record {
    /// Create a new Record
    pub fn new(subject_id: impl Into<String>, destination: impl Into<String>) -> Self {
        Self {
            subject_id: subject_id.into(),
            destination: destination.into(),
        }
    }
}

impl std::fmt::Display for Record {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}, {}", self.subject_id, self.destination)
    }
}

/// Binary result of processing one record
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OutcomeKind {
    /// Payload fetched, rendered and accepted by the transport
    Success,
    /// Any step failed
    Failure,
}

impl OutcomeKind {
    /// Whether this is a success
    pub fn is_success(self) -> bool {
        matches!(self, OutcomeKind::Success)
    }
}

/// Result of processing one record, carrying the record for diagnostics
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Outcome {
    /// Success or failure
    pub kind: OutcomeKind,
    /// The record this outcome belongs to
    pub record: Record,
}

impl Outcome {
    /// Create a new Outcome
    pub fn new(record: Record, kind: OutcomeKind) -> Self {
        Self { kind, record }
    }
}

/// Running counters of outcomes by kind
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchTally {
    /// Number of successful outcomes
    pub succeeded: usize,
    /// Number of failed outcomes
    pub failed: usize,
}

impl BatchTally {
    /// Count one outcome
    pub fn record(&mut self, kind: OutcomeKind) {
        match kind {
            OutcomeKind::Success => self.succeeded += 1,
            OutcomeKind::Failure => self.failed += 1,
        }
    }

    /// Total outcomes counted so far
    pub fn total(&self) -> usize {
        self.succeeded + self.failed
    }
}

/// Summary returned by one pipeline run
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct RunSummary {
    /// Outcomes tallied (equals the number of records fed to the pool)
    pub total_processed: usize,
    /// Successful outcomes
    pub succeeded: usize,
    /// Failed outcomes
    pub failed: usize,
    /// Wall-clock duration of the run in whole seconds
    pub elapsed_seconds: i64,
}

impl RunSummary {
    /// Build a summary from a final tally
    pub fn from_tally(tally: BatchTally, elapsed: std::time::Duration) -> Self {
        Self {
            total_processed: tally.total(),
            succeeded: tally.succeeded,
            failed: tally.failed,
            elapsed_seconds: i64::try_from(elapsed.as_secs()).unwrap_or(i64::MAX),
        }
    }
}

/// Payload returned by the recommendation endpoint
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RecResponse {
    /// Suggested articles, in ranking order
    #[serde(rename = "Suggestions", default)]
    pub suggestions: Vec<Suggestion>,
}

/// A single suggested article
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Suggestion {
    /// Article URL
    #[serde(rename = "Url")]
    pub url: String,
    /// Headline
    #[serde(rename = "Title")]
    pub title: String,
    /// Short summary
    #[serde(rename = "Abstract")]
    pub summary: String,
    /// Section name
    #[serde(rename = "Section")]
    pub section: String,
    /// Author line
    #[serde(rename = "Byline")]
    pub byline: String,
    /// Thumbnail image
    #[serde(rename = "Thumbnail")]
    pub thumbnail: Thumbnail,
    /// Descriptor facets
    #[serde(rename = "Des_facet")]
    pub des_facet: Vec<String>,
}

/// Thumbnail image for a suggestion
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Thumbnail {
    /// Image URL, empty when the endpoint has none
    #[serde(rename = "Url", default)]
    pub url: String,
}

/// Data handed to the presentation template
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct EmailData {
    /// Header `From` address
    pub from_address: String,
    /// Recipient address
    pub to_address: String,
    /// Subject line
    pub subject: String,
    /// RFC 1123 date with numeric zone
    pub date: String,
    /// Long-form local date for the message body
    pub human_date: String,
    /// The fetched payload
    pub rec_response: RecResponse,
}
