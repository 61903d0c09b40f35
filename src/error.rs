//! Error types for the triage pipeline.

use thiserror::Error;

use crate::domain::ticket::TicketId;

/// Result type alias using the triage error type.
pub type Result<T> = std::result::Result<T, TriageError>;

/// Main error type for the triage pipeline.
#[derive(Error, Debug)]
pub enum TriageError {
    /// Catalog source yielded no categories. Fatal: classification cannot
    /// start without a taxonomy.
    #[error("Service catalog is empty (no categories)")]
    EmptyCatalog,

    /// Catalog document could not be parsed.
    #[error("Invalid catalog document: {0}")]
    CatalogFormat(#[from] serde_yaml::Error),

    /// A catalog entry is missing a required field or duplicates another
    /// entry. Fatal: the taxonomy must be unambiguous before classification.
    #[error("Malformed catalog entry: {0}")]
    CatalogEntry(String),

    /// A data source (helpdesk webhook, catalog URL) failed. Fatal: the run
    /// aborts before classification starts.
    #[error("Data source error: {0}")]
    Source(String),

    /// The inference endpoint returned a non-success HTTP status for one
    /// attempt. Retried by the engine up to its attempt budget.
    #[error("Inference request failed with status {status}: {body}")]
    Inference { status: u16, body: String },

    /// The model answered, but the payload did not decode into the expected
    /// shape (missing fields, confidence out of range, non-JSON content).
    /// Retried by the engine up to its attempt budget.
    #[error("Malformed model answer: {0}")]
    MalformedAnswer(String),

    /// A single ticket could not be classified after exhausting all attempts.
    /// Absorbed by the batch coordinator into a fallback record; never fatal
    /// to the batch.
    #[error("Failed to classify ticket {ticket_id} after {attempts} attempts: {source}")]
    Classification {
        ticket_id: TicketId,
        attempts: u32,
        #[source]
        source: Box<TriageError>,
    },

    /// HTTP client error
    #[error("HTTP request failed: {0}")]
    HttpClient(#[from] reqwest::Error),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Report could not be written.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// General error from anyhow
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl TriageError {
    /// Wrap a per-attempt error as a per-ticket classification failure.
    pub fn classification(ticket_id: TicketId, attempts: u32, source: TriageError) -> Self {
        TriageError::Classification {
            ticket_id,
            attempts,
            source: Box::new(source),
        }
    }
}
