//! LLM-based triage for IT helpdesk tickets.
//!
//! This crate fetches open tickets and a service catalog, classifies each
//! ticket into a catalog category and request type via a chat completion
//! model, and writes a sorted triage report. Model output is validated and
//! fuzzily resolved against the catalog; tickets that cannot be classified
//! degrade to a fallback category rather than failing the batch.

pub mod config;
pub mod coordinator;
pub mod domain;
pub mod engine;
pub mod error;
pub mod inference;
pub mod matcher;
pub mod prompt;
pub mod report;
pub mod sources;

// Re-export commonly used types
pub use config::{ApiConfig, AppConfig, CoordinatorConfig, EngineConfig, LlmConfig, OutputConfig};
pub use coordinator::{BatchCoordinator, BatchOutcome, BatchProgress};
pub use domain::catalog::{Catalog, CatalogEntry, Sla, SlaUnit};
pub use domain::classification::{
    ClassificationRecord, RawModelAnswer, Resolution, FALLBACK_CATEGORY, UNSPECIFIED_TYPE,
};
pub use domain::ticket::{Ticket, TicketId};
pub use engine::ClassificationEngine;
pub use error::{Result, TriageError};
pub use inference::{
    InferenceClient, InferenceRequest, InferenceResponse, MockInferenceClient, OpenAiClient,
};
pub use sources::{CatalogClient, HelpdeskClient};
