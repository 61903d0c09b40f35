//! Classification engine: drives one ticket through model call, validation,
//! catalog resolution, and finalization.
//!
//! Transport failures, non-success HTTP statuses, and malformed answers are
//! all retried with exponential backoff up to the configured attempt budget.
//! Backoff delay is `backoff_ms * (factor ^ retry)`, capped at
//! `max_backoff_ms`. A structurally valid answer is never retried; whatever
//! the catalog resolution yields (full, partial, or fallback) is the result.

use metrics::counter;
use std::sync::Arc;
use std::time::Duration;

use crate::config::EngineConfig;
use crate::domain::catalog::Catalog;
use crate::domain::classification::{Classification, ClassificationRecord};
use crate::domain::ticket::Ticket;
use crate::error::{Result, TriageError};
use crate::inference::{parse_answer, InferenceClient, InferenceRequest};
use crate::prompt::{build_user_prompt, SYSTEM_PROMPT};

/// Classifies individual tickets against a fixed catalog.
///
/// Cheap to clone; shares the catalog and client across clones.
#[derive(Clone)]
pub struct ClassificationEngine<C: InferenceClient> {
    client: C,
    catalog: Arc<Catalog>,
    config: EngineConfig,
}

impl<C: InferenceClient> ClassificationEngine<C> {
    pub fn new(client: C, catalog: Arc<Catalog>, config: EngineConfig) -> Self {
        Self {
            client,
            catalog,
            config,
        }
    }

    pub fn catalog(&self) -> &Arc<Catalog> {
        &self.catalog
    }

    /// Classify one ticket end to end.
    ///
    /// # Errors
    /// Returns [`TriageError::Classification`] only after the full attempt
    /// budget is exhausted. The caller decides whether that is fatal; the
    /// batch coordinator absorbs it into a fallback record.
    #[tracing::instrument(skip(self, ticket), fields(ticket_id = %ticket.id))]
    pub async fn classify(&self, ticket: Ticket) -> Result<ClassificationRecord> {
        let request = InferenceRequest {
            ticket_id: ticket.id.clone(),
            system_prompt: SYSTEM_PROMPT.to_string(),
            user_prompt: build_user_prompt(&ticket, &self.catalog),
        };

        let mut last_error = None;

        for attempt in 0..self.config.max_attempts {
            if attempt > 0 {
                let backoff = self.backoff_for(attempt - 1);
                tracing::info!(
                    attempt = attempt + 1,
                    backoff_ms = backoff.as_millis() as u64,
                    "Retrying classification with exponential backoff"
                );
                tokio::time::sleep(backoff).await;
            }

            match self.attempt(&request).await {
                Ok(answer) => {
                    let record = Classification::new(ticket.clone())
                        .model_called(answer)
                        .resolve(&self.catalog)
                        .finalize(&self.catalog);

                    counter!(
                        "triage_classified_total",
                        "resolution" => record.resolution.as_str()
                    )
                    .increment(1);
                    tracing::info!(
                        category = %record.category,
                        request_type = %record.request_type,
                        confidence = record.confidence,
                        resolution = record.resolution.as_str(),
                        attempts = attempt + 1,
                        "Ticket classified"
                    );
                    return Ok(record);
                }
                Err(e) => {
                    counter!(
                        "triage_attempt_failed_total",
                        "kind" => attempt_failure_kind(&e)
                    )
                    .increment(1);
                    tracing::warn!(
                        attempt = attempt + 1,
                        max_attempts = self.config.max_attempts,
                        error = %e,
                        "Classification attempt failed"
                    );
                    last_error = Some(e);
                }
            }
        }

        counter!("triage_classification_failed_total").increment(1);
        let source = last_error.unwrap_or_else(|| {
            TriageError::Other(anyhow::anyhow!("attempt budget is zero"))
        });
        Err(TriageError::classification(
            request.ticket_id,
            self.config.max_attempts,
            source,
        ))
    }

    /// One model call: transport, status check, payload validation.
    async fn attempt(&self, request: &InferenceRequest) -> Result<crate::domain::classification::RawModelAnswer> {
        let response = self
            .client
            .complete(request, self.config.timeout_ms)
            .await?;

        if response.status >= 400 {
            return Err(TriageError::Inference {
                status: response.status,
                body: truncate(&response.body, 512),
            });
        }

        parse_answer(&response.body)
    }

    fn backoff_for(&self, retry: u32) -> Duration {
        let exponential = self
            .config
            .backoff_ms
            .saturating_mul(self.config.backoff_factor.saturating_pow(retry));
        Duration::from_millis(exponential.min(self.config.max_backoff_ms))
    }
}

fn attempt_failure_kind(error: &TriageError) -> &'static str {
    match error {
        TriageError::Inference { .. } => "http_status",
        TriageError::MalformedAnswer(_) => "malformed_answer",
        TriageError::HttpClient(_) => "transport",
        _ => "other",
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.len() <= max {
        s.to_string()
    } else {
        let mut end = max;
        while !s.is_char_boundary(end) {
            end -= 1;
        }
        s[..end].to_string()
    }
}
