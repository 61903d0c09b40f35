//! Per-ticket classification lifecycle using the typestate pattern.
//!
//! Each ticket progresses through distinct states, enforced at compile time:
//!
//! ```text
//! Classification<Pending> ──model_called()──> Classification<ModelCalled>
//!                                                    │
//!                                              resolve(catalog)
//!                                                    │
//!                                        Classification<Labeled>
//!                                   (Resolved | PartiallyResolved | Unresolved)
//!                                                    │
//!                                             finalize(catalog)
//!                                                    │
//!                                           ClassificationRecord
//! ```
//!
//! A terminal record is always reached from a structurally valid answer;
//! resolution never fails, it degrades. Tickets whose model call exhausts its
//! retry budget bypass this lifecycle entirely via
//! [`ClassificationRecord::fallback`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::catalog::{Catalog, Sla};
use crate::domain::ticket::{Ticket, TicketId};
use crate::error::{Result, TriageError};
use crate::matcher;

/// Category assigned when the model's answer cannot be resolved against the
/// catalog at all.
pub const FALLBACK_CATEGORY: &str = "Other/Uncategorized";

/// Sentinel request type for category-only classifications.
pub const UNSPECIFIED_TYPE: &str = "Unspecified";

/// Confidence penalty applied when only the category resolved.
const PARTIAL_CONFIDENCE_FACTOR: f64 = 0.5;

/// Untyped structured output returned by the model for one ticket, before
/// validation. Discarded once resolved into a [`ClassificationRecord`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawModelAnswer {
    pub category: String,
    pub request_type: String,
    pub confidence: f64,
    #[serde(default)]
    pub reasoning: Option<String>,
}

impl RawModelAnswer {
    /// Validate the answer's shape before trusting it.
    ///
    /// The inference payload is never trusted: labels must be non-empty and
    /// the confidence must be a finite number in `[0, 1]`.
    pub fn validate(&self) -> Result<()> {
        if self.category.trim().is_empty() {
            return Err(TriageError::MalformedAnswer(
                "empty category".to_string(),
            ));
        }
        if self.request_type.trim().is_empty() {
            return Err(TriageError::MalformedAnswer(
                "empty request type".to_string(),
            ));
        }
        if !self.confidence.is_finite() || !(0.0..=1.0).contains(&self.confidence) {
            return Err(TriageError::MalformedAnswer(format!(
                "confidence {} out of range [0, 1]",
                self.confidence
            )));
        }
        Ok(())
    }
}

/// How far the model's answer could be resolved against the catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Resolution {
    /// Category and request type both resolved.
    Resolved,
    /// Category resolved, request type fell back to the sentinel.
    PartiallyResolved,
    /// Nothing resolved; forced to the fallback category.
    Unresolved,
}

impl Resolution {
    pub fn as_str(&self) -> &'static str {
        match self {
            Resolution::Resolved => "resolved",
            Resolution::PartiallyResolved => "partially_resolved",
            Resolution::Unresolved => "unresolved",
        }
    }
}

/// Marker trait for valid classification states.
pub trait ClassificationState: Send + Sync {}

/// A ticket moving through the classification lifecycle.
///
/// The generic parameter `S` is the current state; operations are only
/// available in the states where they are valid.
#[derive(Debug, Clone)]
pub struct Classification<S: ClassificationState> {
    pub ticket: Ticket,
    pub state: S,
}

/// Ticket accepted for classification, model not yet consulted.
#[derive(Debug, Clone)]
pub struct Pending;

impl ClassificationState for Pending {}

/// Model answered with a structurally valid payload.
#[derive(Debug, Clone)]
pub struct ModelCalled {
    pub answer: RawModelAnswer,
}

impl ClassificationState for ModelCalled {}

/// Answer resolved against the catalog (possibly degraded).
#[derive(Debug, Clone)]
pub struct Labeled {
    pub category: String,
    pub request_type: String,
    pub confidence: f64,
    pub reasoning: Option<String>,
    pub matched_exactly: bool,
    pub resolution: Resolution,
}

impl ClassificationState for Labeled {}

impl Classification<Pending> {
    pub fn new(ticket: Ticket) -> Self {
        Classification {
            ticket,
            state: Pending,
        }
    }

    /// Record a validated model answer.
    pub fn model_called(self, answer: RawModelAnswer) -> Classification<ModelCalled> {
        Classification {
            ticket: self.ticket,
            state: ModelCalled { answer },
        }
    }
}

impl Classification<ModelCalled> {
    /// Resolve the raw answer against the catalog.
    ///
    /// The category is matched against the full category set; the request
    /// type is then matched only within the resolved category's request
    /// types. A request type from a different category never bleeds in, even
    /// if the raw text would match it.
    pub fn resolve(self, catalog: &Catalog) -> Classification<Labeled> {
        let answer = self.state.answer;
        let ticket_id = &self.ticket.id;

        let category_match = matcher::resolve(&answer.category, catalog.categories());

        let labeled = match category_match {
            None => {
                tracing::warn!(
                    ticket_id = %ticket_id,
                    raw_category = %answer.category,
                    "Category not in catalog, forcing fallback classification"
                );
                Labeled {
                    category: FALLBACK_CATEGORY.to_string(),
                    request_type: UNSPECIFIED_TYPE.to_string(),
                    confidence: 0.0,
                    reasoning: answer.reasoning,
                    matched_exactly: false,
                    resolution: Resolution::Unresolved,
                }
            }
            Some(category) => {
                let type_match =
                    matcher::resolve(&answer.request_type, catalog.request_types_of(&category.label));

                match type_match {
                    Some(request_type) => Labeled {
                        matched_exactly: category.exact && request_type.exact,
                        category: category.label,
                        request_type: request_type.label,
                        confidence: answer.confidence,
                        reasoning: answer.reasoning,
                        resolution: Resolution::Resolved,
                    },
                    None => {
                        tracing::debug!(
                            ticket_id = %ticket_id,
                            category = %category.label,
                            raw_request_type = %answer.request_type,
                            "Request type not under resolved category, degrading to category-only"
                        );
                        Labeled {
                            category: category.label,
                            request_type: UNSPECIFIED_TYPE.to_string(),
                            confidence: answer.confidence * PARTIAL_CONFIDENCE_FACTOR,
                            reasoning: answer.reasoning,
                            matched_exactly: false,
                            resolution: Resolution::PartiallyResolved,
                        }
                    }
                }
            }
        };

        Classification {
            ticket: self.ticket,
            state: labeled,
        }
    }
}

impl Classification<Labeled> {
    /// Attach the SLA and produce the immutable terminal record.
    pub fn finalize(self, catalog: &Catalog) -> ClassificationRecord {
        let sla = catalog.sla_of(&self.state.category, &self.state.request_type);
        ClassificationRecord {
            ticket_id: self.ticket.id,
            category: self.state.category,
            request_type: self.state.request_type,
            sla,
            confidence: self.state.confidence,
            reasoning: self.state.reasoning,
            matched_exactly: self.state.matched_exactly,
            resolution: self.state.resolution,
            classified_at: Utc::now(),
        }
    }
}

/// Final classification for one ticket. Created once, immutable thereafter.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassificationRecord {
    pub ticket_id: TicketId,
    pub category: String,
    pub request_type: String,
    pub sla: Sla,
    pub confidence: f64,
    pub reasoning: Option<String>,
    pub matched_exactly: bool,
    pub resolution: Resolution,
    pub classified_at: DateTime<Utc>,
}

impl ClassificationRecord {
    /// Forced fallback record for a ticket whose classification failed after
    /// all attempts (or was cancelled). Keeps the one-row-per-ticket
    /// guarantee: no ticket silently disappears from the report.
    pub fn fallback(ticket_id: TicketId) -> ClassificationRecord {
        ClassificationRecord {
            ticket_id,
            category: FALLBACK_CATEGORY.to_string(),
            request_type: UNSPECIFIED_TYPE.to_string(),
            sla: Sla::DEFAULT,
            confidence: 0.0,
            reasoning: None,
            matched_exactly: false,
            resolution: Resolution::Unresolved,
            classified_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::catalog::{CatalogEntry, SlaUnit};
    use crate::domain::ticket::TicketId;

    fn catalog() -> Catalog {
        Catalog::from_entries(vec![
            CatalogEntry {
                category: "Security".to_string(),
                request_type: "Report Lost/Stolen Device".to_string(),
                sla: Sla {
                    value: 2,
                    unit: SlaUnit::Hours,
                },
            },
            CatalogEntry {
                category: "Hardware Support".to_string(),
                request_type: "Laptop Repair/Replacement".to_string(),
                sla: Sla {
                    value: 48,
                    unit: SlaUnit::Hours,
                },
            },
        ])
        .unwrap()
    }

    fn ticket() -> Ticket {
        Ticket {
            id: TicketId::from("REQ-100"),
            short_description: "Lost my work phone".to_string(),
            long_description: String::new(),
            requester_email: "user@example.com".to_string(),
        }
    }

    fn classify(answer: RawModelAnswer) -> ClassificationRecord {
        let catalog = catalog();
        Classification::new(ticket())
            .model_called(answer)
            .resolve(&catalog)
            .finalize(&catalog)
    }

    #[test]
    fn exact_answer_resolves_fully() {
        let record = classify(RawModelAnswer {
            category: "Security".to_string(),
            request_type: "Report Lost/Stolen Device".to_string(),
            confidence: 0.95,
            reasoning: Some("Lost device is a security incident".to_string()),
        });

        assert_eq!(record.category, "Security");
        assert_eq!(record.request_type, "Report Lost/Stolen Device");
        assert_eq!(record.resolution, Resolution::Resolved);
        assert!(record.matched_exactly);
        assert_eq!(record.confidence, 0.95);
        assert_eq!(record.sla.value, 2);
    }

    #[test]
    fn fuzzy_answer_resolves_without_exact_flag() {
        let record = classify(RawModelAnswer {
            category: "Hardwre Suport".to_string(),
            request_type: "Laptop Repair/Replacement".to_string(),
            confidence: 0.8,
            reasoning: None,
        });

        assert_eq!(record.category, "Hardware Support");
        assert_eq!(record.resolution, Resolution::Resolved);
        assert!(!record.matched_exactly);
    }

    #[test]
    fn unknown_request_type_degrades_to_category_only() {
        let record = classify(RawModelAnswer {
            category: "Security".to_string(),
            request_type: "Quantum Encryption Reset".to_string(),
            confidence: 0.9,
            reasoning: None,
        });

        assert_eq!(record.category, "Security");
        assert_eq!(record.request_type, UNSPECIFIED_TYPE);
        assert_eq!(record.resolution, Resolution::PartiallyResolved);
        assert!(!record.matched_exactly);
        assert!((record.confidence - 0.45).abs() < 1e-9, "confidence halved");
        // The sentinel pair has no catalog SLA, so the default applies.
        assert_eq!(record.sla, Sla::DEFAULT);
    }

    #[test]
    fn request_type_never_bleeds_across_categories() {
        // "Laptop Repair/Replacement" exists, but under Hardware Support.
        let record = classify(RawModelAnswer {
            category: "Security".to_string(),
            request_type: "Laptop Repair/Replacement".to_string(),
            confidence: 0.9,
            reasoning: None,
        });

        assert_eq!(record.category, "Security");
        assert_eq!(record.request_type, UNSPECIFIED_TYPE);
        assert_eq!(record.resolution, Resolution::PartiallyResolved);
    }

    #[test]
    fn unknown_category_forces_fallback() {
        let record = classify(RawModelAnswer {
            category: "Laptop Issues".to_string(),
            request_type: "Broken Screen".to_string(),
            confidence: 0.9,
            reasoning: None,
        });

        assert_eq!(record.category, FALLBACK_CATEGORY);
        assert_eq!(record.request_type, UNSPECIFIED_TYPE);
        assert_eq!(record.confidence, 0.0);
        assert_eq!(record.resolution, Resolution::Unresolved);
        assert!(!record.matched_exactly);
    }

    #[test]
    fn validate_rejects_out_of_range_confidence() {
        let answer = RawModelAnswer {
            category: "Security".to_string(),
            request_type: "Phishing Report".to_string(),
            confidence: 1.3,
            reasoning: None,
        };
        assert!(matches!(
            answer.validate().unwrap_err(),
            TriageError::MalformedAnswer(_)
        ));
    }

    #[test]
    fn validate_rejects_empty_labels() {
        let answer = RawModelAnswer {
            category: "  ".to_string(),
            request_type: "Phishing Report".to_string(),
            confidence: 0.5,
            reasoning: None,
        };
        assert!(answer.validate().is_err());
    }

    #[test]
    fn fallback_record_keeps_ticket_identity() {
        let record = ClassificationRecord::fallback(TicketId::from("REQ-9"));
        assert_eq!(record.ticket_id, TicketId::from("REQ-9"));
        assert_eq!(record.category, FALLBACK_CATEGORY);
        assert_eq!(record.confidence, 0.0);
        assert_eq!(record.sla, Sla::DEFAULT);
    }
}
