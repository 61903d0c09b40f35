//! Batch coordinator: fans a set of tickets out to the classification
//! engine under a concurrency cap and collects results in input order.
//!
//! Per-ticket failure never fails the batch; a ticket whose classification
//! exhausts its attempts (or is cancelled mid-flight) is absorbed as a
//! fallback record so the output always has exactly one record per input
//! ticket, in input order.

use metrics::{counter, gauge};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{watch, Semaphore};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::config::CoordinatorConfig;
use crate::domain::classification::ClassificationRecord;
use crate::domain::ticket::Ticket;
use crate::engine::ClassificationEngine;
use crate::inference::InferenceClient;

/// Snapshot of batch progress, published after every completed ticket.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchProgress {
    pub total: usize,
    pub completed: usize,
    pub classified: usize,
    pub fallbacks: usize,
}

/// Result of one batch run.
#[derive(Debug)]
pub struct BatchOutcome {
    /// One record per input ticket, in input order.
    pub records: Vec<ClassificationRecord>,
    /// How many of those records are forced fallbacks.
    pub fallback_count: usize,
    /// True when the run was cut short by cancellation.
    pub cancelled: bool,
}

impl BatchOutcome {
    /// True when every ticket in a non-empty, non-cancelled batch failed.
    /// This usually means the inference endpoint was unreachable for the
    /// whole run, which the caller should treat as fatal.
    pub fn all_failed(&self) -> bool {
        !self.records.is_empty() && !self.cancelled && self.fallback_count == self.records.len()
    }
}

/// Runs batches of classifications with bounded concurrency.
pub struct BatchCoordinator<C: InferenceClient + 'static> {
    engine: ClassificationEngine<C>,
    max_concurrency: usize,
    cancel: CancellationToken,
    progress_tx: watch::Sender<BatchProgress>,
}

impl<C: InferenceClient + 'static> BatchCoordinator<C> {
    pub fn new(engine: ClassificationEngine<C>, config: CoordinatorConfig) -> Self {
        let (progress_tx, _) = watch::channel(BatchProgress::default());
        Self {
            engine,
            max_concurrency: config.max_concurrency.max(1),
            cancel: CancellationToken::new(),
            progress_tx,
        }
    }

    /// Token that cancels the in-progress batch when triggered. Completed
    /// results are kept; unfinished tickets become fallback records.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Subscribe to progress updates for the current batch.
    pub fn progress(&self) -> watch::Receiver<BatchProgress> {
        self.progress_tx.subscribe()
    }

    /// Classify every ticket in the batch.
    ///
    /// Never fails: classification errors and cancellation degrade affected
    /// tickets to fallback records instead of propagating.
    pub async fn classify_batch(&self, tickets: Vec<Ticket>) -> BatchOutcome {
        let batch_id = Uuid::new_v4();
        let total = tickets.len();
        tracing::info!(
            batch_id = %batch_id,
            total = total,
            max_concurrency = self.max_concurrency,
            "Starting batch classification"
        );

        // Input-order ids, used to backfill any slot a task never filled.
        let ticket_ids: Vec<_> = tickets.iter().map(|t| t.id.clone()).collect();
        let mut slots: Vec<Option<ClassificationRecord>> = Vec::with_capacity(total);
        slots.resize_with(total, || None);

        let semaphore = Arc::new(Semaphore::new(self.max_concurrency));
        let in_flight = Arc::new(AtomicUsize::new(0));
        let mut join_set: JoinSet<(usize, ClassificationRecord, bool)> = JoinSet::new();

        for (index, ticket) in tickets.into_iter().enumerate() {
            let engine = self.engine.clone();
            let semaphore = semaphore.clone();
            let cancel = self.cancel.clone();
            let in_flight = in_flight.clone();

            join_set.spawn(async move {
                let ticket_id = ticket.id.clone();

                let permit = tokio::select! {
                    _ = cancel.cancelled() => {
                        return (index, ClassificationRecord::fallback(ticket_id), true);
                    }
                    permit = semaphore.acquire_owned() => match permit {
                        Ok(permit) => permit,
                        Err(_) => {
                            return (index, ClassificationRecord::fallback(ticket_id), true);
                        }
                    },
                };
                // Permit is held for the duration of this task.
                let _permit = permit;

                in_flight.fetch_add(1, Ordering::Relaxed);
                gauge!("triage_in_flight").increment(1.0);
                let _guard = scopeguard::guard(in_flight, |in_flight| {
                    in_flight.fetch_sub(1, Ordering::Relaxed);
                    gauge!("triage_in_flight").decrement(1.0);
                });

                tokio::select! {
                    _ = cancel.cancelled() => {
                        tracing::warn!(ticket_id = %ticket_id, "Cancelled mid-classification, absorbing as fallback");
                        (index, ClassificationRecord::fallback(ticket_id), true)
                    }
                    result = engine.classify(ticket) => match result {
                        Ok(record) => (index, record, false),
                        Err(e) => {
                            tracing::error!(
                                ticket_id = %ticket_id,
                                error = %e,
                                "Classification failed after all attempts, absorbing as fallback"
                            );
                            (index, ClassificationRecord::fallback(ticket_id), true)
                        }
                    }
                }
            });
        }

        let mut progress = BatchProgress {
            total,
            ..BatchProgress::default()
        };
        let mut fallback_count = 0;

        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok((index, record, is_fallback)) => {
                    if is_fallback {
                        fallback_count += 1;
                        progress.fallbacks += 1;
                        counter!("triage_batch_fallback_total").increment(1);
                    } else {
                        progress.classified += 1;
                    }
                    progress.completed += 1;
                    slots[index] = Some(record);
                    self.progress_tx.send_replace(progress);
                }
                Err(e) => {
                    // Panicked task; its slot is backfilled below.
                    tracing::error!(batch_id = %batch_id, error = %e, "Classification task aborted");
                }
            }
        }

        let records: Vec<ClassificationRecord> = slots
            .into_iter()
            .zip(ticket_ids)
            .map(|(slot, ticket_id)| match slot {
                Some(record) => record,
                None => {
                    fallback_count += 1;
                    counter!("triage_batch_fallback_total").increment(1);
                    ClassificationRecord::fallback(ticket_id)
                }
            })
            .collect();

        let cancelled = self.cancel.is_cancelled();
        tracing::info!(
            batch_id = %batch_id,
            total = total,
            fallbacks = fallback_count,
            cancelled = cancelled,
            "Batch classification finished"
        );

        BatchOutcome {
            records,
            fallback_count,
            cancelled,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::domain::catalog::{Catalog, CatalogEntry, Sla, SlaUnit};
    use crate::domain::classification::{Resolution, FALLBACK_CATEGORY};
    use crate::domain::ticket::TicketId;
    use crate::inference::{InferenceResponse, MockInferenceClient};
    use std::time::Duration;

    fn catalog() -> Arc<Catalog> {
        Arc::new(
            Catalog::from_entries(vec![CatalogEntry {
                category: "Security".to_string(),
                request_type: "Phishing Report".to_string(),
                sla: Sla {
                    value: 2,
                    unit: SlaUnit::Hours,
                },
            }])
            .unwrap(),
        )
    }

    fn engine(mock: &MockInferenceClient) -> ClassificationEngine<MockInferenceClient> {
        ClassificationEngine::new(
            mock.clone(),
            catalog(),
            EngineConfig {
                max_attempts: 1,
                backoff_ms: 1,
                backoff_factor: 2,
                max_backoff_ms: 5,
                timeout_ms: 1000,
            },
        )
    }

    fn ticket(id: &str) -> Ticket {
        Ticket {
            id: TicketId::from(id),
            short_description: "Suspicious email".to_string(),
            long_description: String::new(),
            requester_email: "u@example.com".to_string(),
        }
    }

    const ANSWER: &str = r#"{"category": "Security", "request_type": "Phishing Report", "confidence": 0.9, "reasoning": "Phishing."}"#;

    #[tokio::test]
    async fn output_preserves_input_order_and_length() {
        let mock = MockInferenceClient::new();
        for id in ["REQ-1", "REQ-2", "REQ-3"] {
            mock.add_answer(id, ANSWER);
        }

        let coordinator =
            BatchCoordinator::new(engine(&mock), CoordinatorConfig { max_concurrency: 2 });
        let outcome = coordinator
            .classify_batch(vec![ticket("REQ-1"), ticket("REQ-2"), ticket("REQ-3")])
            .await;

        assert_eq!(outcome.records.len(), 3);
        let ids: Vec<_> = outcome.records.iter().map(|r| r.ticket_id.0.as_str()).collect();
        assert_eq!(ids, vec!["REQ-1", "REQ-2", "REQ-3"]);
        assert_eq!(outcome.fallback_count, 0);
        assert!(!outcome.cancelled);
    }

    #[tokio::test]
    async fn failed_ticket_is_absorbed_not_fatal() {
        let mock = MockInferenceClient::new();
        mock.add_answer("REQ-1", ANSWER);
        mock.add_response(
            "REQ-2",
            Ok(InferenceResponse {
                status: 500,
                body: "down".to_string(),
            }),
        );
        mock.add_answer("REQ-3", ANSWER);

        let coordinator =
            BatchCoordinator::new(engine(&mock), CoordinatorConfig { max_concurrency: 3 });
        let outcome = coordinator
            .classify_batch(vec![ticket("REQ-1"), ticket("REQ-2"), ticket("REQ-3")])
            .await;

        assert_eq!(outcome.records.len(), 3);
        assert_eq!(outcome.fallback_count, 1);
        let failed = &outcome.records[1];
        assert_eq!(failed.ticket_id, TicketId::from("REQ-2"));
        assert_eq!(failed.category, FALLBACK_CATEGORY);
        assert_eq!(failed.resolution, Resolution::Unresolved);
        assert_eq!(outcome.records[0].category, "Security");
        assert_eq!(outcome.records[2].category, "Security");
    }

    #[tokio::test]
    async fn concurrency_never_exceeds_limit() {
        let mock = MockInferenceClient::new();
        let triggers: Vec<_> = (1..=4)
            .map(|i| {
                mock.add_response_with_trigger(
                    &format!("REQ-{i}"),
                    Ok(InferenceResponse {
                        status: 200,
                        body: serde_json::json!({
                            "choices": [{"message": {"content": ANSWER}}]
                        })
                        .to_string(),
                    }),
                )
            })
            .collect();

        let coordinator =
            BatchCoordinator::new(engine(&mock), CoordinatorConfig { max_concurrency: 2 });
        let tickets: Vec<Ticket> = (1..=4).map(|i| ticket(&format!("REQ-{i}"))).collect();

        let handle = {
            let coordinator = Arc::new(coordinator);
            let c = coordinator.clone();
            tokio::spawn(async move { c.classify_batch(tickets).await })
        };

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(mock.in_flight_count(), 2, "only two calls may be in flight");

        for trigger in triggers {
            let _ = trigger.send(());
        }
        let outcome = handle.await.unwrap();
        assert_eq!(outcome.records.len(), 4);
        assert_eq!(outcome.fallback_count, 0);
    }

    #[tokio::test]
    async fn cancellation_keeps_completed_results() {
        let mock = MockInferenceClient::new();
        mock.add_answer("REQ-1", ANSWER);
        let blocked = mock.add_response_with_trigger(
            "REQ-2",
            Ok(InferenceResponse {
                status: 200,
                body: "never delivered".to_string(),
            }),
        );

        let coordinator = Arc::new(BatchCoordinator::new(
            engine(&mock),
            CoordinatorConfig { max_concurrency: 2 },
        ));
        let cancel = coordinator.cancellation_token();

        let c = coordinator.clone();
        let handle =
            tokio::spawn(async move { c.classify_batch(vec![ticket("REQ-1"), ticket("REQ-2")]).await });

        // Let REQ-1 finish and REQ-2 block, then cancel.
        tokio::time::sleep(Duration::from_millis(50)).await;
        cancel.cancel();

        let outcome = handle.await.unwrap();
        assert!(outcome.cancelled);
        assert_eq!(outcome.records.len(), 2);
        assert_eq!(outcome.records[0].category, "Security");
        assert_eq!(outcome.records[1].category, FALLBACK_CATEGORY);
        assert_eq!(outcome.fallback_count, 1);
        drop(blocked);
    }

    #[tokio::test]
    async fn progress_reaches_total() {
        let mock = MockInferenceClient::new();
        mock.add_answer("REQ-1", ANSWER);
        mock.add_answer("REQ-2", ANSWER);

        let coordinator =
            BatchCoordinator::new(engine(&mock), CoordinatorConfig { max_concurrency: 1 });
        let progress = coordinator.progress();

        let outcome = coordinator
            .classify_batch(vec![ticket("REQ-1"), ticket("REQ-2")])
            .await;

        assert_eq!(outcome.records.len(), 2);
        let final_progress = *progress.borrow();
        assert_eq!(final_progress.total, 2);
        assert_eq!(final_progress.completed, 2);
        assert_eq!(final_progress.classified, 2);
        assert_eq!(final_progress.fallbacks, 0);
    }

    #[tokio::test]
    async fn total_failure_is_reported_as_all_failed() {
        // No mock responses at all: every attempt errors out.
        let mock = MockInferenceClient::new();
        let coordinator =
            BatchCoordinator::new(engine(&mock), CoordinatorConfig { max_concurrency: 2 });
        let outcome = coordinator
            .classify_batch(vec![ticket("REQ-1"), ticket("REQ-2")])
            .await;

        assert_eq!(outcome.fallback_count, 2);
        assert!(outcome.all_failed());
    }

    #[tokio::test]
    async fn empty_batch_yields_empty_output() {
        let mock = MockInferenceClient::new();
        let coordinator =
            BatchCoordinator::new(engine(&mock), CoordinatorConfig { max_concurrency: 2 });
        let outcome = coordinator.classify_batch(Vec::new()).await;
        assert!(outcome.records.is_empty());
        assert_eq!(outcome.fallback_count, 0);
        assert!(!outcome.cancelled);
        assert!(!outcome.all_failed());
    }
}
