//! Inference client abstraction for the classification model.
//!
//! This module defines the `InferenceClient` trait to abstract the chat
//! completion call, enabling testability with mock implementations.

use async_trait::async_trait;
use serde_json::json;
use std::time::Duration;

use crate::config::LlmConfig;
use crate::domain::classification::RawModelAnswer;
use crate::domain::ticket::TicketId;
use crate::error::{Result, TriageError};

/// One classification call to the model.
#[derive(Debug, Clone)]
pub struct InferenceRequest {
    /// Ticket being classified; used for call correlation and logging.
    pub ticket_id: TicketId,
    pub system_prompt: String,
    pub user_prompt: String,
}

/// Raw response from the inference endpoint.
///
/// Status and body are returned as-is; the caller decides what a given
/// status means (retry, fail, parse).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InferenceResponse {
    pub status: u16,
    pub body: String,
}

/// Trait for executing classification calls.
///
/// This abstraction allows different implementations (production vs. testing)
/// and makes the engine and coordinator testable without a live endpoint.
#[async_trait]
pub trait InferenceClient: Send + Sync + Clone {
    /// Execute one chat completion call.
    ///
    /// # Errors
    /// Returns an error if the request fails at the transport level (network
    /// failure, timeout). A non-success HTTP status is NOT an error here; it
    /// comes back in the response for the caller to interpret.
    async fn complete(
        &self,
        request: &InferenceRequest,
        timeout_ms: u64,
    ) -> Result<InferenceResponse>;
}

/// Extract the model's structured answer from a chat completion body.
///
/// The body is expected to be an OpenAI-style completion whose first choice
/// carries a JSON object in `message.content`. Code fences around the JSON
/// are tolerated; anything else is a malformed answer.
pub fn parse_answer(body: &str) -> Result<RawModelAnswer> {
    let completion: serde_json::Value = serde_json::from_str(body)
        .map_err(|e| TriageError::MalformedAnswer(format!("completion is not JSON: {e}")))?;

    let content = completion
        .pointer("/choices/0/message/content")
        .and_then(|v| v.as_str())
        .ok_or_else(|| {
            TriageError::MalformedAnswer("completion has no message content".to_string())
        })?;

    let content = content
        .trim()
        .trim_start_matches("```json")
        .trim_start_matches("```")
        .trim_end_matches("```")
        .trim();

    let answer: RawModelAnswer = serde_json::from_str(content)
        .map_err(|e| TriageError::MalformedAnswer(format!("answer is not valid JSON: {e}")))?;
    answer.validate()?;
    Ok(answer)
}

// ============================================================================
// Production implementation using reqwest
// ============================================================================

/// Production client calling an OpenAI-compatible chat completions endpoint.
#[derive(Clone)]
pub struct OpenAiClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    temperature: f64,
    max_tokens: u32,
}

impl OpenAiClient {
    pub fn new(config: &LlmConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        }
    }
}

#[async_trait]
impl InferenceClient for OpenAiClient {
    #[tracing::instrument(skip(self, request), fields(ticket_id = %request.ticket_id, model = %self.model))]
    async fn complete(
        &self,
        request: &InferenceRequest,
        timeout_ms: u64,
    ) -> Result<InferenceResponse> {
        let url = format!("{}/chat/completions", self.base_url);

        let body = json!({
            "model": self.model,
            "temperature": self.temperature,
            "max_tokens": self.max_tokens,
            "response_format": {"type": "json_object"},
            "messages": [
                {"role": "system", "content": request.system_prompt},
                {"role": "user", "content": request.user_prompt},
            ],
        });

        tracing::debug!(url = %url, timeout_ms = timeout_ms, "Executing inference request");

        let mut req = self
            .client
            .post(&url)
            .timeout(Duration::from_millis(timeout_ms))
            .header("Content-Type", "application/json")
            .json(&body);

        if !self.api_key.is_empty() {
            req = req.header("Authorization", format!("Bearer {}", self.api_key));
        }

        let response = req.send().await.map_err(|e| {
            tracing::error!(
                ticket_id = %request.ticket_id,
                url = %url,
                error = %e,
                "Inference request failed"
            );
            e
        })?;

        let status = response.status().as_u16();
        let body = response.text().await?;

        tracing::debug!(
            ticket_id = %request.ticket_id,
            status = status,
            response_len = body.len(),
            "Inference request completed"
        );

        Ok(InferenceResponse { status, body })
    }
}

// ============================================================================
// Test/Mock implementation
// ============================================================================

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::oneshot;

/// Mock inference client for testing.
///
/// Responses are queued per ticket id and served FIFO, optionally gated on a
/// manual trigger so tests can hold calls in flight and observe concurrency.
#[derive(Clone, Default)]
pub struct MockInferenceClient {
    responses: Arc<Mutex<HashMap<String, Vec<MockResponse>>>>,
    calls: Arc<Mutex<Vec<MockCall>>>,
    in_flight: Arc<AtomicUsize>,
}

enum MockResponse {
    Immediate(Result<InferenceResponse>),
    Triggered {
        response: Result<InferenceResponse>,
        trigger: Arc<Mutex<Option<oneshot::Receiver<()>>>>,
    },
}

/// Record of a call made to the mock client.
#[derive(Debug, Clone)]
pub struct MockCall {
    pub ticket_id: TicketId,
    pub user_prompt: String,
    pub timeout_ms: u64,
}

impl MockInferenceClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a response for a ticket id. Multiple responses for the same id
    /// are served in FIFO order, one per call.
    pub fn add_response(&self, ticket_id: &str, response: Result<InferenceResponse>) {
        self.responses
            .lock()
            .entry(ticket_id.to_string())
            .or_default()
            .push(MockResponse::Immediate(response));
    }

    /// Queue a successful completion whose message content is `answer_json`.
    pub fn add_answer(&self, ticket_id: &str, answer_json: &str) {
        let body = json!({
            "choices": [{"message": {"role": "assistant", "content": answer_json}}]
        });
        self.add_response(
            ticket_id,
            Ok(InferenceResponse {
                status: 200,
                body: body.to_string(),
            }),
        );
    }

    /// Queue a response that completes only after the returned sender fires
    /// (or is dropped).
    pub fn add_response_with_trigger(
        &self,
        ticket_id: &str,
        response: Result<InferenceResponse>,
    ) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        self.responses
            .lock()
            .entry(ticket_id.to_string())
            .or_default()
            .push(MockResponse::Triggered {
                response,
                trigger: Arc::new(Mutex::new(Some(rx))),
            });
        tx
    }

    pub fn get_calls(&self) -> Vec<MockCall> {
        self.calls.lock().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    /// Number of calls currently executing. Useful for asserting concurrency
    /// limits and cancellation behavior.
    pub fn in_flight_count(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl InferenceClient for MockInferenceClient {
    async fn complete(
        &self,
        request: &InferenceRequest,
        timeout_ms: u64,
    ) -> Result<InferenceResponse> {
        self.in_flight.fetch_add(1, Ordering::SeqCst);

        // Guard so the counter drops even if the task is cancelled.
        let in_flight = self.in_flight.clone();
        let _guard = InFlightGuard { in_flight };

        self.calls.lock().push(MockCall {
            ticket_id: request.ticket_id.clone(),
            user_prompt: request.user_prompt.clone(),
            timeout_ms,
        });

        let mock_response = {
            let mut responses = self.responses.lock();
            match responses.get_mut(&*request.ticket_id) {
                Some(queue) if !queue.is_empty() => Some(queue.remove(0)),
                _ => None,
            }
        };

        match mock_response {
            Some(MockResponse::Immediate(response)) => response,
            Some(MockResponse::Triggered { response, trigger }) => {
                let rx = trigger.lock().take();
                if let Some(rx) = rx {
                    let _ = rx.await;
                }
                response
            }
            None => Err(TriageError::Other(anyhow::anyhow!(
                "No mock response configured for ticket {}",
                request.ticket_id
            ))),
        }
    }
}

struct InFlightGuard {
    in_flight: Arc<AtomicUsize>,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}
