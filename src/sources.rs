//! Upstream data sources: the helpdesk ticket webhook and the service
//! catalog URL.
//!
//! Source failures are fatal to the run; there is nothing to classify
//! without tickets and no taxonomy without the catalog.

use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

use crate::config::ApiConfig;
use crate::domain::catalog::Catalog;
use crate::domain::ticket::Ticket;
use crate::error::{Result, TriageError};

/// Envelope the helpdesk webhook wraps its payload in. The outer HTTP status
/// is not authoritative; the webhook reports its real status in
/// `response_code`.
#[derive(Debug, Deserialize)]
struct HelpdeskEnvelope {
    response_code: u16,
    #[serde(default)]
    data: Option<HelpdeskData>,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct HelpdeskData {
    #[serde(default)]
    requests: Vec<Ticket>,
}

/// Client for the helpdesk webhook serving open tickets.
pub struct HelpdeskClient {
    client: reqwest::Client,
    config: ApiConfig,
}

impl HelpdeskClient {
    pub fn new(config: ApiConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;
        Ok(Self { client, config })
    }

    /// Fetch all open tickets.
    #[tracing::instrument(skip(self))]
    pub async fn fetch_tickets(&self) -> Result<Vec<Ticket>> {
        tracing::info!(
            url = %self.config.helpdesk_webhook_url,
            "Fetching helpdesk tickets"
        );

        let response = self
            .client
            .post(&self.config.helpdesk_webhook_url)
            .json(&json!({
                "api_key": self.config.helpdesk_api_key,
                "api_secret": self.config.helpdesk_api_secret,
            }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(TriageError::Source(format!(
                "helpdesk webhook returned HTTP {}",
                status.as_u16()
            )));
        }

        let envelope: HelpdeskEnvelope = response.json().await?;

        if envelope.response_code == 401 {
            return Err(TriageError::Source(
                "helpdesk authentication failed (401): check HELPDESK_API_KEY and HELPDESK_API_SECRET"
                    .to_string(),
            ));
        }
        if envelope.response_code != 200 || envelope.data.is_none() {
            let detail = envelope
                .message
                .unwrap_or_else(|| format!("code {}", envelope.response_code));
            return Err(TriageError::Source(format!("helpdesk API error: {detail}")));
        }

        let tickets = envelope.data.map(|d| d.requests).unwrap_or_default();
        tracing::info!(count = tickets.len(), "Fetched helpdesk tickets");
        Ok(tickets)
    }
}

/// Client for the service catalog document.
pub struct CatalogClient {
    client: reqwest::Client,
    config: ApiConfig,
}

impl CatalogClient {
    pub fn new(config: ApiConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;
        Ok(Self { client, config })
    }

    /// Fetch and parse the catalog YAML.
    #[tracing::instrument(skip(self))]
    pub async fn fetch_catalog(&self) -> Result<Catalog> {
        tracing::info!(
            url = %self.config.service_catalog_url,
            "Fetching service catalog"
        );

        let response = self
            .client
            .get(&self.config.service_catalog_url)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(TriageError::Source(format!(
                "catalog URL returned HTTP {}",
                status.as_u16()
            )));
        }

        let body = response.text().await?;
        let catalog = Catalog::load_yaml(&body)?;
        tracing::info!(
            categories = catalog.categories().len(),
            entries = catalog.entries().len(),
            "Loaded service catalog"
        );
        Ok(catalog)
    }
}
