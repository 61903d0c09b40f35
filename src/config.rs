//! Runtime configuration, loaded from the environment.
//!
//! Every knob has a default so tests can build configs inline; `validate`
//! reports everything missing at once instead of failing on the first field.

use std::env;
use std::path::PathBuf;

/// Upstream data source endpoints.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Helpdesk webhook that serves the open tickets.
    pub helpdesk_webhook_url: String,
    /// Credentials sent in the webhook payload.
    pub helpdesk_api_key: String,
    pub helpdesk_api_secret: String,
    /// URL of the service catalog YAML document.
    pub service_catalog_url: String,
    /// Per-request timeout for source fetches, in seconds.
    pub request_timeout_secs: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            helpdesk_webhook_url: String::new(),
            helpdesk_api_key: String::new(),
            helpdesk_api_secret: String::new(),
            service_catalog_url: String::new(),
            request_timeout_secs: 30,
        }
    }
}

impl ApiConfig {
    pub fn from_env() -> Self {
        Self {
            helpdesk_webhook_url: env_string("HELPDESK_WEBHOOK_URL", ""),
            helpdesk_api_key: env_string("HELPDESK_API_KEY", ""),
            helpdesk_api_secret: env_string("HELPDESK_API_SECRET", ""),
            service_catalog_url: env_string("SERVICE_CATALOG_URL", ""),
            request_timeout_secs: env_parse("REQUEST_TIMEOUT", 30),
        }
    }
}

/// Inference endpoint configuration.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    /// Base URL of an OpenAI-compatible API (`/chat/completions` appended).
    pub base_url: String,
    pub api_key: String,
    pub model: String,
    /// Kept low so repeated runs on the same ticket stay stable.
    pub temperature: f64,
    pub max_tokens: u32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            api_key: String::new(),
            model: "gpt-4o-mini".to_string(),
            temperature: 0.0,
            max_tokens: 500,
        }
    }
}

impl LlmConfig {
    pub fn from_env() -> Self {
        Self {
            base_url: env_string("OPENAI_API_BASE", "https://api.openai.com/v1"),
            api_key: env_string("OPENAI_API_KEY", ""),
            model: env_string("LLM_MODEL", "gpt-4o-mini"),
            temperature: env_parse("LLM_TEMPERATURE", 0.0),
            max_tokens: env_parse("LLM_MAX_TOKENS", 500),
        }
    }
}

/// Per-ticket classification behavior: attempt budget and backoff shape.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Total attempts per ticket, including the first.
    pub max_attempts: u32,
    /// Base backoff in milliseconds, exponentially increased per retry.
    pub backoff_ms: u64,
    /// Factor by which backoff_ms grows with each retry.
    pub backoff_factor: u64,
    /// Cap on the computed backoff.
    pub max_backoff_ms: u64,
    /// Timeout for one inference call, in milliseconds.
    pub timeout_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_ms: 1000,
            backoff_factor: 2,
            max_backoff_ms: 10000,
            timeout_ms: 30000,
        }
    }
}

impl EngineConfig {
    pub fn from_env() -> Self {
        Self {
            max_attempts: env_parse("LLM_MAX_RETRIES", 3),
            backoff_ms: env_parse("LLM_BACKOFF_MS", 1000),
            backoff_factor: env_parse("LLM_BACKOFF_FACTOR", 2),
            max_backoff_ms: env_parse("LLM_MAX_BACKOFF_MS", 10000),
            timeout_ms: env_parse("LLM_TIMEOUT_MS", 30000),
        }
    }
}

/// Batch-level throughput controls.
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// Maximum classifications in flight at once.
    pub max_concurrency: usize,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self { max_concurrency: 5 }
    }
}

impl CoordinatorConfig {
    pub fn from_env() -> Self {
        Self {
            max_concurrency: env_parse("CLASSIFICATION_BATCH_SIZE", 5),
        }
    }
}

/// Report output location.
#[derive(Debug, Clone)]
pub struct OutputConfig {
    pub output_dir: PathBuf,
    pub report_filename: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("./output"),
            report_filename: "classified_tickets.csv".to_string(),
        }
    }
}

impl OutputConfig {
    pub fn from_env() -> Self {
        Self {
            output_dir: PathBuf::from(env_string("OUTPUT_DIR", "./output")),
            report_filename: env_string("REPORT_FILENAME", "classified_tickets.csv"),
        }
    }

    /// Full path to the report file.
    pub fn report_path(&self) -> PathBuf {
        self.output_dir.join(&self.report_filename)
    }
}

/// Aggregated application configuration.
#[derive(Debug, Clone, Default)]
pub struct AppConfig {
    pub api: ApiConfig,
    pub llm: LlmConfig,
    pub engine: EngineConfig,
    pub coordinator: CoordinatorConfig,
    pub output: OutputConfig,
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self {
            api: ApiConfig::from_env(),
            llm: LlmConfig::from_env(),
            engine: EngineConfig::from_env(),
            coordinator: CoordinatorConfig::from_env(),
            output: OutputConfig::from_env(),
        }
    }

    /// Validate the configuration, returning every problem found.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.api.helpdesk_webhook_url.is_empty() {
            errors.push("HELPDESK_WEBHOOK_URL is required".to_string());
        }
        if self.api.helpdesk_api_key.is_empty() {
            errors.push("HELPDESK_API_KEY is required".to_string());
        }
        if self.api.service_catalog_url.is_empty() {
            errors.push("SERVICE_CATALOG_URL is required".to_string());
        }
        if self.llm.api_key.is_empty() {
            errors.push("OPENAI_API_KEY is required for classification".to_string());
        }
        if self.engine.max_attempts == 0 {
            errors.push("LLM_MAX_RETRIES must be at least 1".to_string());
        }
        if self.coordinator.max_concurrency == 0 {
            errors.push("CLASSIFICATION_BATCH_SIZE must be at least 1".to_string());
        }

        errors
    }
}

fn env_string(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
