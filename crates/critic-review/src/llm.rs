use std::time::Duration;

use async_trait::async_trait;
use critic_core::{BackendConfig, BackendError, BackendErrorKind, CriticError};
use serde::Serialize;
use tracing::{debug, instrument};

/// A text-completion backend that turns a prompt into review text.
#[async_trait]
pub trait ReviewBackend: Send + Sync {
    /// Model identifier used for generation.
    fn model(&self) -> &str;

    /// Issue exactly one completion request for `prompt`.
    ///
    /// # Errors
    ///
    /// Returns a [`BackendError`] on timeout, transport failure, non-2xx
    /// status, or a body without a `response` text field.
    async fn generate(&self, prompt: &str) -> Result<String, BackendError>;
}

/// Reachability of the backend as seen by health checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendHealth {
    /// Answered with a 2xx status.
    Healthy,
    /// Answered, but not with a 2xx status.
    Unhealthy,
    /// Did not answer.
    Unavailable,
}

/// Ollama `/api/generate` client.
///
/// Sends non-streaming requests with the configured sampling options and a
/// whole-request timeout (60 seconds by default). No retries.
///
/// # Examples
///
/// ```
/// use critic_core::BackendConfig;
/// use critic_review::llm::{OllamaClient, ReviewBackend};
///
/// let client = OllamaClient::new(&BackendConfig::default()).unwrap();
/// assert_eq!(client.model(), "llama3.2");
/// ```
pub struct OllamaClient {
    client: reqwest::Client,
    config: BackendConfig,
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    options: GenerateOptions,
}

#[derive(Serialize)]
struct GenerateOptions {
    temperature: f32,
    top_p: f32,
    max_tokens: u32,
}

impl OllamaClient {
    /// Create a client from backend configuration.
    ///
    /// # Errors
    ///
    /// Returns [`CriticError::Config`] for a base URL without an http(s)
    /// scheme, or if the HTTP client cannot be built.
    pub fn new(config: &BackendConfig) -> Result<Self, CriticError> {
        Self::with_timeout(config, Duration::from_secs(config.timeout_secs))
    }

    /// Create a client with an explicit request timeout.
    ///
    /// # Errors
    ///
    /// Same as [`OllamaClient::new`].
    pub fn with_timeout(config: &BackendConfig, timeout: Duration) -> Result<Self, CriticError> {
        let base = config.base_url.trim();
        if !(base.starts_with("http://") || base.starts_with("https://")) {
            return Err(CriticError::Config(format!(
                "invalid backend URL '{}', expected http:// or https://",
                config.base_url
            )));
        }

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| CriticError::Config(format!("failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            config: config.clone(),
        })
    }

    fn url(&self, endpoint: &str) -> String {
        format!("{}{endpoint}", self.config.base_url.trim().trim_end_matches('/'))
    }

    /// Check whether the backend answers on `/api/tags` within five seconds.
    pub async fn ping(&self) -> BackendHealth {
        let response = self
            .client
            .get(self.url("/api/tags"))
            .timeout(Duration::from_secs(5))
            .send()
            .await;
        match response {
            Ok(r) if r.status().is_success() => BackendHealth::Healthy,
            Ok(_) => BackendHealth::Unhealthy,
            Err(_) => BackendHealth::Unavailable,
        }
    }
}

#[async_trait]
impl ReviewBackend for OllamaClient {
    fn model(&self) -> &str {
        &self.config.model
    }

    #[instrument(skip_all, fields(model = %self.config.model, prompt_chars = prompt.len()))]
    async fn generate(&self, prompt: &str) -> Result<String, BackendError> {
        let url = self.url("/api/generate");
        let body = GenerateRequest {
            model: &self.config.model,
            prompt,
            stream: false,
            options: GenerateOptions {
                temperature: self.config.temperature,
                top_p: self.config.top_p,
                max_tokens: self.config.max_tokens,
            },
        };

        debug!("POST {url}");
        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(request_error)?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let snippet: String = text.chars().take(240).collect();
            return Err(BackendError::new(
                BackendErrorKind::Status,
                format!("{status}: {snippet}"),
            ));
        }

        let response_body: serde_json::Value = response.json().await.map_err(|e| {
            if e.is_timeout() {
                request_error(e)
            } else {
                BackendError::new(
                    BackendErrorKind::MalformedResponse,
                    format!("failed to parse response: {e}"),
                )
            }
        })?;

        response_body
            .get("response")
            .and_then(|r| r.as_str())
            .map(str::to_string)
            .ok_or_else(|| {
                BackendError::new(
                    BackendErrorKind::MalformedResponse,
                    format!("missing `response` field in {response_body}"),
                )
            })
    }
}

fn request_error(e: reqwest::Error) -> BackendError {
    if e.is_timeout() {
        BackendError::new(BackendErrorKind::Timeout, format!("request timed out: {e}"))
    } else {
        BackendError::new(BackendErrorKind::Transport, format!("request failed: {e}"))
    }
}
