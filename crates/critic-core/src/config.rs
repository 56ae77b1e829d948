use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::CriticError;

/// Top-level configuration loaded from `.critic.toml`.
///
/// Supports layered resolution: CLI flags > env vars > local config > defaults.
/// The library never reads the environment itself; the binary applies
/// [`CriticConfig::with_env_overrides`] once at startup and passes the result
/// down explicitly.
///
/// # Examples
///
/// ```
/// use critic_core::CriticConfig;
///
/// let config = CriticConfig::default();
/// assert_eq!(config.backend.model, "llama3.2");
/// assert_eq!(config.limits.max_file_chars, 2000);
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CriticConfig {
    /// Hosting API settings.
    #[serde(default)]
    pub github: GitHubConfig,
    /// Text-generation backend settings.
    #[serde(default)]
    pub backend: BackendConfig,
    /// Prompt and comment size limits.
    #[serde(default)]
    pub limits: LimitsConfig,
    /// HTTP service settings.
    #[serde(default)]
    pub server: ServerConfig,
}

impl CriticConfig {
    /// Load configuration from a TOML file at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`CriticError::Io`] if the file cannot be read, or
    /// [`CriticError::Toml`] if the content is not valid TOML.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use critic_core::CriticConfig;
    /// use std::path::Path;
    ///
    /// let config = CriticConfig::from_file(Path::new(".critic.toml")).unwrap();
    /// ```
    pub fn from_file(path: &Path) -> Result<Self, CriticError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns [`CriticError::Toml`] if parsing fails.
    ///
    /// # Examples
    ///
    /// ```
    /// use critic_core::CriticConfig;
    ///
    /// let toml = r#"
    /// [backend]
    /// model = "mistral"
    /// "#;
    /// let config = CriticConfig::from_toml(toml).unwrap();
    /// assert_eq!(config.backend.model, "mistral");
    /// ```
    pub fn from_toml(content: &str) -> Result<Self, CriticError> {
        let config: Self = toml::from_str(content)?;
        Ok(config)
    }

    /// Overlay values from an environment lookup.
    ///
    /// Recognised keys: `GITHUB_TOKEN`, `GITHUB_API_URL`, `OLLAMA_URL`,
    /// `OLLAMA_MODEL`. Empty values are ignored.
    ///
    /// # Examples
    ///
    /// ```
    /// use critic_core::CriticConfig;
    ///
    /// let config = CriticConfig::default().with_env_overrides(|key| match key {
    ///     "OLLAMA_MODEL" => Some("codellama".to_string()),
    ///     _ => None,
    /// });
    /// assert_eq!(config.backend.model, "codellama");
    /// ```
    pub fn with_env_overrides<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        if let Some(token) = get("GITHUB_TOKEN") {
            self.github.token = Some(token);
        }
        if let Some(api_base) = get("GITHUB_API_URL") {
            self.github.api_base = api_base;
        }
        if let Some(url) = get("OLLAMA_URL") {
            self.backend.base_url = url;
        }
        if let Some(model) = get("OLLAMA_MODEL") {
            self.backend.model = model;
        }
        self
    }

    /// Pick the token for a run: an explicit one wins over the configured one.
    ///
    /// # Errors
    ///
    /// Returns [`CriticError::Config`] if neither is present.
    ///
    /// # Examples
    ///
    /// ```
    /// use critic_core::CriticConfig;
    ///
    /// let config = CriticConfig::default();
    /// assert_eq!(config.resolve_token(Some("ghp_x")).unwrap(), "ghp_x");
    /// assert!(config.resolve_token(None).is_err());
    /// ```
    pub fn resolve_token(&self, explicit: Option<&str>) -> Result<String, CriticError> {
        explicit
            .filter(|t| !t.trim().is_empty())
            .map(str::to_string)
            .or_else(|| self.github.token.clone().filter(|t| !t.trim().is_empty()))
            .ok_or_else(|| {
                CriticError::Config(
                    "GitHub token not provided. Set GITHUB_TOKEN or pass --token".into(),
                )
            })
    }
}

/// Hosting API configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitHubConfig {
    /// Personal access token used when a request carries none.
    pub token: Option<String>,
    /// REST API base URL.
    #[serde(default = "default_api_base")]
    pub api_base: String,
}

fn default_api_base() -> String {
    "https://api.github.com".into()
}

impl Default for GitHubConfig {
    fn default() -> Self {
        Self {
            token: None,
            api_base: default_api_base(),
        }
    }
}

/// Text-generation backend configuration.
///
/// # Examples
///
/// ```
/// use critic_core::BackendConfig;
///
/// let config = BackendConfig::default();
/// assert_eq!(config.base_url, "http://localhost:11434");
/// assert_eq!(config.temperature, 0.7);
/// assert_eq!(config.top_p, 0.9);
/// assert_eq!(config.max_tokens, 2000);
/// assert_eq!(config.timeout_secs, 60);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    /// Ollama base URL.
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Model identifier.
    #[serde(default = "default_model")]
    pub model: String,
    /// Sampling temperature.
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    /// Nucleus sampling cutoff.
    #[serde(default = "default_top_p")]
    pub top_p: f32,
    /// Upper bound on generated tokens.
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    /// Whole-request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_base_url() -> String {
    "http://localhost:11434".into()
}

fn default_model() -> String {
    "llama3.2".into()
}

fn default_temperature() -> f32 {
    0.7
}

fn default_top_p() -> f32 {
    0.9
}

fn default_max_tokens() -> u32 {
    2000
}

fn default_timeout_secs() -> u64 {
    60
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            model: default_model(),
            temperature: default_temperature(),
            top_p: default_top_p(),
            max_tokens: default_max_tokens(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

/// Character limits applied to prompts and posted comments.
///
/// All counts are in characters, not bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LimitsConfig {
    /// Per-file content cap in the prompt when no patch is available.
    #[serde(default = "default_max_file_chars")]
    pub max_file_chars: usize,
    /// A single-section response longer than this is split by paragraphs.
    #[serde(default = "default_split_threshold")]
    pub split_threshold: usize,
    /// Paragraph packing target for the fallback split.
    #[serde(default = "default_pack_target")]
    pub pack_target: usize,
    /// Summary comment body cap.
    #[serde(default = "default_summary_max_chars")]
    pub summary_max_chars: usize,
}

fn default_max_file_chars() -> usize {
    2000
}

fn default_split_threshold() -> usize {
    1000
}

fn default_pack_target() -> usize {
    800
}

fn default_summary_max_chars() -> usize {
    2000
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_file_chars: default_max_file_chars(),
            split_threshold: default_split_threshold(),
            pack_target: default_pack_target(),
            summary_max_chars: default_summary_max_chars(),
        }
    }
}

/// HTTP service configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Listen address.
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Number of review workers.
    #[serde(default = "default_workers")]
    pub workers: usize,
    /// Maximum queued jobs before submissions are refused.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    /// Finished reviews whose status stays queryable; older ones are evicted.
    #[serde(default = "default_retain_finished")]
    pub retain_finished: usize,
}

fn default_bind() -> String {
    "0.0.0.0:8000".into()
}

fn default_workers() -> usize {
    2
}

fn default_queue_capacity() -> usize {
    32
}

fn default_retain_finished() -> usize {
    256
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            workers: default_workers(),
            queue_capacity: default_queue_capacity(),
            retain_finished: default_retain_finished(),
        }
    }
}
