use std::fmt;

/// Errors that can occur across critic.
///
/// Each variant wraps a specific error domain. Library crates use this type
/// directly; the binary surfaces it through `miette` at the boundary.
///
/// # Examples
///
/// ```
/// use critic_core::CriticError;
///
/// let err = CriticError::Config("missing GitHub token".into());
/// assert!(err.to_string().contains("missing GitHub token"));
/// ```
#[derive(Debug, thiserror::Error, miette::Diagnostic)]
pub enum CriticError {
    /// Filesystem I/O failure.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid or missing configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// Hosting API failure (pull request, file list, content, or comment calls).
    #[error("GitHub error: {0}")]
    GitHub(String),

    /// Text-generation backend failure.
    #[error(transparent)]
    Backend(#[from] BackendError),

    /// A review run ended in the failed state.
    #[error("review failed: {0}")]
    Review(String),

    /// The review was cancelled before anything was posted.
    #[error("review cancelled")]
    Cancelled,

    /// TOML deserialization failure.
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
}

/// Classification of a failed backend call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendErrorKind {
    /// The request did not complete within the configured timeout.
    Timeout,
    /// Connection, DNS, or other transport-level failure.
    Transport,
    /// The backend answered with a non-2xx status.
    Status,
    /// The body was not JSON or lacked the `response` field.
    MalformedResponse,
}

impl fmt::Display for BackendErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendErrorKind::Timeout => write!(f, "timeout"),
            BackendErrorKind::Transport => write!(f, "transport"),
            BackendErrorKind::Status => write!(f, "http status"),
            BackendErrorKind::MalformedResponse => write!(f, "malformed response"),
        }
    }
}

/// Structured failure of a single generation request.
///
/// The rendered message always starts with `Error`, which is the text the
/// fallback review comment embeds.
///
/// # Examples
///
/// ```
/// use critic_core::{BackendError, BackendErrorKind};
///
/// let err = BackendError::new(BackendErrorKind::Timeout, "no answer after 60s");
/// assert!(err.to_string().starts_with("Error"));
/// assert_eq!(err.kind, BackendErrorKind::Timeout);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Error calling backend ({kind}): {detail}")]
pub struct BackendError {
    /// What went wrong.
    pub kind: BackendErrorKind,
    /// Human-readable detail (status line, body snippet, transport message).
    pub detail: String,
}

impl BackendError {
    /// Build a backend error from a kind and detail message.
    pub fn new(kind: BackendErrorKind, detail: impl Into<String>) -> Self {
        Self {
            kind,
            detail: detail.into(),
        }
    }
}
