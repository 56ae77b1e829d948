//! Core types, configuration, and error handling for critic.
//!
//! This crate provides the shared foundation used by the other critic crates:
//! - [`CriticError`]: unified error type using `thiserror`
//! - [`CriticConfig`]: configuration loaded from `.critic.toml`
//! - Shared types: [`PullRequestRef`], [`ChangedFile`], [`FileStatus`],
//!   [`ContentLookup`], [`ReviewComment`], [`OutputFormat`]

mod config;
mod error;
mod types;

pub use config::{BackendConfig, CriticConfig, GitHubConfig, LimitsConfig, ServerConfig};
pub use error::{BackendError, BackendErrorKind, CriticError};
pub use types::{
    ChangedFile, ChangedFileEntry, ContentLookup, FileStatus, OutputFormat, PullRequestInfo,
    PullRequestRef, ReviewComment, CONTENT_UNAVAILABLE, FILE_DELETED,
};

/// A convenience `Result` type for critic operations.
pub type Result<T> = std::result::Result<T, CriticError>;
