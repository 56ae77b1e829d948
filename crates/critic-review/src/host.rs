//! The hosting-API seam.
//!
//! Everything the pipeline needs from the version-control host goes through
//! [`PullRequestHost`], so the fetcher, publisher and orchestrator can run
//! against an in-memory double in tests while [`crate::github::GitHubClient`]
//! handles real HTTP requests.

use async_trait::async_trait;
use critic_core::{
    ChangedFileEntry, ContentLookup, CriticError, PullRequestInfo, PullRequestRef,
};

/// Hosting API operations consumed by a review run.
#[async_trait]
pub trait PullRequestHost: Send + Sync {
    /// Fetch title, description and head commit of the pull request.
    async fn pull_request(&self, pr: &PullRequestRef) -> Result<PullRequestInfo, CriticError>;

    /// List the files changed by the pull request, in API order.
    async fn changed_files(
        &self,
        pr: &PullRequestRef,
    ) -> Result<Vec<ChangedFileEntry>, CriticError>;

    /// Look up `path` at commit `git_ref`.
    ///
    /// Failures are reported through [`ContentLookup::Error`] rather than a
    /// `Result`, because a failed lookup only degrades a single file.
    async fn file_content(&self, pr: &PullRequestRef, path: &str, git_ref: &str)
        -> ContentLookup;

    /// Append a new conversation comment to the pull request.
    async fn post_comment(&self, pr: &PullRequestRef, body: &str) -> Result<(), CriticError>;
}
