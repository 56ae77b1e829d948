use std::fmt;
use std::sync::Arc;

use critic_core::{CriticError, LimitsConfig, PullRequestRef, ReviewComment};
use serde::Serialize;
use tokio::sync::watch;
use tracing::{error, info, instrument};

use crate::fetcher::fetch_changed_files;
use crate::host::PullRequestHost;
use crate::llm::ReviewBackend;
use crate::prompt::build_review_prompt;
use crate::publish::{format_error_comment, format_review_comments, CommentPublisher};
use crate::segment::{segment_response, SegmentLimits};

/// Step of a single review run.
///
/// Runs advance linearly from `Fetching` to `Done`. `Failed` and `Cancelled`
/// can only follow `Fetching` through `Segmenting`: once `Publishing` starts
/// the run always reaches `Done`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ReviewStage {
    Fetching,
    Prompting,
    Generating,
    Segmenting,
    Publishing,
    Done,
    Failed,
    Cancelled,
}

impl fmt::Display for ReviewStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ReviewStage::Fetching => "fetching",
            ReviewStage::Prompting => "prompting",
            ReviewStage::Generating => "generating",
            ReviewStage::Segmenting => "segmenting",
            ReviewStage::Publishing => "publishing",
            ReviewStage::Done => "done",
            ReviewStage::Failed => "failed",
            ReviewStage::Cancelled => "cancelled",
        };
        write!(f, "{s}")
    }
}

/// What a review run did.
///
/// # Examples
///
/// ```
/// use critic_review::pipeline::{ReviewOutcome, ReviewStage};
///
/// let outcome = ReviewOutcome {
///     stage: ReviewStage::Done,
///     failed_at: None,
///     files_reviewed: 1,
///     comments_posted: 2,
///     comments_failed: 0,
///     model: "llama3.2".into(),
///     error: None,
/// };
/// assert!(outcome.is_success());
/// ```
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewOutcome {
    /// Terminal stage: `Done`, `Failed` or `Cancelled`.
    pub stage: ReviewStage,
    /// The step that was running when the review failed or was cancelled.
    pub failed_at: Option<ReviewStage>,
    pub files_reviewed: usize,
    pub comments_posted: usize,
    pub comments_failed: usize,
    /// Model identifier of the backend.
    pub model: String,
    /// Message embedded in the error comment, if the review failed.
    pub error: Option<String>,
}

impl ReviewOutcome {
    /// Whether the run reached `Done`.
    pub fn is_success(&self) -> bool {
        self.stage == ReviewStage::Done
    }
}

struct Draft {
    files_reviewed: usize,
    comments: Vec<ReviewComment>,
}

/// Review orchestrator for a single pull request.
///
/// Fetches the changed files, builds the prompt, makes one backend call,
/// segments the answer and posts it. Any failure posts one error comment
/// instead of a partial review.
pub struct ReviewPipeline {
    host: Arc<dyn PullRequestHost>,
    backend: Arc<dyn ReviewBackend>,
    limits: LimitsConfig,
    cancel: Option<watch::Receiver<bool>>,
}

impl ReviewPipeline {
    pub fn new(
        host: Arc<dyn PullRequestHost>,
        backend: Arc<dyn ReviewBackend>,
        limits: LimitsConfig,
    ) -> Self {
        Self {
            host,
            backend,
            limits,
            cancel: None,
        }
    }

    /// Stop the run at the next stage boundary once `cancel` turns true.
    ///
    /// Calls already in flight finish, and publishing is never interrupted, so
    /// a cancelled run posts nothing at all.
    pub fn with_cancellation(mut self, cancel: watch::Receiver<bool>) -> Self {
        self.cancel = Some(cancel);
        self
    }

    fn checkpoint(&self) -> Result<(), CriticError> {
        match &self.cancel {
            Some(cancel) if *cancel.borrow() => Err(CriticError::Cancelled),
            _ => Ok(()),
        }
    }

    /// Review `pr` and post the result.
    ///
    /// Never returns an error: collaborator failures end in
    /// [`ReviewStage::Failed`] and are reported in the outcome.
    #[instrument(skip_all, fields(pr = %pr, model = self.backend.model()))]
    pub async fn run(&self, pr: &PullRequestRef) -> ReviewOutcome {
        let publisher = CommentPublisher::new(self.host.as_ref());
        let mut stage = ReviewStage::Fetching;

        let drafted = self
            .draft(pr, &mut stage)
            .await
            .and_then(|draft| self.checkpoint().map(|()| draft));

        match drafted {
            Ok(draft) => {
                stage = ReviewStage::Publishing;
                info!(stage = %stage, comments = draft.comments.len(), "posting review");
                let report = publisher.publish(pr, &draft.comments).await;
                stage = ReviewStage::Done;
                info!(stage = %stage, posted = report.posted, failed = report.failed, "review completed");
                ReviewOutcome {
                    stage,
                    failed_at: None,
                    files_reviewed: draft.files_reviewed,
                    comments_posted: report.posted,
                    comments_failed: report.failed,
                    model: self.backend.model().to_string(),
                    error: None,
                }
            }
            Err(CriticError::Cancelled) => {
                info!(cancelled_at = %stage, "review cancelled, nothing posted");
                ReviewOutcome {
                    stage: ReviewStage::Cancelled,
                    failed_at: Some(stage),
                    files_reviewed: 0,
                    comments_posted: 0,
                    comments_failed: 0,
                    model: self.backend.model().to_string(),
                    error: None,
                }
            }
            Err(e) => {
                let message = e.to_string();
                error!(failed_at = %stage, error = %message, "review failed");
                let report = publisher
                    .publish(pr, &[format_error_comment(&message)])
                    .await;
                ReviewOutcome {
                    stage: ReviewStage::Failed,
                    failed_at: Some(stage),
                    files_reviewed: 0,
                    comments_posted: report.posted,
                    comments_failed: report.failed,
                    model: self.backend.model().to_string(),
                    error: Some(message),
                }
            }
        }
    }

    /// Produce the comments a review of `pr` would post, without posting.
    ///
    /// # Errors
    ///
    /// Returns the first fetch or backend error.
    #[instrument(skip_all, fields(pr = %pr))]
    pub async fn preview(&self, pr: &PullRequestRef) -> Result<Vec<ReviewComment>, CriticError> {
        let mut stage = ReviewStage::Fetching;
        self.draft(pr, &mut stage).await.map(|d| d.comments)
    }

    async fn draft(
        &self,
        pr: &PullRequestRef,
        stage: &mut ReviewStage,
    ) -> Result<Draft, CriticError> {
        *stage = ReviewStage::Fetching;
        self.checkpoint()?;
        let info = self.host.pull_request(pr).await?;
        info!(stage = %stage, title = %info.title, "reviewing pull request");
        let files = fetch_changed_files(self.host.as_ref(), pr, &info.head_sha).await?;
        info!(files = files.len(), "found changed files");

        *stage = ReviewStage::Prompting;
        self.checkpoint()?;
        let prompt = build_review_prompt(
            &info.title,
            info.body.as_deref(),
            &files,
            self.limits.max_file_chars,
        );

        *stage = ReviewStage::Generating;
        self.checkpoint()?;
        info!(stage = %stage, prompt_chars = prompt.len(), "requesting review");
        let response = self.backend.generate(&prompt).await?;

        *stage = ReviewStage::Segmenting;
        self.checkpoint()?;
        let segments = segment_response(&response, &SegmentLimits::from(&self.limits));
        info!(stage = %stage, segments = segments.len(), "parsed review response");

        Ok(Draft {
            files_reviewed: files.len(),
            comments: format_review_comments(&response, &segments, self.limits.summary_max_chars),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fakes::{entry, FakeBackend, FakeHost};
    use critic_core::{BackendError, BackendErrorKind, ContentLookup, FileStatus};

    fn pr() -> PullRequestRef {
        PullRequestRef::new("owner/repo", 42).unwrap()
    }

    fn fix_bug_host() -> FakeHost {
        FakeHost::with_pr("Fix bug", Some("")).file(
            entry("a.py", FileStatus::Modified, Some("@@ ... @@")),
            ContentLookup::File {
                content: "x = 1\n".into(),
            },
        )
    }

    fn pipeline(host: Arc<FakeHost>, backend: Arc<FakeBackend>) -> ReviewPipeline {
        ReviewPipeline::new(host, backend, LimitsConfig::default())
    }

    #[tokio::test]
    async fn end_to_end_posts_summary_then_detail() {
        let host = Arc::new(fix_bug_host());
        let backend = Arc::new(FakeBackend::replying("Looks fine.\n- Nit: rename x."));

        let outcome = pipeline(host.clone(), backend.clone()).run(&pr()).await;

        assert_eq!(outcome.stage, ReviewStage::Done);
        assert_eq!(outcome.files_reviewed, 1);
        assert_eq!(outcome.comments_posted, 2);
        assert_eq!(outcome.model, "fake-model");

        let posted = host.posted();
        assert_eq!(posted.len(), 2);
        assert!(posted[0].contains("Looks fine."));
        assert!(posted[1].contains("Detailed Review Part 1"));
        assert!(posted[1].contains("- Nit: rename x."));

        let prompts = backend.prompts.lock().unwrap().clone();
        assert_eq!(prompts.len(), 1);
        assert!(prompts[0].contains("Pull Request Title: Fix bug"));
        assert!(prompts[0].contains("No description provided"));
        assert!(prompts[0].contains("--- File: a.py (modified) ---\nAdditions: 3, Deletions: 1"));
        assert!(prompts[0].contains("Patch/Diff:\n@@ ... @@"));
    }

    #[tokio::test]
    async fn backend_error_posts_exactly_one_error_comment() {
        let host = Arc::new(fix_bug_host());
        let backend = Arc::new(FakeBackend::failing(BackendError::new(
            BackendErrorKind::Timeout,
            "no answer after 60s",
        )));

        let outcome = pipeline(host.clone(), backend.clone()).run(&pr()).await;

        assert_eq!(outcome.stage, ReviewStage::Failed);
        assert_eq!(outcome.failed_at, Some(ReviewStage::Generating));
        assert_eq!(backend.calls(), 1);

        let posted = host.posted();
        assert_eq!(posted.len(), 1);
        assert!(posted[0].starts_with("❌ **Review Error**"));
        assert!(posted[0].contains("Error calling backend (timeout)"));
        assert!(!posted[0].contains("AI Code Review"));
    }

    #[tokio::test]
    async fn listing_failure_fails_before_backend() {
        let host = Arc::new(FakeHost {
            fail_listing: true,
            ..fix_bug_host()
        });
        let backend = Arc::new(FakeBackend::replying("unused"));

        let outcome = pipeline(host.clone(), backend.clone()).run(&pr()).await;

        assert_eq!(outcome.failed_at, Some(ReviewStage::Fetching));
        assert_eq!(backend.calls(), 0);
        assert_eq!(host.posted().len(), 1);
        assert!(outcome.error.unwrap().contains("listing failed"));
    }

    #[tokio::test]
    async fn missing_pull_request_fails_at_fetching() {
        let host = Arc::new(FakeHost::default());
        let backend = Arc::new(FakeBackend::replying("unused"));

        let outcome = pipeline(host.clone(), backend).run(&pr()).await;

        assert_eq!(outcome.stage, ReviewStage::Failed);
        assert_eq!(outcome.failed_at, Some(ReviewStage::Fetching));
        assert!(host.posted()[0].contains("owner/repo#42 not found"));
    }

    #[tokio::test]
    async fn rejected_detail_post_does_not_abort_the_rest() {
        let host = Arc::new(FakeHost {
            failing_posts: [1].into_iter().collect(),
            ..fix_bug_host()
        });
        let backend = Arc::new(FakeBackend::replying("Summary\n- one\n- two"));

        let outcome = pipeline(host.clone(), backend).run(&pr()).await;

        assert_eq!(outcome.stage, ReviewStage::Done);
        assert_eq!(outcome.comments_posted, 2);
        assert_eq!(outcome.comments_failed, 1);
        assert!(host.posted()[1].contains("Detailed Review Part 2"));
    }

    #[tokio::test]
    async fn unpostable_error_comment_is_only_counted() {
        let host = Arc::new(FakeHost {
            fail_all_posts: true,
            ..fix_bug_host()
        });
        let backend = Arc::new(FakeBackend::failing(BackendError::new(
            BackendErrorKind::Transport,
            "refused",
        )));

        let outcome = pipeline(host.clone(), backend).run(&pr()).await;

        assert_eq!(outcome.stage, ReviewStage::Failed);
        assert_eq!(outcome.comments_posted, 0);
        assert_eq!(outcome.comments_failed, 1);
        assert_eq!(*host.attempts.lock().unwrap(), 1);
    }

    #[tokio::test]
    async fn cancelled_before_start_touches_nothing() {
        let (_cancel_tx, cancel_rx) = watch::channel(true);
        let host = Arc::new(fix_bug_host());
        let backend = Arc::new(FakeBackend::replying("unused"));

        let outcome = pipeline(host.clone(), backend.clone())
            .with_cancellation(cancel_rx)
            .run(&pr())
            .await;

        assert_eq!(outcome.stage, ReviewStage::Cancelled);
        assert_eq!(outcome.failed_at, Some(ReviewStage::Fetching));
        assert!(!outcome.is_success());
        assert!(host.lookups().is_empty());
        assert_eq!(backend.calls(), 0);
        assert!(host.posted().is_empty());
    }

    #[tokio::test]
    async fn cancel_during_generation_posts_nothing() {
        let (cancel_tx, cancel_rx) = watch::channel(false);
        let host = Arc::new(fix_bug_host());
        let backend = Arc::new(FakeBackend {
            cancel_on_generate: Some(cancel_tx),
            ..FakeBackend::replying("Looks fine.\n- Nit: rename x.")
        });

        let outcome = pipeline(host.clone(), backend.clone())
            .with_cancellation(cancel_rx)
            .run(&pr())
            .await;

        assert_eq!(outcome.stage, ReviewStage::Cancelled);
        assert_eq!(outcome.failed_at, Some(ReviewStage::Segmenting));
        assert_eq!(outcome.error, None);
        assert_eq!(backend.calls(), 1);
        assert!(host.posted().is_empty());
    }

    #[tokio::test]
    async fn cancel_while_publishing_still_posts_every_part() {
        let (cancel_tx, cancel_rx) = watch::channel(false);
        let host = Arc::new(FakeHost {
            cancel_on_post: Some(cancel_tx),
            ..fix_bug_host()
        });
        let backend = Arc::new(FakeBackend::replying("Summary\n- one\n- two"));

        let outcome = pipeline(host.clone(), backend)
            .with_cancellation(cancel_rx.clone())
            .run(&pr())
            .await;

        assert!(*cancel_rx.borrow());
        assert_eq!(outcome.stage, ReviewStage::Done);
        assert_eq!(outcome.comments_posted, 3);
        let posted = host.posted();
        assert_eq!(posted.len(), 3);
        assert!(posted[2].contains("Detailed Review Part 2"));
    }

    #[tokio::test]
    async fn preview_does_not_post() {
        let host = Arc::new(fix_bug_host());
        let backend = Arc::new(FakeBackend::replying("Looks fine.\n- Nit: rename x."));

        let comments = pipeline(host.clone(), backend).preview(&pr()).await.unwrap();

        assert_eq!(comments.len(), 2);
        assert!(host.posted().is_empty());
    }

    #[tokio::test]
    async fn preview_surfaces_backend_error() {
        let host = Arc::new(fix_bug_host());
        let backend = Arc::new(FakeBackend::failing(BackendError::new(
            BackendErrorKind::Status,
            "500",
        )));

        let err = pipeline(host.clone(), backend).preview(&pr()).await.unwrap_err();

        assert!(matches!(err, CriticError::Backend(_)));
        assert!(host.posted().is_empty());
    }

    #[test]
    fn stage_display_is_lowercase() {
        assert_eq!(ReviewStage::Generating.to_string(), "generating");
        assert_eq!(ReviewStage::Cancelled.to_string(), "cancelled");
        assert_eq!(
            serde_json::to_string(&ReviewStage::Failed).unwrap(),
            "\"failed\""
        );
    }
}
