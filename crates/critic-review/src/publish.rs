//! Formats review chunks as PR comments and posts them.

use critic_core::{PullRequestRef, ReviewComment};
use tracing::{debug, warn};

use crate::host::PullRequestHost;

const SUMMARY_BANNER: &str =
    "🤖 **AI Code Review**\n\nI've analyzed this PR and here are my findings:\n\n";
const TRUNCATION_NOTICE: &str = "\n\n*[Review truncated - see additional comments below]*";

/// Turn segmented review text into the ordered comments to post.
///
/// The first segment becomes the summary comment, capped at
/// `summary_max_chars` characters. The ellipsis and truncation notice are
/// added when the raw response as a whole was longer than the cap.
///
/// # Examples
///
/// ```
/// use critic_review::publish::format_review_comments;
///
/// let segments = vec!["Looks fine.".to_string(), "- Nit: rename x.".to_string()];
/// let comments = format_review_comments("Looks fine.\n- Nit: rename x.", &segments, 2000);
/// assert_eq!(comments.len(), 2);
/// assert!(comments[0].body.starts_with("🤖 **AI Code Review**"));
/// assert!(comments[1].body.starts_with("📝 **Detailed Review Part 1**"));
/// ```
pub fn format_review_comments(
    raw_response: &str,
    segments: &[String],
    summary_max_chars: usize,
) -> Vec<ReviewComment> {
    let first = segments.first().map(String::as_str).unwrap_or(raw_response);

    let mut summary = format!("{SUMMARY_BANNER}{}", take_chars(first, summary_max_chars));
    if raw_response.chars().count() > summary_max_chars {
        summary.push_str("...");
        summary.push_str(TRUNCATION_NOTICE);
    }

    let mut comments = vec![ReviewComment {
        index: 0,
        body: summary,
    }];
    comments.extend(
        segments
            .iter()
            .enumerate()
            .skip(1)
            .map(|(i, segment)| ReviewComment {
                index: i,
                body: format!("📝 **Detailed Review Part {i}**\n\n{segment}"),
            }),
    );
    comments
}

/// The single comment posted when a review fails.
pub fn format_error_comment(message: &str) -> ReviewComment {
    ReviewComment {
        index: 0,
        body: format!(
            "❌ **Review Error**\n\nSorry, I encountered an error while reviewing this PR: {message}"
        ),
    }
}

fn take_chars(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// Counts of comments that made it to the PR and those that did not.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PublishReport {
    pub posted: usize,
    pub failed: usize,
}

/// Posts comments to a pull request one at a time.
pub struct CommentPublisher<'a> {
    host: &'a dyn PullRequestHost,
}

impl<'a> CommentPublisher<'a> {
    pub fn new(host: &'a dyn PullRequestHost) -> Self {
        Self { host }
    }

    /// Post `comments` in order. A rejected post is logged and skipped.
    pub async fn publish(&self, pr: &PullRequestRef, comments: &[ReviewComment]) -> PublishReport {
        let mut report = PublishReport::default();
        for comment in comments {
            match self.host.post_comment(pr, &comment.body).await {
                Ok(()) => {
                    debug!(%pr, index = comment.index, "posted comment");
                    report.posted += 1;
                }
                Err(e) => {
                    warn!(%pr, index = comment.index, error = %e, "error posting comment");
                    report.failed += 1;
                }
            }
        }
        report
    }
}
