use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CriticError;

/// Content placeholder for files that are no longer present at the head commit.
pub const FILE_DELETED: &str = "File deleted";

/// Content placeholder for files whose content lookup failed.
pub const CONTENT_UNAVAILABLE: &str = "Could not fetch content";

/// Identifies a pull request: repository owner, repository name, and number.
///
/// # Examples
///
/// ```
/// use critic_core::PullRequestRef;
///
/// let pr: PullRequestRef = "rust-lang/rust#12345".parse().unwrap();
/// assert_eq!(pr.owner, "rust-lang");
/// assert_eq!(pr.repo, "rust");
/// assert_eq!(pr.number, 12345);
/// assert_eq!(pr.full_name(), "rust-lang/rust");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PullRequestRef {
    /// Repository owner (user or organisation).
    pub owner: String,
    /// Repository name.
    pub repo: String,
    /// Pull request number.
    pub number: u64,
}

impl PullRequestRef {
    /// Build a reference from an `owner/name` repository string and a PR number.
    ///
    /// # Errors
    ///
    /// Returns [`CriticError::Config`] if the repository is not `owner/name`
    /// or the number is zero.
    ///
    /// # Examples
    ///
    /// ```
    /// use critic_core::PullRequestRef;
    ///
    /// let pr = PullRequestRef::new("octocat/hello-world", 42).unwrap();
    /// assert_eq!(pr.to_string(), "octocat/hello-world#42");
    /// assert!(PullRequestRef::new("hello-world", 42).is_err());
    /// ```
    pub fn new(full_name: &str, number: u64) -> Result<Self, CriticError> {
        let Some((owner, repo)) = full_name.trim().split_once('/') else {
            return Err(CriticError::Config(format!(
                "invalid repository '{full_name}', expected owner/repo"
            )));
        };
        if owner.is_empty() || repo.is_empty() || repo.contains('/') {
            return Err(CriticError::Config(format!(
                "invalid repository '{full_name}', expected owner/repo"
            )));
        }
        if number == 0 {
            return Err(CriticError::Config("PR number must be positive".into()));
        }
        Ok(Self {
            owner: owner.to_string(),
            repo: repo.to_string(),
            number,
        })
    }

    /// Repository full name, `owner/repo`.
    pub fn full_name(&self) -> String {
        format!("{}/{}", self.owner, self.repo)
    }
}

impl fmt::Display for PullRequestRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}#{}", self.owner, self.repo, self.number)
    }
}

impl FromStr for PullRequestRef {
    type Err = CriticError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let Some((full_name, number_str)) = s.split_once('#') else {
            return Err(CriticError::Config(format!(
                "invalid PR reference '{s}', expected owner/repo#number"
            )));
        };
        let number: u64 = number_str
            .parse()
            .map_err(|_| CriticError::Config(format!("invalid PR number: {number_str}")))?;
        Self::new(full_name, number)
    }
}

/// Change status of a file as reported by the hosting API.
///
/// # Examples
///
/// ```
/// use critic_core::FileStatus;
///
/// let status: FileStatus = serde_json::from_str("\"modified\"").unwrap();
/// assert_eq!(status, FileStatus::Modified);
/// assert!(status.needs_content());
/// assert!(!FileStatus::Removed.needs_content());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileStatus {
    /// File created by the PR.
    Added,
    /// File edited in place.
    Modified,
    /// File deleted by the PR.
    Removed,
    /// File moved, possibly with edits.
    Renamed,
    /// File copied from another path.
    Copied,
    /// Mode or type change without content edits.
    Changed,
    /// Listed but untouched.
    Unchanged,
}

impl FileStatus {
    /// Whether the head-commit content of a file with this status is fetched.
    pub fn needs_content(self) -> bool {
        matches!(self, FileStatus::Added | FileStatus::Modified)
    }
}

impl fmt::Display for FileStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FileStatus::Added => write!(f, "added"),
            FileStatus::Modified => write!(f, "modified"),
            FileStatus::Removed => write!(f, "removed"),
            FileStatus::Renamed => write!(f, "renamed"),
            FileStatus::Copied => write!(f, "copied"),
            FileStatus::Changed => write!(f, "changed"),
            FileStatus::Unchanged => write!(f, "unchanged"),
        }
    }
}

/// One entry of a pull request's file list, as returned by the hosting API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangedFileEntry {
    /// Repository-relative path.
    pub filename: String,
    /// Change status.
    pub status: FileStatus,
    /// Added line count.
    #[serde(default)]
    pub additions: u64,
    /// Deleted line count.
    #[serde(default)]
    pub deletions: u64,
    /// Unified diff; omitted by the API for binary or very large files.
    #[serde(default)]
    pub patch: Option<String>,
}

/// A changed file together with its post-change content.
///
/// # Examples
///
/// ```
/// use critic_core::{ChangedFile, FileStatus, FILE_DELETED};
///
/// let file = ChangedFile {
///     filename: "src/old.rs".into(),
///     status: FileStatus::Removed,
///     content: FILE_DELETED.into(),
///     patch: None,
///     additions: 0,
///     deletions: 12,
/// };
/// assert!(!file.has_patch());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangedFile {
    /// Repository-relative path.
    pub filename: String,
    /// Change status.
    pub status: FileStatus,
    /// File text at the head commit, or one of the placeholder constants.
    pub content: String,
    /// Unified diff, if the API supplied one.
    pub patch: Option<String>,
    /// Added line count.
    pub additions: u64,
    /// Deleted line count.
    pub deletions: u64,
}

impl ChangedFile {
    /// Build a file from a list entry and resolved content.
    pub fn from_entry(entry: ChangedFileEntry, content: impl Into<String>) -> Self {
        Self {
            filename: entry.filename,
            status: entry.status,
            content: content.into(),
            patch: entry.patch,
            additions: entry.additions,
            deletions: entry.deletions,
        }
    }

    /// Whether a non-empty patch is available.
    pub fn has_patch(&self) -> bool {
        self.patch.as_deref().is_some_and(|p| !p.is_empty())
    }
}

/// Pull request metadata needed for a review.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullRequestInfo {
    /// PR title.
    pub title: String,
    /// PR description, absent when the author left it blank.
    pub body: Option<String>,
    /// Commit SHA of the PR head.
    pub head_sha: String,
}

/// Result of looking up a path at a given commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContentLookup {
    /// A regular file with its decoded text.
    File {
        /// Decoded file text.
        content: String,
    },
    /// The path names a directory.
    Directory,
    /// Nothing exists at the path for that commit.
    NotFound,
    /// The lookup failed.
    Error {
        /// Failure description.
        detail: String,
    },
}

/// One postable unit of review output.
///
/// Index 0 is the summary; later indices are the detailed parts.
///
/// # Examples
///
/// ```
/// use critic_core::ReviewComment;
///
/// let c = ReviewComment { index: 0, body: "Looks fine.".into() };
/// assert!(c.is_summary());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewComment {
    /// Position in the posting order.
    pub index: usize,
    /// Markdown body as posted.
    pub body: String,
}

impl ReviewComment {
    /// Whether this is the leading summary comment.
    pub fn is_summary(&self) -> bool {
        self.index == 0
    }
}

/// Output format for CLI results.
///
/// # Examples
///
/// ```
/// use critic_core::OutputFormat;
///
/// let fmt: OutputFormat = "json".parse().unwrap();
/// assert_eq!(fmt, OutputFormat::Json);
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Human-readable text.
    #[default]
    Text,
    /// Machine-readable JSON.
    Json,
    /// Markdown, exactly as it would be posted.
    Markdown,
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputFormat::Text => write!(f, "text"),
            OutputFormat::Json => write!(f, "json"),
            OutputFormat::Markdown => write!(f, "markdown"),
        }
    }
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(OutputFormat::Text),
            "json" => Ok(OutputFormat::Json),
            "markdown" | "md" => Ok(OutputFormat::Markdown),
            other => Err(format!("unknown output format: {other}")),
        }
    }
}
