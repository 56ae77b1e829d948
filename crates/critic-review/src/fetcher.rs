//! Resolves a pull request's file list into [`ChangedFile`]s with content.

use critic_core::{
    ChangedFile, ContentLookup, CriticError, PullRequestRef, CONTENT_UNAVAILABLE, FILE_DELETED,
};
use tracing::{debug, warn};

use crate::host::PullRequestHost;

/// Fetch every changed file of `pr` together with its content at `head_sha`.
///
/// Added and modified files are looked up one at a time; all other statuses
/// get the [`FILE_DELETED`] placeholder without a request. Paths that turn out
/// to be directories are skipped. A failed lookup degrades only that file to
/// [`CONTENT_UNAVAILABLE`]. The result keeps the API's order.
///
/// # Errors
///
/// Returns the host's error if the file list itself cannot be fetched.
pub async fn fetch_changed_files(
    host: &dyn PullRequestHost,
    pr: &PullRequestRef,
    head_sha: &str,
) -> Result<Vec<ChangedFile>, CriticError> {
    let entries = host.changed_files(pr).await?;
    let mut files = Vec::with_capacity(entries.len());

    for entry in entries {
        if !entry.status.needs_content() {
            files.push(ChangedFile::from_entry(entry, FILE_DELETED));
            continue;
        }

        match host.file_content(pr, &entry.filename, head_sha).await {
            ContentLookup::File { content } => files.push(ChangedFile::from_entry(entry, content)),
            ContentLookup::Directory => {
                debug!(filename = %entry.filename, "skipping directory");
            }
            ContentLookup::NotFound => {
                warn!(filename = %entry.filename, "error fetching content: not found at head");
                files.push(ChangedFile::from_entry(entry, CONTENT_UNAVAILABLE));
            }
            ContentLookup::Error { detail } => {
                warn!(filename = %entry.filename, %detail, "error fetching content");
                files.push(ChangedFile::from_entry(entry, CONTENT_UNAVAILABLE));
            }
        }
    }

    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fakes::{entry, FakeHost};
    use critic_core::FileStatus;

    fn pr() -> PullRequestRef {
        PullRequestRef::new("owner/repo", 7).unwrap()
    }

    fn file(content: &str) -> ContentLookup {
        ContentLookup::File {
            content: content.into(),
        }
    }

    #[tokio::test]
    async fn one_failed_lookup_degrades_only_that_file() {
        let host = FakeHost::with_pr("t", None)
            .file(entry("a.py", FileStatus::Modified, None), file("a"))
            .file(
                entry("b.py", FileStatus::Added, None),
                ContentLookup::Error {
                    detail: "boom".into(),
                },
            )
            .file(entry("c.py", FileStatus::Modified, None), file("c"));

        let files = fetch_changed_files(&host, &pr(), "head-sha").await.unwrap();

        assert_eq!(files.len(), 3);
        let unavailable: Vec<_> = files
            .iter()
            .filter(|f| f.content == CONTENT_UNAVAILABLE)
            .collect();
        assert_eq!(unavailable.len(), 1);
        assert_eq!(unavailable[0].filename, "b.py");
        assert_eq!(files[0].content, "a");
        assert_eq!(files[2].content, "c");
    }

    #[tokio::test]
    async fn not_found_uses_unavailable_placeholder() {
        let host = FakeHost::with_pr("t", None).file(
            entry("gone.py", FileStatus::Modified, Some("@@")),
            ContentLookup::NotFound,
        );

        let files = fetch_changed_files(&host, &pr(), "head-sha").await.unwrap();
        assert_eq!(files[0].content, CONTENT_UNAVAILABLE);
        assert_eq!(files[0].patch.as_deref(), Some("@@"));
    }

    #[tokio::test]
    async fn directories_are_skipped() {
        let host = FakeHost::with_pr("t", None)
            .file(entry("vendor", FileStatus::Added, None), ContentLookup::Directory)
            .file(entry("lib.rs", FileStatus::Added, None), file("fn x() {}"));

        let files = fetch_changed_files(&host, &pr(), "head-sha").await.unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].filename, "lib.rs");
    }

    #[tokio::test]
    async fn non_content_statuses_are_not_looked_up() {
        let host = FakeHost::with_pr("t", None)
            .file(entry("old.py", FileStatus::Removed, None), file("never"))
            .file(entry("moved.py", FileStatus::Renamed, None), file("never"))
            .file(entry("new.py", FileStatus::Added, None), file("new"));

        let files = fetch_changed_files(&host, &pr(), "head-sha").await.unwrap();

        assert_eq!(host.lookups(), vec!["new.py".to_string()]);
        assert_eq!(files[0].content, FILE_DELETED);
        assert_eq!(files[1].content, FILE_DELETED);
        assert_eq!(files[2].content, "new");
    }

    #[tokio::test]
    async fn order_follows_the_api() {
        let host = FakeHost::with_pr("t", None)
            .file(entry("z.rs", FileStatus::Modified, None), file("z"))
            .file(entry("a.rs", FileStatus::Removed, None), file("a"))
            .file(entry("m.rs", FileStatus::Added, None), file("m"));

        let files = fetch_changed_files(&host, &pr(), "head-sha").await.unwrap();
        let names: Vec<_> = files.iter().map(|f| f.filename.as_str()).collect();
        assert_eq!(names, ["z.rs", "a.rs", "m.rs"]);
    }

    #[tokio::test]
    async fn listing_failure_propagates() {
        let host = FakeHost {
            fail_listing: true,
            ..FakeHost::with_pr("t", None)
        };
        assert!(fetch_changed_files(&host, &pr(), "head-sha").await.is_err());
    }
}
