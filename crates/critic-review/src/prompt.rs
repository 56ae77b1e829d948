use std::fmt::Write;

use critic_core::ChangedFile;

/// Substituted when the pull request has no description.
pub const NO_DESCRIPTION: &str = "No description provided";

/// Appended to file content cut at the per-file cap.
pub const TRUNCATION_MARKER: &str = "...";

const PREAMBLE: &str = "\
You are an expert code reviewer. Please review this GitHub Pull Request and provide constructive feedback.";

const REVIEW_INSTRUCTIONS: &str = "
Please provide a thorough code review focusing on:

1. **Code Quality**: Is the code clean, readable, and well-structured?
2. **Best Practices**: Does it follow language-specific best practices?
3. **Security**: Are there any potential security vulnerabilities?
4. **Performance**: Are there any performance concerns?
5. **Bugs**: Do you see any potential bugs or issues?
6. **Documentation**: Is the code well-documented?
7. **Testing**: Are there adequate tests or test coverage concerns?

Format your response as follows:
- Start with a brief summary
- Use bullet points for specific issues
- Include line numbers when referencing specific code
- Suggest specific improvements
- Highlight good practices you notice
- Be constructive and helpful

Keep your response concise but comprehensive (aim for 300-500 words).
";

/// Build the review prompt for a pull request.
///
/// Every file contributes a block in input order: a header with name, status
/// and line counts, then the patch when there is one, otherwise the content
/// cut to `max_file_chars` characters. Files are capped independently; the
/// total length is not bounded.
///
/// # Examples
///
/// ```
/// use critic_core::{ChangedFile, FileStatus};
/// use critic_review::prompt::build_review_prompt;
///
/// let files = vec![ChangedFile {
///     filename: "a.py".into(),
///     status: FileStatus::Modified,
///     content: "x = 1".into(),
///     patch: Some("@@ -1 +1 @@\n-x = 0\n+x = 1".into()),
///     additions: 1,
///     deletions: 1,
/// }];
/// let prompt = build_review_prompt("Fix bug", None, &files, 2000);
/// assert!(prompt.contains("Pull Request Title: Fix bug"));
/// assert!(prompt.contains("No description provided"));
/// assert!(prompt.contains("--- File: a.py (modified) ---"));
/// ```
pub fn build_review_prompt(
    title: &str,
    description: Option<&str>,
    files: &[ChangedFile],
    max_file_chars: usize,
) -> String {
    let description = description
        .filter(|d| !d.is_empty())
        .unwrap_or(NO_DESCRIPTION);

    let mut prompt = String::new();
    let _ = writeln!(prompt, "{PREAMBLE}\n");
    let _ = writeln!(prompt, "Pull Request Title: {title}");
    let _ = writeln!(prompt, "Pull Request Description: {description}\n");
    prompt.push_str("Changed Files:\n");

    for file in files {
        let _ = writeln!(prompt, "\n--- File: {} ({}) ---", file.filename, file.status);
        let _ = writeln!(
            prompt,
            "Additions: {}, Deletions: {}",
            file.additions, file.deletions
        );

        match file.patch.as_deref() {
            Some(patch) if file.has_patch() => {
                let _ = writeln!(prompt, "Patch/Diff:\n{patch}");
            }
            _ => {
                let _ = writeln!(
                    prompt,
                    "Content:\n{}",
                    cap_content(&file.content, max_file_chars)
                );
            }
        }
    }

    prompt.push_str(REVIEW_INSTRUCTIONS);
    prompt
}

/// Keep the first `max_chars` characters, marking the cut when one was made.
fn cap_content(content: &str, max_chars: usize) -> String {
    match content.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => format!("{}{TRUNCATION_MARKER}", &content[..byte_idx]),
        None => content.to_string(),
    }
}
