//! Model-free review path: a contextual review rendered from fixed templates.

use std::collections::BTreeSet;
use std::fmt::Write;
use std::sync::Arc;

use critic_core::{ChangedFile, CriticError, FileStatus, PullRequestRef};
use tracing::{error, info, instrument};

use crate::fetcher::fetch_changed_files;
use crate::host::PullRequestHost;
use crate::publish::format_error_comment;

const FILES_LISTED: usize = 5;

const ASSESSMENT: &str = "
### 🚨 Potential Issues

**Security Considerations:**
- 🔐 Verify input validation on user inputs
- 🛡️ Check for SQL injection risks in database queries
- 🔑 Ensure sensitive data is properly handled

**Performance Notes:**
- ⚡ Review algorithm complexity for large datasets
- 💾 Check memory usage patterns
- 🔄 Consider caching strategies where appropriate

### 💡 Suggestions

1. **Testing**: Add comprehensive test coverage
2. **Documentation**: Include code comments for complex functions
3. **Error Handling**: Implement robust error handling
4. **Logging**: Add appropriate logging for debugging

---
*This is a demo review. In production, this would be generated by an AI model like Llama3.2 or Mistral running locally with Ollama.*";

fn language_for(filename: &str) -> Option<&'static str> {
    let (_, ext) = filename.rsplit_once('.')?;
    match ext.to_ascii_lowercase().as_str() {
        "py" => Some("Python"),
        "js" | "ts" | "jsx" | "tsx" => Some("JavaScript/TypeScript"),
        "java" => Some("Java"),
        "go" => Some("Go"),
        "rs" => Some("Rust"),
        "c" | "cpp" | "h" | "hpp" => Some("C/C++"),
        _ => None,
    }
}

/// Render the demo review for a pull request.
///
/// Languages are listed in alphabetical order.
///
/// # Examples
///
/// ```
/// use critic_core::{ChangedFile, FileStatus};
/// use critic_review::demo::render_demo_review;
///
/// let files = vec![ChangedFile {
///     filename: "src/main.rs".into(),
///     status: FileStatus::Added,
///     content: String::new(),
///     patch: None,
///     additions: 12,
///     deletions: 0,
/// }];
/// let review = render_demo_review("Add CLI", &files);
/// assert!(review.contains("🔤 Languages: Rust"));
/// assert!(review.contains("- **src/main.rs** (added) - 12 additions, 0 deletions"));
/// ```
pub fn render_demo_review(title: &str, files: &[ChangedFile]) -> String {
    let languages: BTreeSet<&str> = files.iter().filter_map(|f| language_for(&f.filename)).collect();
    let languages = languages.into_iter().collect::<Vec<_>>().join(", ");
    let additions: u64 = files.iter().map(|f| f.additions).sum();
    let deletions: u64 = files.iter().map(|f| f.deletions).sum();

    let mut review = String::new();
    let _ = write!(
        review,
        "🤖 **AI Code Review** (Demo Mode)

## Summary
I've analyzed this PR: **\"{title}\"** and here are my findings:

**Changes Overview:**
- 📁 {} files changed
- ➕ {additions} lines added
- ➖ {deletions} lines deleted
- 🔤 Languages: {}

## 📋 Detailed Analysis

### Files Reviewed:",
        files.len(),
        if languages.is_empty() { "Various" } else { languages.as_str() },
    );

    for file in files.iter().take(FILES_LISTED) {
        let _ = write!(review, "\n- **{}** ({})", file.filename, file.status);
        if file.additions > 0 || file.deletions > 0 {
            let _ = write!(
                review,
                " - {} additions, {} deletions",
                file.additions, file.deletions
            );
        }
    }

    let _ = write!(
        review,
        "

### 🔍 Code Quality Assessment

**Strengths I noticed:**
- ✅ Clean file organization
- ✅ Appropriate use of {} conventions
- ✅ Good commit message structure

**Areas for improvement:**
- 🔍 Consider adding unit tests for new functionality
- 📝 Add inline documentation for complex logic
- 🛡️ Review for potential security vulnerabilities
- ⚡ Check for performance optimizations
",
        if languages.is_empty() { "programming" } else { languages.as_str() },
    );
    review.push_str(ASSESSMENT);
    review
}

/// The demo review of a fixed three-file sample pull request.
pub fn sample_review() -> String {
    let file = |filename: &str, status, additions, deletions| ChangedFile {
        filename: filename.to_string(),
        status,
        content: String::new(),
        patch: None,
        additions,
        deletions,
    };
    let files = [
        file("src/auth.py", FileStatus::Modified, 25, 8),
        file("tests/test_auth.py", FileStatus::Added, 45, 0),
        file("README.md", FileStatus::Modified, 3, 1),
    ];
    render_demo_review("Add user authentication feature", &files)
}

/// Reviews pull requests with the demo template instead of a model.
pub struct DemoReviewer {
    host: Arc<dyn PullRequestHost>,
}

impl DemoReviewer {
    pub fn new(host: Arc<dyn PullRequestHost>) -> Self {
        Self { host }
    }

    /// Render the demo review for `pr` and post it as one comment.
    ///
    /// With `dry_run` nothing is posted. Returns the rendered review.
    ///
    /// # Errors
    ///
    /// Returns the fetch error after posting the error comment (outside
    /// dry-run), or the error from posting the review itself.
    #[instrument(skip(self, pr), fields(pr = %pr))]
    pub async fn run(&self, pr: &PullRequestRef, dry_run: bool) -> Result<String, CriticError> {
        let review = match self.render(pr).await {
            Ok(review) => review,
            Err(e) => {
                error!(error = %e, "demo review failed");
                if !dry_run {
                    let comment = format_error_comment(&e.to_string());
                    if let Err(post_err) = self.host.post_comment(pr, &comment.body).await {
                        error!(error = %post_err, "error posting comment");
                    }
                }
                return Err(e);
            }
        };

        if !dry_run {
            self.host.post_comment(pr, &review).await?;
            info!("posted demo review");
        }
        Ok(review)
    }

    async fn render(&self, pr: &PullRequestRef) -> Result<String, CriticError> {
        let info = self.host.pull_request(pr).await?;
        let files = fetch_changed_files(self.host.as_ref(), pr, &info.head_sha).await?;
        info!(title = %info.title, files = files.len(), "rendering demo review");
        Ok(render_demo_review(&info.title, &files))
    }
}
