use async_trait::async_trait;
use base64::Engine;
use critic_core::{
    ChangedFileEntry, ContentLookup, CriticError, PullRequestInfo, PullRequestRef,
};
use octocrab::service::middleware::retry::RetryConfig;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::host::PullRequestHost;

/// GitHub REST client for pull request data and issue comments.
///
/// # Examples
///
/// ```no_run
/// use critic_review::github::GitHubClient;
///
/// # #[tokio::main]
/// # async fn main() {
/// let client = GitHubClient::new("ghp_xxxx", "https://api.github.com").unwrap();
/// # }
/// ```
pub struct GitHubClient {
    octocrab: octocrab::Octocrab,
}

#[derive(Deserialize)]
struct ApiPullRequest {
    title: String,
    body: Option<String>,
    head: ApiCommitRef,
}

#[derive(Deserialize)]
struct ApiCommitRef {
    sha: String,
}

#[derive(Deserialize)]
struct ApiContent {
    #[serde(rename = "type")]
    kind: String,
    content: Option<String>,
    encoding: Option<String>,
}

#[derive(Serialize)]
struct PageQuery {
    per_page: u8,
}

#[derive(Serialize)]
struct RefQuery<'a> {
    #[serde(rename = "ref")]
    git_ref: &'a str,
}

impl GitHubClient {
    /// Create a client for `token` against the REST API at `api_base`.
    ///
    /// Requests are sent once; failed comment posts are never resent.
    ///
    /// # Errors
    ///
    /// Returns [`CriticError::Config`] for an empty token or unparsable base
    /// URL, or [`CriticError::GitHub`] if the client cannot be built.
    pub fn new(token: &str, api_base: &str) -> Result<Self, CriticError> {
        if token.trim().is_empty() {
            return Err(CriticError::Config("GitHub token is empty".into()));
        }

        let octocrab = octocrab::Octocrab::builder()
            .personal_token(token.to_string())
            .add_retry_config(RetryConfig::None)
            .base_uri(api_base)
            .map_err(|e| CriticError::Config(format!("invalid GitHub API URL '{api_base}': {e}")))?
            .build()
            .map_err(|e| CriticError::GitHub(format!("failed to create GitHub client: {e}")))?;

        Ok(Self { octocrab })
    }

    /// Probe the token by fetching the authenticated user's login.
    ///
    /// # Errors
    ///
    /// Returns [`CriticError::GitHub`] if the API rejects the token.
    pub async fn current_login(&self) -> Result<String, CriticError> {
        let user: serde_json::Value = self
            .octocrab
            .get("/user", None::<&()>)
            .await
            .map_err(|e| CriticError::GitHub(format!("failed to fetch current user: {e}")))?;
        Ok(user
            .get("login")
            .and_then(|l| l.as_str())
            .unwrap_or_default()
            .to_string())
    }
}

#[async_trait]
impl PullRequestHost for GitHubClient {
    async fn pull_request(&self, pr: &PullRequestRef) -> Result<PullRequestInfo, CriticError> {
        let route = format!("/repos/{}/{}/pulls/{}", pr.owner, pr.repo, pr.number);
        let api: ApiPullRequest = self
            .octocrab
            .get(route, None::<&()>)
            .await
            .map_err(|e| CriticError::GitHub(format!("failed to fetch {pr}: {e}")))?;

        Ok(PullRequestInfo {
            title: api.title,
            body: api.body,
            head_sha: api.head.sha,
        })
    }

    async fn changed_files(
        &self,
        pr: &PullRequestRef,
    ) -> Result<Vec<ChangedFileEntry>, CriticError> {
        let route = format!("/repos/{}/{}/pulls/{}/files", pr.owner, pr.repo, pr.number);
        let page: octocrab::Page<ChangedFileEntry> = self
            .octocrab
            .get(route, Some(&PageQuery { per_page: 100 }))
            .await
            .map_err(|e| CriticError::GitHub(format!("failed to list files of {pr}: {e}")))?;

        self.octocrab
            .all_pages(page)
            .await
            .map_err(|e| CriticError::GitHub(format!("failed to list files of {pr}: {e}")))
    }

    async fn file_content(
        &self,
        pr: &PullRequestRef,
        path: &str,
        git_ref: &str,
    ) -> ContentLookup {
        let route = format!(
            "/repos/{}/{}/contents/{}",
            pr.owner,
            pr.repo,
            encode_path(path)
        );
        debug!(path, git_ref, "fetching file content");

        let value: serde_json::Value = match self
            .octocrab
            .get(route, Some(&RefQuery { git_ref }))
            .await
        {
            Ok(v) => v,
            Err(octocrab::Error::GitHub { source, .. }) if source.status_code.as_u16() == 404 => {
                return ContentLookup::NotFound;
            }
            Err(e) => {
                return ContentLookup::Error {
                    detail: e.to_string(),
                }
            }
        };

        content_from_json(value)
    }

    async fn post_comment(&self, pr: &PullRequestRef, body: &str) -> Result<(), CriticError> {
        let route = format!(
            "/repos/{}/{}/issues/{}/comments",
            pr.owner, pr.repo, pr.number
        );
        let payload = serde_json::json!({ "body": body });

        let _response: serde_json::Value = self
            .octocrab
            .post(route, Some(&payload))
            .await
            .map_err(|e| CriticError::GitHub(format!("failed to post comment on {pr}: {e}")))?;

        Ok(())
    }
}

/// Percent-encode each segment of a repository path, keeping the slashes.
fn encode_path(path: &str) -> String {
    path.split('/')
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

/// Interpret a contents-API payload.
///
/// A JSON array is a directory listing; an object must be a base64-encoded
/// UTF-8 file.
fn content_from_json(value: serde_json::Value) -> ContentLookup {
    if value.is_array() {
        return ContentLookup::Directory;
    }

    let api: ApiContent = match serde_json::from_value(value) {
        Ok(c) => c,
        Err(e) => {
            return ContentLookup::Error {
                detail: format!("unexpected contents payload: {e}"),
            }
        }
    };

    if api.kind == "dir" {
        return ContentLookup::Directory;
    }
    if api.kind != "file" {
        return ContentLookup::Error {
            detail: format!("unsupported content type '{}'", api.kind),
        };
    }

    match (api.encoding.as_deref(), api.content) {
        (Some("base64"), Some(encoded)) => decode_base64_text(&encoded),
        (encoding, _) => ContentLookup::Error {
            detail: format!(
                "content not inlined (encoding: {})",
                encoding.unwrap_or("none")
            ),
        },
    }
}

fn decode_base64_text(encoded: &str) -> ContentLookup {
    let compact: String = encoded.chars().filter(|c| !c.is_whitespace()).collect();
    let bytes = match base64::engine::general_purpose::STANDARD.decode(compact) {
        Ok(b) => b,
        Err(e) => {
            return ContentLookup::Error {
                detail: format!("invalid base64 content: {e}"),
            }
        }
    };
    match String::from_utf8(bytes) {
        Ok(content) => ContentLookup::File { content },
        Err(_) => ContentLookup::Error {
            detail: "content is not valid UTF-8".into(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use critic_core::FileStatus;
    use wiremock::matchers::{body_json, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn pr() -> PullRequestRef {
        PullRequestRef::new("owner/repo", 42).unwrap()
    }

    async fn client_for(server: &MockServer) -> GitHubClient {
        GitHubClient::new("test-token", &server.uri()).unwrap()
    }

    #[test]
    fn new_rejects_empty_token() {
        assert!(GitHubClient::new("  ", "https://api.github.com").is_err());
    }

    #[test]
    fn encode_path_keeps_separators() {
        assert_eq!(encode_path("src/my file.rs"), "src/my%20file.rs");
        assert_eq!(encode_path("docs/a#b.md"), "docs/a%23b.md");
    }

    #[test]
    fn array_payload_is_directory() {
        let value = serde_json::json!([{ "name": "mod.rs", "type": "file" }]);
        assert_eq!(content_from_json(value), ContentLookup::Directory);
    }

    #[test]
    fn base64_payload_with_newlines_decodes() {
        let value = serde_json::json!({
            "type": "file",
            "encoding": "base64",
            "content": "cHJpbnQo\nJ2hpJyk=\n",
        });
        assert_eq!(
            content_from_json(value),
            ContentLookup::File {
                content: "print('hi')".into()
            }
        );
    }

    #[test]
    fn non_utf8_payload_is_error() {
        let value = serde_json::json!({
            "type": "file",
            "encoding": "base64",
            "content": "/w==",
        });
        assert!(matches!(
            content_from_json(value),
            ContentLookup::Error { .. }
        ));
    }

    #[test]
    fn large_file_without_inline_content_is_error() {
        let value = serde_json::json!({
            "type": "file",
            "encoding": "none",
            "content": "",
        });
        assert!(matches!(
            content_from_json(value),
            ContentLookup::Error { .. }
        ));
    }

    #[tokio::test]
    async fn pull_request_maps_title_body_and_head() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/repos/owner/repo/pulls/42"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "title": "Fix bug",
                "body": null,
                "head": { "sha": "abc123" }
            })))
            .mount(&server)
            .await;

        let info = client_for(&server).await.pull_request(&pr()).await.unwrap();
        assert_eq!(info.title, "Fix bug");
        assert!(info.body.is_none());
        assert_eq!(info.head_sha, "abc123");
    }

    #[tokio::test]
    async fn changed_files_preserves_order() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/repos/owner/repo/pulls/42/files"))
            .and(query_param("per_page", "100"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                { "filename": "b.py", "status": "modified", "additions": 3, "deletions": 1, "patch": "@@ -1 +1 @@" },
                { "filename": "a.png", "status": "added", "additions": 0, "deletions": 0 },
                { "filename": "old.py", "status": "removed", "additions": 0, "deletions": 9 }
            ])))
            .mount(&server)
            .await;

        let files = client_for(&server).await.changed_files(&pr()).await.unwrap();
        let names: Vec<_> = files.iter().map(|f| f.filename.as_str()).collect();
        assert_eq!(names, ["b.py", "a.png", "old.py"]);
        assert_eq!(files[0].status, FileStatus::Modified);
        assert!(files[1].patch.is_none());
        assert_eq!(files[2].deletions, 9);
    }

    #[tokio::test]
    async fn file_content_decodes_file_at_ref() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/repos/owner/repo/contents/src/a.py"))
            .and(query_param("ref", "abc123"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "type": "file",
                "encoding": "base64",
                "content": "eCA9IDEK"
            })))
            .mount(&server)
            .await;

        let lookup = client_for(&server)
            .await
            .file_content(&pr(), "src/a.py", "abc123")
            .await;
        assert_eq!(
            lookup,
            ContentLookup::File {
                content: "x = 1\n".into()
            }
        );
    }

    #[tokio::test]
    async fn file_content_404_is_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/repos/owner/repo/contents/gone.py"))
            .respond_with(ResponseTemplate::new(404).set_body_json(serde_json::json!({
                "message": "Not Found",
                "documentation_url": "https://docs.github.com/rest"
            })))
            .mount(&server)
            .await;

        let lookup = client_for(&server)
            .await
            .file_content(&pr(), "gone.py", "abc123")
            .await;
        assert_eq!(lookup, ContentLookup::NotFound);
    }

    #[tokio::test]
    async fn file_content_server_error_is_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/repos/owner/repo/contents/a.py"))
            .respond_with(ResponseTemplate::new(500).set_body_json(serde_json::json!({
                "message": "Server Error"
            })))
            .mount(&server)
            .await;

        let lookup = client_for(&server)
            .await
            .file_content(&pr(), "a.py", "abc123")
            .await;
        assert!(matches!(lookup, ContentLookup::Error { .. }));
    }

    #[tokio::test]
    async fn post_comment_sends_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/repos/owner/repo/issues/42/comments"))
            .and(body_json(serde_json::json!({ "body": "hello" })))
            .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({ "id": 1 })))
            .expect(1)
            .mount(&server)
            .await;

        client_for(&server)
            .await
            .post_comment(&pr(), "hello")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn post_comment_failure_is_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/repos/owner/repo/issues/42/comments"))
            .respond_with(ResponseTemplate::new(403).set_body_json(serde_json::json!({
                "message": "Resource not accessible by integration"
            })))
            .mount(&server)
            .await;

        let err = client_for(&server)
            .await
            .post_comment(&pr(), "hello")
            .await
            .unwrap_err();
        assert!(matches!(err, CriticError::GitHub(_)));
    }

    #[tokio::test]
    async fn server_error_on_post_is_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/repos/owner/repo/issues/42/comments"))
            .respond_with(ResponseTemplate::new(500).set_body_json(serde_json::json!({
                "message": "Server Error"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let err = client_for(&server)
            .await
            .post_comment(&pr(), "hello")
            .await
            .unwrap_err();
        assert!(matches!(err, CriticError::GitHub(_)));
    }
}
