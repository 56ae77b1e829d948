//! In-memory doubles for the hosting API and the backend.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;
use critic_core::{
    BackendError, ChangedFileEntry, ContentLookup, CriticError, FileStatus, PullRequestInfo,
    PullRequestRef,
};
use tokio::sync::watch;

use crate::host::PullRequestHost;
use crate::llm::ReviewBackend;

pub(crate) fn entry(filename: &str, status: FileStatus, patch: Option<&str>) -> ChangedFileEntry {
    ChangedFileEntry {
        filename: filename.into(),
        status,
        additions: 3,
        deletions: 1,
        patch: patch.map(str::to_string),
    }
}

#[derive(Default)]
pub(crate) struct FakeHost {
    pub info: Option<PullRequestInfo>,
    pub files: Vec<ChangedFileEntry>,
    pub contents: HashMap<String, ContentLookup>,
    pub fail_listing: bool,
    /// Post attempts whose zero-based index is in this set fail.
    pub failing_posts: HashSet<usize>,
    pub fail_all_posts: bool,
    pub lookups: Mutex<Vec<String>>,
    pub attempts: Mutex<usize>,
    pub posted: Mutex<Vec<String>>,
    /// Raised on every post attempt.
    pub cancel_on_post: Option<watch::Sender<bool>>,
}

impl FakeHost {
    pub(crate) fn with_pr(title: &str, body: Option<&str>) -> Self {
        Self {
            info: Some(PullRequestInfo {
                title: title.into(),
                body: body.map(str::to_string),
                head_sha: "head-sha".into(),
            }),
            ..Self::default()
        }
    }

    pub(crate) fn file(mut self, entry: ChangedFileEntry, lookup: ContentLookup) -> Self {
        self.contents.insert(entry.filename.clone(), lookup);
        self.files.push(entry);
        self
    }

    pub(crate) fn posted(&self) -> Vec<String> {
        self.posted.lock().unwrap().clone()
    }

    pub(crate) fn lookups(&self) -> Vec<String> {
        self.lookups.lock().unwrap().clone()
    }
}

#[async_trait]
impl PullRequestHost for FakeHost {
    async fn pull_request(&self, pr: &PullRequestRef) -> Result<PullRequestInfo, CriticError> {
        self.info
            .clone()
            .ok_or_else(|| CriticError::GitHub(format!("{pr} not found")))
    }

    async fn changed_files(
        &self,
        _pr: &PullRequestRef,
    ) -> Result<Vec<ChangedFileEntry>, CriticError> {
        if self.fail_listing {
            return Err(CriticError::GitHub("listing failed".into()));
        }
        Ok(self.files.clone())
    }

    async fn file_content(
        &self,
        _pr: &PullRequestRef,
        path: &str,
        git_ref: &str,
    ) -> ContentLookup {
        assert_eq!(git_ref, "head-sha");
        self.lookups.lock().unwrap().push(path.to_string());
        self.contents
            .get(path)
            .cloned()
            .unwrap_or(ContentLookup::NotFound)
    }

    async fn post_comment(&self, _pr: &PullRequestRef, body: &str) -> Result<(), CriticError> {
        if let Some(cancel) = &self.cancel_on_post {
            cancel.send_replace(true);
        }
        let attempt = {
            let mut attempts = self.attempts.lock().unwrap();
            let current = *attempts;
            *attempts += 1;
            current
        };
        if self.fail_all_posts || self.failing_posts.contains(&attempt) {
            return Err(CriticError::GitHub(format!("post {attempt} rejected")));
        }
        self.posted.lock().unwrap().push(body.to_string());
        Ok(())
    }
}

pub(crate) struct FakeBackend {
    pub reply: Result<String, BackendError>,
    pub prompts: Mutex<Vec<String>>,
    /// Raised when the backend is called.
    pub cancel_on_generate: Option<watch::Sender<bool>>,
}

impl FakeBackend {
    pub(crate) fn replying(text: &str) -> Self {
        Self {
            reply: Ok(text.to_string()),
            prompts: Mutex::new(Vec::new()),
            cancel_on_generate: None,
        }
    }

    pub(crate) fn failing(err: BackendError) -> Self {
        Self {
            reply: Err(err),
            prompts: Mutex::new(Vec::new()),
            cancel_on_generate: None,
        }
    }

    pub(crate) fn calls(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }
}

#[async_trait]
impl ReviewBackend for FakeBackend {
    fn model(&self) -> &str {
        "fake-model"
    }

    async fn generate(&self, prompt: &str) -> Result<String, BackendError> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        if let Some(cancel) = &self.cancel_on_generate {
            cancel.send_replace(true);
        }
        self.reply.clone()
    }
}
