use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use critic_core::PullRequestRef;
use critic_review::demo::sample_review;
use critic_review::llm::{BackendHealth, OllamaClient};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{AppError, AppResult};
use crate::queue::JobStatus;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct ServiceInfo {
    pub message: &'static str,
    pub version: &'static str,
    pub status: &'static str,
}

pub async fn root() -> Json<ServiceInfo> {
    Json(ServiceInfo {
        message: "critic pull request review service",
        version: env!("CARGO_PKG_VERSION"),
        status: "running",
    })
}

#[derive(Debug, Serialize)]
pub struct HealthReport {
    pub api: &'static str,
    pub ollama: BackendHealth,
    pub github_token: &'static str,
}

pub async fn health(State(state): State<AppState>) -> Json<HealthReport> {
    let ollama = match OllamaClient::new(&state.config.backend) {
        Ok(client) => client.ping().await,
        Err(_) => BackendHealth::Unavailable,
    };
    let github_token = match state.config.github.token.as_deref() {
        Some(token) if !token.trim().is_empty() => "configured",
        _ => "missing",
    };
    Json(HealthReport {
        api: "healthy",
        ollama,
        github_token,
    })
}

/// Body of `POST /review`.
#[derive(Debug, Deserialize)]
pub struct ReviewRequest {
    #[serde(default)]
    pub pr_number: u64,
    #[serde(default)]
    pub repo_name: String,
    pub token: Option<String>,
    #[serde(default)]
    pub use_demo: bool,
}

#[derive(Debug, Serialize)]
pub struct ReviewAccepted {
    pub success: bool,
    pub message: String,
    pub review_id: String,
}

pub async fn submit_review(
    State(state): State<AppState>,
    Json(request): Json<ReviewRequest>,
) -> AppResult<(StatusCode, Json<ReviewAccepted>)> {
    if request.repo_name.trim().is_empty() {
        return Err(AppError::BadRequest("repo_name is required".into()));
    }
    if request.pr_number == 0 {
        return Err(AppError::BadRequest(
            "pr_number must be a positive integer".into(),
        ));
    }
    let pr = PullRequestRef::new(request.repo_name.trim(), request.pr_number)
        .map_err(|e| AppError::BadRequest(e.to_string()))?;

    let token = request
        .token
        .filter(|t| !t.trim().is_empty())
        .or_else(|| state.config.github.token.clone())
        .filter(|t| !t.trim().is_empty())
        .ok_or_else(|| AppError::BadRequest("GitHub token is required".into()))?;

    let message = if request.use_demo {
        format!("Demo review started for PR #{} in {}", pr.number, pr.full_name())
    } else {
        format!("Review started for PR #{} in {}", pr.number, pr.full_name())
    };
    let review_id = state.queue.submit(pr, token, request.use_demo)?;
    info!(%review_id, "accepted review request");

    Ok((
        StatusCode::ACCEPTED,
        Json(ReviewAccepted {
            success: true,
            message,
            review_id,
        }),
    ))
}

#[derive(Debug, Serialize)]
pub struct ReviewState {
    pub review_id: String,
    pub status: JobStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

pub async fn review_status(
    State(state): State<AppState>,
    Path(review_id): Path<String>,
) -> AppResult<Json<ReviewState>> {
    let snapshot = state
        .queue
        .status(&review_id)
        .ok_or_else(|| AppError::NotFound(review_id.clone()))?;
    Ok(Json(ReviewState {
        review_id,
        status: snapshot.status,
        error: snapshot.error,
    }))
}

pub async fn cancel_review(
    State(state): State<AppState>,
    Path(review_id): Path<String>,
) -> AppResult<Json<ReviewState>> {
    let status = state
        .queue
        .cancel(&review_id)
        .ok_or_else(|| AppError::NotFound(review_id.clone()))?;
    Ok(Json(ReviewState {
        review_id,
        status,
        error: None,
    }))
}

#[derive(Debug, Serialize)]
pub struct DemoReview {
    pub success: bool,
    pub demo_mode: bool,
    pub review: String,
}

pub async fn demo_review() -> Json<DemoReview> {
    Json(DemoReview {
        success: true,
        demo_mode: true,
        review: sample_review(),
    })
}
