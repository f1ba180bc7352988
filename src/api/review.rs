//! Review API Endpoints
//!
//! Reviewers list pending cases and resolve them.

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
};
use serde::{Deserialize, Serialize};

use crate::api::{ApiState, api_error};
use crate::moderation::{ReviewCase, ReviewResolution, Verdict};

#[derive(Debug, Serialize)]
pub struct PendingReviewsResponse {
    pub total: usize,
    pub cases: Vec<ReviewCase>,
}

#[derive(Debug, Deserialize)]
pub struct ResolveRequest {
    pub verdict: Verdict,
    pub reviewer_id: String,
}

/// GET /reviews/pending
pub async fn get_pending(
    State(state): State<ApiState>,
) -> Result<Json<PendingReviewsResponse>, (StatusCode, String)> {
    let cases = state
        .moderator
        .reviews()
        .pending()
        .await
        .map_err(api_error)?;

    Ok(Json(PendingReviewsResponse {
        total: cases.len(),
        cases,
    }))
}

/// GET /reviews/{case_id}
pub async fn get_case(
    State(state): State<ApiState>,
    Path(case_id): Path<String>,
) -> Result<Json<ReviewCase>, (StatusCode, String)> {
    state
        .moderator
        .reviews()
        .get(&case_id)
        .await
        .map(Json)
        .map_err(api_error)
}

/// POST /reviews/{case_id}/resolve
pub async fn resolve_case(
    State(state): State<ApiState>,
    Path(case_id): Path<String>,
    Json(payload): Json<ResolveRequest>,
) -> Result<Json<ReviewResolution>, (StatusCode, String)> {
    let reviewer_id = payload.reviewer_id.trim();
    if reviewer_id.is_empty() {
        return Err((StatusCode::BAD_REQUEST, "reviewer_id is required".to_string()));
    }

    state
        .moderator
        .reviews()
        .resolve(&case_id, payload.verdict, reviewer_id)
        .await
        .map(Json)
        .map_err(api_error)
}

pub fn create_review_router(state: ApiState) -> Router {
    Router::new()
        .route("/pending", get(get_pending))
        .route("/{case_id}", get(get_case))
        .route("/{case_id}/resolve", post(resolve_case))
        .with_state(state)
}
