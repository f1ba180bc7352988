//! Media ingress, health and stats

use axum::{
    Json, Router,
    body::Bytes,
    extract::{DefaultBodyLimit, Query, State},
    http::StatusCode,
    routing::{get, post},
};
use serde::{Deserialize, Serialize};

use crate::api::{ApiState, api_error};
use crate::moderation::{CacheStats, MediaSubmission, ModerationOutcome};

/// Largest media payload accepted by `/moderate`
const MAX_MEDIA_BYTES: usize = 25 * 1024 * 1024;

#[derive(Debug, Deserialize)]
pub struct SubmitParams {
    pub chat_id: i64,
    pub user_id: i64,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub cache: CacheStats,
    pub open_reviews: usize,
    pub event_subscribers: usize,
}

/// GET /health
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// POST /moderate?chat_id=&user_id= with the raw media as the body
pub async fn moderate(
    State(state): State<ApiState>,
    Query(params): Query<SubmitParams>,
    body: Bytes,
) -> Result<Json<ModerationOutcome>, (StatusCode, String)> {
    let submission = MediaSubmission::new(params.chat_id, params.user_id, body.to_vec());

    state
        .moderator
        .moderate(submission)
        .await
        .map(Json)
        .map_err(api_error)
}

/// GET /stats
pub async fn stats(State(state): State<ApiState>) -> Json<StatsResponse> {
    let moderator = &state.moderator;

    Json(StatsResponse {
        cache: moderator.cache().stats().await,
        open_reviews: moderator.reviews().open_count(),
        event_subscribers: moderator.events().subscriber_count(),
    })
}

pub fn create_moderation_router(state: ApiState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route(
            "/moderate",
            post(moderate).layer(DefaultBodyLimit::max(MAX_MEDIA_BYTES)),
        )
        .route("/stats", get(stats))
        .with_state(state)
}
