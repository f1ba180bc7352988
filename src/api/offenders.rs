//! Offender and whitelist administration

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post, put},
};
use chrono::Utc;
use serde::Serialize;
use tracing::info;

use crate::api::{ApiState, api_error};
use crate::moderation::{Offender, UserRef};

#[derive(Debug, Serialize)]
pub struct OffenderResponse {
    #[serde(flatten)]
    pub offender: Offender,
    pub muted: bool,
    pub whitelisted: bool,
}

#[derive(Debug, Serialize)]
pub struct WhitelistResponse {
    pub user: UserRef,
    pub whitelisted: bool,
    /// False when the request did not change anything
    pub changed: bool,
}

async fn offender_response(
    state: &ApiState,
    offender: Offender,
) -> Result<Json<OffenderResponse>, (StatusCode, String)> {
    let whitelisted = state
        .moderator
        .store()
        .is_whitelisted(offender.user)
        .await
        .map_err(api_error)?;

    Ok(Json(OffenderResponse {
        muted: offender.is_muted_at(Utc::now()),
        whitelisted,
        offender,
    }))
}

/// GET /offenders/{chat_id}/{user_id}
pub async fn get_offender(
    State(state): State<ApiState>,
    Path((chat_id, user_id)): Path<(i64, i64)>,
) -> Result<Json<OffenderResponse>, (StatusCode, String)> {
    let offender = state
        .moderator
        .ledger()
        .get(UserRef::new(chat_id, user_id))
        .await
        .map_err(api_error)?;

    offender_response(&state, offender).await
}

/// POST /offenders/{chat_id}/{user_id}/unmute
pub async fn unmute(
    State(state): State<ApiState>,
    Path((chat_id, user_id)): Path<(i64, i64)>,
) -> Result<Json<OffenderResponse>, (StatusCode, String)> {
    let offender = state
        .moderator
        .ledger()
        .reset_mute(UserRef::new(chat_id, user_id))
        .await
        .map_err(api_error)?;

    offender_response(&state, offender).await
}

/// POST /offenders/{chat_id}/{user_id}/reset
pub async fn reset(
    State(state): State<ApiState>,
    Path((chat_id, user_id)): Path<(i64, i64)>,
) -> Result<Json<OffenderResponse>, (StatusCode, String)> {
    let offender = state
        .moderator
        .ledger()
        .reset(UserRef::new(chat_id, user_id))
        .await
        .map_err(api_error)?;

    offender_response(&state, offender).await
}

/// PUT /whitelist/{chat_id}/{user_id}
pub async fn add_whitelist(
    State(state): State<ApiState>,
    Path((chat_id, user_id)): Path<(i64, i64)>,
) -> Result<Json<WhitelistResponse>, (StatusCode, String)> {
    let user = UserRef::new(chat_id, user_id);
    let changed = state
        .moderator
        .store()
        .add_whitelist(user)
        .await
        .map_err(api_error)?;

    if changed {
        info!(user = %user, "User whitelisted");
    }

    Ok(Json(WhitelistResponse {
        user,
        whitelisted: true,
        changed,
    }))
}

/// DELETE /whitelist/{chat_id}/{user_id}
pub async fn remove_whitelist(
    State(state): State<ApiState>,
    Path((chat_id, user_id)): Path<(i64, i64)>,
) -> Result<Json<WhitelistResponse>, (StatusCode, String)> {
    let user = UserRef::new(chat_id, user_id);
    let changed = state
        .moderator
        .store()
        .remove_whitelist(user)
        .await
        .map_err(api_error)?;

    if changed {
        info!(user = %user, "User removed from whitelist");
    }

    Ok(Json(WhitelistResponse {
        user,
        whitelisted: false,
        changed,
    }))
}

pub fn create_offenders_router(state: ApiState) -> Router {
    Router::new()
        .route("/offenders/{chat_id}/{user_id}", get(get_offender))
        .route("/offenders/{chat_id}/{user_id}/unmute", post(unmute))
        .route("/offenders/{chat_id}/{user_id}/reset", post(reset))
        .route(
            "/whitelist/{chat_id}/{user_id}",
            put(add_whitelist).delete(remove_whitelist),
        )
        .with_state(state)
}
