//! HTTP API
//!
//! - `moderation` - media ingress, health and stats
//! - `review` - reviewer endpoints for borderline cases
//! - `offenders` - ledger inspection, unmute/reset and the whitelist
//! - `middleware` - API-key auth and security headers

pub mod middleware;
pub mod moderation;
pub mod offenders;
pub mod review;

pub use middleware::{SecurityState, auth_middleware, security_headers_middleware};

use axum::{Router, http::StatusCode, middleware as axum_middleware};
use std::sync::Arc;
use tracing::error;

use crate::error::ModerationError;
use crate::moderation::Moderator;

/// Shared state for every route
#[derive(Clone)]
pub struct ApiState {
    pub moderator: Arc<Moderator>,
}

/// Map a moderation error to the response the client sees
pub fn api_error(err: ModerationError) -> (StatusCode, String) {
    let status = match &err {
        ModerationError::InvalidContent(_) | ModerationError::InvalidConfig(_) => {
            StatusCode::BAD_REQUEST
        }
        ModerationError::CaseNotFound(_) => StatusCode::NOT_FOUND,
        ModerationError::DuplicateCase { .. } | ModerationError::InvalidTransition { .. } => {
            StatusCode::CONFLICT
        }
        ModerationError::ScoringUnavailable(_) | ModerationError::StoreContention(_) => {
            StatusCode::SERVICE_UNAVAILABLE
        }
        ModerationError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };

    if status.is_server_error() {
        error!(error = %err, "Request failed");
    }

    (status, err.to_string())
}

/// Full router with auth and security headers applied
pub fn create_router(state: ApiState, security: SecurityState) -> Router {
    Router::new()
        .merge(moderation::create_moderation_router(state.clone()))
        .nest("/reviews", review::create_review_router(state.clone()))
        .merge(offenders::create_offenders_router(state))
        .layer(axum_middleware::from_fn_with_state(security, auth_middleware))
        .layer(axum_middleware::from_fn(security_headers_middleware))
}
