//! Moderation error taxonomy

use thiserror::Error;

use crate::moderation::ReviewState;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ModerationError {
    /// Empty or unparseable content, nothing is recorded for it
    #[error("Invalid content: {0}")]
    InvalidContent(String),

    /// Bad policy or threshold configuration, fatal at startup
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The remote scorer failed or returned an unusable reply
    #[error("Scoring unavailable: {0}")]
    ScoringUnavailable(String),

    #[error("A review case is already open for user {user} and content {fingerprint} ({case_id})")]
    DuplicateCase {
        user: String,
        fingerprint: String,
        case_id: String,
    },

    #[error("Review case {case_id} is already {state:?}")]
    InvalidTransition { case_id: String, state: ReviewState },

    #[error("Review case not found: {0}")]
    CaseNotFound(String),

    #[error("Store error: {0}")]
    Store(String),

    /// Transient store conflict, safe to retry
    #[error("Store contention: {0}")]
    StoreContention(String),
}

impl ModerationError {
    pub fn is_transient(&self) -> bool {
        matches!(self, ModerationError::StoreContention(_))
    }
}

pub type ModerationResult<T> = Result<T, ModerationError>;
