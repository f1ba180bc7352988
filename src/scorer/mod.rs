//! Remote content scoring
//!
//! The moderator only needs a number in `[0, 1]` for a media payload; where it
//! comes from is behind the [`Scorer`] trait. [`HttpScorer`] talks to the
//! model service over HTTP.

mod http;

pub use http::{HttpScorer, HttpScorerConfig};

use async_trait::async_trait;

use crate::error::ModerationResult;

#[async_trait]
pub trait Scorer: Send + Sync {
    /// Likelihood in `[0, 1]` that the media violates policy.
    ///
    /// Fails with `ScoringUnavailable` when no trustworthy score was obtained.
    async fn score(&self, media: &[u8]) -> ModerationResult<f64>;
}
