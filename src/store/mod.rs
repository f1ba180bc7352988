//! Persistence for moderation state
//!
//! Offenders, review cases and the per-chat whitelist live behind the
//! [`ModerationStore`] trait. Each operation is atomic for its key; callers
//! that need a read-modify-write sequence serialize it themselves.
//!
//! - [`MemoryStore`]: concurrent in-process maps, used in tests and when
//!   PostgreSQL is disabled
//! - [`PgStore`]: PostgreSQL via sqlx

#[cfg(test)]
pub(crate) mod faulty;
mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::ModerationResult;
use crate::moderation::{Offender, ReviewCase, ReviewState, UserRef};

/// Mute applied in the same write as the increment once the count reaches `limit`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Escalation {
    pub limit: u32,

    /// Never shortens a later existing mute
    pub muted_until: DateTime<Utc>,
}

impl Escalation {
    /// Apply to a record whose count was just incremented
    pub fn apply(&self, offender: &mut Offender) {
        if offender.violation_count >= self.limit {
            offender.muted_until = Some(match offender.muted_until {
                Some(existing) if existing > self.muted_until => existing,
                _ => self.muted_until,
            });
        }
    }
}

#[async_trait]
pub trait ModerationStore: Send + Sync {
    async fn get_offender(&self, user: UserRef) -> ModerationResult<Option<Offender>>;

    /// Atomically add one violation, creating the record on first offense,
    /// and apply the mute escalation in the same write
    async fn increment_violation(
        &self,
        user: UserRef,
        at: DateTime<Utc>,
        escalation: Escalation,
    ) -> ModerationResult<Offender>;

    async fn put_offender(&self, offender: &Offender) -> ModerationResult<()>;

    async fn get_case(&self, case_id: &str) -> ModerationResult<Option<ReviewCase>>;

    async fn put_case(&self, case: &ReviewCase) -> ModerationResult<()>;

    /// Cases ordered by opening time, optionally filtered by state
    async fn list_cases(&self, state: Option<ReviewState>) -> ModerationResult<Vec<ReviewCase>>;

    /// Returns false when the user was already whitelisted
    async fn add_whitelist(&self, user: UserRef) -> ModerationResult<bool>;

    /// Returns false when the user was not whitelisted
    async fn remove_whitelist(&self, user: UserRef) -> ModerationResult<bool>;

    async fn is_whitelisted(&self, user: UserRef) -> ModerationResult<bool>;
}
