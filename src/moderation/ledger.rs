//! Offense Ledger
//!
//! Durable per-user violation counts and mute state. Every mutation for a
//! given user runs under that user's lock, so concurrent violations never
//! lose an increment. The store applies the increment and the mute
//! escalation in one atomic write.

use backoff::ExponentialBackoffBuilder;
use backoff::future::retry;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::error::{ModerationError, ModerationResult};
use crate::moderation::decision::DecisionPolicy;
use crate::moderation::locks::KeyedLocks;
use crate::store::{Escalation, ModerationStore};

/// A chat member; offenses are tracked per chat
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserRef {
    pub chat_id: i64,
    pub user_id: i64,
}

impl UserRef {
    pub fn new(chat_id: i64, user_id: i64) -> Self {
        Self { chat_id, user_id }
    }
}

impl fmt::Display for UserRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.chat_id, self.user_id)
    }
}

/// Violation history for one chat member
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Offender {
    pub user: UserRef,

    /// Confirmed violations; only an administrative reset lowers it
    pub violation_count: u32,

    /// Mute expiry, set by escalation and cleared by admin override
    pub muted_until: Option<DateTime<Utc>>,

    pub last_offense_at: Option<DateTime<Utc>>,
}

impl Offender {
    /// Zero-state record for a user with no history
    pub fn new(user: UserRef) -> Self {
        Self {
            user,
            violation_count: 0,
            muted_until: None,
            last_offense_at: None,
        }
    }

    pub fn is_muted_at(&self, now: DateTime<Utc>) -> bool {
        self.muted_until.is_some_and(|until| until > now)
    }
}

pub struct OffenseLedger {
    store: Arc<dyn ModerationStore>,
    policy: DecisionPolicy,
    locks: KeyedLocks<UserRef>,
    retry_budget: Duration,
}

impl OffenseLedger {
    pub fn new(store: Arc<dyn ModerationStore>, policy: DecisionPolicy) -> Self {
        Self {
            store,
            policy,
            locks: KeyedLocks::new(),
            retry_budget: Duration::from_secs(5),
        }
    }

    /// Total time spent retrying a contended store write before giving up
    pub fn with_retry_budget(mut self, budget: Duration) -> Self {
        self.retry_budget = budget;
        self
    }

    /// Current record, or the zero-state if the user never offended
    pub async fn get(&self, user: UserRef) -> ModerationResult<Offender> {
        Ok(self
            .store
            .get_offender(user)
            .await?
            .unwrap_or_else(|| Offender::new(user)))
    }

    /// Record one confirmed violation and escalate to a mute at the limit
    pub async fn record_violation(&self, user: UserRef) -> ModerationResult<Offender> {
        let _guard = self.locks.acquire(&user).await;
        let now = Utc::now();

        // Saturates instead of overflowing for an absurd mute period
        let escalation = Escalation {
            limit: self.policy.repeat_offense_limit,
            muted_until: now
                .checked_add_signed(self.policy.mute_period())
                .unwrap_or(DateTime::<Utc>::MAX_UTC),
        };

        let offender = self.increment_with_retry(user, now, escalation).await?;

        if offender.violation_count >= self.policy.repeat_offense_limit {
            info!(
                user = %user,
                violations = offender.violation_count,
                muted_until = ?offender.muted_until,
                "Repeat-offense limit reached, user muted"
            );
        } else {
            debug!(
                user = %user,
                violations = offender.violation_count,
                "Recorded violation"
            );
        }

        Ok(offender)
    }

    /// Administrative unmute; the violation count is kept
    pub async fn reset_mute(&self, user: UserRef) -> ModerationResult<Offender> {
        let _guard = self.locks.acquire(&user).await;

        let mut offender = self.get(user).await?;
        if offender.muted_until.take().is_some() {
            self.put_with_retry(&offender).await?;
            info!(user = %user, "Mute cleared by admin");
        }

        Ok(offender)
    }

    /// Administrative pardon: clears both the count and any mute
    pub async fn reset(&self, user: UserRef) -> ModerationResult<Offender> {
        let _guard = self.locks.acquire(&user).await;

        let mut offender = self.get(user).await?;
        offender.violation_count = 0;
        offender.muted_until = None;
        self.put_with_retry(&offender).await?;

        info!(user = %user, "Offense history reset by admin");
        Ok(offender)
    }

    pub fn policy(&self) -> &DecisionPolicy {
        &self.policy
    }

    async fn increment_with_retry(
        &self,
        user: UserRef,
        at: DateTime<Utc>,
        escalation: Escalation,
    ) -> ModerationResult<Offender> {
        let store = self.store.clone();
        retry(self.backoff(), move || {
            let store = store.clone();
            async move {
                store
                    .increment_violation(user, at, escalation)
                    .await
                    .map_err(classify_store_error)
            }
        })
        .await
    }

    async fn put_with_retry(&self, offender: &Offender) -> ModerationResult<()> {
        let store = self.store.clone();
        let offender = offender.clone();
        retry(self.backoff(), move || {
            let store = store.clone();
            let offender = offender.clone();
            async move {
                store
                    .put_offender(&offender)
                    .await
                    .map_err(classify_store_error)
            }
        })
        .await
    }

    fn backoff(&self) -> backoff::ExponentialBackoff {
        ExponentialBackoffBuilder::new()
            .with_initial_interval(Duration::from_millis(20))
            .with_max_interval(Duration::from_millis(500))
            .with_multiplier(2.0)
            .with_max_elapsed_time(Some(self.retry_budget))
            .build()
    }
}

fn classify_store_error(err: ModerationError) -> backoff::Error<ModerationError> {
    if err.is_transient() {
        warn!(error = %err, "Store contention, retrying");
        backoff::Error::transient(err)
    } else {
        backoff::Error::permanent(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use crate::store::faulty::FaultyStore;

    fn ledger(limit: u32) -> OffenseLedger {
        let policy = DecisionPolicy {
            repeat_offense_limit: limit,
            ..DecisionPolicy::default()
        };
        OffenseLedger::new(Arc::new(MemoryStore::new()), policy)
    }

    #[tokio::test]
    async fn test_unseen_user_has_zero_state() {
        let ledger = ledger(3);
        let offender = ledger.get(UserRef::new(1, 7)).await.unwrap();
        assert_eq!(offender.violation_count, 0);
        assert!(offender.muted_until.is_none());
        assert!(offender.last_offense_at.is_none());
    }

    #[tokio::test]
    async fn test_record_violation_increments() {
        let ledger = ledger(3);
        let user = UserRef::new(1, 7);

        let first = ledger.record_violation(user).await.unwrap();
        assert_eq!(first.violation_count, 1);
        assert!(first.last_offense_at.is_some());
        assert!(first.muted_until.is_none());

        let second = ledger.record_violation(user).await.unwrap();
        assert_eq!(second.violation_count, 2);
    }

    #[tokio::test]
    async fn test_mute_set_at_limit() {
        let ledger = ledger(2);
        let user = UserRef::new(1, 7);

        ledger.record_violation(user).await.unwrap();
        let before = Utc::now();
        let offender = ledger.record_violation(user).await.unwrap();

        let until = offender.muted_until.expect("muted at limit");
        assert!(until >= before);
        assert!(offender.is_muted_at(Utc::now()));
    }

    #[tokio::test]
    async fn test_reset_mute_keeps_count() {
        let ledger = ledger(1);
        let user = UserRef::new(1, 7);

        ledger.record_violation(user).await.unwrap();
        let cleared = ledger.reset_mute(user).await.unwrap();

        assert_eq!(cleared.violation_count, 1);
        assert!(cleared.muted_until.is_none());
        assert_eq!(ledger.get(user).await.unwrap().violation_count, 1);
    }

    #[tokio::test]
    async fn test_reset_clears_history() {
        let ledger = ledger(1);
        let user = UserRef::new(1, 7);

        ledger.record_violation(user).await.unwrap();
        let reset = ledger.reset(user).await.unwrap();
        assert_eq!(reset.violation_count, 0);
        assert!(reset.muted_until.is_none());
    }

    #[tokio::test]
    async fn test_mute_needs_no_separate_write() {
        let store = Arc::new(FaultyStore::new());
        store.fail_offender_puts();
        let policy = DecisionPolicy {
            repeat_offense_limit: 1,
            ..DecisionPolicy::default()
        };
        let ledger = OffenseLedger::new(store.clone(), policy);
        let user = UserRef::new(1, 7);

        let offender = ledger.record_violation(user).await.unwrap();
        assert_eq!(offender.violation_count, 1);
        assert!(offender.is_muted_at(Utc::now()));

        let stored = store.get_offender(user).await.unwrap().unwrap();
        assert_eq!(stored.muted_until, offender.muted_until);
    }

    #[tokio::test]
    async fn test_huge_mute_period_saturates() {
        let policy = DecisionPolicy {
            repeat_offense_limit: 1,
            mute_days: u32::MAX,
            ..DecisionPolicy::default()
        };
        let ledger = OffenseLedger::new(Arc::new(MemoryStore::new()), policy);

        let offender = ledger.record_violation(UserRef::new(1, 7)).await.unwrap();
        assert_eq!(offender.muted_until, Some(DateTime::<Utc>::MAX_UTC));
    }

    #[tokio::test]
    async fn test_users_are_scoped_per_chat() {
        let ledger = ledger(3);
        ledger.record_violation(UserRef::new(1, 7)).await.unwrap();

        let other_chat = ledger.get(UserRef::new(2, 7)).await.unwrap();
        assert_eq!(other_chat.violation_count, 0);
    }
}
