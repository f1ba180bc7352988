//! Store wrapper that injects failures and latency for tests

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use crate::error::{ModerationError, ModerationResult};
use crate::moderation::{Offender, ReviewCase, ReviewState, UserRef};
use crate::store::{Escalation, MemoryStore, ModerationStore};

#[derive(Default)]
pub struct FaultyStore {
    inner: MemoryStore,
    /// Upcoming writes of a terminal case that fail
    failing_resolutions: AtomicUsize,
    failing_offender_puts: AtomicBool,
    case_put_delay: Option<Duration>,
}

impl FaultyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_case_put_delay(mut self, delay: Duration) -> Self {
        self.case_put_delay = Some(delay);
        self
    }

    pub fn fail_next_resolutions(&self, count: usize) {
        self.failing_resolutions.store(count, Ordering::SeqCst);
    }

    pub fn fail_offender_puts(&self) {
        self.failing_offender_puts.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl ModerationStore for FaultyStore {
    async fn get_offender(&self, user: UserRef) -> ModerationResult<Option<Offender>> {
        self.inner.get_offender(user).await
    }

    async fn increment_violation(
        &self,
        user: UserRef,
        at: DateTime<Utc>,
        escalation: Escalation,
    ) -> ModerationResult<Offender> {
        self.inner.increment_violation(user, at, escalation).await
    }

    async fn put_offender(&self, offender: &Offender) -> ModerationResult<()> {
        if self.failing_offender_puts.load(Ordering::SeqCst) {
            return Err(ModerationError::Store("offender write refused".to_string()));
        }
        self.inner.put_offender(offender).await
    }

    async fn get_case(&self, case_id: &str) -> ModerationResult<Option<ReviewCase>> {
        self.inner.get_case(case_id).await
    }

    async fn put_case(&self, case: &ReviewCase) -> ModerationResult<()> {
        if let Some(delay) = self.case_put_delay {
            tokio::time::sleep(delay).await;
        }

        if case.state.is_terminal()
            && self
                .failing_resolutions
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
        {
            return Err(ModerationError::Store("case write refused".to_string()));
        }

        self.inner.put_case(case).await
    }

    async fn list_cases(&self, state: Option<ReviewState>) -> ModerationResult<Vec<ReviewCase>> {
        self.inner.list_cases(state).await
    }

    async fn add_whitelist(&self, user: UserRef) -> ModerationResult<bool> {
        self.inner.add_whitelist(user).await
    }

    async fn remove_whitelist(&self, user: UserRef) -> ModerationResult<bool> {
        self.inner.remove_whitelist(user).await
    }

    async fn is_whitelisted(&self, user: UserRef) -> ModerationResult<bool> {
        self.inner.is_whitelisted(user).await
    }
}
