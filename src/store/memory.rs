//! In-memory store backed by concurrent maps

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::{DashMap, DashSet};

use crate::error::ModerationResult;
use crate::moderation::{Offender, ReviewCase, ReviewState, UserRef};
use crate::store::{Escalation, ModerationStore};

#[derive(Default)]
pub struct MemoryStore {
    offenders: DashMap<UserRef, Offender>,
    cases: DashMap<String, ReviewCase>,
    whitelist: DashSet<UserRef>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn offender_count(&self) -> usize {
        self.offenders.len()
    }
}

#[async_trait]
impl ModerationStore for MemoryStore {
    async fn get_offender(&self, user: UserRef) -> ModerationResult<Option<Offender>> {
        Ok(self.offenders.get(&user).map(|entry| entry.value().clone()))
    }

    async fn increment_violation(
        &self,
        user: UserRef,
        at: DateTime<Utc>,
        escalation: Escalation,
    ) -> ModerationResult<Offender> {
        // The entry guard holds the shard lock for the whole update
        let mut entry = self
            .offenders
            .entry(user)
            .or_insert_with(|| Offender::new(user));

        entry.violation_count = entry.violation_count.saturating_add(1);
        entry.last_offense_at = Some(at);
        escalation.apply(&mut entry);

        Ok(entry.value().clone())
    }

    async fn put_offender(&self, offender: &Offender) -> ModerationResult<()> {
        self.offenders.insert(offender.user, offender.clone());
        Ok(())
    }

    async fn get_case(&self, case_id: &str) -> ModerationResult<Option<ReviewCase>> {
        Ok(self.cases.get(case_id).map(|entry| entry.value().clone()))
    }

    async fn put_case(&self, case: &ReviewCase) -> ModerationResult<()> {
        self.cases.insert(case.case_id.clone(), case.clone());
        Ok(())
    }

    async fn list_cases(&self, state: Option<ReviewState>) -> ModerationResult<Vec<ReviewCase>> {
        let mut cases: Vec<ReviewCase> = self
            .cases
            .iter()
            .filter(|entry| state.is_none_or(|s| entry.state == s))
            .map(|entry| entry.value().clone())
            .collect();

        cases.sort_by_key(|case| case.opened_at);
        Ok(cases)
    }

    async fn add_whitelist(&self, user: UserRef) -> ModerationResult<bool> {
        Ok(self.whitelist.insert(user))
    }

    async fn remove_whitelist(&self, user: UserRef) -> ModerationResult<bool> {
        Ok(self.whitelist.remove(&user).is_some())
    }

    async fn is_whitelisted(&self, user: UserRef) -> ModerationResult<bool> {
        Ok(self.whitelist.contains(&user))
    }
}
