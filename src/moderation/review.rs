//! Review Workflow
//!
//! Borderline content waits here for a human verdict.
//!
//! ```text
//!            open()                resolve(Approve)
//!  (none) ──────────► Pending ───────────────────────► Approved
//!                        │
//!                        │         resolve(Reject)
//!                        └───────────────────────────► Rejected
//! ```
//!
//! | Verdict | Ledger | Cached decision |
//! |---------|--------|-----------------|
//! | Approve | untouched | Allow |
//! | Reject | one violation recorded | Delete, or Mute at the repeat-offense limit |
//!
//! Only one Pending case may exist per (user, fingerprint). Terminal cases
//! cannot be resolved again. A case enters the open-case index only after it
//! is persisted, and a Reject verdict records its violation once even when
//! persisting the resolution has to be retried.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::error::{ModerationError, ModerationResult};
use crate::events::{EventBus, ModerationEvent};
use crate::moderation::cache::ScoreCache;
use crate::moderation::decision::{Decision, DecisionEngine, DecisionKind};
use crate::moderation::fingerprint::Fingerprint;
use crate::moderation::ledger::{OffenseLedger, Offender, UserRef};
use crate::moderation::locks::KeyedLocks;
use crate::store::ModerationStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReviewState {
    /// Awaiting a reviewer
    Pending,
    /// Reviewer found the content acceptable
    Approved,
    /// Reviewer confirmed the violation
    Rejected,
}

impl ReviewState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReviewState::Pending => "pending",
            ReviewState::Approved => "approved",
            ReviewState::Rejected => "rejected",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, ReviewState::Pending)
    }
}

impl fmt::Display for ReviewState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReviewState {
    type Err = ModerationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(ReviewState::Pending),
            "approved" => Ok(ReviewState::Approved),
            "rejected" => Ok(ReviewState::Rejected),
            other => Err(ModerationError::Store(format!(
                "unknown review state: {}",
                other
            ))),
        }
    }
}

/// A reviewer's ruling on a case
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    Approve,
    Reject,
}

impl Verdict {
    fn resulting_state(&self) -> ReviewState {
        match self {
            Verdict::Approve => ReviewState::Approved,
            Verdict::Reject => ReviewState::Rejected,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewCase {
    pub case_id: String,
    pub fingerprint: Fingerprint,
    pub user: UserRef,

    /// None when the case was opened because scoring failed
    pub score: Option<f64>,

    pub state: ReviewState,
    pub opened_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub resolved_by: Option<String>,

    /// Enforcement applied on resolution
    pub outcome: Option<DecisionKind>,
}

impl ReviewCase {
    fn new(fingerprint: Fingerprint, user: UserRef, score: Option<f64>) -> Self {
        Self {
            case_id: format!("case_{}", Uuid::new_v4().simple()),
            fingerprint,
            user,
            score,
            state: ReviewState::Pending,
            opened_at: Utc::now(),
            resolved_at: None,
            resolved_by: None,
            outcome: None,
        }
    }
}

/// What a resolution did
#[derive(Debug, Clone, Serialize)]
pub struct ReviewResolution {
    pub case: ReviewCase,
    pub decision: Decision,
    /// Updated ledger record when the verdict was Reject
    pub offender: Option<Offender>,
}

pub struct ReviewWorkflow {
    store: Arc<dyn ModerationStore>,
    ledger: Arc<OffenseLedger>,
    cache: Arc<ScoreCache>,
    engine: Arc<DecisionEngine>,
    events: EventBus,

    /// (user, fingerprint) -> id of its Pending case
    open_cases: DashMap<(UserRef, Fingerprint), String>,

    /// Violations recorded for a Reject whose resolution is not persisted yet
    enforced: DashMap<String, Offender>,

    open_locks: KeyedLocks<(UserRef, Fingerprint)>,
    case_locks: KeyedLocks<String>,
}

impl ReviewWorkflow {
    pub fn new(
        store: Arc<dyn ModerationStore>,
        ledger: Arc<OffenseLedger>,
        cache: Arc<ScoreCache>,
        engine: Arc<DecisionEngine>,
        events: EventBus,
    ) -> Self {
        Self {
            store,
            ledger,
            cache,
            engine,
            events,
            open_cases: DashMap::new(),
            enforced: DashMap::new(),
            open_locks: KeyedLocks::new(),
            case_locks: KeyedLocks::new(),
        }
    }

    /// Rebuild the open-case index from the store, returns the number of Pending cases
    pub async fn restore(&self) -> ModerationResult<usize> {
        let pending = self.store.list_cases(Some(ReviewState::Pending)).await?;

        for case in &pending {
            self.open_cases
                .insert((case.user, case.fingerprint), case.case_id.clone());
            self.cache.pin(&case.fingerprint).await;
        }

        if !pending.is_empty() {
            info!("Restored {} pending review case(s)", pending.len());
        }

        Ok(pending.len())
    }

    /// Open a Pending case for content posted by `user`
    pub async fn open(
        &self,
        fingerprint: Fingerprint,
        user: UserRef,
        score: Option<f64>,
    ) -> ModerationResult<ReviewCase> {
        let key = (user, fingerprint);
        let _guard = self.open_locks.acquire(&key).await;

        let existing = self.open_cases.get(&key).map(|entry| entry.value().clone());
        if let Some(case_id) = existing {
            return Err(ModerationError::DuplicateCase {
                user: user.to_string(),
                fingerprint: fingerprint.to_hex(),
                case_id,
            });
        }

        let case = ReviewCase::new(fingerprint, user, score);

        if let Err(err) = self.store.put_case(&case).await {
            error!(user = %user, error = %err, "Failed to persist review case");
            return Err(err);
        }

        // Indexed only once persisted, so a DuplicateCase id always resolves
        self.open_cases.insert(key, case.case_id.clone());
        self.cache.pin(&fingerprint).await;

        info!(
            case_id = %case.case_id,
            user = %user,
            fingerprint = %fingerprint.short(),
            score = ?score,
            "Opened review case"
        );
        self.events
            .publish(ModerationEvent::ReviewOpened { case: case.clone() });

        Ok(case)
    }

    /// Apply a reviewer's verdict to a Pending case
    pub async fn resolve(
        &self,
        case_id: &str,
        verdict: Verdict,
        reviewer_id: &str,
    ) -> ModerationResult<ReviewResolution> {
        let _guard = self.case_locks.acquire(&case_id.to_string()).await;

        let mut case = self
            .store
            .get_case(case_id)
            .await?
            .ok_or_else(|| ModerationError::CaseNotFound(case_id.to_string()))?;

        if case.state.is_terminal() {
            return Err(ModerationError::InvalidTransition {
                case_id: case_id.to_string(),
                state: case.state,
            });
        }

        // A violation already recorded for this case wins over a changed verdict
        let earlier = self
            .enforced
            .get(case_id)
            .map(|entry| entry.value().clone());
        let verdict = match (&earlier, verdict) {
            (Some(_), Verdict::Approve) => {
                warn!(
                    case_id = %case_id,
                    "Violation already recorded for this case, keeping the rejection"
                );
                Verdict::Reject
            }
            (_, verdict) => verdict,
        };

        let (decision, offender) = match verdict {
            Verdict::Approve => (
                Decision::new(
                    DecisionKind::Allow,
                    format!("approved by reviewer {}", reviewer_id),
                ),
                None,
            ),
            Verdict::Reject => {
                let offender = match earlier {
                    Some(offender) => offender,
                    None => {
                        let offender = self.ledger.record_violation(case.user).await?;
                        self.enforced.insert(case_id.to_string(), offender.clone());
                        offender
                    }
                };
                let kind = self.engine.enforcement_for(offender.violation_count);
                let muted_until = match kind {
                    DecisionKind::Mute => offender.muted_until,
                    _ => None,
                };
                let decision = Decision::new(
                    kind,
                    format!(
                        "rejected by reviewer {}; offense {} of limit {}",
                        reviewer_id,
                        offender.violation_count,
                        self.engine.policy().repeat_offense_limit
                    ),
                )
                .with_muted_until(muted_until);
                (decision, Some(offender))
            }
        };

        case.state = verdict.resulting_state();
        case.resolved_at = Some(Utc::now());
        case.resolved_by = Some(reviewer_id.to_string());
        case.outcome = Some(decision.kind);

        if let Err(err) = self.store.put_case(&case).await {
            error!(
                case_id = %case_id,
                error = %err,
                "Failed to persist review resolution"
            );
            return Err(err);
        }

        self.enforced.remove(case_id);
        self.open_cases
            .remove_if(&(case.user, case.fingerprint), |_, id| id == case_id);

        self.cache.finalize(&case.fingerprint, decision.kind).await;
        self.cache.unpin(&case.fingerprint).await;

        info!(
            case_id = %case_id,
            reviewer = %reviewer_id,
            state = %case.state,
            decision = %decision.kind,
            "Resolved review case"
        );
        self.events.publish(ModerationEvent::ReviewResolved {
            case: case.clone(),
            decision: decision.clone(),
        });

        Ok(ReviewResolution {
            case,
            decision,
            offender,
        })
    }

    pub async fn get(&self, case_id: &str) -> ModerationResult<ReviewCase> {
        self.store
            .get_case(case_id)
            .await?
            .ok_or_else(|| ModerationError::CaseNotFound(case_id.to_string()))
    }

    /// Pending cases, oldest first
    pub async fn pending(&self) -> ModerationResult<Vec<ReviewCase>> {
        self.store.list_cases(Some(ReviewState::Pending)).await
    }

    /// The Pending case for this user and content, if any
    pub async fn open_case_for(
        &self,
        user: UserRef,
        fingerprint: Fingerprint,
    ) -> ModerationResult<Option<ReviewCase>> {
        let case_id = match self.open_cases.get(&(user, fingerprint)) {
            Some(entry) => entry.value().clone(),
            None => return Ok(None),
        };

        self.store.get_case(&case_id).await
    }

    pub fn open_count(&self) -> usize {
        self.open_cases.len()
    }

    /// Re-announce Pending cases older than `max_age` so none is forgotten
    pub async fn overdue(&self, max_age: chrono::Duration) -> ModerationResult<Vec<ReviewCase>> {
        let cutoff = Utc::now() - max_age;
        let overdue: Vec<ReviewCase> = self
            .pending()
            .await?
            .into_iter()
            .filter(|case| case.opened_at < cutoff)
            .collect();

        for case in &overdue {
            warn!(
                case_id = %case.case_id,
                user = %case.user,
                opened_at = %case.opened_at,
                "Review case still awaiting a verdict"
            );
            self.events
                .publish(ModerationEvent::ReviewOverdue { case: case.clone() });
        }

        if overdue.is_empty() {
            debug!("No overdue review cases");
        }

        Ok(overdue)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::moderation::cache::CacheSettings;
    use crate::moderation::decision::DecisionPolicy;
    use crate::moderation::fingerprint::fingerprint;
    use crate::store::MemoryStore;
    use crate::store::faulty::FaultyStore;
    use std::time::Duration;

    struct Fixture {
        workflow: ReviewWorkflow,
        ledger: Arc<OffenseLedger>,
        cache: Arc<ScoreCache>,
        events: EventBus,
    }

    fn fixture(limit: u32) -> Fixture {
        fixture_with(limit, Arc::new(MemoryStore::new()), ScoreCache::default())
    }

    fn fixture_with(limit: u32, store: Arc<dyn ModerationStore>, cache: ScoreCache) -> Fixture {
        let policy = DecisionPolicy {
            threshold_low: 0.3,
            threshold_high: 0.7,
            repeat_offense_limit: limit,
            mute_days: 9999,
        };
        let engine = Arc::new(DecisionEngine::new(policy.clone()).unwrap());
        let ledger = Arc::new(OffenseLedger::new(store.clone(), policy));
        let cache = Arc::new(cache);
        let events = EventBus::new(64);
        let workflow = ReviewWorkflow::new(
            store,
            ledger.clone(),
            cache.clone(),
            engine,
            events.clone(),
        );
        Fixture {
            workflow,
            ledger,
            cache,
            events,
        }
    }

    #[tokio::test]
    async fn test_approve_leaves_ledger_untouched() {
        let fx = fixture(3);
        let fp = fingerprint(b"beach photo").unwrap();
        let user = UserRef::new(1, 5);
        fx.cache.store(fp, 0.5, DecisionKind::Borderline).await;

        let case = fx.workflow.open(fp, user, Some(0.5)).await.unwrap();
        assert_eq!(case.state, ReviewState::Pending);

        let resolution = fx
            .workflow
            .resolve(&case.case_id, Verdict::Approve, "admin_1")
            .await
            .unwrap();

        assert_eq!(resolution.case.state, ReviewState::Approved);
        assert_eq!(resolution.case.resolved_by.as_deref(), Some("admin_1"));
        assert_eq!(resolution.decision.kind, DecisionKind::Allow);
        assert!(resolution.offender.is_none());
        assert_eq!(fx.ledger.get(user).await.unwrap().violation_count, 0);
        assert_eq!(
            fx.cache.lookup(&fp).await.unwrap().decision,
            DecisionKind::Allow
        );
    }

    #[tokio::test]
    async fn test_reject_records_violation_and_finalizes() {
        let fx = fixture(3);
        let fp = fingerprint(b"explicit").unwrap();
        let user = UserRef::new(1, 5);
        fx.cache.store(fp, 0.6, DecisionKind::Borderline).await;

        let case = fx.workflow.open(fp, user, Some(0.6)).await.unwrap();
        let resolution = fx
            .workflow
            .resolve(&case.case_id, Verdict::Reject, "admin_1")
            .await
            .unwrap();

        assert_eq!(resolution.case.state, ReviewState::Rejected);
        assert_eq!(resolution.decision.kind, DecisionKind::Delete);
        assert_eq!(resolution.offender.unwrap().violation_count, 1);
        assert_eq!(
            fx.cache.lookup(&fp).await.unwrap().decision,
            DecisionKind::Delete
        );
    }

    #[tokio::test]
    async fn test_duplicate_open_rejected() {
        let fx = fixture(3);
        let fp = fingerprint(b"dup").unwrap();
        let user = UserRef::new(1, 5);

        let first = fx.workflow.open(fp, user, Some(0.5)).await.unwrap();
        let second = fx.workflow.open(fp, user, Some(0.5)).await;

        match second {
            Err(ModerationError::DuplicateCase { case_id, .. }) => {
                assert_eq!(case_id, first.case_id)
            }
            other => panic!("expected DuplicateCase, got {:?}", other),
        }

        // A different user may have a case for the same content
        assert!(fx.workflow.open(fp, UserRef::new(1, 6), Some(0.5)).await.is_ok());
    }

    #[tokio::test]
    async fn test_reopen_after_resolution() {
        let fx = fixture(3);
        let fp = fingerprint(b"again").unwrap();
        let user = UserRef::new(1, 5);

        let case = fx.workflow.open(fp, user, Some(0.5)).await.unwrap();
        fx.workflow
            .resolve(&case.case_id, Verdict::Approve, "admin")
            .await
            .unwrap();

        assert!(fx.workflow.open(fp, user, Some(0.5)).await.is_ok());
    }

    #[tokio::test]
    async fn test_resolving_twice_fails() {
        let fx = fixture(3);
        let fp = fingerprint(b"twice").unwrap();
        let case = fx
            .workflow
            .open(fp, UserRef::new(1, 5), Some(0.5))
            .await
            .unwrap();

        fx.workflow
            .resolve(&case.case_id, Verdict::Reject, "admin")
            .await
            .unwrap();
        let again = fx
            .workflow
            .resolve(&case.case_id, Verdict::Approve, "admin")
            .await;

        assert!(matches!(
            again,
            Err(ModerationError::InvalidTransition {
                state: ReviewState::Rejected,
                ..
            })
        ));
        assert_eq!(
            fx.ledger
                .get(UserRef::new(1, 5))
                .await
                .unwrap()
                .violation_count,
            1
        );
    }

    #[tokio::test]
    async fn test_concurrent_resolutions_apply_once() {
        let fx = Arc::new(fixture(3));
        let fp = fingerprint(b"race").unwrap();
        let user = UserRef::new(1, 5);
        let case = fx.workflow.open(fp, user, Some(0.5)).await.unwrap();

        let tasks: Vec<_> = (0..8)
            .map(|i| {
                let fx = fx.clone();
                let case_id = case.case_id.clone();
                tokio::spawn(async move {
                    fx.workflow
                        .resolve(&case_id, Verdict::Reject, &format!("admin_{}", i))
                        .await
                })
            })
            .collect();

        let mut succeeded = 0;
        for task in tasks {
            if task.await.unwrap().is_ok() {
                succeeded += 1;
            }
        }

        assert_eq!(succeeded, 1);
        assert_eq!(fx.ledger.get(user).await.unwrap().violation_count, 1);
    }

    #[tokio::test]
    async fn test_unknown_case() {
        let fx = fixture(3);
        assert!(matches!(
            fx.workflow.resolve("case_missing", Verdict::Approve, "admin").await,
            Err(ModerationError::CaseNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_events_published() {
        let fx = fixture(3);
        let mut rx = fx.events.subscribe();
        let fp = fingerprint(b"evented").unwrap();

        let case = fx
            .workflow
            .open(fp, UserRef::new(1, 5), Some(0.5))
            .await
            .unwrap();
        fx.workflow
            .resolve(&case.case_id, Verdict::Approve, "admin")
            .await
            .unwrap();

        assert!(matches!(
            rx.recv().await.unwrap(),
            ModerationEvent::ReviewOpened { .. }
        ));
        assert!(matches!(
            rx.recv().await.unwrap(),
            ModerationEvent::ReviewResolved { .. }
        ));
    }

    #[tokio::test]
    async fn test_overdue_cases_reported() {
        let fx = fixture(3);
        let fp = fingerprint(b"stale").unwrap();
        fx.workflow
            .open(fp, UserRef::new(1, 5), Some(0.5))
            .await
            .unwrap();

        assert!(fx
            .workflow
            .overdue(chrono::Duration::hours(1))
            .await
            .unwrap()
            .is_empty());
        assert_eq!(
            fx.workflow
                .overdue(chrono::Duration::seconds(-1))
                .await
                .unwrap()
                .len(),
            1
        );
    }

    #[tokio::test]
    async fn test_open_pins_cache_record() {
        let fx = fixture(3);
        let fp = fingerprint(b"pinned").unwrap();
        fx.cache.store(fp, 0.5, DecisionKind::Borderline).await;

        let case = fx
            .workflow
            .open(fp, UserRef::new(1, 5), Some(0.5))
            .await
            .unwrap();
        assert_eq!(fx.cache.stats().await.pinned, 1);

        fx.workflow
            .resolve(&case.case_id, Verdict::Approve, "admin")
            .await
            .unwrap();
        assert_eq!(fx.cache.stats().await.pinned, 0);
    }

    #[tokio::test]
    async fn test_case_opened_before_record_keeps_other_case_pinned() {
        let fx = fixture_with(
            3,
            Arc::new(MemoryStore::new()),
            ScoreCache::new(CacheSettings {
                ttl: None,
                capacity: Some(1),
            }),
        );
        let fp = fingerprint(b"shared meme").unwrap();

        // Scoring was down for the first poster, so nothing is cached yet
        let first = fx
            .workflow
            .open(fp, UserRef::new(1, 5), None)
            .await
            .unwrap();
        fx.cache.store(fp, 0.5, DecisionKind::Borderline).await;
        fx.workflow
            .open(fp, UserRef::new(1, 6), Some(0.5))
            .await
            .unwrap();

        fx.workflow
            .resolve(&first.case_id, Verdict::Approve, "admin")
            .await
            .unwrap();

        let other = fingerprint(b"unrelated").unwrap();
        fx.cache.store(other, 0.1, DecisionKind::Allow).await;
        fx.cache
            .store(fingerprint(b"unrelated 2").unwrap(), 0.1, DecisionKind::Allow)
            .await;

        let record = fx.cache.lookup(&fp).await.expect("record of an open case");
        assert_eq!(record.decision, DecisionKind::Allow);
        assert_eq!(fx.cache.stats().await.pinned, 1);
    }

    #[tokio::test]
    async fn test_record_scored_after_opening_is_pinned() {
        let fx = fixture_with(
            3,
            Arc::new(MemoryStore::new()),
            ScoreCache::new(CacheSettings {
                ttl: None,
                capacity: Some(1),
            }),
        );
        let fp = fingerprint(b"rescored").unwrap();

        fx.workflow
            .open(fp, UserRef::new(1, 5), None)
            .await
            .unwrap();
        fx.cache.store(fp, 0.5, DecisionKind::Borderline).await;
        fx.cache
            .store(fingerprint(b"filler").unwrap(), 0.1, DecisionKind::Allow)
            .await;

        assert!(fx.cache.lookup(&fp).await.is_some());
    }

    #[tokio::test]
    async fn test_failed_resolution_retry_counts_one_violation() {
        let store = Arc::new(FaultyStore::new());
        let fx = fixture_with(3, store.clone(), ScoreCache::default());
        let fp = fingerprint(b"retried").unwrap();
        let user = UserRef::new(1, 5);
        let case = fx.workflow.open(fp, user, Some(0.6)).await.unwrap();

        store.fail_next_resolutions(1);
        let failed = fx
            .workflow
            .resolve(&case.case_id, Verdict::Reject, "admin")
            .await;
        assert!(matches!(failed, Err(ModerationError::Store(_))));
        assert_eq!(
            fx.workflow.get(&case.case_id).await.unwrap().state,
            ReviewState::Pending
        );

        let resolution = fx
            .workflow
            .resolve(&case.case_id, Verdict::Reject, "admin")
            .await
            .unwrap();

        assert_eq!(resolution.case.state, ReviewState::Rejected);
        assert_eq!(resolution.offender.unwrap().violation_count, 1);
        assert_eq!(fx.ledger.get(user).await.unwrap().violation_count, 1);
        assert_eq!(fx.workflow.open_count(), 0);
    }

    #[tokio::test]
    async fn test_recorded_rejection_survives_changed_verdict() {
        let store = Arc::new(FaultyStore::new());
        let fx = fixture_with(3, store.clone(), ScoreCache::default());
        let fp = fingerprint(b"second thoughts").unwrap();
        let user = UserRef::new(1, 5);
        let case = fx.workflow.open(fp, user, Some(0.6)).await.unwrap();

        store.fail_next_resolutions(1);
        assert!(fx
            .workflow
            .resolve(&case.case_id, Verdict::Reject, "admin")
            .await
            .is_err());

        let resolution = fx
            .workflow
            .resolve(&case.case_id, Verdict::Approve, "admin")
            .await
            .unwrap();

        assert_eq!(resolution.case.state, ReviewState::Rejected);
        assert_eq!(resolution.decision.kind, DecisionKind::Delete);
        assert_eq!(fx.ledger.get(user).await.unwrap().violation_count, 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_duplicate_open_sees_persisted_case() {
        let store = Arc::new(FaultyStore::new().with_case_put_delay(Duration::from_millis(100)));
        let fx = Arc::new(fixture_with(3, store, ScoreCache::default()));
        let fp = fingerprint(b"slow write").unwrap();
        let user = UserRef::new(1, 5);

        let tasks: Vec<_> = (0..4)
            .map(|_| {
                let fx = fx.clone();
                tokio::spawn(async move { fx.workflow.open(fp, user, Some(0.5)).await })
            })
            .collect();

        let mut opened = Vec::new();
        let mut duplicates = Vec::new();
        for task in tasks {
            match task.await.unwrap() {
                Ok(case) => opened.push(case),
                Err(ModerationError::DuplicateCase { case_id, .. }) => duplicates.push(case_id),
                Err(other) => panic!("unexpected error: {:?}", other),
            }
        }

        assert_eq!(opened.len(), 1);
        assert_eq!(duplicates.len(), 3);
        for case_id in duplicates {
            assert_eq!(case_id, opened[0].case_id);
            assert!(fx.workflow.get(&case_id).await.is_ok());
        }
    }
}
