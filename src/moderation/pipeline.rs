//! Per-item moderation pipeline
//!
//! ```text
//! submission ─► whitelist? ─► fingerprint ─► cache / scorer ─► decide
//!                                                                │
//!                       Delete / Mute ◄──────────────────────────┤
//!                  (violation recorded)                          │
//!                                       Borderline ─► review case
//! ```
//!
//! A cached record whose decision was finalized by review is applied as the
//! reviewer's verdict: an approval allows the content, a rejection is a
//! confirmed violation for whoever posts it next.

use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::error::{ModerationError, ModerationResult};
use crate::events::{EventBus, ModerationEvent};
use crate::moderation::cache::{ScoreCache, ScoreRecord};
use crate::moderation::decision::{Decision, DecisionEngine, DecisionKind};
use crate::moderation::fingerprint::{Fingerprint, fingerprint};
use crate::moderation::ledger::{OffenseLedger, Offender, UserRef};
use crate::moderation::review::{ReviewCase, ReviewWorkflow};
use crate::scorer::Scorer;
use crate::store::ModerationStore;

/// A media item posted by a chat member
#[derive(Debug, Clone)]
pub struct MediaSubmission {
    pub user: UserRef,
    pub bytes: Vec<u8>,
}

impl MediaSubmission {
    pub fn new(chat_id: i64, user_id: i64, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            user: UserRef::new(chat_id, user_id),
            bytes: bytes.into(),
        }
    }
}

/// Everything the transport needs to act on a submission
#[derive(Debug, Clone, Serialize)]
pub struct ModerationOutcome {
    pub fingerprint: Option<Fingerprint>,
    pub score: Option<f64>,
    pub decision: Decision,

    /// Ledger record after a recorded violation
    pub offender: Option<Offender>,

    /// Case holding the item for review
    pub review_case: Option<ReviewCase>,

    /// Served from the cache without a scoring call
    pub cached: bool,
}

impl ModerationOutcome {
    fn skipped(decision: Decision) -> Self {
        Self {
            fingerprint: None,
            score: None,
            decision,
            offender: None,
            review_case: None,
            cached: false,
        }
    }
}

pub struct Moderator {
    scorer: Arc<dyn Scorer>,
    engine: Arc<DecisionEngine>,
    cache: Arc<ScoreCache>,
    ledger: Arc<OffenseLedger>,
    reviews: Arc<ReviewWorkflow>,
    store: Arc<dyn ModerationStore>,
    events: EventBus,
}

impl Moderator {
    pub fn new(
        scorer: Arc<dyn Scorer>,
        engine: Arc<DecisionEngine>,
        cache: Arc<ScoreCache>,
        ledger: Arc<OffenseLedger>,
        reviews: Arc<ReviewWorkflow>,
        store: Arc<dyn ModerationStore>,
        events: EventBus,
    ) -> Self {
        Self {
            scorer,
            engine,
            cache,
            ledger,
            reviews,
            store,
            events,
        }
    }

    pub async fn moderate(&self, submission: MediaSubmission) -> ModerationResult<ModerationOutcome> {
        let user = submission.user;

        if self.store.is_whitelisted(user).await? {
            debug!(user = %user, "Whitelisted user, skipping moderation");
            let outcome =
                ModerationOutcome::skipped(Decision::new(DecisionKind::Allow, "whitelisted"));
            self.publish_decided(user, &outcome);
            return Ok(outcome);
        }

        let fp = fingerprint(&submission.bytes)?;

        let scored = self
            .cache
            .get_or_score(fp, || async {
                let score = self.scorer.score(&submission.bytes).await?;
                Ok::<_, ModerationError>((score, self.engine.classify(score)))
            })
            .await;

        let outcome = match scored {
            Ok((record, cached)) => self.apply(user, record, cached).await?,
            Err(ModerationError::ScoringUnavailable(reason)) => {
                self.fail_closed(user, fp, reason).await?
            }
            Err(err) => return Err(err),
        };

        self.publish_decided(user, &outcome);
        Ok(outcome)
    }

    async fn apply(
        &self,
        user: UserRef,
        record: ScoreRecord,
        cached: bool,
    ) -> ModerationResult<ModerationOutcome> {
        let fp = record.fingerprint;
        let mut outcome = ModerationOutcome {
            fingerprint: Some(fp),
            score: Some(record.score),
            decision: Decision::new(DecisionKind::Allow, ""),
            offender: None,
            review_case: None,
            cached,
        };

        // Finalized by review: the reviewer's verdict replaces the score bands
        let reviewed = record.decision != self.engine.classify(record.score);

        let decision = if reviewed {
            match record.decision {
                DecisionKind::Allow => {
                    Decision::new(DecisionKind::Allow, "previously approved on review")
                }
                _ => Decision::new(DecisionKind::Delete, "previously rejected on review"),
            }
        } else {
            let offender = self.ledger.get(user).await?;
            self.engine.decide(record.score, &offender)
        };

        match decision.kind {
            DecisionKind::Allow => {
                outcome.decision = decision;
            }
            DecisionKind::Delete | DecisionKind::Mute => {
                let offender = self.ledger.record_violation(user).await?;

                // The recorded count is authoritative when violations race
                let kind = self.engine.enforcement_for(offender.violation_count);
                let muted_until = match kind {
                    DecisionKind::Mute => offender.muted_until,
                    _ => None,
                };

                info!(
                    user = %user,
                    fingerprint = %fp.short(),
                    score = record.score,
                    decision = %kind,
                    violations = offender.violation_count,
                    "Violation enforced"
                );

                outcome.decision = Decision {
                    kind,
                    reason: decision.reason,
                    muted_until,
                };
                outcome.offender = Some(offender);
            }
            DecisionKind::Borderline => {
                outcome.review_case = Some(self.hold_for_review(user, fp, Some(record.score)).await?);
                outcome.decision = decision;
            }
        }

        Ok(outcome)
    }

    async fn fail_closed(
        &self,
        user: UserRef,
        fp: Fingerprint,
        reason: String,
    ) -> ModerationResult<ModerationOutcome> {
        warn!(
            user = %user,
            fingerprint = %fp.short(),
            error = %reason,
            "Scoring unavailable, holding media for review"
        );
        self.events.publish(ModerationEvent::ScoringFailed {
            user,
            fingerprint: fp,
            error: reason.clone(),
        });

        let case = self.hold_for_review(user, fp, None).await?;

        Ok(ModerationOutcome {
            fingerprint: Some(fp),
            score: None,
            decision: self.engine.unscored(&reason),
            offender: None,
            review_case: Some(case),
            cached: false,
        })
    }

    /// Open a case, or return the one already pending for this user and content
    async fn hold_for_review(
        &self,
        user: UserRef,
        fp: Fingerprint,
        score: Option<f64>,
    ) -> ModerationResult<ReviewCase> {
        match self.reviews.open(fp, user, score).await {
            Ok(case) => Ok(case),
            Err(ModerationError::DuplicateCase { case_id, .. }) => {
                debug!(user = %user, case_id = %case_id, "Review already pending");
                self.reviews.get(&case_id).await
            }
            Err(err) => Err(err),
        }
    }

    fn publish_decided(&self, user: UserRef, outcome: &ModerationOutcome) {
        self.events.publish(ModerationEvent::Decided {
            user,
            fingerprint: outcome.fingerprint,
            decision: outcome.decision.clone(),
        });
    }

    pub fn cache(&self) -> &Arc<ScoreCache> {
        &self.cache
    }

    pub fn ledger(&self) -> &Arc<OffenseLedger> {
        &self.ledger
    }

    pub fn reviews(&self) -> &Arc<ReviewWorkflow> {
        &self.reviews
    }

    pub fn store(&self) -> &Arc<dyn ModerationStore> {
        &self.store
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }
}
