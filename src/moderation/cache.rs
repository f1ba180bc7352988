//! Score Cache
//!
//! Remembers the score obtained for each fingerprint so identical media is
//! scored remotely at most once.
//!
//! | Situation | Behavior |
//! |-----------|----------|
//! | Hit | Record returned, LRU recency refreshed |
//! | Concurrent misses | One scoring call, every caller gets its result |
//! | Scoring failure | Shared with the waiting callers, nothing cached |
//! | Record older than TTL | Treated as absent and dropped |
//! | Capacity reached | Least recently used unpinned record dropped |
//! | Open review case | Record pinned, exempt from TTL and capacity |

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use lru::LruCache;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::future::Future;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::{Mutex, OnceCell};
use tracing::debug;

use crate::error::{ModerationError, ModerationResult};
use crate::moderation::decision::DecisionKind;
use crate::moderation::fingerprint::Fingerprint;

/// A score obtained from the remote scorer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreRecord {
    pub fingerprint: Fingerprint,

    /// Immutable once written
    pub score: f64,

    /// Content-level decision; a Borderline one is finalized after review
    pub decision: DecisionKind,

    pub computed_at: DateTime<Utc>,
}

/// Retention bounds for the cache
#[derive(Debug, Clone, Default)]
pub struct CacheSettings {
    /// Records older than this are dropped (None keeps them forever)
    pub ttl: Option<chrono::Duration>,

    /// Maximum unpinned records (None is unbounded)
    pub capacity: Option<usize>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CacheStats {
    pub entries: usize,
    pub pinned: usize,
    pub hits: u64,
    pub scoring_calls: u64,
    pub in_flight: usize,
}

/// Open review cases referencing a fingerprint; the record may arrive later
struct PinnedRecord {
    record: Option<ScoreRecord>,
    pins: usize,
}

struct CacheState {
    lru: LruCache<Fingerprint, ScoreRecord>,
    pinned: HashMap<Fingerprint, PinnedRecord>,
}

impl CacheState {
    fn lookup(
        &mut self,
        fp: &Fingerprint,
        now: DateTime<Utc>,
        ttl: Option<chrono::Duration>,
    ) -> Option<ScoreRecord> {
        if let Some(pinned) = self.pinned.get(fp) {
            return pinned.record.clone();
        }

        // `get` refreshes recency
        let expired = match self.lru.get(fp) {
            Some(record) => is_expired(record, now, ttl),
            None => return None,
        };

        if expired {
            self.lru.pop(fp);
            debug!(fingerprint = %fp.short(), "Dropped expired score record");
            return None;
        }

        self.lru.peek(fp).cloned()
    }
}

fn is_expired(record: &ScoreRecord, now: DateTime<Utc>, ttl: Option<chrono::Duration>) -> bool {
    ttl.is_some_and(|ttl| now - record.computed_at > ttl)
}

type Flight = Arc<OnceCell<ModerationResult<ScoreRecord>>>;

pub struct ScoreCache {
    state: Mutex<CacheState>,
    settings: CacheSettings,
    in_flight: DashMap<Fingerprint, Flight>,
    hits: AtomicU64,
    scoring_calls: AtomicU64,
}

impl ScoreCache {
    pub fn new(settings: CacheSettings) -> Self {
        let lru = match settings.capacity.and_then(NonZeroUsize::new) {
            Some(capacity) => LruCache::new(capacity),
            None => LruCache::unbounded(),
        };

        Self {
            state: Mutex::new(CacheState {
                lru,
                pinned: HashMap::new(),
            }),
            settings,
            in_flight: DashMap::new(),
            hits: AtomicU64::new(0),
            scoring_calls: AtomicU64::new(0),
        }
    }

    /// Cached record for `fp`, never triggers scoring
    pub async fn lookup(&self, fp: &Fingerprint) -> Option<ScoreRecord> {
        let mut state = self.state.lock().await;
        state.lookup(fp, Utc::now(), self.settings.ttl)
    }

    /// Insert a record unless one is already cached; the existing record wins
    pub async fn store(&self, fp: Fingerprint, score: f64, decision: DecisionKind) -> ScoreRecord {
        let mut state = self.state.lock().await;
        let now = Utc::now();

        if let Some(existing) = state.lookup(&fp, now, self.settings.ttl) {
            return existing;
        }

        let record = ScoreRecord {
            fingerprint: fp,
            score,
            decision,
            computed_at: now,
        };

        // A case opened before the record existed already holds a pin
        if let Some(pinned) = state.pinned.get_mut(&fp) {
            pinned.record = Some(record.clone());
            return record;
        }

        if let Some((evicted, _)) = state.lru.push(fp, record.clone())
            && evicted != fp
        {
            debug!(fingerprint = %evicted.short(), "Evicted least recently used score");
        }

        record
    }

    /// Cached record for `fp`, scoring it with `score_fn` on a miss.
    ///
    /// Concurrent misses for the same fingerprint share a single call to
    /// `score_fn`. Returns the record and whether this caller was served
    /// without scoring.
    pub async fn get_or_score<F, Fut>(
        &self,
        fp: Fingerprint,
        score_fn: F,
    ) -> ModerationResult<(ScoreRecord, bool)>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = ModerationResult<(f64, DecisionKind)>>,
    {
        if let Some(record) = self.lookup(&fp).await {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Ok((record, true));
        }

        let flight = self
            .in_flight
            .entry(fp)
            .or_insert_with(|| Arc::new(OnceCell::new()))
            .clone();

        let mut scored_here = false;
        let leader = &mut scored_here;

        let result = flight
            .get_or_init(move || async move {
                // A flight that finished just before ours may have filled the cache
                if let Some(record) = self.lookup(&fp).await {
                    return Ok::<_, ModerationError>(record);
                }

                *leader = true;
                self.scoring_calls.fetch_add(1, Ordering::Relaxed);
                let (score, decision) = score_fn().await?;
                Ok(self.store(fp, score, decision).await)
            })
            .await
            .clone();

        self.in_flight
            .remove_if(&fp, |_, current| Arc::ptr_eq(current, &flight));

        if !scored_here && result.is_ok() {
            self.hits.fetch_add(1, Ordering::Relaxed);
        }

        result.map(|record| (record, !scored_here))
    }

    /// Protect the record for `fp` from eviction while a review case
    /// references it. The pin is held even when no record is cached yet, and
    /// a record stored later lands directly in the pinned set. Returns
    /// whether a record is currently held.
    pub async fn pin(&self, fp: &Fingerprint) -> bool {
        let mut guard = self.state.lock().await;
        let state = &mut *guard;

        if let Some(pinned) = state.pinned.get_mut(fp) {
            pinned.pins += 1;
            return pinned.record.is_some();
        }

        let record = state.lru.pop(fp);
        let held = record.is_some();
        state.pinned.insert(*fp, PinnedRecord { record, pins: 1 });
        held
    }

    /// Release one pin; the record becomes evictable again at zero
    pub async fn unpin(&self, fp: &Fingerprint) {
        let mut guard = self.state.lock().await;
        let state = &mut *guard;

        let Some(pinned) = state.pinned.get_mut(fp) else {
            return;
        };

        if pinned.pins > 1 {
            pinned.pins -= 1;
            return;
        }

        if let Some(record) = state.pinned.remove(fp).and_then(|released| released.record) {
            state.lru.push(*fp, record);
        }
    }

    /// Replace a Borderline decision with the reviewed one
    pub async fn finalize(&self, fp: &Fingerprint, decision: DecisionKind) -> Option<ScoreRecord> {
        let mut guard = self.state.lock().await;
        let state = &mut *guard;

        let record = match state.pinned.get_mut(fp) {
            Some(pinned) => pinned.record.as_mut(),
            None => state.lru.peek_mut(fp),
        }?;

        if record.decision == DecisionKind::Borderline {
            record.decision = decision;
            debug!(fingerprint = %fp.short(), decision = %decision, "Finalized cached decision");
        }

        Some(record.clone())
    }

    /// Drop unpinned records older than the TTL as of `now`
    pub async fn evict_expired(&self, now: DateTime<Utc>) -> usize {
        let Some(ttl) = self.settings.ttl else {
            return 0;
        };

        let mut state = self.state.lock().await;

        let expired: Vec<Fingerprint> = state
            .lru
            .iter()
            .filter(|(_, record)| is_expired(record, now, Some(ttl)))
            .map(|(fp, _)| *fp)
            .collect();

        for fp in &expired {
            state.lru.pop(fp);
        }

        if !expired.is_empty() {
            debug!("Evicted {} expired score records", expired.len());
        }

        expired.len()
    }

    pub async fn stats(&self) -> CacheStats {
        let state = self.state.lock().await;
        let held = state.pinned.values().filter(|p| p.record.is_some()).count();
        CacheStats {
            entries: state.lru.len() + held,
            pinned: state.pinned.len(),
            hits: self.hits.load(Ordering::Relaxed),
            scoring_calls: self.scoring_calls.load(Ordering::Relaxed),
            in_flight: self.in_flight.len(),
        }
    }
}

impl Default for ScoreCache {
    fn default() -> Self {
        Self::new(CacheSettings::default())
    }
}
