//! Moderation core
//!
//! Components, leaf-first:
//!
//! - `fingerprint` - content-addressable key for media bytes
//! - `decision` - pure score/history → decision mapping
//! - `cache` - fingerprint → score memo with single-flight scoring
//! - `ledger` - per-user violation counts and mutes
//! - `review` - human review state machine for borderline content
//! - `pipeline` - the per-item flow tying them together

pub mod cache;
pub mod decision;
pub mod fingerprint;
pub mod ledger;
mod locks;
pub mod pipeline;
pub mod review;

pub use cache::{CacheSettings, CacheStats, ScoreCache, ScoreRecord};
pub use decision::{Decision, DecisionEngine, DecisionKind, DecisionPolicy};
pub use fingerprint::{Fingerprint, fingerprint};
pub use ledger::{OffenseLedger, Offender, UserRef};
pub use pipeline::{MediaSubmission, ModerationOutcome, Moderator};
pub use review::{ReviewCase, ReviewResolution, ReviewState, ReviewWorkflow, Verdict};
