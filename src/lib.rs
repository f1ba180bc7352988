//! Media Moderator
//!
//! Scores media posted in group chats, removes violating content, escalates
//! repeat offenders to a mute and routes ambiguous content to human review.
//!
//! ## Module Structure
//!
//! ```text
//! src/
//! ├── lib.rs         - Crate root with re-exports
//! ├── main.rs        - Server entrypoint
//! ├── config.rs      - Environment configuration
//! ├── error.rs       - Error taxonomy
//! ├── events.rs      - Broadcast of moderation events
//! ├── moderation/    - Moderation core
//! │   ├── fingerprint.rs - Content-addressable media keys
//! │   ├── cache.rs       - Score memo with single-flight scoring
//! │   ├── decision.rs    - Score bands and escalation policy
//! │   ├── ledger.rs      - Per-user violations and mutes
//! │   ├── review.rs      - Human review state machine
//! │   └── pipeline.rs    - Per-item moderation flow
//! ├── scorer/        - Remote scoring client
//! ├── store/         - Memory and PostgreSQL persistence
//! └── api/           - HTTP API (ingress, reviews, admin)
//! ```

pub mod api;
pub mod config;
pub mod error;
pub mod events;
pub mod moderation;
pub mod scorer;
pub mod store;

pub use config::ModeratorConfig;
pub use error::{ModerationError, ModerationResult};
pub use events::{EventBus, ModerationEvent};
pub use moderation::{
    Decision, DecisionEngine, DecisionKind, DecisionPolicy, Fingerprint, MediaSubmission,
    ModerationOutcome, Moderator, OffenseLedger, Offender, ReviewCase, ReviewState,
    ReviewWorkflow, ScoreCache, UserRef, Verdict, fingerprint,
};
pub use scorer::{HttpScorer, HttpScorerConfig, Scorer};
pub use store::{Escalation, MemoryStore, ModerationStore, PgStore};
