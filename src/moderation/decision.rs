//! Decision Engine
//!
//! Pure mapping from a content score and the offender's history to an
//! enforcement decision. No I/O, no clock, no randomness.
//!
//! ```text
//!  0.0            threshold_low         threshold_high            1.0
//!   |---- Allow ----|------ Borderline ------|---- Delete / Mute ----|
//!                   ^ inclusive              ^ inclusive
//! ```
//!
//! In the high band the offense is escalated to Mute when the violation it
//! produces brings the offender to the repeat-offense limit.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{ModerationError, ModerationResult};
use crate::moderation::ledger::Offender;

/// Enforcement outcome for a media item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DecisionKind {
    /// Content stays up
    Allow,
    /// Content is removed
    Delete,
    /// Content is removed and the sender is muted
    Mute,
    /// Ambiguous, routed to a human reviewer
    Borderline,
}

impl DecisionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DecisionKind::Allow => "allow",
            DecisionKind::Delete => "delete",
            DecisionKind::Mute => "mute",
            DecisionKind::Borderline => "borderline",
        }
    }

    /// Whether the transport should remove the message
    pub fn removes_content(&self) -> bool {
        matches!(self, DecisionKind::Delete | DecisionKind::Mute)
    }

    /// Whether this decision counts as a confirmed violation
    pub fn is_violation(&self) -> bool {
        self.removes_content()
    }
}

impl fmt::Display for DecisionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DecisionKind {
    type Err = ModerationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "allow" => Ok(DecisionKind::Allow),
            "delete" => Ok(DecisionKind::Delete),
            "mute" => Ok(DecisionKind::Mute),
            "borderline" => Ok(DecisionKind::Borderline),
            other => Err(ModerationError::Store(format!(
                "unknown decision kind: {}",
                other
            ))),
        }
    }
}

/// A decision with the human-readable reason shown to admins
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    pub kind: DecisionKind,
    pub reason: String,
    /// Filled in once the ledger has applied a mute
    pub muted_until: Option<DateTime<Utc>>,
}

impl Decision {
    pub fn new(kind: DecisionKind, reason: impl Into<String>) -> Self {
        Self {
            kind,
            reason: reason.into(),
            muted_until: None,
        }
    }

    pub fn with_muted_until(mut self, until: Option<DateTime<Utc>>) -> Self {
        self.muted_until = until;
        self
    }
}

/// Longest accepted mute, about 2700 years; keeps mute expiries representable
pub const MAX_MUTE_DAYS: u32 = 1_000_000;

/// Injected policy: score bands and escalation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionPolicy {
    /// Scores below this are allowed
    pub threshold_low: f64,

    /// Scores at or above this are violations
    pub threshold_high: f64,

    /// Violation count at which the offender is muted
    pub repeat_offense_limit: u32,

    /// Mute period in days (9999 is effectively permanent)
    pub mute_days: u32,
}

impl Default for DecisionPolicy {
    fn default() -> Self {
        Self {
            threshold_low: 0.40,
            threshold_high: 0.65,
            repeat_offense_limit: 3,
            mute_days: 9999,
        }
    }
}

impl DecisionPolicy {
    pub fn validate(&self) -> ModerationResult<()> {
        for (name, value) in [
            ("threshold_low", self.threshold_low),
            ("threshold_high", self.threshold_high),
        ] {
            if !value.is_finite() || !(0.0..=1.0).contains(&value) {
                return Err(ModerationError::InvalidConfig(format!(
                    "{} must be within [0, 1], got {}",
                    name, value
                )));
            }
        }

        if self.threshold_low > self.threshold_high {
            return Err(ModerationError::InvalidConfig(format!(
                "threshold_low ({}) must not exceed threshold_high ({})",
                self.threshold_low, self.threshold_high
            )));
        }

        if self.repeat_offense_limit == 0 {
            return Err(ModerationError::InvalidConfig(
                "repeat_offense_limit must be at least 1".to_string(),
            ));
        }

        if self.mute_days > MAX_MUTE_DAYS {
            return Err(ModerationError::InvalidConfig(format!(
                "mute_days must not exceed {}, got {}",
                MAX_MUTE_DAYS, self.mute_days
            )));
        }

        Ok(())
    }

    pub fn mute_period(&self) -> chrono::Duration {
        chrono::Duration::days(self.mute_days as i64)
    }
}

/// Deterministic decision function over a validated policy
#[derive(Debug, Clone)]
pub struct DecisionEngine {
    policy: DecisionPolicy,
}

impl DecisionEngine {
    pub fn new(policy: DecisionPolicy) -> ModerationResult<Self> {
        policy.validate()?;
        Ok(Self { policy })
    }

    pub fn policy(&self) -> &DecisionPolicy {
        &self.policy
    }

    /// Decide the enforcement for `score` posted by `offender`.
    ///
    /// Non-finite scores land in the Borderline band.
    pub fn decide(&self, score: f64, offender: &Offender) -> Decision {
        let p = &self.policy;

        if score < p.threshold_low {
            Decision::new(
                DecisionKind::Allow,
                format!("score {:.3} below {:.3}", score, p.threshold_low),
            )
        } else if score >= p.threshold_high {
            let count = offender.violation_count.saturating_add(1);
            let kind = self.enforcement_for(count);
            Decision::new(
                kind,
                format!(
                    "score {:.3} at or above {:.3}; offense {} of limit {}",
                    score, p.threshold_high, count, p.repeat_offense_limit
                ),
            )
        } else {
            Decision::new(
                DecisionKind::Borderline,
                format!(
                    "score {:.3} in review band [{:.3}, {:.3})",
                    score, p.threshold_low, p.threshold_high
                ),
            )
        }
    }

    /// Content-level classification, independent of who posted it
    pub fn classify(&self, score: f64) -> DecisionKind {
        if score < self.policy.threshold_low {
            DecisionKind::Allow
        } else if score >= self.policy.threshold_high {
            DecisionKind::Delete
        } else {
            DecisionKind::Borderline
        }
    }

    /// Enforcement for a confirmed violation that brings the count to `violation_count`
    pub fn enforcement_for(&self, violation_count: u32) -> DecisionKind {
        if violation_count >= self.policy.repeat_offense_limit {
            DecisionKind::Mute
        } else {
            DecisionKind::Delete
        }
    }

    /// Fail-closed decision when the scorer could not be reached
    pub fn unscored(&self, reason: &str) -> Decision {
        Decision::new(
            DecisionKind::Borderline,
            format!("score unavailable ({}), held for review", reason),
        )
    }
}
