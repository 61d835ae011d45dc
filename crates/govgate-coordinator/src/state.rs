//! # Decision Lifecycle
//!
//! ```text
//! Received → Evaluated → Logged → CapabilityIssued → Executed
//!                           └──→ Blocked
//! any non-terminal ──→ Failed   (ledger write failed; fail closed)
//! ```
//!
//! `Blocked`, `Executed` and `Failed` are terminal.

use govgate_core::{ContentDigest, Principal, Timestamp};
use serde::{Deserialize, Serialize};

/// Where a decision is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DecisionState {
    Received,
    Evaluated,
    Logged,
    CapabilityIssued,
    Blocked,
    Executed,
    Failed,
}

impl DecisionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Received => "RECEIVED",
            Self::Evaluated => "EVALUATED",
            Self::Logged => "LOGGED",
            Self::CapabilityIssued => "CAPABILITY_ISSUED",
            Self::Blocked => "BLOCKED",
            Self::Executed => "EXECUTED",
            Self::Failed => "FAILED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Blocked | Self::Executed | Self::Failed)
    }

    /// Whether `self → next` is a legal transition.
    pub fn can_transition_to(&self, next: DecisionState) -> bool {
        use DecisionState::*;
        match (self, next) {
            (Received, Evaluated) => true,
            (Evaluated, Logged) => true,
            (Logged, CapabilityIssued) | (Logged, Blocked) => true,
            (CapabilityIssued, Executed) => true,
            (from, Failed) => !from.is_terminal(),
            _ => false,
        }
    }
}

impl std::fmt::Display for DecisionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the coordinator remembers about a decision it evaluated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecisionRecord {
    pub state: DecisionState,
    pub action: String,
    pub principal: Principal,
    /// Canonical hash of the full intent.
    pub intent_hash: ContentDigest,
    /// Execution needs human approvals.
    pub requires_approval: bool,
    /// Hash of the `decision_production` ledger entry, once logged.
    pub evidence_hash: Option<ContentDigest>,
    /// Time of the latest state change.
    pub updated_at: Timestamp,
}
