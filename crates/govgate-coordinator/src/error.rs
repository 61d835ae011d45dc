//! # Coordinator Error Types
//!
//! Every error carries a stable reason code. Ledger and capability errors
//! keep the code of the underlying error; coordinator-level denials use
//! [`DenialReason`].

use std::path::PathBuf;

use govgate_capability::CapabilityError;
use govgate_core::{CanonicalizationError, DecisionId};
use govgate_ledger::LedgerError;
use thiserror::Error;

use crate::state::DecisionState;

/// Configuration could not be loaded or is invalid.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("invalid config: {}", .0.join("; "))]
    Invalid(Vec<String>),
}

/// Coordinator-level reasons to refuse an execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DenialReason {
    /// Production blocked the decision; no capability exists.
    DecisionBlocked,
    /// The decision has already been executed.
    AlreadyExecuted,
    /// The decision never reached capability issuance.
    NotExecutable(DecisionState),
    /// The intent presented with approvals is not the intent that was
    /// decided.
    IntentMismatch,
}

impl DenialReason {
    pub fn code(&self) -> &'static str {
        match self {
            Self::DecisionBlocked => "DECISION_BLOCKED",
            Self::AlreadyExecuted => "ALREADY_EXECUTED",
            Self::NotExecutable(_) => "DECISION_NOT_EXECUTABLE",
            Self::IntentMismatch => "INTENT_MISMATCH",
        }
    }
}

impl std::fmt::Display for DenialReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotExecutable(state) => write!(f, "{} (state {state})", self.code()),
            _ => f.write_str(self.code()),
        }
    }
}

/// Errors from coordinator operations.
#[derive(Error, Debug)]
pub enum CoordinatorError {
    /// The ledger could not record an event. Nothing was issued.
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    /// Token or approval verification failed.
    #[error(transparent)]
    Capability(#[from] CapabilityError),

    /// The coordinator refused the operation for this decision.
    #[error("decision {decision_id} denied: {reason}")]
    Denied {
        decision_id: DecisionId,
        reason: DenialReason,
    },

    /// The intent could not be canonicalized.
    #[error("intent cannot be canonicalized: {0}")]
    Canonicalization(#[from] CanonicalizationError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl CoordinatorError {
    /// Stable machine-readable reason.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Ledger(e) => e.code(),
            Self::Capability(e) => e.code(),
            Self::Denied { reason, .. } => reason.code(),
            Self::Canonicalization(_) => "CANONICALIZATION_FAILED",
            Self::Config(_) => "INVALID_CONFIG",
        }
    }

    /// Whether this is a ledger durability or integrity failure.
    pub fn is_ledger_failure(&self) -> bool {
        matches!(self, Self::Ledger(_))
    }
}
