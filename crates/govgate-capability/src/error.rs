//! # Capability Error Types
//!
//! Every variant that denies an execution maps to a stable reason code via
//! [`CapabilityError::code`]. Callers branch on the code, never on the
//! message text.

use govgate_core::{ApprovalId, CanonicalizationError, TokenId};
use thiserror::Error;

/// Errors from token issuance, token verification and approval handling.
#[derive(Error, Debug)]
pub enum CapabilityError {
    /// The token's `exp` is not after the current time.
    #[error("token expired at {exp} (now {now})")]
    TokenExpired {
        /// Token expiry, unix seconds.
        exp: i64,
        /// Verification time, unix seconds.
        now: i64,
    },

    /// The token was minted for a different action.
    #[error("token action mismatch: expected {expected:?}, token carries {actual:?}")]
    ActionMismatch { expected: String, actual: String },

    /// The token was minted for a different principal.
    #[error("token principal mismatch: expected {expected:?}, token carries {actual:?}")]
    PrincipalMismatch { expected: String, actual: String },

    /// The token was minted for a different decision.
    #[error("token decision mismatch: expected {expected:?}, token carries {actual:?}")]
    DecisionMismatch { expected: String, actual: String },

    /// The token's `jti` has already been consumed.
    #[error("replay detected for token {jti}")]
    ReplayDetected { jti: TokenId },

    /// The token's `jti` has been revoked.
    #[error("token {jti} has been revoked")]
    Revoked { jti: TokenId },

    /// The signature does not verify under the configured secret.
    #[error("token signature is invalid")]
    InvalidSignature,

    /// The token could not be decoded.
    #[error("malformed token: {0}")]
    Malformed(String),

    /// A token TTL of zero was requested.
    #[error("token ttl must be positive")]
    InvalidTtl,

    /// The signing secret is unusable.
    #[error("invalid signing secret: {0}")]
    InvalidSecret(String),

    /// An approval's scope hash does not match the intent being executed.
    #[error("approval {approval_id} is bound to {expected}, intent hashes to {actual}")]
    ApprovalBindingViolation {
        approval_id: ApprovalId,
        expected: String,
        actual: String,
    },

    /// No approval was supplied, or the supplied id is unknown.
    #[error("approval missing: {0}")]
    ApprovalMissing(String),

    /// The approval's validity window has passed.
    #[error("approval {0} has expired")]
    ApprovalExpired(ApprovalId),

    /// The approval was already used.
    #[error("approval {0} has already been consumed")]
    ApprovalConsumed(ApprovalId),

    /// Fewer valid approvals from distinct approvers than required.
    #[error("insufficient approvals: {valid} valid, {required} required")]
    InsufficientApprovals { required: usize, valid: usize },

    /// Claims or scope could not be canonicalized.
    #[error("canonicalization error: {0}")]
    Canonicalization(#[from] CanonicalizationError),
}

impl CapabilityError {
    /// Stable machine-readable denial reason.
    pub fn code(&self) -> &'static str {
        match self {
            Self::TokenExpired { .. } => "TOKEN_EXPIRED",
            Self::ActionMismatch { .. } => "ACTION_MISMATCH",
            Self::PrincipalMismatch { .. } => "PRINCIPAL_MISMATCH",
            Self::DecisionMismatch { .. } => "DECISION_MISMATCH",
            Self::ReplayDetected { .. } => "REPLAY_DETECTED",
            Self::Revoked { .. } => "TOKEN_REVOKED",
            Self::InvalidSignature => "INVALID_SIGNATURE",
            Self::Malformed(_) => "MALFORMED_TOKEN",
            Self::InvalidTtl => "INVALID_TTL",
            Self::InvalidSecret(_) => "INVALID_SECRET",
            Self::ApprovalBindingViolation { .. } => "APPROVAL_BINDING_VIOLATION",
            Self::ApprovalMissing(_) => "APPROVAL_MISSING",
            Self::ApprovalExpired(_) => "APPROVAL_EXPIRED",
            Self::ApprovalConsumed(_) => "APPROVAL_CONSUMED",
            Self::InsufficientApprovals { .. } => "INSUFFICIENT_APPROVALS",
            Self::Canonicalization(_) => "CANONICALIZATION_FAILED",
        }
    }
}
