//! # Shadow Error Types
//!
//! Shadow errors are recorded and logged, never surfaced to the caller as a
//! blocking error.

use govgate_core::PolicyError;
use thiserror::Error;

/// Why a shadow evaluation produced no decision.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ShadowError {
    /// The shadow policy returned an error.
    #[error("shadow policy failed: {0}")]
    Failed(#[from] PolicyError),

    /// The shadow policy did not finish within the bound.
    #[error("shadow policy {policy_id} timed out after {timeout_ms} ms")]
    Timeout { policy_id: String, timeout_ms: u64 },

    /// The shadow policy panicked.
    #[error("shadow policy {policy_id} panicked")]
    Panicked { policy_id: String },

    /// The evaluation task was cancelled before completing.
    #[error("shadow policy {policy_id} was cancelled")]
    Cancelled { policy_id: String },
}

impl ShadowError {
    /// Stable machine-readable code, recorded in `shadow_evaluation_error`
    /// ledger entries.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Failed(_) => "SHADOW_POLICY_FAILED",
            Self::Timeout { .. } => "SHADOW_TIMEOUT",
            Self::Panicked { .. } => "SHADOW_PANICKED",
            Self::Cancelled { .. } => "SHADOW_CANCELLED",
        }
    }
}
