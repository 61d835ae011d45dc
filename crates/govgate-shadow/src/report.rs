//! # Shadow Promotion Report
//!
//! Aggregates production and shadow decisions recorded in the ledger and
//! recommends whether the shadow policy can replace production.
//!
//! | Condition | Recommendation |
//! |---|---|
//! | no blocks on either side | `INSUFFICIENT_DATA` |
//! | shadow blocks > 2 × production blocks | `SHADOW_TOO_STRICT` |
//! | shadow blocks ≤ 1.2 × production blocks | `READY_TO_PROMOTE` |
//! | otherwise | `HOLD` |
//!
//! Comparisons are done in integer arithmetic.

use govgate_ledger::LedgerEntry;
use serde::{Deserialize, Serialize};

/// Event type of the production decision entry.
pub const DECISION_PRODUCTION_EVENT: &str = "decision_production";
/// Event type of the shadow decision entry.
pub const DECISION_SHADOW_EVENT: &str = "decision_shadow";
/// Event type recorded when the shadow policy produced no decision.
pub const SHADOW_ERROR_EVENT: &str = "shadow_evaluation_error";

/// Whether the shadow policy is ready to replace production.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PromotionRecommendation {
    InsufficientData,
    ShadowTooStrict,
    ReadyToPromote,
    Hold,
}

impl PromotionRecommendation {
    /// Recommendation for the given block counts.
    pub fn from_counts(production_blocks: u64, shadow_blocks: u64) -> Self {
        let prod = u128::from(production_blocks);
        let shadow = u128::from(shadow_blocks);
        if prod == 0 && shadow == 0 {
            Self::InsufficientData
        } else if shadow > prod * 2 {
            Self::ShadowTooStrict
        } else if shadow * 5 <= prod * 6 {
            Self::ReadyToPromote
        } else {
            Self::Hold
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InsufficientData => "INSUFFICIENT_DATA",
            Self::ShadowTooStrict => "SHADOW_TOO_STRICT",
            Self::ReadyToPromote => "READY_TO_PROMOTE",
            Self::Hold => "HOLD",
        }
    }
}

impl std::fmt::Display for PromotionRecommendation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Aggregate comparison of production and shadow decisions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShadowReport {
    /// Production decisions seen.
    pub total_evaluations: u64,
    pub production_blocks: u64,
    pub shadow_blocks: u64,
    /// Shadow evaluations that failed or timed out.
    pub shadow_errors: u64,
    pub divergences: u64,
    /// `shadow_blocks - production_blocks`; negative when shadow is looser.
    pub additional_shadow_blocks: i64,
    /// Percentage of evaluations production blocked.
    pub production_block_rate: f64,
    /// Percentage of evaluations shadow would have blocked.
    pub shadow_block_rate: f64,
    pub recommendation: PromotionRecommendation,
}

impl ShadowReport {
    /// Build a report from ledger entries. Entries of other types are
    /// ignored.
    pub fn from_entries(entries: &[LedgerEntry]) -> Self {
        let mut total = 0u64;
        let mut production_blocks = 0u64;
        let mut shadow_blocks = 0u64;
        let mut shadow_errors = 0u64;
        let mut divergences = 0u64;

        for entry in entries {
            match entry.event_type.as_str() {
                DECISION_PRODUCTION_EVENT => {
                    total += 1;
                    if entry.data_bool("allowed") == Some(false) {
                        production_blocks += 1;
                    }
                }
                DECISION_SHADOW_EVENT => {
                    if entry.data_bool("allowed") == Some(false) {
                        shadow_blocks += 1;
                    }
                    if entry.data_bool("diverged") == Some(true) {
                        divergences += 1;
                    }
                }
                SHADOW_ERROR_EVENT => shadow_errors += 1,
                _ => {}
            }
        }

        let rate = |n: u64| {
            if total == 0 {
                0.0
            } else {
                n as f64 * 100.0 / total as f64
            }
        };

        Self {
            total_evaluations: total,
            production_blocks,
            shadow_blocks,
            shadow_errors,
            divergences,
            additional_shadow_blocks: shadow_blocks as i64 - production_blocks as i64,
            production_block_rate: rate(production_blocks),
            shadow_block_rate: rate(shadow_blocks),
            recommendation: PromotionRecommendation::from_counts(production_blocks, shadow_blocks),
        }
    }
}
