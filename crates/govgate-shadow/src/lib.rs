//! # govgate-shadow: Shadow Policy Evaluation
//!
//! A shadow policy is a candidate (usually stricter) policy evaluated beside
//! production for measurement only. It never vetoes, alters or gates a
//! production decision; its failures are recorded and otherwise ignored.
//!
//! - **Evaluator** (`evaluator.rs`): isolated, deadline-bounded evaluation
//!   on the blocking pool, and the `DualDecision` pair.
//! - **Report** (`report.rs`): ledger aggregation and the promotion
//!   recommendation.

pub mod error;
pub mod evaluator;
pub mod report;

pub use error::ShadowError;
pub use evaluator::{DualDecision, ShadowEvaluator, ShadowTask, DEFAULT_SHADOW_TIMEOUT};
pub use report::{
    PromotionRecommendation, ShadowReport, DECISION_PRODUCTION_EVENT, DECISION_SHADOW_EVENT,
    SHADOW_ERROR_EVENT,
};
