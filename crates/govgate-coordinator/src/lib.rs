//! # govgate-coordinator
//!
//! Ties the govgate building blocks into one decision lifecycle:
//!
//! 1. The production policy and, optionally, a shadow policy evaluate an
//!    intent concurrently.
//! 2. The production outcome is appended to the hash-chained ledger. Only
//!    after that entry is durable does an allowed decision get a single-use
//!    capability token.
//! 3. The shadow outcome is appended under the same decision id by a
//!    detached task, so it never holds back the production path.
//! 4. Execution consumes the token (and any required human approvals) and
//!    records the outcome.
//!
//! ```text
//! Intent ─→ DecisionCoordinator ─┬─→ production Policy ─┐
//!                                └─→ shadow Policy ─────┼─→ HashChainLedger
//!                                                       └─→ CapabilityTokenService
//! ```
//!
//! The coordinator has no transport. Callers are in-process.

pub mod config;
pub mod coordinator;
pub mod error;
pub mod state;

pub use config::CoordinatorConfig;
pub use coordinator::{
    DecisionCoordinator, EvaluationResult, ExecutionReceipt, PendingShadow,
    CAPABILITY_ISSUED_EVENT, EXECUTION_BLOCKED_EVENT, EXECUTION_EVENT,
};
pub use error::{ConfigError, CoordinatorError, DenialReason};
pub use state::{DecisionRecord, DecisionState};
