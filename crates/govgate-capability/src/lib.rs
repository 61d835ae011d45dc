//! # govgate-capability: Single-Use Execution Capabilities
//!
//! An allowed decision is executed by presenting a capability token. The
//! token is short-lived, HMAC-signed, bound to one decision, one action and
//! one principal, and consumable exactly once.
//!
//! ## Architecture
//!
//! - **Replay** (`replay.rs`): the `ReplayGuard` seam and the in-memory,
//!   non-durable implementation with atomic check-and-mark and TTL sweep.
//!
//! - **Token** (`token.rs`): signing secret, compact token wire format,
//!   and `CapabilityTokenService` (issue, verify-and-consume, revoke).
//!
//! - **Approval** (`approval.rs`): human approval grants bound to the
//!   canonical hash of the risk-relevant intent fields, with dual approval
//!   above a threshold.
//!
//! ## Crate Policy
//!
//! - Depends only on `govgate-core` internally.
//! - State lives in injected store objects; there are no globals.

pub mod approval;
pub mod error;
pub mod replay;
pub mod token;

pub use approval::{
    approval_scope_hash, assert_approval_binding, ApprovalGrant, ApprovalPolicy, ApprovalStore,
    DEFAULT_APPROVAL_FIELDS,
};
pub use error::CapabilityError;
pub use replay::{InMemoryReplayGuard, ReplayGuard, ReplayRecord, DEFAULT_ATTEMPT_RETENTION_SECS};
pub use token::{
    decode_and_authenticate, CapabilityToken, CapabilityTokenService, Expected, SigningSecret,
    TokenClaims, DEFAULT_TOKEN_TTL_SECS, MIN_SECRET_LEN,
};
