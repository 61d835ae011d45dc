//! # Error Types
//!
//! Errors owned by the foundational crate. Higher crates wrap these with
//! `#[from]` in their own enums.

use thiserror::Error;

/// General error for core type construction and parsing.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Canonicalization failed.
    #[error("canonicalization error: {0}")]
    Canonicalization(#[from] CanonicalizationError),

    /// A digest string was not 64 hex characters.
    #[error("invalid digest: {0}")]
    InvalidDigest(String),

    /// A timestamp could not be parsed or was not UTC.
    #[error("invalid timestamp: {0}")]
    InvalidTimestamp(String),

    /// An identifier failed validation.
    #[error("invalid identifier: {0}")]
    InvalidIdentifier(String),
}

/// Error during canonical serialization.
#[derive(Error, Debug)]
pub enum CanonicalizationError {
    /// Float values are not permitted in canonical representations.
    #[error("float values are not permitted in canonical representations; use string or integer: {0}")]
    FloatRejected(f64),

    /// JSON serialization failed.
    #[error("serialization failed: {0}")]
    SerializationFailed(#[from] serde_json::Error),
}

/// A policy could not produce a decision.
///
/// For the production policy this fails the decision closed; for a shadow
/// policy it is recorded and otherwise ignored.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("policy {policy_id} failed: {message}")]
pub struct PolicyError {
    /// Identifier of the failing policy.
    pub policy_id: String,
    /// Description of the failure.
    pub message: String,
}

impl PolicyError {
    /// Build a policy error.
    pub fn new(policy_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            policy_id: policy_id.into(),
            message: message.into(),
        }
    }
}
