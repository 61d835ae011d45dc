//! # govgate-core: Foundational Types
//!
//! This crate is the leaf of the govgate workspace. It defines the primitives
//! every other crate builds on: the canonical byte form used for every hash,
//! the digest type, UTC timestamps, identifiers, and the policy seam through
//! which the external policy engine is consulted.
//!
//! ## Key Design Principles
//!
//! 1. **`CanonicalBytes` newtype.** ALL hash computation flows through
//!    `CanonicalBytes::new()`. Ledger entry hashes, approval scope hashes and
//!    capability token signatures are all computed over canonical bytes, so
//!    two processes (or two languages) agree on every digest.
//!
//! 2. **`sha256_digest()` accepts only `&CanonicalBytes`.** A digest over
//!    non-canonical bytes cannot be expressed.
//!
//! 3. **UTC-only timestamps.** `Timestamp` is UTC with `Z` suffix and seconds
//!    precision, matching the canonical form.
//!
//! 4. **Time is injected.** Expiry-sensitive components take an
//!    `Arc<dyn Clock>` rather than reading the wall clock directly.
//!
//! 5. **Policies are opaque.** The content of policy rules is external; this
//!    crate only defines the `Policy` trait and the `Decision` it produces.
//!
//! ## Crate Policy
//!
//! - No dependencies on other `govgate-*` crates.
//! - No `unsafe` code.
//! - No `panic!()` or `.unwrap()` outside tests.

pub mod canonical;
pub mod clock;
pub mod digest;
pub mod error;
pub mod identity;
pub mod policy;
pub mod temporal;

pub use canonical::CanonicalBytes;
pub use clock::{Clock, ManualClock, SystemClock};
pub use digest::{sha256_digest, sha256_hex, ContentDigest, GENESIS_HASH};
pub use error::{CanonicalizationError, CoreError, PolicyError};
pub use identity::{ApprovalId, DecisionId, Principal, TokenId};
pub use policy::{Decision, FnPolicy, Intent, Policy};
pub use temporal::Timestamp;
