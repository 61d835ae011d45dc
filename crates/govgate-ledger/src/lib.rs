//! # govgate-ledger: Hash-Chained Decision Ledger
//!
//! Every decision, capability consumption and verification run is recorded
//! as an immutable entry bound to its predecessor by SHA-256 over canonical
//! JSON. Any edit to a stored entry breaks the chain at that index.
//!
//! ## Architecture
//!
//! - **Entry** (`entry.rs`): `LedgerEntry`, hash derivation and per-entry
//!   validation.
//!
//! - **Storage** (`storage.rs`): the `LedgerStorage` seam, JSONL file
//!   storage with a synchronous flush per append, and in-memory storage.
//!
//! - **Chain** (`chain.rs`): `HashChainLedger`, the single-writer,
//!   many-reader chain with fail-closed load verification.
//!
//! - **Backend** (`backend.rs`): `submit`/`query` anchoring targets and the
//!   WORM file implementation.
//!
//! - **Report** (`report.rs`) and **Repair** (`repair.rs`): operator-facing
//!   audit export and torn-tail truncation.
//!
//! ## Crate Policy
//!
//! - Depends only on `govgate-core` internally.
//! - Synchronous I/O; async callers wrap appends in `spawn_blocking`.

pub mod backend;
pub mod chain;
pub mod entry;
pub mod error;
pub mod repair;
pub mod report;
pub mod storage;

pub use backend::{mirror_entry, verify_receipt, LedgerBackend, Receipt, WormFileBackend};
pub use chain::{
    verify_entries, BrokenLink, ChainVerification, HashChainLedger, LoadOptions,
    CHAIN_VERIFIED_EVENT,
};
pub use entry::{compute_entry_hash, EntryFault, LedgerEntry};
pub use error::LedgerError;
pub use repair::{truncate_incomplete_tail, RepairOutcome};
pub use report::AuditReport;
pub use storage::{JsonlFileStorage, LedgerStorage, LoadedLog, MemoryStorage};
