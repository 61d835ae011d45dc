//! # External Ledger Backends
//!
//! Anchoring targets beyond the local hash chain (WORM storage, permissioned
//! chains, managed ledger databases) sit behind one interface:
//! `submit(payload) -> receipt` and `query(receipt) -> payload`.
//!
//! The local [`HashChainLedger`](crate::HashChainLedger) stays the source of
//! truth. A backend receipt is accepted only if it equals the SHA-256 of the
//! submitted canonical payload, which for a ledger entry is the entry's own
//! hash.

use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use govgate_core::{sha256_digest, CanonicalBytes, ContentDigest};
use parking_lot::Mutex;

use crate::entry::LedgerEntry;
use crate::error::LedgerError;

/// Opaque identifier returned by a backend for a submitted payload.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Receipt(String);

impl Receipt {
    /// Wrap a backend-issued receipt.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The receipt as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Receipt {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// An external anchoring target.
pub trait LedgerBackend: Send + Sync + std::fmt::Debug {
    /// Short name for logs, e.g. `worm`.
    fn name(&self) -> &str;

    /// Submit a canonical payload and return the backend's receipt.
    fn submit(&self, payload: &CanonicalBytes) -> Result<Receipt, LedgerError>;

    /// Fetch the payload previously stored under `receipt`.
    fn query(&self, receipt: &Receipt) -> Result<Option<String>, LedgerError>;
}

/// Check that a backend receipt replay-verifies against the local hash.
pub fn verify_receipt(entry: &LedgerEntry, receipt: &Receipt) -> bool {
    receipt.as_str() == entry.hash.to_hex()
}

/// Submit a ledger entry's canonical payload to `backend`.
///
/// Returns an error if the backend fails or its receipt does not match the
/// entry hash. Callers treat either as non-fatal to the local ledger.
pub fn mirror_entry(
    backend: &dyn LedgerBackend,
    entry: &LedgerEntry,
) -> Result<Receipt, LedgerError> {
    let payload = entry.payload_bytes()?;
    let receipt = backend.submit(&payload)?;
    if !verify_receipt(entry, &receipt) {
        return Err(LedgerError::Backend {
            backend: backend.name().to_string(),
            reason: format!(
                "receipt {receipt} does not match entry hash {} at index {}",
                entry.hash, entry.index
            ),
        });
    }
    tracing::debug!(backend = backend.name(), index = entry.index, %receipt, "ledger entry mirrored");
    Ok(receipt)
}

// ---------------------------------------------------------------------------
// WormFileBackend
// ---------------------------------------------------------------------------

/// Write-once file backend: one `"<sha256hex>:<payload>"` line per submission.
///
/// Receipts are the SHA-256 of the payload, so a receipt for a ledger entry
/// is that entry's hash.
#[derive(Debug)]
pub struct WormFileBackend {
    path: PathBuf,
    file: Mutex<File>,
}

impl WormFileBackend {
    /// Open (creating if missing) the WORM file at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, LedgerError> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| backend_error(&path, e))?;
        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    /// Path of the WORM file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn backend_error(path: &Path, e: std::io::Error) -> LedgerError {
    LedgerError::Backend {
        backend: "worm".to_string(),
        reason: format!("{}: {e}", path.display()),
    }
}

impl LedgerBackend for WormFileBackend {
    fn name(&self) -> &str {
        "worm"
    }

    fn submit(&self, payload: &CanonicalBytes) -> Result<Receipt, LedgerError> {
        let digest: ContentDigest = sha256_digest(payload);
        let line = format!("{}:{}\n", digest.to_hex(), payload.to_text());
        let mut file = self.file.lock();
        file.write_all(line.as_bytes())
            .and_then(|_| file.sync_data())
            .map_err(|e| backend_error(&self.path, e))?;
        Ok(Receipt::new(digest.to_hex()))
    }

    fn query(&self, receipt: &Receipt) -> Result<Option<String>, LedgerError> {
        let file = File::open(&self.path).map_err(|e| backend_error(&self.path, e))?;
        for line in BufReader::new(file).lines() {
            let line = line.map_err(|e| backend_error(&self.path, e))?;
            if let Some((hash, payload)) = line.split_once(':') {
                if hash == receipt.as_str() {
                    return Ok(Some(payload.to_string()));
                }
            }
        }
        Ok(None)
    }
}
