// ⛓️ Registry Client
// Seam between the pipeline and the hash registry. The pipeline only sees
// the `RegistryClient` trait; `LedgerRegistry` backs it with the local
// SQLite ledger.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use tracing::{info, warn};

use crate::error::{AnchorError, Result};
use crate::hasher::{sha256_hex, ContentHash};
use crate::ledger::{HashLedger, LedgerEvent};
use crate::repository::MeterIdentity;

/// Proof that a registry call went through
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Receipt {
    pub transaction_hash: String,
    pub signer: String,
    pub did: String,
    /// Position the call touched in the DID's hash list
    pub index: usize,
    pub network: String,
    pub timestamp: DateTime<Utc>,
}

#[async_trait]
pub trait RegistryClient: Send + Sync {
    /// Append `hash` to the identity's list (storeHash)
    async fn submit(&self, identity: &MeterIdentity, hash: &ContentHash) -> Result<Receipt>;

    /// Replace the entry at `index` (updateHash)
    async fn update(&self, did: &str, index: usize, hash: &ContentHash) -> Result<Receipt>;

    /// Remove the entry at `index` (revokeHash)
    async fn revoke(&self, did: &str, index: usize) -> Result<Receipt>;

    /// Current list for `did` (getHashes)
    async fn hashes(&self, did: &str) -> Result<Vec<String>>;
}

// ============================================================================
// MOCK SIGNER
// ============================================================================

/// MOCK, NOT FOR PRODUCTION.
///
/// Derives "signing material" by hashing the public DID, so anyone who knows
/// the DID can reproduce the key. A real deployment must load keys from a
/// secure credential store instead.
pub struct MockSigner {
    private_key: String,
    address: String,
}

impl MockSigner {
    pub fn derive_from_did(did: &str) -> Self {
        let private_key = format!("0x{}", sha256_hex(did.as_bytes()));
        // Last 20 bytes of the key's digest, account-address shaped
        let digest = sha256_hex(private_key.as_bytes());
        let address = format!("0x{}", &digest[24..]);
        MockSigner { private_key, address }
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    /// Deterministic stand-in for a transaction signature
    fn sign(&self, payload: &str) -> String {
        format!("0x{}", sha256_hex(format!("{}|{}", self.private_key, payload).as_bytes()))
    }
}

impl fmt::Debug for MockSigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MockSigner")
            .field("address", &self.address)
            .field("private_key", &"<redacted>")
            .finish()
    }
}

// ============================================================================
// LEDGER-BACKED REGISTRY
// ============================================================================

pub struct LedgerRegistry {
    ledger: Mutex<HashLedger>,
    network: String,
}

impl LedgerRegistry {
    pub fn new(ledger: HashLedger, network: impl Into<String>) -> Self {
        LedgerRegistry {
            ledger: Mutex::new(ledger),
            network: network.into(),
        }
    }

    pub fn open<P: AsRef<Path>>(path: P, network: impl Into<String>) -> Result<Self> {
        Ok(Self::new(HashLedger::open(path)?, network))
    }

    fn ledger(&self) -> Result<MutexGuard<'_, HashLedger>> {
        self.ledger
            .lock()
            .map_err(|_| AnchorError::Submission("ledger lock poisoned".to_string()))
    }

    /// Audit trail of every store/update/revoke for `did`
    pub fn events(&self, did: &str) -> Result<Vec<LedgerEvent>> {
        self.ledger()?.get_events(did)
    }

    fn receipt(&self, operation: &str, did: &str, index: usize, hash: Option<&str>) -> Receipt {
        let signer = MockSigner::derive_from_did(did);
        let timestamp = Utc::now();
        let payload = format!(
            "{}|{}|{}|{}|{}",
            operation,
            did,
            index,
            hash.unwrap_or_default(),
            timestamp.to_rfc3339()
        );

        Receipt {
            transaction_hash: signer.sign(&payload),
            signer: signer.address().to_string(),
            did: did.to_string(),
            index,
            network: self.network.clone(),
            timestamp,
        }
    }
}

#[async_trait]
impl RegistryClient for LedgerRegistry {
    async fn submit(&self, identity: &MeterIdentity, hash: &ContentHash) -> Result<Receipt> {
        let value = hash.to_prefixed();
        let index = self
            .ledger()?
            .store_hash(&identity.did, &value)
            .map_err(|e| AnchorError::Submission(e.to_string()))?;

        let receipt = self.receipt("storeHash", &identity.did, index, Some(&value));
        info!(did = %identity.did, index, tx = %receipt.transaction_hash, "hash stored");
        Ok(receipt)
    }

    async fn update(&self, did: &str, index: usize, hash: &ContentHash) -> Result<Receipt> {
        let value = hash.to_prefixed();
        self.ledger()?.update_hash(did, index, &value).map_err(|e| {
            warn!(did, index, error = %e, "updateHash rejected");
            e
        })?;

        Ok(self.receipt("updateHash", did, index, Some(&value)))
    }

    async fn revoke(&self, did: &str, index: usize) -> Result<Receipt> {
        self.ledger()?.revoke_hash(did, index).map_err(|e| {
            warn!(did, index, error = %e, "revokeHash rejected");
            e
        })?;

        Ok(self.receipt("revokeHash", did, index, None))
    }

    async fn hashes(&self, did: &str) -> Result<Vec<String>> {
        self.ledger()?.get_hashes(did)
    }
}

// ============================================================================
// TESTS
// ============================================================================
