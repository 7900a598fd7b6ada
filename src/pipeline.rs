// 🔄 Anchoring Pipeline
// lookup reading → lookup DID → hash → build credential → persist → submit
//
// A run never returns an error: every path ends in a `RunOutcome`.
// Missing data is reported, step failures are logged and reported,
// and a failed submission keeps the already-written credential.

use serde::Serialize;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, instrument, warn};

use crate::config::Config;
use crate::credential::{build_credential, CredentialStore, VerifiableCredential};
use crate::error::{AnchorError, Result};
use crate::hasher::{compute_hash, ContentHash};
use crate::registry::{Receipt, RegistryClient};
use crate::repository::{MeterIdentity, MeterRepository};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Step {
    LookupReading,
    LookupIdentity,
    Hash,
    Persist,
    Submit,
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Step::LookupReading => "lookup_reading",
            Step::LookupIdentity => "lookup_identity",
            Step::Hash => "hash",
            Step::Persist => "persist",
            Step::Submit => "submit",
        };
        f.write_str(name)
    }
}

/// Which lookup came back empty
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Missing {
    Reading,
    Identity,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RunOutcome {
    /// Credential written and hash accepted by the registry
    Anchored {
        meter_id: String,
        did: String,
        hash: ContentHash,
        credential_path: PathBuf,
        receipt: Receipt,
    },
    /// Credential written, registry call failed (non-fatal)
    PersistedNotAnchored {
        meter_id: String,
        did: String,
        hash: ContentHash,
        credential_path: PathBuf,
        error: String,
    },
    NoData {
        meter_id: String,
        missing: Missing,
    },
    Failed {
        meter_id: String,
        step: Step,
        error: String,
    },
}

impl RunOutcome {
    /// A credential was produced locally
    pub fn is_success(&self) -> bool {
        matches!(
            self,
            RunOutcome::Anchored { .. } | RunOutcome::PersistedNotAnchored { .. }
        )
    }

    pub fn credential_path(&self) -> Option<&PathBuf> {
        match self {
            RunOutcome::Anchored { credential_path, .. }
            | RunOutcome::PersistedNotAnchored { credential_path, .. } => Some(credential_path),
            _ => None,
        }
    }

    /// One-line, user-facing report
    pub fn summary(&self) -> String {
        match self {
            RunOutcome::Anchored { did, credential_path, receipt, .. } => format!(
                "✓ Credential for {} written to {} (tx {})",
                did,
                credential_path.display(),
                receipt.transaction_hash
            ),
            RunOutcome::PersistedNotAnchored { did, credential_path, error, .. } => format!(
                "✓ Credential for {} written to {}; registry submission failed: {}",
                did,
                credential_path.display(),
                error
            ),
            RunOutcome::NoData { meter_id, .. } => {
                format!("No data found for meter ID {}.", meter_id)
            }
            RunOutcome::Failed { step, error, .. } => format!("❌ Failed at {}: {}", step, error),
        }
    }
}

/// Result of re-checking a stored credential
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Verification {
    pub did: String,
    pub credential_id: String,
    pub hash: ContentHash,
    /// Embedded hash equals the hash of the embedded reading
    pub consistent: bool,
    /// Position of the hash in the registry list, if anchored
    pub anchored_index: Option<usize>,
}

impl Verification {
    pub fn is_valid(&self) -> bool {
        self.consistent && self.anchored_index.is_some()
    }
}

pub struct Pipeline {
    repository: MeterRepository,
    store: CredentialStore,
    registry: Arc<dyn RegistryClient>,
    submit_timeout: Duration,
}

impl Pipeline {
    pub fn new(
        repository: MeterRepository,
        store: CredentialStore,
        registry: Arc<dyn RegistryClient>,
        submit_timeout: Duration,
    ) -> Self {
        Pipeline {
            repository,
            store,
            registry,
            submit_timeout,
        }
    }

    pub fn from_config(config: &Config, registry: Arc<dyn RegistryClient>) -> Self {
        Self::new(
            MeterRepository::new(&config.meter_data_path, &config.meters_path),
            CredentialStore::new(&config.vc_dir),
            registry,
            Duration::from_secs(config.registry_timeout_secs),
        )
    }

    pub fn registry(&self) -> &Arc<dyn RegistryClient> {
        &self.registry
    }

    /// Process one meter ID end to end
    #[instrument(skip_all, fields(meter_id = %meter_id.trim()))]
    pub async fn run(&self, meter_id: &str) -> RunOutcome {
        let meter_id = meter_id.trim().to_string();
        let failed = |step: Step, err: AnchorError| {
            error!(%step, error = %err, "pipeline step failed");
            RunOutcome::Failed {
                meter_id: meter_id.clone(),
                step,
                error: err.to_string(),
            }
        };

        let reading = match self.repository.find_reading(&meter_id).await {
            Ok(Some(reading)) => reading,
            Ok(None) => return self.no_data(&meter_id, Missing::Reading),
            Err(e) => return failed(Step::LookupReading, e),
        };

        let identity = match self.repository.find_identity(&meter_id).await {
            Ok(Some(identity)) => identity,
            Ok(None) => return self.no_data(&meter_id, Missing::Identity),
            Err(e) => return failed(Step::LookupIdentity, e),
        };

        info!(did = %identity.did, "processing meter data");

        let hash = match compute_hash(&reading) {
            Ok(hash) => hash,
            Err(e) => return failed(Step::Hash, e),
        };

        let credential = build_credential(&reading, &identity, &hash);

        let credential_path = match self.store.persist(&credential).await {
            Ok(path) => path,
            Err(e) => return failed(Step::Persist, e),
        };

        match self.submit(&identity, &hash).await {
            Ok(receipt) => {
                info!(tx = %receipt.transaction_hash, index = receipt.index, "hash anchored");
                RunOutcome::Anchored {
                    meter_id: meter_id.clone(),
                    did: identity.did,
                    hash,
                    credential_path,
                    receipt,
                }
            }
            Err(e) => {
                warn!(step = %Step::Submit, error = %e, "registry submission failed; credential kept");
                RunOutcome::PersistedNotAnchored {
                    meter_id: meter_id.clone(),
                    did: identity.did,
                    hash,
                    credential_path,
                    error: e.to_string(),
                }
            }
        }
    }

    async fn submit(&self, identity: &MeterIdentity, hash: &ContentHash) -> Result<Receipt> {
        match tokio::time::timeout(self.submit_timeout, self.registry.submit(identity, hash)).await {
            Ok(result) => result,
            Err(_) => Err(AnchorError::Timeout(self.submit_timeout)),
        }
    }

    fn no_data(&self, meter_id: &str, missing: Missing) -> RunOutcome {
        info!(?missing, "no data for identifier");
        RunOutcome::NoData {
            meter_id: meter_id.to_string(),
            missing,
        }
    }

    /// Reload the credential stored for `did` and verify it.
    /// Distinct DIDs can share a file name, so the stored subject must match.
    pub async fn verify(&self, did: &str) -> Result<Verification> {
        let credential = self.store.load(did).await?;
        if credential.did() != did {
            warn!(requested = did, found = credential.did(), "credential subject mismatch");
            return Err(AnchorError::CredentialMismatch {
                requested: did.to_string(),
                found: credential.did().to_string(),
            });
        }

        verify_credential(&credential, self.registry.as_ref()).await
    }
}

/// Re-hash the embedded reading and look the embedded hash up in the
/// registry under the credential's own subject
pub async fn verify_credential(
    credential: &VerifiableCredential,
    registry: &dyn RegistryClient,
) -> Result<Verification> {
    let consistent = credential.is_consistent()?;

    let anchored = credential.hash().to_prefixed();
    let anchored_index = registry
        .hashes(credential.did())
        .await?
        .iter()
        .position(|h| *h == anchored);

    Ok(Verification {
        did: credential.did().to_string(),
        credential_id: credential.id.clone(),
        hash: credential.hash().clone(),
        consistent,
        anchored_index,
    })
}

// ============================================================================
// TESTS
// ============================================================================
