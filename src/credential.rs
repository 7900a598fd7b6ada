// 📜 Verifiable Credentials
// Wraps a meter reading and its content hash in a W3C-style credential
// and stores one pretty-printed JSON file per DID under the VC directory.

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::error::{AnchorError, Result};
use crate::hasher::{compute_hash, ContentHash};
use crate::repository::{MeterIdentity, MeterReading};

pub const CREDENTIALS_CONTEXT: &str = "https://www.w3.org/2018/credentials/v1";
pub const CREDENTIAL_TYPE: &str = "VerifiableCredential";

// ============================================================================
// DOCUMENT
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerifiableCredential {
    #[serde(rename = "@context")]
    pub context: Vec<String>,

    /// `urn:uuid:<v4>`, fresh per document
    pub id: String,

    #[serde(rename = "type")]
    pub types: Vec<String>,

    pub issuer: String,

    /// ISO-8601 UTC, millisecond precision
    #[serde(rename = "issuanceDate")]
    pub issuance_date: String,

    #[serde(rename = "credentialSubject")]
    pub credential_subject: CredentialSubject,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CredentialSubject {
    pub id: String,

    #[serde(rename = "meterData")]
    pub meter_data: MeterReading,

    pub hash: ContentHash,
}

impl VerifiableCredential {
    pub fn did(&self) -> &str {
        &self.credential_subject.id
    }

    pub fn hash(&self) -> &ContentHash {
        &self.credential_subject.hash
    }

    /// True when the embedded hash still matches the embedded reading
    pub fn is_consistent(&self) -> Result<bool> {
        Ok(compute_hash(&self.credential_subject.meter_data)? == self.credential_subject.hash)
    }
}

/// Assemble a credential. Inputs are trusted: `hash` must already be
/// `compute_hash(reading)`.
pub fn build_credential(
    reading: &MeterReading,
    identity: &MeterIdentity,
    hash: &ContentHash,
) -> VerifiableCredential {
    VerifiableCredential {
        context: vec![CREDENTIALS_CONTEXT.to_string()],
        id: format!("urn:uuid:{}", uuid::Uuid::new_v4()),
        types: vec![CREDENTIAL_TYPE.to_string()],
        issuer: identity.did.clone(),
        issuance_date: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        credential_subject: CredentialSubject {
            id: identity.did.clone(),
            meter_data: reading.clone(),
            hash: hash.clone(),
        },
    }
}

/// Filesystem-safe file stem for a DID: anything outside
/// `[A-Za-z0-9._-]` becomes `_`
pub fn sanitize_did(did: &str) -> String {
    did.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

// ============================================================================
// STORE
// ============================================================================

#[derive(Debug, Clone)]
pub struct CredentialStore {
    dir: PathBuf,
}

impl CredentialStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        CredentialStore { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// `<dir>/<sanitized-did>.json`
    pub fn path_for(&self, did: &str) -> PathBuf {
        self.dir.join(format!("{}.json", sanitize_did(did)))
    }

    /// Write the credential, replacing any earlier one for the same DID
    pub async fn persist(&self, credential: &VerifiableCredential) -> Result<PathBuf> {
        let path = self.path_for(credential.did());

        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|source| AnchorError::Persistence {
                path: self.dir.clone(),
                source,
            })?;

        let body = serde_json::to_string_pretty(credential)?;
        tokio::fs::write(&path, body)
            .await
            .map_err(|source| AnchorError::Persistence {
                path: path.clone(),
                source,
            })?;

        info!(path = %path.display(), credential_id = %credential.id, "credential persisted");
        Ok(path)
    }

    /// Read back the credential stored for `did`
    pub async fn load(&self, did: &str) -> Result<VerifiableCredential> {
        let path = self.path_for(did);
        debug!(path = %path.display(), "loading credential");

        let body = tokio::fs::read_to_string(&path)
            .await
            .map_err(|source| AnchorError::Persistence {
                path: path.clone(),
                source,
            })?;

        Ok(serde_json::from_str(&body)?)
    }
}

// ============================================================================
// TESTS
// ============================================================================
