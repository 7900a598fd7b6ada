// ⚠️ Error taxonomy for the anchoring pipeline
// "No data" is not an error: lookups return Ok(None)

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, AnchorError>;

#[derive(Debug, Error)]
pub enum AnchorError {
    /// Input CSV missing, unreadable or malformed
    #[error("data source {source_name} failed: {reason}")]
    DataSource { source_name: String, reason: String },

    /// Record could not be turned into canonical JSON
    #[error("serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Credential could not be written (or read back)
    #[error("cannot persist credential at {path:?}: {source}")]
    Persistence {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Registry rejected or failed the call
    #[error("registry submission failed: {0}")]
    Submission(String),

    #[error("registry submission timed out after {0:?}")]
    Timeout(Duration),

    /// Stored credential belongs to a different DID that sanitizes to the same file
    #[error("credential at this location is for {found}, not {requested}")]
    CredentialMismatch { requested: String, found: String },

    /// Update/revoke addressed an index not present for the DID
    #[error("Index out of bounds: {index} (len {len}) for {did}")]
    IndexOutOfBounds { did: String, index: usize, len: usize },

    #[error("ledger storage error: {0}")]
    Ledger(#[from] rusqlite::Error),
}

impl AnchorError {
    pub fn data_source(source_name: impl Into<String>, reason: impl ToString) -> Self {
        AnchorError::DataSource {
            source_name: source_name.into(),
            reason: reason.to_string(),
        }
    }
}
