// 🔐 Content Hashing
// SHA-256 over the compact JSON serialization of a record

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

use crate::error::Result;

/// Lowercase hex SHA-256 digest (64 chars)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentHash(String);

impl ContentHash {
    pub const HEX_LEN: usize = 64;

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Ledger-facing form with a `0x` prefix
    pub fn to_prefixed(&self) -> String {
        format!("0x{}", self.0)
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Hash raw bytes into a hex digest
pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

/// Hash the canonical (compact, field-order preserving) JSON of `record`
pub fn compute_hash<T: Serialize + ?Sized>(record: &T) -> Result<ContentHash> {
    let canonical = serde_json::to_string(record)?;
    Ok(ContentHash(sha256_hex(canonical.as_bytes())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::ser::Error as _;
    use serde::Serializer;
    use serde_json::json;

    #[test]
    fn test_known_digest() {
        let hash = compute_hash(&json!({ "key": "value" })).unwrap();
        assert_eq!(
            hash.as_str(),
            "e43abcf3375244839c012f9633f95862d232a95b00d5bc7348b3098b9fed7f32"
        );
        assert_eq!(hash.as_str().len(), ContentHash::HEX_LEN);
    }

    #[test]
    fn test_deterministic() {
        let record = json!({ "Meter ID": "1001", "Counter": "2500" });
        assert_eq!(compute_hash(&record).unwrap(), compute_hash(&record).unwrap());
    }

    #[test]
    fn test_field_change_changes_hash() {
        let a = json!({ "Meter ID": "1001", "Counter": "2500" });
        let b = json!({ "Meter ID": "1001", "Counter": "2501" });
        assert_ne!(compute_hash(&a).unwrap(), compute_hash(&b).unwrap());
    }

    #[test]
    fn test_field_order_is_significant() {
        let a = json!({ "a": "1", "b": "2" });
        let b = json!({ "b": "2", "a": "1" });
        assert_ne!(compute_hash(&a).unwrap(), compute_hash(&b).unwrap());
    }

    struct Unserializable;

    impl Serialize for Unserializable {
        fn serialize<S: Serializer>(&self, _: S) -> std::result::Result<S::Ok, S::Error> {
            Err(S::Error::custom("not representable"))
        }
    }

    #[test]
    fn test_unserializable_record_fails() {
        let err = compute_hash(&Unserializable).unwrap_err();
        assert!(matches!(err, crate::error::AnchorError::Serialization(_)));
    }

    #[test]
    fn test_prefixed() {
        let hash = compute_hash(&json!({})).unwrap();
        assert!(hash.to_prefixed().starts_with("0x"));
        assert_eq!(hash.to_prefixed().len(), 66);
    }
}
