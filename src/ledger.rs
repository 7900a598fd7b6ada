// 🗄️ Hash Ledger - local stand-in for the MeterHashStorage contract
// Per-DID ordered list of hashes: append, update-by-index, revoke-by-index.
// Every mutation is also written to an append-only event log.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{AnchorError, Result};

/// Audit entry for one ledger mutation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LedgerEvent {
    pub event_id: String,
    pub timestamp: DateTime<Utc>,
    pub event_type: String,
    pub did: String,
    pub index: usize,
    pub hash: Option<String>,
}

impl LedgerEvent {
    fn new(event_type: &str, did: &str, index: usize, hash: Option<&str>) -> Self {
        Self {
            event_id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            event_type: event_type.to_string(),
            did: did.to_string(),
            index,
            hash: hash.map(str::to_string),
        }
    }
}

pub struct HashLedger {
    conn: Connection,
}

impl HashLedger {
    /// Open (or create) a ledger file. `:memory:` gives a throwaway ledger.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let conn = Connection::open(path)?;
        Self::from_connection(conn)
    }

    pub fn in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        setup_ledger(&conn)?;
        Ok(HashLedger { conn })
    }

    /// Append `hash` to the DID's list, returning its index
    pub fn store_hash(&mut self, did: &str, hash: &str) -> Result<usize> {
        let tx = self.conn.transaction()?;
        tx.execute(
            "INSERT INTO meter_hashes (did, hash, created_at) VALUES (?1, ?2, ?3)",
            params![did, hash, Utc::now().to_rfc3339()],
        )?;
        let index = count_for(&tx, did)? - 1;
        insert_event(&tx, &LedgerEvent::new("hash_stored", did, index, Some(hash)))?;
        tx.commit()?;
        Ok(index)
    }

    /// Replace the hash at `index`
    pub fn update_hash(&mut self, did: &str, index: usize, hash: &str) -> Result<()> {
        let tx = self.conn.transaction()?;
        let row_id = row_id_at(&tx, did, index)?;
        tx.execute(
            "UPDATE meter_hashes SET hash = ?1 WHERE id = ?2",
            params![hash, row_id],
        )?;
        insert_event(&tx, &LedgerEvent::new("hash_updated", did, index, Some(hash)))?;
        tx.commit()?;
        Ok(())
    }

    /// Remove the hash at `index`; later entries shift down by one
    pub fn revoke_hash(&mut self, did: &str, index: usize) -> Result<()> {
        let tx = self.conn.transaction()?;
        let row_id = row_id_at(&tx, did, index)?;
        tx.execute("DELETE FROM meter_hashes WHERE id = ?1", params![row_id])?;
        insert_event(&tx, &LedgerEvent::new("hash_revoked", did, index, None))?;
        tx.commit()?;
        Ok(())
    }

    /// Current list for `did`, oldest first
    pub fn get_hashes(&self, did: &str) -> Result<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT hash FROM meter_hashes WHERE did = ?1 ORDER BY id ASC")?;
        let hashes = stmt
            .query_map(params![did], |row| row.get(0))?
            .collect::<std::result::Result<Vec<String>, _>>()?;
        Ok(hashes)
    }

    /// Audit trail for `did`, oldest first
    pub fn get_events(&self, did: &str) -> Result<Vec<LedgerEvent>> {
        let mut stmt = self.conn.prepare(
            "SELECT event_id, timestamp, event_type, did, idx, hash
             FROM ledger_events
             WHERE did = ?1
             ORDER BY id ASC",
        )?;

        let events = stmt
            .query_map(params![did], |row| {
                let timestamp_str: String = row.get(1)?;
                let index: i64 = row.get(4)?;
                Ok(LedgerEvent {
                    event_id: row.get(0)?,
                    timestamp: DateTime::parse_from_rfc3339(&timestamp_str)
                        .map_err(|e| {
                            rusqlite::Error::FromSqlConversionFailure(
                                1,
                                rusqlite::types::Type::Text,
                                Box::new(e),
                            )
                        })?
                        .with_timezone(&Utc),
                    event_type: row.get(2)?,
                    did: row.get(3)?,
                    index: index as usize,
                    hash: row.get(5)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(events)
    }
}

pub fn setup_ledger(conn: &Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS meter_hashes (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            did TEXT NOT NULL,
            hash TEXT NOT NULL,
            created_at TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS ledger_events (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            event_id TEXT UNIQUE NOT NULL,
            timestamp TEXT NOT NULL,
            event_type TEXT NOT NULL,
            did TEXT NOT NULL,
            idx INTEGER NOT NULL,
            hash TEXT
        )",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_meter_hashes_did ON meter_hashes(did)",
        [],
    )?;

    Ok(())
}

fn count_for(conn: &Connection, did: &str) -> Result<usize> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM meter_hashes WHERE did = ?1",
        params![did],
        |row| row.get(0),
    )?;
    Ok(count as usize)
}

fn row_id_at(conn: &Connection, did: &str, index: usize) -> Result<i64> {
    let row_id = conn
        .query_row(
            "SELECT id FROM meter_hashes WHERE did = ?1 ORDER BY id ASC LIMIT 1 OFFSET ?2",
            params![did, index as i64],
            |row| row.get(0),
        )
        .optional()?;

    match row_id {
        Some(id) => Ok(id),
        None => Err(AnchorError::IndexOutOfBounds {
            did: did.to_string(),
            index,
            len: count_for(conn, did)?,
        }),
    }
}

fn insert_event(conn: &Connection, event: &LedgerEvent) -> Result<()> {
    conn.execute(
        "INSERT INTO ledger_events (event_id, timestamp, event_type, did, idx, hash)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            event.event_id,
            event.timestamp.to_rfc3339(),
            event.event_type,
            event.did,
            event.index as i64,
            event.hash,
        ],
    )?;
    Ok(())
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    const DID: &str = "did:ewc:0x123";

    #[test]
    fn test_store_hash() {
        let mut ledger = HashLedger::in_memory().unwrap();
        assert_eq!(ledger.store_hash(DID, "0x123").unwrap(), 0);

        assert_eq!(ledger.get_hashes(DID).unwrap(), vec!["0x123"]);
    }

    #[test]
    fn test_multiple_hashes_keep_order() {
        let mut ledger = HashLedger::in_memory().unwrap();
        ledger.store_hash(DID, "0xaaa").unwrap();
        assert_eq!(ledger.store_hash(DID, "0xbbb").unwrap(), 1);

        assert_eq!(ledger.get_hashes(DID).unwrap(), vec!["0xaaa", "0xbbb"]);
    }

    #[test]
    fn test_lists_are_per_did() {
        let mut ledger = HashLedger::in_memory().unwrap();
        ledger.store_hash(DID, "0xaaa").unwrap();
        ledger.store_hash("did:ewc:0x456", "0xbbb").unwrap();

        assert_eq!(ledger.get_hashes(DID).unwrap(), vec!["0xaaa"]);
        assert!(ledger.get_hashes("did:ewc:0x789").unwrap().is_empty());
    }

    #[test]
    fn test_update_hash() {
        let mut ledger = HashLedger::in_memory().unwrap();
        ledger.store_hash(DID, "0x123").unwrap();
        ledger.update_hash(DID, 0, "0x456").unwrap();

        assert_eq!(ledger.get_hashes(DID).unwrap(), vec!["0x456"]);
    }

    #[test]
    fn test_revoke_hash() {
        let mut ledger = HashLedger::in_memory().unwrap();
        ledger.store_hash(DID, "0x123").unwrap();
        ledger.revoke_hash(DID, 0).unwrap();

        assert!(ledger.get_hashes(DID).unwrap().is_empty());
    }

    #[test]
    fn test_revoke_middle_keeps_order() {
        let mut ledger = HashLedger::in_memory().unwrap();
        for h in ["0xa", "0xb", "0xc"] {
            ledger.store_hash(DID, h).unwrap();
        }
        ledger.revoke_hash(DID, 1).unwrap();

        assert_eq!(ledger.get_hashes(DID).unwrap(), vec!["0xa", "0xc"]);
        // Index 1 now addresses what used to be index 2
        ledger.update_hash(DID, 1, "0xd").unwrap();
        assert_eq!(ledger.get_hashes(DID).unwrap(), vec!["0xa", "0xd"]);
    }

    #[test]
    fn test_invalid_index() {
        let mut ledger = HashLedger::in_memory().unwrap();
        ledger.store_hash(DID, "0x123").unwrap();

        let err = ledger.update_hash(DID, 1, "0x456").unwrap_err();
        assert!(err.to_string().contains("Index out of bounds"));
        assert!(matches!(err, AnchorError::IndexOutOfBounds { index: 1, len: 1, .. }));

        let err = ledger.revoke_hash(DID, 1).unwrap_err();
        assert!(err.to_string().contains("Index out of bounds"));

        // Failed calls leave the list untouched
        assert_eq!(ledger.get_hashes(DID).unwrap(), vec!["0x123"]);
    }

    #[test]
    fn test_events_recorded() {
        let mut ledger = HashLedger::in_memory().unwrap();
        ledger.store_hash(DID, "0x1").unwrap();
        ledger.update_hash(DID, 0, "0x2").unwrap();
        ledger.revoke_hash(DID, 0).unwrap();
        let _ = ledger.revoke_hash(DID, 0);

        let events = ledger.get_events(DID).unwrap();
        let kinds: Vec<&str> = events.iter().map(|e| e.event_type.as_str()).collect();
        assert_eq!(kinds, vec!["hash_stored", "hash_updated", "hash_revoked"]);
        assert_eq!(events[1].hash.as_deref(), Some("0x2"));
        assert_eq!(events[2].hash, None);
    }

    #[test]
    fn test_file_ledger_survives_reopen() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("registry.db");

        {
            let mut ledger = HashLedger::open(&path).unwrap();
            ledger.store_hash(DID, "0xabc").unwrap();
        }

        let ledger = HashLedger::open(&path).unwrap();
        assert_eq!(ledger.get_hashes(DID).unwrap(), vec!["0xabc"]);
    }
}
