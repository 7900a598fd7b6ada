// 📂 Meter Repository
// Looks up a reading and the meter's DID from two CSV sources.
// First trimmed match on "Meter ID" wins; the scan stops there.

use csv::StringRecord;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::{AnchorError, Result};

pub const METER_ID_COLUMN: &str = "Meter ID";
pub const TIMESTAMP_COLUMN: &str = "Timestamp";
pub const COUNTER_COLUMN: &str = "Counter";
pub const CONSUMPTION_COLUMN: &str = "Consumption";
pub const DID_COLUMN: &str = "DID";

const READING_COLUMNS: [&str; 4] = [
    METER_ID_COLUMN,
    TIMESTAMP_COLUMN,
    COUNTER_COLUMN,
    CONSUMPTION_COLUMN,
];
const IDENTITY_COLUMNS: [&str; 2] = [METER_ID_COLUMN, DID_COLUMN];

// ============================================================================
// RECORDS
// ============================================================================

/// One row of the readings source, keyed by header, in header order.
/// Values are kept as the raw strings from the file so the hash covers
/// exactly what was read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MeterReading(Map<String, Value>);

impl MeterReading {
    /// Build from (column, value) pairs, preserving their order
    pub fn from_pairs<K, V, I>(pairs: I) -> Self
    where
        K: Into<String>,
        V: Into<String>,
        I: IntoIterator<Item = (K, V)>,
    {
        let map = pairs
            .into_iter()
            .map(|(k, v)| (k.into(), Value::String(v.into())))
            .collect();
        MeterReading(map)
    }

    fn from_row(headers: &StringRecord, row: &StringRecord) -> Self {
        Self::from_pairs(headers.iter().map(str::trim).zip(row.iter()))
    }

    pub fn get(&self, column: &str) -> Option<&str> {
        self.0.get(column).and_then(Value::as_str)
    }

    pub fn meter_id(&self) -> Option<&str> {
        self.get(METER_ID_COLUMN).map(str::trim)
    }

    pub fn timestamp(&self) -> Option<&str> {
        self.get(TIMESTAMP_COLUMN)
    }

    pub fn counter(&self) -> Option<u64> {
        self.get(COUNTER_COLUMN)?.trim().parse().ok()
    }

    pub fn consumption(&self) -> Option<f64> {
        self.get(CONSUMPTION_COLUMN)?.trim().parse().ok()
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.0
    }
}

/// Meter ID → DID pairing from the identities source
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MeterIdentity {
    pub meter_id: String,
    pub did: String,
}

impl MeterIdentity {
    /// DID method, e.g. `ewc` for `did:ewc:0x...`
    pub fn method(&self) -> Option<&str> {
        did_parts(&self.did).map(|(method, _)| method)
    }
}

/// Split `did:<method>:<method-specific-id>` into its two parts
pub fn did_parts(did: &str) -> Option<(&str, &str)> {
    let rest = did.strip_prefix("did:")?;
    let (method, id) = rest.split_once(':')?;
    if method.is_empty() || id.is_empty() {
        return None;
    }
    Some((method, id))
}

// ============================================================================
// REPOSITORY
// ============================================================================

#[derive(Debug, Clone)]
pub struct MeterRepository {
    readings_path: PathBuf,
    identities_path: PathBuf,
}

impl MeterRepository {
    pub fn new(readings_path: impl Into<PathBuf>, identities_path: impl Into<PathBuf>) -> Self {
        MeterRepository {
            readings_path: readings_path.into(),
            identities_path: identities_path.into(),
        }
    }

    /// First reading whose "Meter ID" equals `meter_id` (both trimmed)
    pub async fn find_reading(&self, meter_id: &str) -> Result<Option<MeterReading>> {
        let path = self.readings_path.clone();
        let wanted = meter_id.trim().to_string();

        tokio::task::spawn_blocking(move || {
            scan_first(&path, "readings", &wanted, &READING_COLUMNS, |headers, row| {
                Ok(MeterReading::from_row(headers, row))
            })
        })
        .await
        .map_err(|e| AnchorError::data_source("readings", e))?
    }

    /// DID registered for `meter_id`
    pub async fn find_identity(&self, meter_id: &str) -> Result<Option<MeterIdentity>> {
        let path = self.identities_path.clone();
        let wanted = meter_id.trim().to_string();

        tokio::task::spawn_blocking(move || {
            scan_first(&path, "identities", &wanted, &IDENTITY_COLUMNS, |headers, row| {
                let did = column_index(headers, DID_COLUMN)
                    .and_then(|i| row.get(i))
                    .map(str::trim)
                    .unwrap_or_default();

                if did_parts(did).is_none() {
                    return Err(AnchorError::data_source(
                        "identities",
                        format!("invalid DID {:?} for meter {}", did, wanted),
                    ));
                }

                Ok(MeterIdentity {
                    meter_id: wanted.clone(),
                    did: did.to_string(),
                })
            })
        })
        .await
        .map_err(|e| AnchorError::data_source("identities", e))?
    }
}

fn column_index(headers: &StringRecord, column: &str) -> Option<usize> {
    headers.iter().position(|h| h.trim() == column)
}

/// Stream `path` row by row and return the first row whose meter ID matches.
/// Rows after the match are never read.
fn scan_first<T>(
    path: &Path,
    source_name: &str,
    wanted: &str,
    required: &[&str],
    build: impl Fn(&StringRecord, &StringRecord) -> Result<T>,
) -> Result<Option<T>> {
    let mut rdr = csv::Reader::from_path(path)
        .map_err(|e| AnchorError::data_source(source_name, format!("{}: {}", path.display(), e)))?;

    let headers = rdr
        .headers()
        .map_err(|e| AnchorError::data_source(source_name, e))?
        .clone();

    for column in required {
        if column_index(&headers, column).is_none() {
            return Err(AnchorError::data_source(
                source_name,
                format!("missing column {:?}", column),
            ));
        }
    }
    let id_col = column_index(&headers, METER_ID_COLUMN).unwrap_or_default();

    let mut scanned = 0usize;
    for result in rdr.records() {
        let row = result.map_err(|e| AnchorError::data_source(source_name, e))?;
        scanned += 1;

        if row.get(id_col).map(str::trim) == Some(wanted) {
            debug!(source = source_name, meter_id = wanted, rows = scanned, "match found");
            return build(&headers, &row).map(Some);
        }
    }

    debug!(source = source_name, meter_id = wanted, rows = scanned, "no match");
    Ok(None)
}

// ============================================================================
// TESTS
// ============================================================================
