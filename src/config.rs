// ⚙️ Configuration
// Built once at startup from the environment (and `.env` if present),
// then handed to the pipeline by reference.

use anyhow::{Context, Result};
use std::env;
use std::path::PathBuf;

pub const DEFAULT_RPC_URL: &str = "https://volta-rpc.energyweb.org";

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Readings CSV (`Meter ID,Timestamp,Counter,Consumption`)
    pub meter_data_path: PathBuf,
    /// Identities CSV (`Meter ID,DID`)
    pub meters_path: PathBuf,
    /// Output directory for credential files
    pub vc_dir: PathBuf,
    /// SQLite file backing the hash registry
    pub ledger_path: PathBuf,
    pub registry_timeout_secs: u64,
    /// Recorded on receipts as the network label
    pub rpc_url: String,
    pub server_addr: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            meter_data_path: PathBuf::from("meter_data.csv"),
            meters_path: PathBuf::from("meters.csv"),
            vc_dir: PathBuf::from("vcs"),
            ledger_path: PathBuf::from("registry.db"),
            registry_timeout_secs: 30,
            rpc_url: DEFAULT_RPC_URL.to_string(),
            server_addr: "127.0.0.1:3000".to_string(),
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // Load .env file if it exists
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Same as `from_env` but reads keys through `lookup`
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Config::default();

        let registry_timeout_secs = match lookup("REGISTRY_TIMEOUT_SECS") {
            Some(raw) => raw
                .trim()
                .parse()
                .with_context(|| format!("REGISTRY_TIMEOUT_SECS is not a number: {:?}", raw))?,
            None => defaults.registry_timeout_secs,
        };

        Ok(Config {
            meter_data_path: lookup("METER_DATA_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.meter_data_path),
            meters_path: lookup("METERS_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.meters_path),
            vc_dir: lookup("VC_DIR").map(PathBuf::from).unwrap_or(defaults.vc_dir),
            ledger_path: lookup("LEDGER_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.ledger_path),
            registry_timeout_secs,
            rpc_url: lookup("RPC_URL").unwrap_or(defaults.rpc_url),
            server_addr: lookup("SERVER_ADDR").unwrap_or(defaults.server_addr),
        })
    }
}
