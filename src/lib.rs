// Meter Anchor - Core Library
// Reading → verifiable credential → hash anchored in a registry.
// Shared by the CLI, the API server and the tests.

pub mod config;
pub mod credential;
pub mod error;
pub mod hasher;
pub mod ledger;
pub mod pipeline;
pub mod registry;
pub mod repository;

// Re-export commonly used types
pub use config::Config;
pub use credential::{
    build_credential, sanitize_did, CredentialStore, CredentialSubject, VerifiableCredential,
};
pub use error::{AnchorError, Result};
pub use hasher::{compute_hash, ContentHash};
pub use ledger::{HashLedger, LedgerEvent};
pub use pipeline::{verify_credential, Missing, Pipeline, RunOutcome, Step, Verification};
pub use registry::{LedgerRegistry, MockSigner, Receipt, RegistryClient};
pub use repository::{MeterIdentity, MeterReading, MeterRepository};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Install the `tracing` subscriber used by every binary.
/// `RUST_LOG` overrides the default filter.
pub fn init_tracing() {
    use tracing_subscriber::EnvFilter;

    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| "meter_anchor=info".into()),
        )
        .with_writer(std::io::stderr)
        .try_init();
}
