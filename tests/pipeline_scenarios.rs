// End-to-end runs of the anchoring pipeline against temp CSV sources

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::fs;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

use meter_anchor::{
    AnchorError, ContentHash, CredentialStore, HashLedger, LedgerRegistry, MeterIdentity,
    MeterRepository, Missing, Pipeline, Receipt, RegistryClient, Result, RunOutcome,
    VerifiableCredential,
};

const DID: &str = "did:ewc:0xc9Fc54b40453db70425D42f03521391D94e7B0b6";
const SANITIZED: &str = "did_ewc_0xc9Fc54b40453db70425D42f03521391D94e7B0b6.json";
const CANONICAL_READING: &str =
    r#"{"Meter ID":"1001","Timestamp":"2022-12-01T12:00:00","Counter":"2500","Consumption":"15.5"}"#;

/// Registry that rejects every call and counts the attempts
#[derive(Default)]
struct RejectingRegistry {
    calls: AtomicUsize,
}

#[async_trait]
impl RegistryClient for RejectingRegistry {
    async fn submit(&self, _: &MeterIdentity, _: &ContentHash) -> Result<Receipt> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(AnchorError::Submission("execution reverted".to_string()))
    }

    async fn update(&self, _: &str, _: usize, _: &ContentHash) -> Result<Receipt> {
        Err(AnchorError::Submission("execution reverted".to_string()))
    }

    async fn revoke(&self, _: &str, _: usize) -> Result<Receipt> {
        Err(AnchorError::Submission("execution reverted".to_string()))
    }

    async fn hashes(&self, _: &str) -> Result<Vec<String>> {
        Ok(Vec::new())
    }
}

fn workspace(registry: Arc<dyn RegistryClient>) -> (TempDir, Pipeline) {
    let dir = TempDir::new().unwrap();
    fs::write(
        dir.path().join("meter_data.csv"),
        "Meter ID,Timestamp,Counter,Consumption\n1001,2022-12-01T12:00:00,2500,15.5\n",
    )
    .unwrap();
    fs::write(dir.path().join("meters.csv"), format!("Meter ID,DID\n1001,{}\n", DID)).unwrap();

    let pipeline = Pipeline::new(
        MeterRepository::new(dir.path().join("meter_data.csv"), dir.path().join("meters.csv")),
        CredentialStore::new(dir.path().join("vcs")),
        registry,
        Duration::from_secs(5),
    );
    (dir, pipeline)
}

fn sha256_hex(input: &str) -> String {
    format!("{:x}", Sha256::digest(input.as_bytes()))
}

#[tokio::test]
async fn test_scenario_a_reading_is_anchored() {
    let registry = Arc::new(LedgerRegistry::new(HashLedger::in_memory().unwrap(), "volta"));
    let (dir, pipeline) = workspace(registry.clone());

    let outcome = pipeline.run("1001").await;
    let receipt = match &outcome {
        RunOutcome::Anchored { receipt, .. } => receipt.clone(),
        other => panic!("expected anchored outcome, got {:?}", other),
    };

    let path = dir.path().join("vcs").join(SANITIZED);
    assert_eq!(outcome.credential_path(), Some(&path));

    let vc: VerifiableCredential =
        serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
    let expected = sha256_hex(CANONICAL_READING);

    assert_eq!(vc.credential_subject.hash.as_str(), expected);
    assert_eq!(vc.issuer, DID);
    assert_eq!(vc.credential_subject.meter_data.get("Counter"), Some("2500"));

    assert_eq!(receipt.did, DID);
    assert_eq!(receipt.index, 0);
    assert_eq!(
        registry.hashes(DID).await.unwrap(),
        vec![format!("0x{}", expected)]
    );
}

#[tokio::test]
async fn test_scenario_a_file_is_pretty_printed_json() {
    let registry = Arc::new(LedgerRegistry::new(HashLedger::in_memory().unwrap(), "volta"));
    let (dir, pipeline) = workspace(registry);
    pipeline.run("1001").await;

    let raw = fs::read_to_string(dir.path().join("vcs").join(SANITIZED)).unwrap();
    assert!(raw.contains("\n  \"@context\""));
    assert!(raw.contains("\"credentialSubject\""));
    assert!(raw.contains("\"meterData\""));
}

#[tokio::test]
async fn test_rerun_overwrites_credential_and_appends_hash() {
    let registry = Arc::new(LedgerRegistry::new(HashLedger::in_memory().unwrap(), "volta"));
    let (dir, pipeline) = workspace(registry.clone());

    pipeline.run("1001").await;
    let first: VerifiableCredential =
        serde_json::from_str(&fs::read_to_string(dir.path().join("vcs").join(SANITIZED)).unwrap())
            .unwrap();
    pipeline.run("1001").await;
    let second: VerifiableCredential =
        serde_json::from_str(&fs::read_to_string(dir.path().join("vcs").join(SANITIZED)).unwrap())
            .unwrap();

    assert_ne!(first.id, second.id);
    assert_eq!(first.credential_subject.hash, second.credential_subject.hash);
    assert_eq!(fs::read_dir(dir.path().join("vcs")).unwrap().count(), 1);
    assert_eq!(registry.hashes(DID).await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_scenario_b_unknown_meter_writes_nothing() {
    let registry = Arc::new(RejectingRegistry::default());
    let (dir, pipeline) = workspace(registry.clone());

    let outcome = pipeline.run("9999").await;

    assert_eq!(
        outcome,
        RunOutcome::NoData {
            meter_id: "9999".to_string(),
            missing: Missing::Reading,
        }
    );
    assert!(outcome.summary().contains("No data found"));
    assert!(!dir.path().join("vcs").exists());
    assert_eq!(registry.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_scenario_c_rejected_submission_keeps_credential() {
    let registry = Arc::new(RejectingRegistry::default());
    let (dir, pipeline) = workspace(registry.clone());

    let outcome = pipeline.run("1001").await;

    match &outcome {
        RunOutcome::PersistedNotAnchored { error, hash, .. } => {
            assert!(error.contains("execution reverted"));
            assert_eq!(hash.as_str(), sha256_hex(CANONICAL_READING));
        }
        other => panic!("expected persisted-not-anchored outcome, got {:?}", other),
    }
    assert!(outcome.is_success());
    assert!(dir.path().join("vcs").join(SANITIZED).exists());
    // No retries
    assert_eq!(registry.calls.load(Ordering::SeqCst), 1);
}
