use anyhow::{Context, Result};
use std::env;
use std::io::{self, BufRead, Write};
use std::sync::Arc;
use tracing::info;

use meter_anchor::{init_tracing, Config, LedgerRegistry, Pipeline, RegistryClient};

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let args: Vec<String> = env::args().collect();

    // Startup failures are the only non-zero exits
    let config = Config::from_env().context("Failed to load configuration")?;
    let registry = LedgerRegistry::open(&config.ledger_path, config.rpc_url.clone())
        .with_context(|| format!("Failed to open registry ledger at {:?}", config.ledger_path))?;
    let registry = Arc::new(registry);
    let pipeline = Pipeline::from_config(&config, registry.clone());

    info!(version = meter_anchor::VERSION, network = %config.rpc_url, "meter-anchor started");

    match args.get(1).map(String::as_str) {
        Some("process") => match args.get(2) {
            Some(meter_id) => run_once(&pipeline, meter_id).await,
            None => usage(),
        },
        Some("hashes") => match args.get(2) {
            Some(did) => show_hashes(pipeline.registry().as_ref(), did).await,
            None => usage(),
        },
        Some("history") => match args.get(2) {
            Some(did) => show_history(&registry, did),
            None => usage(),
        },
        Some("verify") => match args.get(2) {
            Some(did) => verify(&pipeline, did).await,
            None => usage(),
        },
        Some(_) => usage(),
        None => {
            let answer = prompt("Enter the Meter ID: ", io::stdin().lock(), io::stdout());
            match answer {
                Ok(meter_id) => run_once(&pipeline, &meter_id).await,
                // Not a startup failure: report and exit cleanly
                Err(e) => eprintln!("❌ Could not read meter ID: {}", e),
            }
        }
    }

    println!("Exiting the application...");
    Ok(())
}

fn prompt(question: &str, mut input: impl BufRead, mut output: impl Write) -> io::Result<String> {
    write!(output, "{}", question)?;
    output.flush()?;

    let mut line = String::new();
    input.read_line(&mut line)?;
    Ok(line.trim().to_string())
}

async fn run_once(pipeline: &Pipeline, meter_id: &str) {
    println!("Processing data for Meter ID: {}", meter_id.trim());
    let outcome = pipeline.run(meter_id).await;
    println!("{}", outcome.summary());
}

async fn show_hashes(registry: &dyn RegistryClient, did: &str) {
    match registry.hashes(did).await {
        Ok(hashes) if hashes.is_empty() => println!("No hashes stored for {}", did),
        Ok(hashes) => {
            println!("{} hash(es) stored for {}:", hashes.len(), did);
            for (i, hash) in hashes.iter().enumerate() {
                println!("  [{}] {}", i, hash);
            }
        }
        Err(e) => eprintln!("❌ Could not read registry: {}", e),
    }
}

fn show_history(registry: &LedgerRegistry, did: &str) {
    match registry.events(did) {
        Ok(events) if events.is_empty() => println!("No registry activity for {}", did),
        Ok(events) => {
            for event in events {
                println!(
                    "  {} {:<13} [{}] {}",
                    event.timestamp.to_rfc3339(),
                    event.event_type,
                    event.index,
                    event.hash.as_deref().unwrap_or("-")
                );
            }
        }
        Err(e) => eprintln!("❌ Could not read registry history: {}", e),
    }
}

async fn verify(pipeline: &Pipeline, did: &str) {
    match pipeline.verify(did).await {
        Ok(v) => {
            println!("Credential {} for {}", v.credential_id, v.did);
            println!("  hash:       {}", v.hash);
            println!("  consistent: {}", if v.consistent { "✓" } else { "✗" });
            match v.anchored_index {
                Some(i) => println!("  anchored:   ✓ (index {})", i),
                None => println!("  anchored:   ✗"),
            }
        }
        Err(e) => eprintln!("❌ Verification failed: {}", e),
    }
}

fn usage() {
    eprintln!("Usage:");
    eprintln!("   meter-anchor                     prompt for a meter ID");
    eprintln!("   meter-anchor process <meter-id>  anchor one meter reading");
    eprintln!("   meter-anchor hashes <did>        list registry hashes for a DID");
    eprintln!("   meter-anchor history <did>       show registry activity for a DID");
    eprintln!("   meter-anchor verify <did>        check a stored credential");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Cursor, Read};

    /// Input that fails on every read
    struct BrokenInput;

    impl Read for BrokenInput {
        fn read(&mut self, _: &mut [u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "stdin closed"))
        }
    }

    #[test]
    fn test_prompt_reads_trimmed_line() {
        let mut out = Vec::new();
        let id = prompt("Enter the Meter ID: ", Cursor::new(" 1001 \n"), &mut out).unwrap();

        assert_eq!(id, "1001");
        assert_eq!(String::from_utf8(out).unwrap(), "Enter the Meter ID: ");
    }

    #[test]
    fn test_prompt_read_failure_is_returned_not_raised() {
        let err = prompt("Enter the Meter ID: ", io::BufReader::new(BrokenInput), Vec::new()).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::BrokenPipe);
    }
}
