use std::error::Error;
use strand_compaction::CompactionConfig;
use stress_test::{stress_test_scaling, stress_test_text};
use tracing_subscriber::EnvFilter;

mod replica;

/// Compaction settings come from the JSON file named by the first argument,
/// or the defaults when none is given.
fn load_config() -> Result<CompactionConfig, Box<dyn Error>> {
    match std::env::args().nth(1) {
        Some(path) => {
            let json = std::fs::read_to_string(&path)?;
            let config = CompactionConfig::from_json(&json)?;
            tracing::info!(%path, "loaded compaction config");
            Ok(config)
        }
        None => Ok(CompactionConfig::default()),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("strand=info".parse()?))
        .init();

    let config = load_config()?;

    println!("\n\n╔════════════════════════════════════════════════════════════╗");
    println!("║            ASYNC STRESS TESTS                               ║");
    println!("╚════════════════════════════════════════════════════════════╝");

    // Test 1: small scale
    let stats = stress_test_text(4, 50, 40, 3, config.clone()).await?;
    stats.print();

    // Test 2: medium scale
    let stats = stress_test_text(10, 200, 200, 3, config.clone()).await?;
    stats.print();

    // Test 3: scaling analysis
    stress_test_scaling(12, 4, config).await?;

    println!("\n✓ All stress tests completed successfully!");
    Ok(())
}
