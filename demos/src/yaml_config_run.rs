//! Wires a job from a YAML document, the same way the `term-ingest`
//! binary does, and runs it against local directories.

use tempfile::TempDir;
use term_ingest::config::IngestConfig;
use term_ingest::logging::setup::init_logging;
use term_ingest::orchestrator::RunOptions;
use term_ingest::storage::{ObjectStoreGateway, StorageGateway};
use term_ingest_demos::seed_source;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let root = TempDir::new()?;
    let source_path = root.path().join("raw");
    let destination_path = root.path().join("processed");

    let yaml = format!(
        r#"
source:
  type: local
  path: {source}
destination:
  type: local
  path: {destination}
pipeline:
  flag_column: Is processed
  sql: SELECT "HomeTeam", "AwayTeam", "FTHG" + "FTAG" AS goals FROM partition_data
logging:
  preset: development
  storage_operations: false
"#,
        source = source_path.display(),
        destination = destination_path.display(),
    );

    let config = IngestConfig::from_yaml_str(&yaml)?;
    init_logging(config.logging.subscriber_config()?)?;

    std::fs::create_dir_all(&source_path)?;
    seed_source(&ObjectStoreGateway::local(&source_path)?).await?;

    let report = config.build_orchestrator()?.run(RunOptions::default()).await;
    println!("{}", serde_json::to_string_pretty(&report)?);

    let destination = ObjectStoreGateway::local(&destination_path)?;
    let output = destination.get("data/processed-data-2023-03-20.csv").await?;
    println!("{}", String::from_utf8_lossy(&output));

    Ok(())
}
