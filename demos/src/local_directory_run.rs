//! Processes partitions from one local directory into another, writing
//! Parquet and committing the watermark after every partition.

use std::sync::Arc;

use tempfile::TempDir;
use term_ingest::prelude::*;
use term_ingest::transform::TimestampColumn;
use term_ingest_demos::seed_source;

#[tokio::main]
async fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    println!("=== Term Ingest Local Directory Example ===\n");

    let source_dir = TempDir::new()?;
    let destination_dir = TempDir::new()?;
    println!("Source:      {}", source_dir.path().display());
    println!("Destination: {}\n", destination_dir.path().display());

    let source: Arc<dyn StorageGateway> = Arc::new(ObjectStoreGateway::local(source_dir.path())?);
    let destination: Arc<dyn StorageGateway> =
        Arc::new(ObjectStoreGateway::local(destination_dir.path())?);
    seed_source(source.as_ref()).await?;

    let transform = TransformChain::new()
        .then(FlagColumn::default())
        .then(TimestampColumn::new("processed_at"));
    let processor = PartitionProcessor::new(source.clone(), destination.clone())
        .with_transform(Arc::new(transform))
        .with_layout(OutputLayout::new("data/processed-data-", TableFormat::Parquet));

    let orchestrator = Orchestrator::new(
        PartitionCatalog::new(source.clone(), PartitionNaming::default())
            .with_reserved_key(DEFAULT_WATERMARK_KEY),
        WatermarkStore::new(destination.clone(), DEFAULT_WATERMARK_KEY),
        processor,
    )
    .with_commit_mode(CommitMode::PerPartition);

    let report = orchestrator.run(RunOptions::default()).await;
    println!("{}", serde_json::to_string_pretty(&report)?);

    println!("\nDestination contents:");
    for key in destination.list("").await? {
        println!("  {key}");
    }

    Ok(())
}
