//! Runs the engine twice against in-memory stores.
//!
//! The first run processes every pending partition; the second finds
//! nothing to do because the watermark already records them.

use std::sync::Arc;

use chrono::{TimeZone, Utc};
use term_ingest::prelude::*;
use term_ingest_demos::seed_source;

#[tokio::main]
async fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    println!("=== Term Ingest In-Memory Example ===\n");

    let source: Arc<dyn StorageGateway> = Arc::new(ObjectStoreGateway::in_memory());
    let destination: Arc<dyn StorageGateway> = Arc::new(ObjectStoreGateway::in_memory());
    seed_source(source.as_ref()).await?;

    let orchestrator = Orchestrator::new(
        PartitionCatalog::new(source.clone(), PartitionNaming::default())
            .with_reserved_key(DEFAULT_WATERMARK_KEY),
        WatermarkStore::new(source.clone(), DEFAULT_WATERMARK_KEY),
        PartitionProcessor::new(source.clone(), destination.clone()),
    );

    let at = Utc.with_ymd_and_hms(2023, 3, 21, 6, 0, 0).unwrap();
    for attempt in 1..=2 {
        let report = orchestrator.run(RunOptions::default().with_at(at)).await;
        println!("Run {attempt}: {:?}", report.status);
        for outcome in &report.processed {
            println!(
                "  {} -> {:?} ({} rows)",
                outcome.partition_id, outcome.output_key, outcome.rows_written
            );
        }
        println!("  already processed: {:?}\n", report.already_processed);
    }

    let output = destination.get("data/processed-data-2023-03-19.csv").await?;
    println!("data/processed-data-2023-03-19.csv:\n{}", String::from_utf8_lossy(&output));

    let watermark = source.get(DEFAULT_WATERMARK_KEY).await?;
    println!("{DEFAULT_WATERMARK_KEY}:\n{}", String::from_utf8_lossy(&watermark));

    Ok(())
}
