//! # Term Ingest - Incremental Partition Ingestion for Rust
//!
//! Term Ingest moves date-partitioned tabular extracts from a source object
//! store to a destination store. Each run it discovers the partitions in
//! the source, skips those a persisted watermark already records, combines
//! the files of every remaining partition into one table, applies a pure
//! transformation and writes the result. Progress is committed to the
//! watermark so that repeated runs never process a partition twice.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use term_ingest::prelude::*;
//!
//! # async fn example() -> term_ingest::error::Result<()> {
//! let source: Arc<dyn StorageGateway> = Arc::new(ObjectStoreGateway::local("/data/raw")?);
//! let destination: Arc<dyn StorageGateway> =
//!     Arc::new(ObjectStoreGateway::local("/data/processed")?);
//!
//! let orchestrator = Orchestrator::new(
//!     PartitionCatalog::new(source.clone(), PartitionNaming::default())
//!         .with_reserved_key(DEFAULT_WATERMARK_KEY),
//!     WatermarkStore::new(source.clone(), DEFAULT_WATERMARK_KEY),
//!     PartitionProcessor::new(source, destination),
//! );
//!
//! let report = orchestrator.run(RunOptions::default()).await;
//! if !report.is_success() {
//!     eprintln!("run stopped: {:?}", report.status);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! The same wiring can be driven from a YAML file through
//! [`config::IngestConfig`], which is what the `term-ingest` binary (feature
//! `cli`) does.
//!
//! ## Guarantees
//!
//! - Partitions are processed one at a time in ascending id order.
//! - The first failing partition stops the run; only the partitions before
//!   it are committed, so the next run resumes exactly where this one
//!   stopped.
//! - The watermark is append-only and never records a partition twice.
//! - A partition without data files is recorded as processed without
//!   writing an output object.
//!
//! ## Architecture
//!
//! - **`storage`**: the [`storage::StorageGateway`] trait and its
//!   `object_store` implementation (memory, local directory, S3)
//! - **`codec`**: CSV and Parquet encoding on Arrow
//! - **`table`**: the Arrow-backed [`table::UnifiedTable`]
//! - **`partition`**: partition ids, naming and discovery
//! - **`watermark`**: the persisted record of processed partitions
//! - **`transform`**: pure table transformations, including SQL via DataFusion
//! - **`processor`**: combine, transform and write one partition
//! - **`orchestrator`**: the run state machine and its report
//! - **`config`**: YAML job configuration
//! - **`logging`**: verbosity toggles and subscriber setup

pub mod codec;
pub mod config;
pub mod error;
pub mod logging;
pub mod orchestrator;
pub mod partition;
pub mod prelude;
pub mod processor;
pub mod security;
pub mod storage;
pub mod table;
pub mod transform;
pub mod watermark;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
