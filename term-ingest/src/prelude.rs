//! Prelude for commonly used types and traits in term-ingest.

pub use crate::codec::{ArrowTableCodec, TableCodec, TableFormat};
pub use crate::config::IngestConfig;
pub use crate::error::{ErrorContext, IngestError, Result};
pub use crate::logging::LogConfig;
pub use crate::orchestrator::{CommitMode, Orchestrator, RunOptions, RunReport, RunStatus};
pub use crate::partition::{PartitionCatalog, PartitionId, PartitionManifest, PartitionNaming};
pub use crate::processor::{OutputLayout, PartitionProcessor, ProcessedOutcome};
pub use crate::storage::{ObjectStoreGateway, StorageGateway};
pub use crate::table::UnifiedTable;
pub use crate::transform::{FlagColumn, TableTransform, TransformChain};
pub use crate::watermark::{Watermark, WatermarkStore, DEFAULT_WATERMARK_KEY};
