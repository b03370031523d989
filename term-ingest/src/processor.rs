//! Combine, transform and write a single partition.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::{StreamExt, TryStreamExt};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::codec::{ArrowTableCodec, TableCodec, TableFormat};
use crate::error::{IngestError, Result};
use crate::log_partition;
use crate::logging::LogConfig;
use crate::partition::{PartitionId, PartitionManifest};
use crate::storage::StorageGateway;
use crate::table::UnifiedTable;
use crate::transform::{FlagColumn, TableTransform, TransformContext};

/// Key prefix used for processed outputs unless configured otherwise.
pub const DEFAULT_OUTPUT_PREFIX: &str = "data/processed-data-";

/// Where and in which format processed partitions are written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputLayout {
    pub key_prefix: String,
    pub format: TableFormat,
}

impl Default for OutputLayout {
    fn default() -> Self {
        Self {
            key_prefix: DEFAULT_OUTPUT_PREFIX.to_string(),
            format: TableFormat::Csv,
        }
    }
}

impl OutputLayout {
    pub fn new(key_prefix: impl Into<String>, format: TableFormat) -> Self {
        Self {
            key_prefix: key_prefix.into(),
            format,
        }
    }

    /// Destination key for a partition, e.g. `data/processed-data-2023-03-19.csv`.
    pub fn key_for(&self, id: &PartitionId) -> String {
        format!("{}{}.{}", self.key_prefix, id, self.format.extension())
    }
}

/// Result of processing one partition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessedOutcome {
    pub partition_id: PartitionId,
    pub rows_written: usize,
    /// True when the output was empty and no object was written.
    pub was_skipped: bool,
    pub output_key: Option<String>,
}

/// Turns a partition manifest into one output object.
///
/// Processing never touches the watermark; a failure at any step leaves the
/// partition pending for the next run.
#[derive(Debug, Clone)]
pub struct PartitionProcessor {
    source: Arc<dyn StorageGateway>,
    destination: Arc<dyn StorageGateway>,
    codec: Arc<dyn TableCodec>,
    transform: Arc<dyn TableTransform>,
    layout: OutputLayout,
    fetch_concurrency: usize,
    log_config: LogConfig,
}

impl PartitionProcessor {
    /// Creates a processor with the Arrow codec, the `is_processed` flag
    /// transform and the default output layout.
    pub fn new(source: Arc<dyn StorageGateway>, destination: Arc<dyn StorageGateway>) -> Self {
        Self {
            source,
            destination,
            codec: Arc::new(ArrowTableCodec::default()),
            transform: Arc::new(FlagColumn::default()),
            layout: OutputLayout::default(),
            fetch_concurrency: num_cpus::get().max(1),
            log_config: LogConfig::default(),
        }
    }

    pub fn with_codec(mut self, codec: Arc<dyn TableCodec>) -> Self {
        self.codec = codec;
        self
    }

    pub fn with_transform(mut self, transform: Arc<dyn TableTransform>) -> Self {
        self.transform = transform;
        self
    }

    pub fn with_layout(mut self, layout: OutputLayout) -> Self {
        self.layout = layout;
        self
    }

    /// Sets how many manifest objects are fetched at once. Zero is treated as one.
    pub fn with_fetch_concurrency(mut self, fetch_concurrency: usize) -> Self {
        self.fetch_concurrency = fetch_concurrency.max(1);
        self
    }

    pub fn with_log_config(mut self, log_config: LogConfig) -> Self {
        self.log_config = log_config;
        self
    }

    pub fn layout(&self) -> &OutputLayout {
        &self.layout
    }

    /// Fetches, decodes and concatenates every object of the manifest.
    ///
    /// Objects are fetched concurrently but concatenated in manifest order,
    /// so the row order is deterministic. An empty manifest gives an empty
    /// table.
    #[instrument(skip(self, manifest), fields(partition.id = %manifest.partition_id(), keys = manifest.len()))]
    pub async fn combine(&self, manifest: &PartitionManifest) -> Result<UnifiedTable> {
        let id = manifest.partition_id();
        let tables: Vec<UnifiedTable> = futures::stream::iter(manifest.keys())
            .map(|key| self.fetch_table(id, key))
            .buffered(self.fetch_concurrency)
            .try_collect()
            .await?;

        UnifiedTable::concat(tables).map_err(|e| IngestError::Combine {
            partition: id.clone(),
            message: e.to_string(),
        })
    }

    async fn fetch_table(&self, id: &PartitionId, key: &str) -> Result<UnifiedTable> {
        let combine_error = |message: String| IngestError::Combine {
            partition: id.clone(),
            message,
        };

        let format = TableFormat::from_key(key)
            .ok_or_else(|| combine_error(format!("'{key}' is not a data file")))?;
        let data = self
            .source
            .get(key)
            .await
            .map_err(|e| combine_error(e.to_string()))?;
        let table = self
            .codec
            .decode(&data, format)
            .map_err(|e| combine_error(format!("failed to decode '{key}': {e}")))?;

        debug!(storage.key = %key, rows = table.num_rows(), "Decoded source object");
        Ok(table)
    }

    /// Processes one partition: combine, transform, then write.
    ///
    /// `at` is handed to the transform as its only time input. An output
    /// with no rows is not written and the outcome is marked skipped.
    #[instrument(skip(self, manifest), fields(partition.id = %manifest.partition_id()))]
    pub async fn process(
        &self,
        manifest: &PartitionManifest,
        at: DateTime<Utc>,
    ) -> Result<ProcessedOutcome> {
        let id = manifest.partition_id().clone();
        let combined = self.combine(manifest).await?;
        log_partition!(
            self.log_config,
            partition.id = %id,
            keys = manifest.len(),
            rows = combined.num_rows(),
            "Combined partition"
        );

        let ctx = TransformContext {
            partition_id: id.clone(),
            processed_at: at,
        };
        let output = self
            .transform
            .apply(combined, &ctx)
            .await
            .map_err(|e| IngestError::Transform {
                partition: id.clone(),
                message: e.to_string(),
            })?;

        if output.is_empty() {
            log_partition!(
                self.log_config,
                partition.id = %id,
                "Partition produced no rows, skipping write"
            );
            return Ok(ProcessedOutcome {
                partition_id: id,
                rows_written: 0,
                was_skipped: true,
                output_key: None,
            });
        }

        let key = self.layout.key_for(&id);
        let write_error = |message: String| IngestError::Write {
            partition: id.clone(),
            key: key.clone(),
            message,
        };
        let data = self
            .codec
            .encode(&output, self.layout.format)
            .map_err(|e| write_error(e.to_string()))?;
        self.destination
            .put(&key, data)
            .await
            .map_err(|e| write_error(e.to_string()))?;

        let rows_written = output.num_rows();
        log_partition!(
            self.log_config,
            partition.id = %id,
            storage.key = %key,
            rows.written = rows_written,
            "Wrote processed partition"
        );

        Ok(ProcessedOutcome {
            partition_id: id,
            rows_written,
            was_skipped: false,
            output_key: Some(key),
        })
    }
}
