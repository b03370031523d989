//! Discovery of partitions and their manifests in the source store.

use std::collections::BTreeSet;
use std::sync::Arc;

use tracing::{debug, info, instrument, warn};

use super::{PartitionId, PartitionManifest, PartitionNaming};
use crate::codec::TableFormat;
use crate::error::{IngestError, Result};
use crate::storage::StorageGateway;

/// Enumerates the partitions present in the source store.
///
/// Discovery is read-only and never retries; retry policy belongs to the
/// gateway.
#[derive(Debug, Clone)]
pub struct PartitionCatalog {
    source: Arc<dyn StorageGateway>,
    naming: PartitionNaming,
    reserved_keys: Vec<String>,
}

impl PartitionCatalog {
    /// Creates a catalog over `source` using `naming`.
    pub fn new(source: Arc<dyn StorageGateway>, naming: PartitionNaming) -> Self {
        Self {
            source,
            naming,
            reserved_keys: Vec::new(),
        }
    }

    /// Excludes a meta-object key (such as the watermark artifact) from discovery.
    pub fn with_reserved_key(mut self, key: impl Into<String>) -> Self {
        self.reserved_keys.push(key.into());
        self
    }

    /// The naming convention in use.
    pub fn naming(&self) -> &PartitionNaming {
        &self.naming
    }

    /// Lists every partition in the source store, in ascending order.
    ///
    /// Root-level objects (the watermark artifact and other meta files) and
    /// folders that don't follow the naming convention are skipped.
    #[instrument(skip(self), fields(store = %self.source.description()))]
    pub async fn discover(&self) -> Result<BTreeSet<PartitionId>> {
        let keys = self.source.list("").await.map_err(|e| {
            IngestError::discovery_with_source("Failed to list source store", Box::new(e))
        })?;

        let mut partitions = BTreeSet::new();
        let mut ignored = BTreeSet::new();
        for key in &keys {
            if self.reserved_keys.iter().any(|reserved| reserved == key) {
                continue;
            }
            let (folder, nested) = match key.split_once('/') {
                Some((folder, _)) => (folder, true),
                // Some stores surface an empty folder marker as a root-level key.
                None if TableFormat::from_key(key).is_none() => (key.as_str(), false),
                // Root-level data files are meta objects, never partitions.
                None => continue,
            };
            match self.naming.parse_folder(folder) {
                Some(id) => {
                    partitions.insert(id);
                }
                None if nested => {
                    ignored.insert(folder.to_string());
                }
                None => {}
            }
        }

        for folder in &ignored {
            warn!(folder = %folder, "Skipping folder that does not follow the partition naming convention");
        }
        info!(
            partitions = partitions.len(),
            objects = keys.len(),
            "Discovered partitions"
        );
        Ok(partitions)
    }

    /// Resolves the data keys of one partition.
    ///
    /// Folder markers and files without a recognised data extension are
    /// excluded; the result may be empty.
    #[instrument(skip(self), fields(partition.id = %id))]
    pub async fn manifest(&self, id: &PartitionId) -> Result<PartitionManifest> {
        let folder = self.naming.folder_for(id);
        let keys = self.source.list(&folder).await.map_err(|e| IngestError::Combine {
            partition: id.clone(),
            message: format!("Failed to list '{folder}': {e}"),
        })?;

        let data_keys: Vec<String> = keys
            .into_iter()
            .filter(|key| !key.ends_with('/') && TableFormat::from_key(key).is_some())
            .collect();

        debug!(files = data_keys.len(), "Resolved partition manifest");
        Ok(PartitionManifest::new(id.clone(), data_keys))
    }
}
