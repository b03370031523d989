//! Loading and committing the watermark artifact.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info, instrument};

use super::{artifact, Watermark};
use crate::error::{IngestError, Result};
use crate::partition::PartitionId;
use crate::storage::StorageGateway;

/// Key of the watermark artifact in the original deployment.
pub const DEFAULT_WATERMARK_KEY: &str = "processed_data.csv";

/// Reads and writes the watermark artifact at a fixed key.
///
/// Only one orchestrator may commit to a given key at a time.
#[derive(Debug, Clone)]
pub struct WatermarkStore {
    gateway: Arc<dyn StorageGateway>,
    key: String,
}

impl WatermarkStore {
    /// Creates a store for the artifact at `key`.
    pub fn new(gateway: Arc<dyn StorageGateway>, key: impl Into<String>) -> Self {
        Self {
            gateway,
            key: key.into(),
        }
    }

    /// The artifact key.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Loads the persisted watermark.
    ///
    /// A missing artifact is the first-run case and yields an empty
    /// watermark. An artifact that cannot be parsed is
    /// [`IngestError::WatermarkCorrupt`]; the engine never guesses a partial
    /// watermark.
    #[instrument(skip(self), fields(watermark.key = %self.key))]
    pub async fn load(&self) -> Result<Watermark> {
        let data = match self.gateway.get(&self.key).await {
            Ok(data) => data,
            Err(e) if e.is_not_found() => {
                info!("No watermark artifact found, starting from an empty watermark");
                return Ok(Watermark::empty());
            }
            Err(e) => return Err(e.into()),
        };

        let records = artifact::parse(&data)
            .map_err(|message| IngestError::watermark_corrupt(&self.key, message))?;
        let watermark = Watermark::from_records(records).map_err(|duplicate| {
            IngestError::watermark_corrupt(
                &self.key,
                format!("partition '{duplicate}' is recorded more than once"),
            )
        })?;

        debug!(records = watermark.len(), "Loaded watermark");
        Ok(watermark)
    }

    /// Appends `newly_processed` to `watermark` and persists the full result.
    ///
    /// Ids already in the watermark are skipped, so a partition never gains a
    /// second record. When nothing is left to append no write happens and the
    /// watermark is returned unchanged.
    #[instrument(skip(self, watermark, newly_processed), fields(
        watermark.key = %self.key,
        watermark.records = watermark.len(),
        partitions = newly_processed.len()
    ))]
    pub async fn commit(
        &self,
        watermark: &Watermark,
        newly_processed: &[PartitionId],
        at: DateTime<Utc>,
    ) -> Result<Watermark> {
        let (mut next, added) = watermark.appended(newly_processed, at);
        if added.is_empty() {
            debug!("Nothing new to commit, skipping watermark write");
            return Ok(watermark.clone());
        }

        let data = artifact::render(next.records())?;
        self.gateway.put(&self.key, data).await?;
        next.generation += 1;

        info!(
            added = added.len(),
            records = next.len(),
            generation = next.generation,
            "Committed watermark"
        );
        Ok(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::ObjectStoreGateway;
    use crate::test_utils::FaultyGateway;
    use bytes::Bytes;
    use chrono::TimeZone;

    fn id(s: &str) -> PartitionId {
        PartitionId::new(s).unwrap()
    }

    fn at(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2023, 3, day, 6, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn test_load_missing_artifact_is_empty() {
        let store = WatermarkStore::new(
            Arc::new(ObjectStoreGateway::in_memory()),
            DEFAULT_WATERMARK_KEY,
        );
        let watermark = store.load().await.unwrap();
        assert!(watermark.is_empty());
        assert_eq!(watermark.generation(), 0);
    }

    #[tokio::test]
    async fn test_commit_then_load() {
        let gateway = Arc::new(ObjectStoreGateway::in_memory());
        let store = WatermarkStore::new(gateway.clone(), DEFAULT_WATERMARK_KEY);

        let empty = store.load().await.unwrap();
        let committed = store
            .commit(&empty, &[id("2023-03-18"), id("2023-03-19")], at(20))
            .await
            .unwrap();
        assert_eq!(committed.len(), 2);
        assert_eq!(committed.generation(), 1);

        let reloaded = store.load().await.unwrap();
        assert_eq!(reloaded.records(), committed.records());

        let raw = gateway.get(DEFAULT_WATERMARK_KEY).await.unwrap();
        assert!(std::str::from_utf8(&raw)
            .unwrap()
            .starts_with("partition_id,processed_at\n"));
    }

    #[tokio::test]
    async fn test_commit_is_idempotent() {
        let gateway = Arc::new(ObjectStoreGateway::in_memory());
        let store = WatermarkStore::new(gateway.clone(), DEFAULT_WATERMARK_KEY);

        let first = store
            .commit(&Watermark::empty(), &[id("2023-03-18")], at(20))
            .await
            .unwrap();
        let second = store.commit(&first, &[id("2023-03-18")], at(21)).await.unwrap();

        assert_eq!(second.len(), 1);
        assert_eq!(second.generation(), first.generation());
        assert_eq!(second.records()[0].processed_at, at(20));
    }

    #[tokio::test]
    async fn test_commit_empty_skips_write() {
        let gateway = Arc::new(ObjectStoreGateway::in_memory());
        let store = WatermarkStore::new(gateway.clone(), DEFAULT_WATERMARK_KEY);

        let watermark = store.commit(&Watermark::empty(), &[], at(20)).await.unwrap();
        assert!(watermark.is_empty());
        assert!(gateway
            .get(DEFAULT_WATERMARK_KEY)
            .await
            .unwrap_err()
            .is_not_found());
    }

    #[tokio::test]
    async fn test_load_corrupt_artifact() {
        let gateway = Arc::new(ObjectStoreGateway::in_memory());
        gateway
            .put(DEFAULT_WATERMARK_KEY, Bytes::from_static(b"Data1,Data2\n1,2\n"))
            .await
            .unwrap();
        let store = WatermarkStore::new(gateway, DEFAULT_WATERMARK_KEY);

        let err = store.load().await.unwrap_err();
        assert!(matches!(err, IngestError::WatermarkCorrupt { .. }));
    }

    #[tokio::test]
    async fn test_load_duplicate_records_is_corrupt() {
        let gateway = Arc::new(ObjectStoreGateway::in_memory());
        gateway
            .put(
                DEFAULT_WATERMARK_KEY,
                Bytes::from_static(
                    b"partition_id,processed_at\n2023-03-18,2023-03-18\n2023-03-18,2023-03-19\n",
                ),
            )
            .await
            .unwrap();
        let store = WatermarkStore::new(gateway, DEFAULT_WATERMARK_KEY);

        let err = store.load().await.unwrap_err();
        assert!(err.to_string().contains("more than once"));
    }

    #[tokio::test]
    async fn test_commit_write_failure_propagates() {
        let faulty = FaultyGateway::new(Arc::new(ObjectStoreGateway::in_memory()))
            .fail_put(DEFAULT_WATERMARK_KEY);
        let store = WatermarkStore::new(Arc::new(faulty), DEFAULT_WATERMARK_KEY);

        let err = store
            .commit(&Watermark::empty(), &[id("2023-03-18")], at(20))
            .await
            .unwrap_err();
        assert!(matches!(err, IngestError::Storage(_)));
    }
}
