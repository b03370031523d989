//! [`StorageGateway`] implementation over the `object_store` crate.

use std::future::Future;
use std::path::Path as FsPath;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::TryStreamExt;
use object_store::local::LocalFileSystem;
use object_store::memory::InMemory;
use object_store::path::Path;
use object_store::{ObjectStore, PutPayload};
use tracing::{debug, instrument};

use super::{StorageError, StorageGateway, StorageResult};
use crate::log_storage_op;
use crate::logging::{truncate_field, LogConfig};

/// Timeout applied to each store call unless configured otherwise.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// A gateway backed by any [`ObjectStore`].
#[derive(Debug, Clone)]
pub struct ObjectStoreGateway {
    store: Arc<dyn ObjectStore>,
    label: String,
    timeout: Duration,
    log_config: LogConfig,
}

impl ObjectStoreGateway {
    /// Wraps an existing object store.
    pub fn new(store: Arc<dyn ObjectStore>, label: impl Into<String>) -> Self {
        Self {
            store,
            label: label.into(),
            timeout: DEFAULT_REQUEST_TIMEOUT,
            log_config: LogConfig::default(),
        }
    }

    /// Creates a gateway over a fresh in-memory store.
    pub fn in_memory() -> Self {
        Self::new(Arc::new(InMemory::new()), "memory://")
    }

    /// Creates a gateway rooted at a local directory, which must exist.
    pub fn local(root: impl AsRef<FsPath>) -> StorageResult<Self> {
        let root = root.as_ref();
        let store = LocalFileSystem::new_with_prefix(root).map_err(|e| {
            StorageError::from_object_store("open", &root.display().to_string(), e)
        })?;
        Ok(Self::new(
            Arc::new(store),
            format!("file://{}", root.display()),
        ))
    }

    /// Sets the per-call timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets the logging configuration for storage operations.
    pub fn with_log_config(mut self, log_config: LogConfig) -> Self {
        self.log_config = log_config;
        self
    }

    /// Returns the configured per-call timeout.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    async fn bounded<T, F>(&self, operation: &'static str, key: &str, fut: F) -> StorageResult<T>
    where
        F: Future<Output = StorageResult<T>>,
    {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(StorageError::Timeout {
                operation,
                key: key.to_string(),
                after: self.timeout,
            }),
        }
    }
}

/// Splits a key prefix into the directory part `object_store` lists by.
///
/// `object_store` matches prefixes on whole path segments, so
/// `football-2023` is listed through its parent and filtered afterwards.
fn listing_root(prefix: &str) -> Option<Path> {
    prefix
        .rfind('/')
        .map(|idx| &prefix[..idx])
        .filter(|dir| !dir.is_empty())
        .map(Path::from)
}

#[async_trait]
impl StorageGateway for ObjectStoreGateway {
    #[instrument(skip(self), fields(store = %self.label))]
    async fn list(&self, prefix: &str) -> StorageResult<Vec<String>> {
        let root = listing_root(prefix);
        let listing = async {
            self.store
                .list(root.as_ref())
                .map_ok(|meta| meta.location.to_string())
                .try_collect::<Vec<_>>()
                .await
                .map_err(|e| StorageError::from_object_store("list", prefix, e))
        };
        let mut keys: Vec<String> = self
            .bounded("list", prefix, listing)
            .await?
            .into_iter()
            .filter(|key| key.starts_with(prefix))
            .collect();
        keys.sort();

        log_storage_op!(
            self.log_config,
            storage.prefix = %prefix,
            storage.keys = keys.len(),
            "Listed objects"
        );
        debug!(
            storage.keys = %truncate_field(&keys.join(","), self.log_config.max_field_length),
            "Listed keys"
        );
        Ok(keys)
    }

    #[instrument(skip(self), fields(store = %self.label))]
    async fn get(&self, key: &str) -> StorageResult<Bytes> {
        let path = Path::from(key);
        let fetch = async {
            let result = self
                .store
                .get(&path)
                .await
                .map_err(|e| StorageError::from_object_store("get", key, e))?;
            result
                .bytes()
                .await
                .map_err(|e| StorageError::from_object_store("get", key, e))
        };
        let data = self.bounded("get", key, fetch).await?;
        log_storage_op!(
            self.log_config,
            storage.key = %key,
            storage.bytes = data.len(),
            "Fetched object"
        );
        Ok(data)
    }

    #[instrument(skip(self, data), fields(store = %self.label, storage.bytes = data.len()))]
    async fn put(&self, key: &str, data: Bytes) -> StorageResult<()> {
        let path = Path::from(key);
        let size = data.len();
        let write = async {
            self.store
                .put(&path, PutPayload::from(data))
                .await
                .map(|_| ())
                .map_err(|e| StorageError::from_object_store("put", key, e))
        };
        self.bounded("put", key, write).await?;
        log_storage_op!(
            self.log_config,
            storage.key = %key,
            storage.bytes = size,
            "Wrote object"
        );
        Ok(())
    }

    fn description(&self) -> String {
        self.label.clone()
    }
}
