//! Object store access for the ingestion engine.
//!
//! The engine only ever needs three primitives from a store: list keys under
//! a prefix, fetch an object, and write an object. [`StorageGateway`] captures
//! exactly that, so the core can run against S3, a local directory or an
//! in-memory store without knowing which one it talks to.
//!
//! Keys are flat strings whose `/` characters express a logical hierarchy,
//! e.g. `football-2023-03-19/data1.csv`.

use std::fmt::Debug;

use async_trait::async_trait;
use bytes::Bytes;

mod error;
mod gateway;

#[cfg(feature = "s3")]
mod cloud;

pub use error::{StorageError, StorageResult};
pub use gateway::{ObjectStoreGateway, DEFAULT_REQUEST_TIMEOUT};

#[cfg(feature = "s3")]
pub use cloud::{S3Auth, S3Config};

/// Read/list/write access to a key-prefix object store.
///
/// Implementations own their retry policy and must bound every call with a
/// timeout; the engine itself never retries.
///
/// # Examples
///
/// ```rust,ignore
/// use term_ingest::storage::{ObjectStoreGateway, StorageGateway};
///
/// # async fn example() -> term_ingest::storage::StorageResult<()> {
/// let gateway = ObjectStoreGateway::in_memory();
/// gateway.put("football-2023-03-19/data1.csv", "a,b\n1,2\n".into()).await?;
/// let keys = gateway.list("football-").await?;
/// assert_eq!(keys, vec!["football-2023-03-19/data1.csv"]);
/// # Ok(())
/// # }
/// ```
#[async_trait]
pub trait StorageGateway: Debug + Send + Sync {
    /// Lists every key that starts with `prefix`, sorted ascending.
    ///
    /// An empty prefix lists the whole store.
    async fn list(&self, prefix: &str) -> StorageResult<Vec<String>>;

    /// Fetches the full contents of an object.
    ///
    /// Returns [`StorageError::NotFound`] if the object doesn't exist.
    async fn get(&self, key: &str) -> StorageResult<Bytes>;

    /// Writes an object, replacing any previous contents.
    async fn put(&self, key: &str, data: Bytes) -> StorageResult<()>;

    /// Returns a human-readable description of the store.
    fn description(&self) -> String;
}
