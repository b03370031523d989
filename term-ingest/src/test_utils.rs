//! Helpers for exercising the engine against in-memory stores.
//!
//! Available in unit tests and, with the `test-utils` feature, to
//! integration tests and downstream crates.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;

use crate::storage::{ObjectStoreGateway, StorageError, StorageGateway, StorageResult};

/// Creates an in-memory store seeded with `(key, contents)` pairs.
pub async fn seeded_store(objects: &[(&str, &str)]) -> Arc<ObjectStoreGateway> {
    let store = ObjectStoreGateway::in_memory();
    for (key, contents) in objects {
        store
            .put(key, Bytes::copy_from_slice(contents.as_bytes()))
            .await
            .expect("in-memory put cannot fail");
    }
    Arc::new(store)
}

/// Reads an object as UTF-8 text.
pub async fn read_text(store: &dyn StorageGateway, key: &str) -> StorageResult<String> {
    let data = store.get(key).await?;
    Ok(String::from_utf8_lossy(&data).into_owned())
}

#[derive(Debug, Default)]
struct Faults {
    list: HashSet<String>,
    get: HashSet<String>,
    put: HashSet<String>,
    put_substrings: Vec<String>,
}

/// A gateway that fails selected calls and otherwise delegates.
///
/// Failures are reported as [`StorageError::Backend`]. Every successful
/// `put` key is recorded so tests can assert on what was written.
#[derive(Debug)]
pub struct FaultyGateway {
    inner: Arc<dyn StorageGateway>,
    faults: Mutex<Faults>,
    writes: Mutex<Vec<String>>,
}

impl FaultyGateway {
    /// Wraps `inner` with no faults configured.
    pub fn new(inner: Arc<dyn StorageGateway>) -> Self {
        Self {
            inner,
            faults: Mutex::new(Faults::default()),
            writes: Mutex::new(Vec::new()),
        }
    }

    /// Fails `list` calls for exactly this prefix.
    pub fn fail_list(self, prefix: impl Into<String>) -> Self {
        self.faults.lock().unwrap().list.insert(prefix.into());
        self
    }

    /// Fails `get` calls for exactly this key.
    pub fn fail_get(self, key: impl Into<String>) -> Self {
        self.faults.lock().unwrap().get.insert(key.into());
        self
    }

    /// Fails `put` calls for exactly this key.
    pub fn fail_put(self, key: impl Into<String>) -> Self {
        self.faults.lock().unwrap().put.insert(key.into());
        self
    }

    /// Fails `put` calls for any key containing `fragment`.
    pub fn fail_put_containing(self, fragment: impl Into<String>) -> Self {
        self.faults
            .lock()
            .unwrap()
            .put_substrings
            .push(fragment.into());
        self
    }

    /// Removes every configured fault.
    pub fn heal(&self) {
        *self.faults.lock().unwrap() = Faults::default();
    }

    /// Keys successfully written through this gateway, in order.
    pub fn writes(&self) -> Vec<String> {
        self.writes.lock().unwrap().clone()
    }

    fn injected(operation: &'static str, key: &str) -> StorageError {
        StorageError::Backend {
            operation,
            key: key.to_string(),
            message: "injected failure".to_string(),
        }
    }
}

#[async_trait]
impl StorageGateway for FaultyGateway {
    async fn list(&self, prefix: &str) -> StorageResult<Vec<String>> {
        if self.faults.lock().unwrap().list.contains(prefix) {
            return Err(Self::injected("list", prefix));
        }
        self.inner.list(prefix).await
    }

    async fn get(&self, key: &str) -> StorageResult<Bytes> {
        if self.faults.lock().unwrap().get.contains(key) {
            return Err(Self::injected("get", key));
        }
        self.inner.get(key).await
    }

    async fn put(&self, key: &str, data: Bytes) -> StorageResult<()> {
        let fail = {
            let faults = self.faults.lock().unwrap();
            faults.put.contains(key)
                || faults
                    .put_substrings
                    .iter()
                    .any(|fragment| key.contains(fragment.as_str()))
        };
        if fail {
            return Err(Self::injected("put", key));
        }
        self.inner.put(key, data).await?;
        self.writes.lock().unwrap().push(key.to_string());
        Ok(())
    }

    fn description(&self) -> String {
        format!("faulty({})", self.inner.description())
    }
}
