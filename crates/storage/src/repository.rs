use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use thiserror::Error;

/// Errors surfaced by storage adapters.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StorageError {
    #[error("storage capacity exceeded: {0}")]
    CapacityExceeded(String),

    #[error("storage unavailable: {0}")]
    Unavailable(String),

    #[error("connection error: {0}")]
    Connection(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

/// String key-value persistence contract.
///
/// `set` overwrites any previous value stored under the key.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Fetch the value stored under `key`.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the backend cannot be read.
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError>;

    /// Store `value` under `key`, replacing any previous value.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::CapacityExceeded` if the write does not fit, or
    /// other storage errors if the backend rejects it.
    async fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;

    /// Atomically read the value under `key`, pass it to `apply`, and store what
    /// `apply` returns. No other `update` or `set` on the same backend can land
    /// between the read and the write. Returning `None` from `apply` leaves the
    /// stored value untouched.
    ///
    /// Returns whether a value was written.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the value cannot be read or the write is
    /// rejected. `apply` is not called when the read fails.
    async fn update(&self, key: &str, apply: UpdateFn<'_>) -> Result<bool, StorageError>;
}

/// Transformation applied by [`KeyValueStore::update`] to the current value.
pub type UpdateFn<'a> = Box<dyn FnOnce(Option<String>) -> Option<String> + Send + 'a>;

/// In-memory store for tests and prototyping.
///
/// An optional byte limit mimics a browser storage quota: a write fails when
/// the summed size of all keys and values would exceed it.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    entries: Arc<Mutex<HashMap<String, String>>>,
    capacity_bytes: Option<usize>,
    unavailable: Arc<AtomicBool>,
}

impl InMemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_capacity_limit(capacity_bytes: usize) -> Self {
        Self {
            capacity_bytes: Some(capacity_bytes),
            ..Self::default()
        }
    }

    /// Make every subsequent operation fail with `StorageError::Unavailable`.
    pub fn mark_unavailable(&self) {
        self.unavailable.store(true, Ordering::SeqCst);
    }

    fn check_available(&self) -> Result<(), StorageError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StorageError::Unavailable("store marked unavailable".into()));
        }
        Ok(())
    }

    fn insert_within_quota(
        &self,
        entries: &mut HashMap<String, String>,
        key: &str,
        value: String,
    ) -> Result<(), StorageError> {
        if let Some(limit) = self.capacity_bytes {
            let others: usize = entries
                .iter()
                .filter(|(k, _)| k.as_str() != key)
                .map(|(k, v)| k.len() + v.len())
                .sum();
            let attempted = others + key.len() + value.len();
            if attempted > limit {
                return Err(StorageError::CapacityExceeded(format!(
                    "{attempted} bytes exceeds quota of {limit} bytes"
                )));
            }
        }

        entries.insert(key.to_string(), value);
        Ok(())
    }
}

#[async_trait]
impl KeyValueStore for InMemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        self.check_available()?;
        let guard = self
            .entries
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        Ok(guard.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.check_available()?;
        let mut guard = self
            .entries
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        self.insert_within_quota(&mut guard, key, value.to_string())
    }

    async fn update(&self, key: &str, apply: UpdateFn<'_>) -> Result<bool, StorageError> {
        self.check_available()?;
        let mut guard = self
            .entries
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        let Some(value) = apply(guard.get(key).cloned()) else {
            return Ok(false);
        };
        self.insert_within_quota(&mut guard, key, value)?;
        Ok(true)
    }
}

/// Holds the key-value backend behind a trait object for easy backend swapping.
#[derive(Clone)]
pub struct Storage {
    pub kv: Arc<dyn KeyValueStore>,
}

impl Storage {
    #[must_use]
    pub fn in_memory() -> Self {
        let kv: Arc<dyn KeyValueStore> = Arc::new(InMemoryStore::new());
        Self { kv }
    }
}
