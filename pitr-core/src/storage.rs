use async_trait::async_trait;
use thiserror::Error;

use crate::chunk::Instant;

/// One entry returned by a prefix listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectInfo {
    pub key: String,
    pub last_modified: Option<Instant>,
}

/// Result of a best-effort batch delete. Keys in `deleted` are gone for good.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchDeleteOutcome {
    pub deleted: Vec<String>,
    pub failed: Vec<(String, String)>,
}

impl BatchDeleteOutcome {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("object store {op} {key}: {reason}")]
    Backend {
        op: &'static str,
        key: String,
        reason: String,
    },

    #[error("invalid backend configuration: {0}")]
    Config(String),
}

impl StorageError {
    pub fn backend(op: &'static str, key: impl Into<String>, reason: impl ToString) -> Self {
        StorageError::Backend {
            op,
            key: key.into(),
            reason: reason.to_string(),
        }
    }
}

/// Key/value object bucket with prefix listing.
///
/// Implementations own timeouts and retries. The only non-error miss is `get`
/// returning `Ok(None)` for an absent key.
#[async_trait]
pub trait ObjectStore: Send + Sync + 'static {
    /// List every object whose key starts with `prefix`, recursively.
    async fn list(&self, prefix: &str) -> Result<Vec<ObjectInfo>, StorageError>;

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError>;

    /// Write an object. Returning `Ok` means the object is durable.
    async fn put(&self, key: &str, bytes: Vec<u8>) -> Result<(), StorageError>;

    async fn delete_batch(&self, keys: &[String]) -> Result<BatchDeleteOutcome, StorageError>;
}
