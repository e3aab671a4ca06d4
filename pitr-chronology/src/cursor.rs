use std::sync::Arc;

use pitr_core::keys;
use pitr_core::storage::ObjectStore;
use pitr_core::{Instant, Result, TimeRange};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Persisted end of the last successfully captured chunk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainCursor {
    /// Start of the chunk that advanced the cursor; informational.
    pub last_captured_from: Instant,
    /// `to_time` of the newest chunk; the next capture starts here.
    pub last_captured_to: Instant,
    pub last_chunk_key: Option<String>,
    pub updated_at: Instant,
}

impl ChainCursor {
    pub fn after_capture(range: &TimeRange, chunk_key: &str, updated_at: Instant) -> Self {
        Self {
            last_captured_from: range.from,
            last_captured_to: range.to,
            last_chunk_key: Some(chunk_key.to_string()),
            updated_at,
        }
    }
}

/// Reads and writes the singleton cursor object of one chain prefix.
///
/// Last-writer-wins; a single producer per prefix is assumed.
#[derive(Clone)]
pub struct CursorStore {
    store: Arc<dyn ObjectStore>,
    key: String,
}

impl CursorStore {
    pub fn new(store: Arc<dyn ObjectStore>, prefix: &str) -> Self {
        Self {
            store,
            key: keys::cursor_key(prefix),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// `Ok(None)` when no capture has completed on this chain yet.
    pub async fn read(&self) -> Result<Option<ChainCursor>> {
        match self.store.get(&self.key).await? {
            Some(bytes) => {
                let cursor: ChainCursor = serde_json::from_slice(&bytes).map_err(|e| {
                    warn!(target = "cursor", key = %self.key, error = %e, "chain cursor parse failed");
                    e
                })?;
                debug!(target = "cursor", key = %self.key, last_captured_to = %cursor.last_captured_to, "read chain cursor");
                Ok(Some(cursor))
            }
            None => {
                debug!(target = "cursor", key = %self.key, "no chain cursor found");
                Ok(None)
            }
        }
    }

    pub async fn write(&self, cursor: &ChainCursor) -> Result<()> {
        let bytes = serde_json::to_vec(cursor)?;
        let size = bytes.len();
        self.store.put(&self.key, bytes).await?;
        debug!(target = "cursor", key = %self.key, size, last_captured_to = %cursor.last_captured_to, "wrote chain cursor");
        Ok(())
    }
}
