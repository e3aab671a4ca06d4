use std::sync::Arc;

use pitr_core::keys;
use pitr_core::storage::{ObjectInfo, ObjectStore};
use pitr_core::{Chunk, FullBackup, Result};
use tracing::{debug, warn};

/// Derives chunk and full-backup metadata from object keys.
#[derive(Clone)]
pub struct ChunkCatalog {
    store: Arc<dyn ObjectStore>,
    prefix: String,
}

impl ChunkCatalog {
    pub fn new(store: Arc<dyn ObjectStore>, prefix: &str) -> Self {
        Self {
            store,
            prefix: prefix.to_string(),
        }
    }

    /// All chunks under the chain prefix, ascending by `to_time`.
    pub async fn list_chunks(&self) -> Result<Vec<Chunk>> {
        let chunk_prefix = keys::chunk_prefix(&self.prefix);
        let objects = self.store.list(&chunk_prefix).await?;
        let chunks = chunks_from_objects(&self.prefix, &objects)?;
        debug!(target = "catalog", prefix = %chunk_prefix, chunks = chunks.len(), "listed chunks");
        Ok(chunks)
    }

    /// Full backups for `database` (whole cluster when `None`), ascending by `created_at`.
    pub async fn list_full_backups(&self, database: Option<&str>) -> Result<Vec<FullBackup>> {
        let backup_prefix = keys::full_backup_prefix(&self.prefix, database);
        let objects = self.store.list(&backup_prefix).await?;
        let backups = full_backups_from_objects(&self.prefix, database, &objects)?;
        debug!(target = "catalog", prefix = %backup_prefix, backups = backups.len(), "listed full backups");
        Ok(backups)
    }

    /// Full backups of every set under the prefix (whole cluster and each database),
    /// ascending by `created_at`. All of them roll forward over the same chunk chain.
    pub async fn list_all_full_backups(&self) -> Result<Vec<FullBackup>> {
        let root = keys::prefix_root(&self.prefix);
        let objects = self.store.list(&root).await?;
        let backups = all_full_backups_from_objects(&self.prefix, &objects)?;
        debug!(target = "catalog", prefix = %root, backups = backups.len(), "listed full backups of all sets");
        Ok(backups)
    }
}

/// Parse a chunk listing. The cursor object is skipped by name; any other key that does
/// not decode fails the whole listing.
pub fn chunks_from_objects(prefix: &str, objects: &[ObjectInfo]) -> Result<Vec<Chunk>> {
    let chunk_prefix = keys::chunk_prefix(prefix);
    let cursor_key = keys::cursor_key(prefix);

    let mut chunks = Vec::with_capacity(objects.len());
    for obj in objects {
        if obj.key == cursor_key {
            continue;
        }
        let range = keys::decode_chunk_key(&chunk_prefix, &obj.key).map_err(|e| {
            warn!(target = "catalog", key = %obj.key, error = %e, "undecodable object in chunk prefix");
            e
        })?;
        chunks.push(Chunk {
            key: obj.key.clone(),
            from_time: range.from,
            to_time: range.to,
            last_modified: obj.last_modified,
        });
    }
    chunks.sort_by(|a, b| {
        a.to_time
            .cmp(&b.to_time)
            .then(a.from_time.cmp(&b.from_time))
            .then_with(|| a.key.cmp(&b.key))
    });
    Ok(chunks)
}

pub fn full_backups_from_objects(
    prefix: &str,
    database: Option<&str>,
    objects: &[ObjectInfo],
) -> Result<Vec<FullBackup>> {
    let backup_prefix = keys::full_backup_prefix(prefix, database);
    let mut backups = Vec::with_capacity(objects.len());
    for obj in objects {
        let created_at = keys::decode_full_backup_key(&backup_prefix, &obj.key)?;
        backups.push(FullBackup {
            key: obj.key.clone(),
            created_at,
            database: database.map(str::to_string),
            last_modified: obj.last_modified,
        });
    }
    backups.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.key.cmp(&b.key)));
    Ok(backups)
}

/// Parse a listing of the whole prefix, keeping only objects inside a backup set.
pub fn all_full_backups_from_objects(prefix: &str, objects: &[ObjectInfo]) -> Result<Vec<FullBackup>> {
    let mut backups = Vec::new();
    for obj in objects {
        let Some(database) = keys::backup_set_of(prefix, &obj.key) else {
            continue;
        };
        let backup_prefix = keys::full_backup_prefix(prefix, database.as_deref());
        let created_at = keys::decode_full_backup_key(&backup_prefix, &obj.key)?;
        backups.push(FullBackup {
            key: obj.key.clone(),
            created_at,
            database,
            last_modified: obj.last_modified,
        });
    }
    backups.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.key.cmp(&b.key)));
    Ok(backups)
}

/// Ordered chain used for selection and retention.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChainView {
    /// Live chunks, ascending by `to_time`.
    pub chunks: Vec<Chunk>,
    /// Chunks fully covered by a later chunk; never replayed.
    pub superseded: Vec<Chunk>,
}

impl ChainView {
    pub fn start(&self) -> Option<pitr_core::Instant> {
        self.chunks.first().map(|c| c.from_time)
    }

    pub fn end(&self) -> Option<pitr_core::Instant> {
        self.chunks.last().map(|c| c.to_time)
    }
}

/// Build the chain from a catalog listing sorted by `to_time`.
///
/// A chunk that starts no later than the chunk before it and reaches at least as far
/// replaces it (an orphan left by a crash between upload and cursor advance).
pub fn build_chain(sorted: Vec<Chunk>) -> ChainView {
    let mut view = ChainView::default();
    for chunk in sorted {
        while view.chunks.last().is_some_and(|last| chunk.supersedes(last)) {
            if let Some(orphan) = view.chunks.pop() {
                debug!(target = "catalog", orphan = %orphan.key, by = %chunk.key, "chunk superseded");
                view.superseded.push(orphan);
            }
        }
        view.chunks.push(chunk);
    }
    view
}
