use std::path::PathBuf;
use std::sync::Arc;

use pitr_core::engine::{ApplyOutcome, DumpEngine, NamespaceFilter, RestoreEngine, RestoreInput};
use pitr_core::keys;
use pitr_core::storage::{ObjectStore, StorageError};
use pitr_core::{ChronologyError, FullBackup, Instant, RestoreWindow, Result};
use tracing::{info, warn};

use crate::capture::CaptureOutcome;
use crate::catalog::{build_chain, ChainView, ChunkCatalog};
use crate::cursor::CursorStore;
use crate::replay::ReplaySummary;
use crate::selection::select_for_window;

/// Settings for one backup chain.
///
/// Fields:
/// - `prefix`: bucket prefix holding chunks, cursor and full backups (empty = bucket root)
/// - `database`: restrict full backups to one database; `None` backs up the whole cluster
/// - `collection`: restrict full backups to one collection of `database`
/// - `excluded_collections`: collections left out of full backups
/// - `keep_recent_n`: number of full backups of this set retained by pruning, `0` disables pruning
/// - `scratch_dir`: parent directory for temporary dump and extract directories
/// - `gzip`: compress full backup archives
#[derive(Debug, Clone)]
pub struct ChronologyConfig {
    pub prefix: String,
    pub database: Option<String>,
    pub collection: Option<String>,
    pub excluded_collections: Vec<String>,
    pub keep_recent_n: u32,
    pub scratch_dir: PathBuf,
    pub gzip: bool,
}

impl ChronologyConfig {
    pub fn namespace(&self) -> NamespaceFilter {
        NamespaceFilter {
            database: self.database.clone(),
            collection: self.collection.clone(),
            excluded_collections: self.excluded_collections.clone(),
        }
    }
}

impl Default for ChronologyConfig {
    fn default() -> Self {
        Self {
            prefix: String::new(),
            database: None,
            collection: None,
            excluded_collections: Vec::new(),
            keep_recent_n: 0,
            scratch_dir: std::env::temp_dir(),
            gzip: true,
        }
    }
}

/// Coordinates capture, point-in-time restore and retention for one chain prefix.
///
/// At most one producer may run against a prefix at a time; the cursor is not locked.
pub struct ChronologyManager {
    pub(crate) cfg: ChronologyConfig,
    pub(crate) store: Arc<dyn ObjectStore>,
    pub(crate) dump: Arc<dyn DumpEngine>,
    pub(crate) restore: Arc<dyn RestoreEngine>,
    pub(crate) catalog: ChunkCatalog,
    pub(crate) cursor: CursorStore,
}

impl ChronologyManager {
    pub fn new(
        cfg: ChronologyConfig,
        store: Arc<dyn ObjectStore>,
        dump: Arc<dyn DumpEngine>,
        restore: Arc<dyn RestoreEngine>,
    ) -> Self {
        let catalog = ChunkCatalog::new(store.clone(), &cfg.prefix);
        let cursor = CursorStore::new(store.clone(), &cfg.prefix);
        Self {
            cfg,
            store,
            dump,
            restore,
            catalog,
            cursor,
        }
    }

    pub fn config(&self) -> &ChronologyConfig {
        &self.cfg
    }

    pub fn cursor(&self) -> &CursorStore {
        &self.cursor
    }

    pub async fn list_chunks(&self) -> Result<Vec<pitr_core::Chunk>> {
        self.catalog.list_chunks().await
    }

    /// Full backups of the configured database, ascending by creation time.
    pub async fn list_full_backups(&self) -> Result<Vec<FullBackup>> {
        self.list_full_backups_for(self.cfg.database.as_deref()).await
    }

    /// Full backups of `database` (whole cluster when `None`) under the same prefix.
    pub async fn list_full_backups_for(&self, database: Option<&str>) -> Result<Vec<FullBackup>> {
        self.catalog.list_full_backups(database).await
    }

    /// Backups a chunk chain can start from: whole-cluster backups plus those of the
    /// configured database, ascending by creation time.
    pub async fn chain_anchors(&self) -> Result<Vec<FullBackup>> {
        let database = self.cfg.database.as_deref();
        let mut anchors = self.catalog.list_all_full_backups().await?;
        anchors.retain(|b| b.database.is_none() || b.database.as_deref() == database);
        Ok(anchors)
    }

    pub async fn chain(&self) -> Result<ChainView> {
        Ok(build_chain(self.list_chunks().await?))
    }

    /// Capture the next chunk, then apply retention with the configured `keep_recent_n`.
    pub async fn run_oplog_job(&self, now: Instant) -> Result<CaptureOutcome> {
        let outcome = self.capture_next(now).await?;
        self.prune(self.cfg.keep_recent_n).await?;
        Ok(outcome)
    }

    /// Take a full backup, then apply retention with the configured `keep_recent_n`.
    pub async fn run_full_job(&self, now: Instant) -> Result<FullBackup> {
        let backup = self.capture_full(now).await?;
        self.prune(self.cfg.keep_recent_n).await?;
        Ok(backup)
    }

    /// Roll the database forward over `window` by replaying the covering chunks.
    ///
    /// The target is expected to hold the anchoring full backup already.
    pub async fn restore_window(&self, window: &RestoreWindow) -> Result<ReplaySummary> {
        window.validate()?;
        let chain = self.chain().await?;
        let backups = self.chain_anchors().await?;
        validate_anchor(&chain, &backups, window)?;

        let selection = select_for_window(&chain.chunks, window)?;
        if selection.is_empty() {
            info!(
                target = "replay",
                prefix = %self.cfg.prefix,
                from = ?window.from,
                to = ?window.to,
                "no chunks overlap the restore window"
            );
            return Ok(ReplaySummary::default());
        }
        self.replay(&selection).await
    }

    /// Download the full backup at `key` and apply it as a snapshot.
    pub async fn restore_full(&self, key: &str) -> Result<ApplyOutcome> {
        let bytes = self
            .store
            .get(key)
            .await?
            .ok_or_else(|| StorageError::backend("get", key, "full backup not found"))?;

        let scratch = self.scratch("full-restore-").await?;
        let gzip = key.ends_with(keys::GZIP_EXTENSION);
        let archive = scratch.path().join(if gzip { "dump.gzip" } else { "dump.archive" });
        tokio::fs::write(&archive, &bytes).await?;

        let outcome = self
            .restore
            .apply(&RestoreInput::Snapshot { archive, gzip })
            .await?;
        info!(
            target = "replay",
            key = %key,
            size = bytes.len(),
            applied = outcome.applied,
            failed = outcome.failed,
            "restored full backup"
        );
        Ok(outcome)
    }
}

/// Check that the chain can roll a snapshot forward to the window end.
///
/// The anchor is the newest full backup created no later than `window.to` (the newest
/// overall for an open end). A chain that starts after the anchor cannot be replayed onto
/// it. Returns the anchor when one exists; a missing anchor is only logged because the
/// snapshot may have been restored out of band.
pub fn validate_anchor<'a>(
    chain: &ChainView,
    backups: &'a [FullBackup],
    window: &RestoreWindow,
) -> Result<Option<&'a FullBackup>> {
    let anchor = backups
        .iter()
        .rev()
        .find(|b| window.to.map_or(true, |to| b.created_at <= to));

    let Some(anchor) = anchor else {
        warn!(
            target = "replay",
            backups = backups.len(),
            to = ?window.to,
            "no full backup anchors the restore window"
        );
        return Ok(None);
    };

    if let Some(start) = chain.start() {
        if start > anchor.created_at {
            return Err(ChronologyError::UnanchoredChain {
                anchor_key: anchor.key.clone(),
                anchor_created_at: anchor.created_at,
                chain_start: start,
            });
        }
    }
    Ok(Some(anchor))
}
