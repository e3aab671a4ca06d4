use std::path::Path;

use metrics::{counter, histogram};
use pitr_core::engine::DumpRequest;
use pitr_core::keys;
use pitr_core::{Chunk, FullBackup, Instant, Result, TimeRange};
use tracing::{debug, error, info};

use crate::archive::pack_directory;
use crate::chronology_metrics::{
    CAPTURE_LATENCY_MS, CHUNK_CAPTURE_TOTAL, CHUNK_UPLOAD_BYTES_TOTAL, FULL_BACKUP_TOTAL,
};
use crate::cursor::ChainCursor;
use crate::manager::ChronologyManager;

/// Why a capture produced nothing. Neither case is an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeferReason {
    /// No full backup exists yet to start the chain from.
    NoAnchor,
    /// The cursor is already at or past `now`.
    EmptyInterval,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureOutcome {
    Deferred(DeferReason),
    Captured(Chunk),
}

impl CaptureOutcome {
    pub fn chunk(&self) -> Option<&Chunk> {
        match self {
            CaptureOutcome::Captured(chunk) => Some(chunk),
            CaptureOutcome::Deferred(_) => None,
        }
    }
}

impl ChronologyManager {
    /// Capture `[cursor, now)` as the next chunk of the chain.
    ///
    /// The chain of a prefix is shared by every backup set, so it starts at the newest
    /// whole-cluster backup regardless of the configured database. The chunk is uploaded
    /// before the cursor advances. A failure anywhere leaves the cursor untouched, so the
    /// next call re-captures from the same point.
    pub async fn capture_next(&self, now: Instant) -> Result<CaptureOutcome> {
        let backups = self.list_full_backups_for(None).await?;
        let Some(anchor) = backups.last() else {
            info!(
                target = "capture",
                prefix = %self.cfg.prefix,
                "no whole-cluster full backup found, oplog capture deferred"
            );
            counter!(CHUNK_CAPTURE_TOTAL.name, "prefix" => self.cfg.prefix.clone(), "result" => "deferred").increment(1);
            return Ok(CaptureOutcome::Deferred(DeferReason::NoAnchor));
        };

        let from = match self.cursor.read().await? {
            Some(cursor) => cursor.last_captured_to,
            None => {
                info!(
                    target = "capture",
                    prefix = %self.cfg.prefix,
                    anchor = %anchor.key,
                    "starting chain at most recent full backup"
                );
                anchor.created_at
            }
        };
        let to = keys::truncate_millis(now);
        if from >= to {
            debug!(target = "capture", prefix = %self.cfg.prefix, from = %from, to = %to, "empty capture interval");
            counter!(CHUNK_CAPTURE_TOTAL.name, "prefix" => self.cfg.prefix.clone(), "result" => "deferred").increment(1);
            return Ok(CaptureOutcome::Deferred(DeferReason::EmptyInterval));
        }
        let range = TimeRange::new(from, to)?;

        let started = std::time::Instant::now();
        match self.capture_range(&range, now).await {
            Ok(chunk) => {
                histogram!(CAPTURE_LATENCY_MS.name, "kind" => "oplog")
                    .record(started.elapsed().as_millis() as f64);
                counter!(CHUNK_CAPTURE_TOTAL.name, "prefix" => self.cfg.prefix.clone(), "result" => "ok").increment(1);
                Ok(CaptureOutcome::Captured(chunk))
            }
            Err(e) => {
                error!(
                    target = "capture",
                    prefix = %self.cfg.prefix,
                    from = %range.from,
                    to = %range.to,
                    error = %e,
                    "oplog capture failed, cursor left in place"
                );
                counter!(CHUNK_CAPTURE_TOTAL.name, "prefix" => self.cfg.prefix.clone(), "result" => "error").increment(1);
                Err(e)
            }
        }
    }

    async fn capture_range(&self, range: &TimeRange, now: Instant) -> Result<Chunk> {
        let scratch = self.scratch("oplog-").await?;
        let out_dir = scratch.path().join("dump");
        tokio::fs::create_dir_all(&out_dir).await?;

        let dumped = self
            .dump
            .dump(&DumpRequest::Oplog { range: *range }, &out_dir)
            .await?;
        let archive = scratch.path().join("chunk.tar.gz");
        pack_directory(&dumped, &archive).await?;

        let key = keys::encode_chunk_key(&self.cfg.prefix, range);
        let size = self.upload_file(&key, &archive).await?;
        counter!(CHUNK_UPLOAD_BYTES_TOTAL.name, "prefix" => self.cfg.prefix.clone()).increment(size);

        self.cursor
            .write(&ChainCursor::after_capture(range, &key, now))
            .await?;
        info!(
            target = "capture",
            key = %key,
            from = %range.from,
            to = %range.to,
            size,
            "captured oplog chunk"
        );
        Ok(Chunk {
            key,
            from_time: range.from,
            to_time: range.to,
            last_modified: None,
        })
    }

    /// Dump a snapshot of the configured namespace and upload it as the full backup for `now`.
    pub async fn capture_full(&self, now: Instant) -> Result<FullBackup> {
        let started = std::time::Instant::now();
        let created_at = keys::truncate_millis(now);
        let result: Result<FullBackup> = async {
            let scratch = self.scratch("full-").await?;
            let archive = self
                .dump
                .dump(
                    &DumpRequest::Snapshot {
                        namespace: self.cfg.namespace(),
                        gzip: self.cfg.gzip,
                    },
                    scratch.path(),
                )
                .await?;
            let key = keys::encode_full_backup_key(
                &self.cfg.prefix,
                self.cfg.database.as_deref(),
                created_at,
                self.cfg.gzip,
            );
            let size = self.upload_file(&key, &archive).await?;
            info!(target = "capture", key = %key, size, "uploaded full backup");
            Ok(FullBackup {
                key,
                created_at,
                database: self.cfg.database.clone(),
                last_modified: None,
            })
        }
        .await;

        let status = if result.is_ok() { "ok" } else { "error" };
        counter!(FULL_BACKUP_TOTAL.name, "prefix" => self.cfg.prefix.clone(), "result" => status).increment(1);
        if result.is_ok() {
            histogram!(CAPTURE_LATENCY_MS.name, "kind" => "full")
                .record(started.elapsed().as_millis() as f64);
        }
        result
    }

    async fn upload_file(&self, key: &str, path: &Path) -> Result<u64> {
        let bytes = tokio::fs::read(path).await?;
        let size = bytes.len() as u64;
        self.store.put(key, bytes).await?;
        debug!(target = "capture", key = %key, size, "upload acknowledged");
        Ok(size)
    }

    pub(crate) async fn scratch(&self, prefix: &str) -> Result<tempfile::TempDir> {
        tokio::fs::create_dir_all(&self.cfg.scratch_dir).await?;
        let parent = self.cfg.scratch_dir.clone();
        let prefix = prefix.to_string();
        let dir = tokio::task::spawn_blocking(move || {
            tempfile::Builder::new().prefix(&prefix).tempdir_in(parent)
        })
        .await
        .map_err(std::io::Error::other)??;
        Ok(dir)
    }
}
