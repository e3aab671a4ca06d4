use metrics::counter;
use pitr_core::{ChronologyError, Chunk, FullBackup, Instant, Result};
use tracing::{debug, info, warn};

use crate::catalog::ChainView;
use crate::chronology_metrics::RETENTION_DELETE_TOTAL;
use crate::manager::ChronologyManager;

/// Objects one retention pass removes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RetentionPlan {
    pub full_backups_to_delete: Vec<FullBackup>,
    pub chunks_to_delete: Vec<Chunk>,
    /// Creation time of the oldest full backup kept in any set; chunks ending at or before it go.
    pub oldest_retained_anchor: Option<Instant>,
}

impl RetentionPlan {
    pub fn is_empty(&self) -> bool {
        self.full_backups_to_delete.is_empty() && self.chunks_to_delete.is_empty()
    }

    pub fn keys(&self) -> Vec<String> {
        self.full_backups_to_delete
            .iter()
            .map(|b| b.key.clone())
            .chain(self.chunks_to_delete.iter().map(|c| c.key.clone()))
            .collect()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RetentionReport {
    pub full_backups_deleted: usize,
    pub chunks_deleted: usize,
}

/// Decide what to delete so that the `keep_recent_n` newest full backups of `database`
/// (whole cluster when `None`) survive together with every chunk needed to roll any
/// surviving backup forward.
///
/// `full_backups` lists every set under the prefix. Only backups of `database` are
/// candidates for deletion; backups of the other sets still pin the chunks they need.
/// A chunk is removed when it ends at or before the oldest surviving backup of any set;
/// a chunk that straddles it is kept. Superseded chunks are removed as well.
/// `keep_recent_n == 0` disables pruning and no full backup at all leaves the chunks alone.
pub fn plan_retention(
    full_backups: &[FullBackup],
    database: Option<&str>,
    chain: &ChainView,
    keep_recent_n: u32,
    cursor_key: &str,
) -> RetentionPlan {
    if keep_recent_n == 0 {
        return RetentionPlan::default();
    }

    let mut newest_first: Vec<&FullBackup> = full_backups
        .iter()
        .filter(|b| b.database.as_deref() == database)
        .collect();
    newest_first.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| b.key.cmp(&a.key)));
    let keep = (keep_recent_n as usize).min(newest_first.len());
    let expired = &newest_first[keep..];

    let oldest_retained_anchor = full_backups
        .iter()
        .filter(|b| !expired.iter().any(|e| e.key == b.key))
        .map(|b| b.created_at)
        .min();
    let mut chunks_to_delete: Vec<Chunk> = chain
        .superseded
        .iter()
        .filter(|c| c.key != cursor_key)
        .cloned()
        .collect();
    if let Some(anchor) = oldest_retained_anchor {
        chunks_to_delete.extend(
            chain
                .chunks
                .iter()
                .filter(|c| c.key != cursor_key && c.to_time <= anchor)
                .cloned(),
        );
    }

    RetentionPlan {
        full_backups_to_delete: expired.iter().map(|b| (*b).clone()).collect(),
        chunks_to_delete,
        oldest_retained_anchor,
    }
}

impl ChronologyManager {
    /// Apply retention keeping the `keep_recent_n` newest full backups of the configured
    /// database (whole cluster when unset). Backups of other sets are never deleted here.
    ///
    /// Best-effort: when some deletions fail the rest stay deleted and
    /// `PartialDelete` is returned so the next run can retry.
    pub async fn prune(&self, keep_recent_n: u32) -> Result<RetentionReport> {
        if keep_recent_n == 0 {
            debug!(target = "retention", prefix = %self.cfg.prefix, "retention disabled");
            return Ok(RetentionReport::default());
        }

        let backups = self.catalog.list_all_full_backups().await?;
        let chain = self.chain().await?;
        let plan = plan_retention(
            &backups,
            self.cfg.database.as_deref(),
            &chain,
            keep_recent_n,
            self.cursor.key(),
        );
        if plan.is_empty() {
            debug!(
                target = "retention",
                prefix = %self.cfg.prefix,
                backups = backups.len(),
                chunks = chain.chunks.len(),
                "retention policy selected nothing for deletion"
            );
            return Ok(RetentionReport::default());
        }

        let keys = plan.keys();
        let outcome = self.store.delete_batch(&keys).await?;

        let is_backup = |key: &str| plan.full_backups_to_delete.iter().any(|b| b.key == key);
        let full_backups_deleted = outcome.deleted.iter().filter(|k| is_backup(k)).count();
        let report = RetentionReport {
            full_backups_deleted,
            chunks_deleted: outcome.deleted.len() - full_backups_deleted,
        };
        counter!(RETENTION_DELETE_TOTAL.name, "kind" => "full", "result" => "ok")
            .increment(report.full_backups_deleted as u64);
        counter!(RETENTION_DELETE_TOTAL.name, "kind" => "chunk", "result" => "ok")
            .increment(report.chunks_deleted as u64);

        if !outcome.is_complete() {
            for (key, reason) in &outcome.failed {
                warn!(target = "retention", key = %key, error = %reason, "failed to delete object, will retry next run");
            }
            counter!(RETENTION_DELETE_TOTAL.name, "kind" => "any", "result" => "error")
                .increment(outcome.failed.len() as u64);
            return Err(ChronologyError::PartialDelete {
                deleted: outcome.deleted.len(),
                failed: outcome.failed.into_iter().map(|(key, _)| key).collect(),
            });
        }

        info!(
            target = "retention",
            prefix = %self.cfg.prefix,
            database = ?self.cfg.database,
            full_backups_deleted = report.full_backups_deleted,
            chunks_deleted = report.chunks_deleted,
            oldest_retained_anchor = ?plan.oldest_retained_anchor,
            "retention completed"
        );
        Ok(report)
    }
}
