use metrics::counter;
use pitr_core::engine::RestoreInput;
use pitr_core::storage::StorageError;
use pitr_core::Result;
use tracing::{error, info};

use crate::archive::unpack_archive;
use crate::chronology_metrics::CHUNK_REPLAY_TOTAL;
use crate::manager::ChronologyManager;
use crate::selection::{SelectedChunk, Selection};

/// Totals of one replay run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplaySummary {
    pub chunks: usize,
    pub applied: u64,
    pub failed: u64,
}

impl ChronologyManager {
    /// Apply the selected chunks strictly in chain order.
    ///
    /// The first failure aborts the run; chunks already applied stay applied.
    pub async fn replay(&self, selection: &Selection) -> Result<ReplaySummary> {
        let mut summary = ReplaySummary::default();
        for selected in &selection.chunks {
            let upper_bound = selection.upper_bound_for(selected);
            match self.replay_chunk(selected, upper_bound).await {
                Ok(outcome) => {
                    summary.chunks += 1;
                    summary.applied += outcome.applied;
                    summary.failed += outcome.failed;
                    counter!(CHUNK_REPLAY_TOTAL.name, "result" => "ok").increment(1);
                }
                Err(e) => {
                    error!(
                        target = "replay",
                        key = %selected.chunk.key,
                        replayed = summary.chunks,
                        error = %e,
                        "chunk replay failed, aborting restore"
                    );
                    counter!(CHUNK_REPLAY_TOTAL.name, "result" => "error").increment(1);
                    return Err(e);
                }
            }
        }
        info!(
            target = "replay",
            chunks = summary.chunks,
            applied = summary.applied,
            failed = summary.failed,
            "replay completed"
        );
        Ok(summary)
    }

    async fn replay_chunk(
        &self,
        selected: &SelectedChunk,
        upper_bound: Option<pitr_core::Instant>,
    ) -> Result<pitr_core::engine::ApplyOutcome> {
        let key = &selected.chunk.key;
        let bytes = self
            .store
            .get(key)
            .await?
            .ok_or_else(|| StorageError::backend("get", key.as_str(), "chunk listed but not found"))?;

        // Dropped at the end of this call, removing the extracted records.
        let scratch = self.scratch("replay-").await?;
        let archive = scratch.path().join("chunk.tar.gz");
        tokio::fs::write(&archive, &bytes).await?;
        let dir = unpack_archive(&archive, &scratch.path().join("records")).await?;

        let outcome = self
            .restore
            .apply(&RestoreInput::Oplog { dir, upper_bound })
            .await?;
        info!(
            target = "replay",
            key = %key,
            terminal = selected.terminal,
            upper_bound = ?upper_bound,
            applied = outcome.applied,
            failed = outcome.failed,
            "replayed chunk"
        );
        Ok(outcome)
    }
}
