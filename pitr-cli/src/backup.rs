use anyhow::Result;
use chrono::Utc;
use pitr_chronology::{CaptureOutcome, ChronologyManager, DeferReason};
use pitr_core::keys;
use tracing::info;

pub(crate) async fn handle_dump(manager: &ChronologyManager) -> Result<()> {
    let backup = manager.run_full_job(Utc::now()).await?;
    println!(
        "Full backup {} created at {}",
        backup.key,
        keys::format_human_instant(backup.created_at)
    );
    Ok(())
}

pub(crate) async fn handle_oplog_dump(manager: &ChronologyManager) -> Result<()> {
    match manager.run_oplog_job(Utc::now()).await? {
        CaptureOutcome::Captured(chunk) => println!(
            "Oplog chunk {} captured: {} ~ {}",
            chunk.key,
            keys::format_human_instant(chunk.from_time),
            keys::format_human_instant(chunk.to_time)
        ),
        CaptureOutcome::Deferred(DeferReason::NoAnchor) => {
            println!("deferred: no full backup found, run `pitr dump` first")
        }
        CaptureOutcome::Deferred(DeferReason::EmptyInterval) => {
            println!("deferred: nothing new to capture since the last chunk")
        }
    }
    Ok(())
}

pub(crate) async fn handle_prune(manager: &ChronologyManager) -> Result<()> {
    let keep = manager.config().keep_recent_n;
    let report = manager.prune(keep).await?;
    info!(target = "retention", keep, ?report, "prune finished");
    println!(
        "Pruned {} full backup(s) and {} oplog chunk(s)",
        report.full_backups_deleted, report.chunks_deleted
    );
    Ok(())
}
