use anyhow::{anyhow, Context, Result};
use clap::Args;
use pitr_chronology::ChronologyManager;
use pitr_core::{keys, Instant, RestoreWindow};

#[derive(Debug, Args)]
pub(crate) struct PitrRestoreArgs {
    #[arg(long, help = "Window start, \"YYYY-MM-DD HH:MM:SS\" (UTC) or RFC 3339")]
    pub(crate) from: Option<String>,
    #[arg(long, help = "Restore state as of this instant, \"YYYY-MM-DD HH:MM:SS\" (UTC) or RFC 3339")]
    pub(crate) to: Option<String>,
}

#[derive(Debug, Args)]
pub(crate) struct RestoreArgs {
    #[arg(long, help = "Object key of the full backup to restore")]
    pub(crate) key: Option<String>,
    #[arg(long, conflicts_with = "key", help = "Restore the most recent full backup")]
    pub(crate) latest: bool,
}

fn parse_bound(value: Option<&str>, name: &str) -> Result<Option<Instant>> {
    value
        .map(|v| keys::parse_human_instant(v).with_context(|| format!("Failed to parse --{}", name)))
        .transpose()
}

pub(crate) fn window_from_args(args: &PitrRestoreArgs) -> Result<RestoreWindow> {
    let from = parse_bound(args.from.as_deref(), "from")?;
    let to = parse_bound(args.to.as_deref(), "to")?;
    Ok(RestoreWindow::new(from, to)?)
}

pub(crate) async fn handle_pitr_restore(
    manager: &ChronologyManager,
    args: PitrRestoreArgs,
) -> Result<()> {
    let window = window_from_args(&args)?;
    let summary = manager.restore_window(&window).await?;
    println!(
        "Replayed {} chunk(s): {} entries applied, {} failed",
        summary.chunks, summary.applied, summary.failed
    );
    Ok(())
}

pub(crate) async fn handle_restore(manager: &ChronologyManager, args: RestoreArgs) -> Result<()> {
    let key = match (args.key, args.latest) {
        (Some(key), _) => key,
        (None, true) => manager
            .list_full_backups()
            .await?
            .pop()
            .map(|b| b.key)
            .ok_or_else(|| anyhow!("No full backups found"))?,
        (None, false) => return Err(anyhow!("Either --key or --latest is required")),
    };
    let outcome = manager.restore_full(&key).await?;
    println!(
        "Restored {}: {} documents restored, {} failed",
        key, outcome.applied, outcome.failed
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    #[test]
    fn window_accepts_human_and_rfc3339_bounds() {
        let args = PitrRestoreArgs {
            from: Some("2024-01-01 00:00:00".to_string()),
            to: Some("2024-01-01T02:30:00Z".to_string()),
        };
        let window = window_from_args(&args).expect("window");
        assert_eq!(window.from, Some(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()));
        assert_eq!(window.to, Some(Utc.with_ymd_and_hms(2024, 1, 1, 2, 30, 0).unwrap()));
    }

    #[test]
    fn window_rejects_inverted_and_malformed_bounds() {
        let inverted = PitrRestoreArgs {
            from: Some("2024-01-02 00:00:00".to_string()),
            to: Some("2024-01-01 00:00:00".to_string()),
        };
        assert!(window_from_args(&inverted).is_err());

        let malformed = PitrRestoreArgs {
            from: Some("yesterday".to_string()),
            to: None,
        };
        assert!(window_from_args(&malformed).is_err());

        let open = PitrRestoreArgs { from: None, to: None };
        assert_eq!(window_from_args(&open).unwrap(), RestoreWindow::unbounded());
    }
}
