use anyhow::{anyhow, Result};
use clap::Args;
use pitr_chronology::ChronologyManager;
use pitr_core::{keys, Chunk, FullBackup};
use prettytable::{format, Cell, Row, Table};

#[derive(Debug, Args)]
pub(crate) struct ListArgs {
    #[arg(long, help = "List oplog chunks")]
    pub(crate) oplog: bool,
    #[arg(long, help = "List whole-cluster full backups")]
    pub(crate) full_backups: bool,
    #[arg(long, help = "List full backups of one database")]
    pub(crate) database: Option<String>,
    #[arg(long, value_parser = ["json"], help = "Output format: json (default: table)")]
    pub(crate) output: Option<String>,
}

pub(crate) async fn handle_command(manager: &ChronologyManager, args: ListArgs) -> Result<()> {
    let json = matches!(args.output.as_deref(), Some("json"));
    if args.oplog {
        let chunks = manager.list_chunks().await?;
        if json {
            println!("{}", serde_json::to_string_pretty(&chunks)?);
        } else {
            chunk_table(&chunks).printstd();
        }
        return Ok(());
    }

    let database = match (&args.database, args.full_backups) {
        (Some(db), _) => Some(db.as_str()),
        (None, true) => None,
        (None, false) => {
            return Err(anyhow!(
                "Choose what to list: --oplog, --full-backups or --database <DB>"
            ))
        }
    };
    let backups = manager.list_full_backups_for(database).await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&backups)?);
    } else {
        backup_table(&backups).printstd();
    }
    Ok(())
}

fn table(headers: &[&str]) -> Table {
    let mut table = Table::new();
    table.set_format(*format::consts::FORMAT_NO_BORDER_LINE_SEPARATOR);
    table.add_row(Row::new(headers.iter().map(|h| Cell::new(h)).collect()));
    table
}

fn chunk_table(chunks: &[Chunk]) -> Table {
    let mut table = table(&["FROM ~ TO", "KEY"]);
    for chunk in chunks {
        table.add_row(Row::new(vec![
            Cell::new(&format!(
                "{} ~ {}",
                keys::format_human_instant(chunk.from_time),
                keys::format_human_instant(chunk.to_time)
            )),
            Cell::new(&chunk.key),
        ]));
    }
    table
}

fn backup_table(backups: &[FullBackup]) -> Table {
    let mut table = table(&["CREATED AT", "KEY"]);
    for backup in backups {
        table.add_row(Row::new(vec![
            Cell::new(&keys::format_human_instant(backup.created_at)),
            Cell::new(&backup.key),
        ]));
    }
    table
}
