use std::path::{Path, PathBuf};

use async_trait::async_trait;
use pitr_core::engine::{
    ApplyOutcome, DumpEngine, DumpRequest, EngineError, RestoreEngine, RestoreInput,
};
use pitr_core::{Instant, TimeRange};
use serde_json::json;
use tokio::process::Command;
use tracing::{debug, info};

const OPLOG_DATABASE: &str = "local";
const OPLOG_COLLECTION: &str = "oplog.rs";
const OPLOG_FILE_NAMES: &[&str] = &["oplog.rs.bson", "oplog.bson"];
const STDERR_TAIL: usize = 2048;

#[derive(Debug, Clone)]
pub(crate) struct MongoToolsConfig {
    /// Only required by commands that run a tool
    pub(crate) connection_string: Option<String>,
    pub(crate) mongodump_path: String,
    pub(crate) mongorestore_path: String,
    /// Pass `--drop` to snapshot restores
    pub(crate) drop: bool,
}

impl MongoToolsConfig {
    fn uri_arg(&self, tool: &str) -> Result<String, EngineError> {
        self.connection_string
            .as_deref()
            .map(|uri| format!("--uri={}", uri))
            .ok_or_else(|| EngineError::Launch {
                tool: tool.to_string(),
                reason: "missing MongoDB connection string (--connection-string or MONGO__CONNECTION_STRING)"
                    .to_string(),
            })
    }
}

/// `DumpEngine` backed by the `mongodump` binary.
pub(crate) struct MongoToolsDumpEngine {
    cfg: MongoToolsConfig,
}

impl MongoToolsDumpEngine {
    pub(crate) fn new(cfg: MongoToolsConfig) -> Self {
        Self { cfg }
    }
}

/// `RestoreEngine` backed by the `mongorestore` binary.
pub(crate) struct MongoToolsRestoreEngine {
    cfg: MongoToolsConfig,
}

impl MongoToolsRestoreEngine {
    pub(crate) fn new(cfg: MongoToolsConfig) -> Self {
        Self { cfg }
    }
}

/// Extended JSON filter selecting oplog entries with `from <= wall < to`.
pub(crate) fn oplog_query(range: &TimeRange) -> String {
    json!({
        "wall": {
            "$gte": { "$date": range.from.to_rfc3339_opts(chrono::SecondsFormat::Millis, true) },
            "$lt": { "$date": range.to.to_rfc3339_opts(chrono::SecondsFormat::Millis, true) },
        }
    })
    .to_string()
}

/// `--oplogLimit` value; entries at or after it are not applied. Truncated to whole seconds
/// so replay never passes `upper_bound`.
pub(crate) fn oplog_limit(upper_bound: Instant) -> String {
    format!("{}:0", upper_bound.timestamp())
}

/// Arguments for `mongodump` and the path the dump lands in.
pub(crate) fn dump_args(
    cfg: &MongoToolsConfig,
    request: &DumpRequest,
    out_dir: &Path,
) -> Result<(Vec<String>, PathBuf), EngineError> {
    let mut args = vec![cfg.uri_arg("mongodump")?];
    match request {
        DumpRequest::Oplog { range } => {
            args.push(format!("--db={}", OPLOG_DATABASE));
            args.push(format!("--collection={}", OPLOG_COLLECTION));
            args.push(format!("--query={}", oplog_query(range)));
            args.push(format!("--out={}", out_dir.display()));
            Ok((args, out_dir.to_path_buf()))
        }
        DumpRequest::Snapshot { namespace, gzip } => {
            if let Some(db) = &namespace.database {
                args.push(format!("--db={}", db));
            }
            if let Some(collection) = &namespace.collection {
                args.push(format!("--collection={}", collection));
            }
            for excluded in &namespace.excluded_collections {
                args.push(format!("--excludeCollection={}", excluded));
            }
            let archive = out_dir.join(if *gzip { "dump.gzip" } else { "dump.archive" });
            args.push(format!("--archive={}", archive.display()));
            if *gzip {
                args.push("--gzip".to_string());
            }
            Ok((args, archive))
        }
    }
}

fn snapshot_restore_args(
    cfg: &MongoToolsConfig,
    archive: &Path,
    gzip: bool,
) -> Result<Vec<String>, EngineError> {
    let mut args = vec![
        cfg.uri_arg("mongorestore")?,
        format!("--archive={}", archive.display()),
    ];
    if gzip {
        args.push("--gzip".to_string());
    }
    if cfg.drop {
        args.push("--drop".to_string());
    }
    Ok(args)
}

pub(crate) fn oplog_replay_args(
    cfg: &MongoToolsConfig,
    oplog_file: &Path,
    upper_bound: Option<Instant>,
    empty_root: &Path,
) -> Result<Vec<String>, EngineError> {
    let mut args = vec![
        cfg.uri_arg("mongorestore")?,
        "--oplogReplay".to_string(),
        format!("--oplogFile={}", oplog_file.display()),
    ];
    if let Some(limit) = upper_bound {
        args.push(format!("--oplogLimit={}", oplog_limit(limit)));
    }
    args.push(empty_root.display().to_string());
    Ok(args)
}

/// Number directly before `marker` in `text`, e.g. `12` in "12 document(s) restored".
fn count_before(text: &str, marker: &str) -> Option<u64> {
    let idx = text.find(marker)?;
    text[..idx].split_whitespace().last()?.parse().ok()
}

pub(crate) fn parse_restore_counts(stderr: &str) -> ApplyOutcome {
    let applied = count_before(stderr, "document(s) restored successfully")
        .or_else(|| count_before(stderr, "oplog entries"))
        .unwrap_or(0);
    let failed = count_before(stderr, "document(s) failed to restore").unwrap_or(0);
    ApplyOutcome { applied, failed }
}

async fn find_oplog_file(dir: &Path) -> Result<PathBuf, EngineError> {
    let mut pending = vec![dir.to_path_buf()];
    while let Some(current) = pending.pop() {
        let mut entries = tokio::fs::read_dir(&current)
            .await
            .map_err(|e| EngineError::Other(format!("read {}: {}", current.display(), e)))?;
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| EngineError::Other(format!("read {}: {}", current.display(), e)))?
        {
            let path = entry.path();
            let file_type = entry
                .file_type()
                .await
                .map_err(|e| EngineError::Other(format!("stat {}: {}", path.display(), e)))?;
            if file_type.is_dir() {
                pending.push(path);
            } else if entry
                .file_name()
                .to_str()
                .is_some_and(|name| OPLOG_FILE_NAMES.contains(&name))
            {
                return Ok(path);
            }
        }
    }
    Err(EngineError::Other(format!(
        "no oplog file found under {}",
        dir.display()
    )))
}

/// Run a tool to completion and return its stderr, where the mongo tools write progress.
async fn run(tool: &str, program: &str, args: &[String]) -> Result<String, EngineError> {
    // The first argument carries the connection string and is not logged.
    debug!(target = "mongo_tools", tool, args = ?&args[1..], "spawning");
    let output = Command::new(program)
        .args(args)
        .kill_on_drop(true)
        .output()
        .await
        .map_err(|e| EngineError::Launch {
            tool: tool.to_string(),
            reason: e.to_string(),
        })?;
    let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
    if !output.status.success() {
        let start = stderr.len().saturating_sub(STDERR_TAIL);
        let start = (start..stderr.len())
            .find(|i| stderr.is_char_boundary(*i))
            .unwrap_or(stderr.len());
        return Err(EngineError::Failed {
            tool: tool.to_string(),
            code: output.status.code(),
            stderr: stderr[start..].trim().to_string(),
        });
    }
    Ok(stderr)
}

#[async_trait]
impl DumpEngine for MongoToolsDumpEngine {
    async fn dump(&self, request: &DumpRequest, out_dir: &Path) -> Result<PathBuf, EngineError> {
        let (args, produced) = dump_args(&self.cfg, request, out_dir)?;
        run("mongodump", &self.cfg.mongodump_path, &args).await?;
        info!(target = "mongo_tools", path = %produced.display(), "mongodump finished");
        Ok(produced)
    }
}

#[async_trait]
impl RestoreEngine for MongoToolsRestoreEngine {
    async fn apply(&self, input: &RestoreInput) -> Result<ApplyOutcome, EngineError> {
        let stderr = match input {
            RestoreInput::Snapshot { archive, gzip } => {
                let args = snapshot_restore_args(&self.cfg, archive, *gzip)?;
                run("mongorestore", &self.cfg.mongorestore_path, &args).await?
            }
            RestoreInput::Oplog { dir, upper_bound } => {
                let oplog_file = find_oplog_file(dir).await?;
                let empty_root = dir.join("replay-root");
                tokio::fs::create_dir_all(&empty_root)
                    .await
                    .map_err(|e| EngineError::Other(e.to_string()))?;
                let args = oplog_replay_args(&self.cfg, &oplog_file, *upper_bound, &empty_root)?;
                run("mongorestore", &self.cfg.mongorestore_path, &args).await?
            }
        };
        let outcome = parse_restore_counts(&stderr);
        info!(
            target = "mongo_tools",
            applied = outcome.applied,
            failed = outcome.failed,
            "mongorestore finished"
        );
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use pitr_core::engine::NamespaceFilter;

    fn cfg() -> MongoToolsConfig {
        MongoToolsConfig {
            connection_string: Some("mongodb://db:27017".to_string()),
            mongodump_path: "mongodump".to_string(),
            mongorestore_path: "mongorestore".to_string(),
            drop: true,
        }
    }

    fn range() -> TimeRange {
        TimeRange::new(
            Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2024, 1, 1, 1, 0, 0).unwrap(),
        )
        .unwrap()
    }

    #[test]
    fn oplog_query_is_half_open_on_wall_time() {
        let query: serde_json::Value = serde_json::from_str(&oplog_query(&range())).unwrap();
        assert_eq!(query["wall"]["$gte"]["$date"], "2024-01-01T00:00:00.000Z");
        assert_eq!(query["wall"]["$lt"]["$date"], "2024-01-01T01:00:00.000Z");
    }

    #[test]
    fn oplog_dump_targets_local_oplog_collection() {
        let (args, produced) = dump_args(
            &cfg(),
            &DumpRequest::Oplog { range: range() },
            Path::new("/scratch/dump"),
        )
        .expect("args");
        assert_eq!(produced, PathBuf::from("/scratch/dump"));
        assert!(args.contains(&"--db=local".to_string()));
        assert!(args.contains(&"--collection=oplog.rs".to_string()));
        assert!(args.contains(&"--out=/scratch/dump".to_string()));
    }

    #[test]
    fn snapshot_dump_writes_single_archive() {
        let request = DumpRequest::Snapshot {
            namespace: NamespaceFilter {
                database: Some("orders".to_string()),
                collection: None,
                excluded_collections: vec!["audit".to_string()],
            },
            gzip: true,
        };
        let (args, produced) = dump_args(&cfg(), &request, Path::new("/scratch")).expect("args");
        assert_eq!(produced, PathBuf::from("/scratch/dump.gzip"));
        assert_eq!(
            &args[1..],
            &[
                "--db=orders",
                "--excludeCollection=audit",
                "--archive=/scratch/dump.gzip",
                "--gzip"
            ]
        );
    }

    #[test]
    fn replay_limit_only_for_bounded_chunks() {
        let upper = Utc.with_ymd_and_hms(2024, 1, 1, 0, 30, 0).unwrap()
            + chrono::Duration::milliseconds(750);
        let args = oplog_replay_args(&cfg(), Path::new("/x/local/oplog.rs.bson"), Some(upper), Path::new("/x/root"))
            .expect("args");
        assert!(args.contains(&format!("--oplogLimit={}:0", upper.timestamp())));
        assert_eq!(args.last().map(String::as_str), Some("/x/root"));

        let args = oplog_replay_args(&cfg(), Path::new("/x/local/oplog.rs.bson"), None, Path::new("/x/root"))
            .expect("args");
        assert!(!args.iter().any(|a| a.starts_with("--oplogLimit")));
    }

    #[test]
    fn missing_connection_string_fails_only_when_a_tool_runs() {
        let cfg = MongoToolsConfig {
            connection_string: None,
            ..cfg()
        };
        let err = dump_args(&cfg, &DumpRequest::Oplog { range: range() }, Path::new("/d")).unwrap_err();
        assert!(matches!(err, EngineError::Launch { ref tool, .. } if tool == "mongodump"));
        assert!(snapshot_restore_args(&cfg, Path::new("/d/dump.gzip"), true).is_err());
        assert!(oplog_replay_args(&cfg, Path::new("/d/oplog.bson"), None, Path::new("/r")).is_err());
    }

    #[test]
    fn restore_counts_are_parsed_from_tool_output() {
        let out = "2024-01-01T00:00:00.000+0000\t12 document(s) restored successfully. 3 document(s) failed to restore.";
        assert_eq!(parse_restore_counts(out), ApplyOutcome { applied: 12, failed: 3 });
        let replay = "2024-01-01T00:00:00.000+0000\tapplied 42 oplog entries";
        assert_eq!(parse_restore_counts(replay), ApplyOutcome { applied: 42, failed: 0 });
        assert_eq!(parse_restore_counts("done"), ApplyOutcome::default());
    }

    #[tokio::test]
    async fn oplog_file_is_found_in_dump_layout() {
        let dir = tempfile::TempDir::new().unwrap();
        tokio::fs::create_dir_all(dir.path().join("local")).await.unwrap();
        tokio::fs::write(dir.path().join("local/oplog.rs.metadata.json"), b"{}").await.unwrap();
        tokio::fs::write(dir.path().join("local/oplog.rs.bson"), b"").await.unwrap();
        let found = find_oplog_file(dir.path()).await.unwrap();
        assert!(found.ends_with("local/oplog.rs.bson"));

        let empty = tempfile::TempDir::new().unwrap();
        assert!(find_oplog_file(empty.path()).await.is_err());
    }
}
