use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::chunk::{Instant, TimeRange};

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("failed to launch {tool}: {reason}")]
    Launch { tool: String, reason: String },

    #[error("{tool} failed (exit code {code:?}): {stderr}")]
    Failed {
        tool: String,
        code: Option<i32>,
        stderr: String,
    },

    #[error("{0}")]
    Other(String),
}

/// Database / collection selection for snapshot dumps.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamespaceFilter {
    pub database: Option<String>,
    pub collection: Option<String>,
    #[serde(default)]
    pub excluded_collections: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DumpRequest {
    /// Full snapshot, packaged by the engine into a single archive file.
    Snapshot { namespace: NamespaceFilter, gzip: bool },
    /// Change-log records with `range.from <= ts < range.to`, written as a directory.
    Oplog { range: TimeRange },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RestoreInput {
    Snapshot { archive: PathBuf, gzip: bool },
    /// Replay a captured change-log directory, never past `upper_bound` when set.
    Oplog {
        dir: PathBuf,
        upper_bound: Option<Instant>,
    },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ApplyOutcome {
    pub applied: u64,
    pub failed: u64,
}

/// Produces backup material from a live database.
#[async_trait]
pub trait DumpEngine: Send + Sync + 'static {
    /// Dump into `out_dir` and return the produced path: the archive file for a snapshot,
    /// the record directory for an oplog capture. All-or-nothing: an `Err` leaves nothing
    /// worth uploading.
    async fn dump(&self, request: &DumpRequest, out_dir: &Path) -> Result<PathBuf, EngineError>;
}

/// Applies backup material to a live database.
///
/// Oplog application must be idempotent per record; overlapping chunks rely on it.
#[async_trait]
pub trait RestoreEngine: Send + Sync + 'static {
    async fn apply(&self, input: &RestoreInput) -> Result<ApplyOutcome, EngineError>;
}
