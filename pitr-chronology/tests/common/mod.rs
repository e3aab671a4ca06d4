#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{Duration, TimeZone, Utc};
use pitr_chronology::{BackendConfig, ChronologyConfig, ChronologyManager, CloudStore, LocalBackend};
use pitr_core::engine::{
    ApplyOutcome, DumpEngine, DumpRequest, EngineError, RestoreEngine, RestoreInput,
};
use pitr_core::storage::{BatchDeleteOutcome, ObjectInfo, ObjectStore, StorageError};
use pitr_core::{Instant, TimeRange};

pub const PREFIX: &str = "prod";

/// Hours after 2024-01-01T00:00:00Z.
pub fn t(hours: i64) -> Instant {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + Duration::hours(hours)
}

pub fn t_min(minutes: i64) -> Instant {
    t(0) + Duration::minutes(minutes)
}

/// Fresh in-memory object store; `root` isolates tests from each other.
pub fn memory_store(root: &str) -> Arc<CloudStore> {
    Arc::new(
        CloudStore::new(BackendConfig::Local {
            backend: LocalBackend::Memory,
            root: root.to_string(),
        })
        .expect("memory store"),
    )
}

/// Dump engine writing a small file that names the captured range.
#[derive(Default)]
pub struct FakeDumpEngine {
    pub requests: Mutex<Vec<DumpRequest>>,
    pub fail_next: Mutex<bool>,
}

impl FakeDumpEngine {
    pub fn fail_once(&self) {
        *self.fail_next.lock().unwrap() = true;
    }

    pub fn oplog_ranges(&self) -> Vec<TimeRange> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter_map(|r| match r {
                DumpRequest::Oplog { range } => Some(*range),
                DumpRequest::Snapshot { .. } => None,
            })
            .collect()
    }
}

pub fn range_marker(range: &TimeRange) -> String {
    format!("{}|{}", range.from.to_rfc3339(), range.to.to_rfc3339())
}

#[async_trait]
impl DumpEngine for FakeDumpEngine {
    async fn dump(&self, request: &DumpRequest, out_dir: &Path) -> Result<PathBuf, EngineError> {
        self.requests.lock().unwrap().push(request.clone());
        {
            let mut fail = self.fail_next.lock().unwrap();
            if *fail {
                *fail = false;
                return Err(EngineError::Failed {
                    tool: "fake-dump".to_string(),
                    code: Some(1),
                    stderr: "connection refused".to_string(),
                });
            }
        }
        match request {
            DumpRequest::Oplog { range } => {
                let dir = out_dir.join("local");
                tokio::fs::create_dir_all(&dir)
                    .await
                    .map_err(|e| EngineError::Other(e.to_string()))?;
                tokio::fs::write(dir.join("oplog.rs.json"), range_marker(range))
                    .await
                    .map_err(|e| EngineError::Other(e.to_string()))?;
                Ok(out_dir.to_path_buf())
            }
            DumpRequest::Snapshot { gzip, .. } => {
                let path = out_dir.join(if *gzip { "dump.gzip" } else { "dump.archive" });
                tokio::fs::write(&path, b"snapshot")
                    .await
                    .map_err(|e| EngineError::Other(e.to_string()))?;
                Ok(path)
            }
        }
    }
}

/// What the restore engine saw for one call; files are read during `apply` since the
/// scratch directory is gone afterwards.
#[derive(Debug, Clone, PartialEq)]
pub enum Applied {
    Snapshot { gzip: bool, content: Vec<u8> },
    Oplog { marker: String, upper_bound: Option<Instant> },
}

#[derive(Default)]
pub struct RecordingRestoreEngine {
    pub applied: Mutex<Vec<Applied>>,
    pub calls: AtomicUsize,
    /// 1-based call number that fails.
    pub fail_on_call: Mutex<Option<usize>>,
}

impl RecordingRestoreEngine {
    pub fn applied(&self) -> Vec<Applied> {
        self.applied.lock().unwrap().clone()
    }

    pub fn oplog_markers(&self) -> Vec<String> {
        self.applied()
            .into_iter()
            .filter_map(|a| match a {
                Applied::Oplog { marker, .. } => Some(marker),
                Applied::Snapshot { .. } => None,
            })
            .collect()
    }
}

#[async_trait]
impl RestoreEngine for RecordingRestoreEngine {
    async fn apply(&self, input: &RestoreInput) -> Result<ApplyOutcome, EngineError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if *self.fail_on_call.lock().unwrap() == Some(call) {
            return Err(EngineError::Failed {
                tool: "fake-restore".to_string(),
                code: Some(2),
                stderr: "duplicate key".to_string(),
            });
        }
        let record = match input {
            RestoreInput::Snapshot { archive, gzip } => Applied::Snapshot {
                gzip: *gzip,
                content: tokio::fs::read(archive)
                    .await
                    .map_err(|e| EngineError::Other(e.to_string()))?,
            },
            RestoreInput::Oplog { dir, upper_bound } => Applied::Oplog {
                marker: tokio::fs::read_to_string(dir.join("local/oplog.rs.json"))
                    .await
                    .map_err(|e| EngineError::Other(e.to_string()))?,
                upper_bound: *upper_bound,
            },
        };
        self.applied.lock().unwrap().push(record);
        Ok(ApplyOutcome {
            applied: 1,
            failed: 0,
        })
    }
}

/// Object store wrapper that injects failures for keys containing a pattern.
pub struct FlakyStore {
    inner: Arc<dyn ObjectStore>,
    fail_puts: Mutex<Vec<String>>,
    fail_deletes: Mutex<Vec<String>>,
    pub put_failures: AtomicUsize,
}

impl FlakyStore {
    pub fn new(inner: Arc<dyn ObjectStore>) -> Self {
        Self {
            inner,
            fail_puts: Mutex::new(Vec::new()),
            fail_deletes: Mutex::new(Vec::new()),
            put_failures: AtomicUsize::new(0),
        }
    }

    /// Fail the next put whose key contains `pattern`.
    pub fn fail_put_once(&self, pattern: &str) {
        self.fail_puts.lock().unwrap().push(pattern.to_string());
    }

    /// Fail every delete of keys containing `pattern` until cleared.
    pub fn fail_deletes(&self, pattern: &str) {
        self.fail_deletes.lock().unwrap().push(pattern.to_string());
    }

    pub fn clear_delete_failures(&self) {
        self.fail_deletes.lock().unwrap().clear();
    }
}

#[async_trait]
impl ObjectStore for FlakyStore {
    async fn list(&self, prefix: &str) -> Result<Vec<ObjectInfo>, StorageError> {
        self.inner.list(prefix).await
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        self.inner.get(key).await
    }

    async fn put(&self, key: &str, bytes: Vec<u8>) -> Result<(), StorageError> {
        let injected = {
            let mut patterns = self.fail_puts.lock().unwrap();
            match patterns.iter().position(|p| key.contains(p.as_str())) {
                Some(i) => {
                    patterns.remove(i);
                    true
                }
                None => false,
            }
        };
        if injected {
            self.put_failures.fetch_add(1, Ordering::SeqCst);
            return Err(StorageError::backend("put", key, "injected failure"));
        }
        self.inner.put(key, bytes).await
    }

    async fn delete_batch(&self, keys: &[String]) -> Result<BatchDeleteOutcome, StorageError> {
        let patterns = self.fail_deletes.lock().unwrap().clone();
        let (blocked, allowed): (Vec<String>, Vec<String>) = keys
            .iter()
            .cloned()
            .partition(|k| patterns.iter().any(|p| k.contains(p.as_str())));
        let mut outcome = self.inner.delete_batch(&allowed).await?;
        outcome
            .failed
            .extend(blocked.into_iter().map(|k| (k, "injected failure".to_string())));
        Ok(outcome)
    }
}

pub struct Harness {
    pub manager: ChronologyManager,
    pub store: Arc<FlakyStore>,
    pub dump: Arc<FakeDumpEngine>,
    pub restore: Arc<RecordingRestoreEngine>,
    pub scratch: tempfile::TempDir,
}

pub fn harness(root: &str, keep_recent_n: u32) -> Harness {
    let scratch = tempfile::TempDir::new().expect("scratch dir");
    let store = Arc::new(FlakyStore::new(memory_store(root)));
    let dump = Arc::new(FakeDumpEngine::default());
    let restore = Arc::new(RecordingRestoreEngine::default());
    let cfg = ChronologyConfig {
        prefix: PREFIX.to_string(),
        keep_recent_n,
        scratch_dir: scratch.path().to_path_buf(),
        ..Default::default()
    };
    let manager = ChronologyManager::new(cfg, store.clone(), dump.clone(), restore.clone());
    Harness {
        manager,
        store,
        dump,
        restore,
        scratch,
    }
}

/// Second manager on the harness store, scoped to `database`, sharing the same chain prefix.
pub fn database_manager(h: &Harness, database: &str, keep_recent_n: u32) -> ChronologyManager {
    let cfg = ChronologyConfig {
        prefix: PREFIX.to_string(),
        database: Some(database.to_string()),
        keep_recent_n,
        scratch_dir: h.scratch.path().to_path_buf(),
        ..Default::default()
    };
    ChronologyManager::new(cfg, h.store.clone(), h.dump.clone(), h.restore.clone())
}
