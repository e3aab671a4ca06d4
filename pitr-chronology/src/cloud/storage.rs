use async_trait::async_trait;
use opendal::{ErrorKind, Operator};
use pitr_core::storage::{BatchDeleteOutcome, ObjectInfo, ObjectStore, StorageError};
use tracing::{debug, warn};

use crate::cloud::storage_config::BackendConfig;

/// `ObjectStore` backed by an opendal operator (S3, fs or memory).
#[derive(Debug, Clone)]
pub struct CloudStore {
    /// Optional extra prefix for key joining (used by Local backends)
    pub(crate) root_prefix: String,
    /// Opendal operator
    pub(crate) op: Operator,
    provider: &'static str,
}

impl CloudStore {
    pub fn new(cfg: BackendConfig) -> Result<Self, StorageError> {
        let (op, root_prefix) = cfg.build_operator()?;
        Ok(Self {
            root_prefix,
            op,
            provider: cfg.provider(),
        })
    }

    pub fn provider(&self) -> &'static str {
        self.provider
    }

    #[inline]
    fn join(&self, path: &str) -> String {
        let p = path.trim_start_matches('/');
        if self.root_prefix.is_empty() {
            p.to_string()
        } else {
            format!("{}/{}", self.root_prefix, p)
        }
    }

    /// Inverse of `join` for paths returned by the backend.
    #[inline]
    fn strip_root<'a>(&self, path: &'a str) -> &'a str {
        let p = path.trim_start_matches('/');
        if self.root_prefix.is_empty() {
            return p;
        }
        p.strip_prefix(self.root_prefix.as_str())
            .map(|rest| rest.trim_start_matches('/'))
            .unwrap_or(p)
    }
}

#[async_trait]
impl ObjectStore for CloudStore {
    async fn list(&self, prefix: &str) -> Result<Vec<ObjectInfo>, StorageError> {
        let full = self.join(prefix);
        // opendal lists directories; list the closest parent and filter by the full prefix.
        let dir = match full.rfind('/') {
            Some(idx) => full[..=idx].to_string(),
            None => "/".to_string(),
        };
        let entries = match self.op.list_with(&dir).recursive(true).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(StorageError::backend("list", full, e)),
        };

        let mut out = Vec::with_capacity(entries.len());
        for entry in entries {
            let path = entry.path().trim_start_matches('/');
            if path.ends_with('/') || !path.starts_with(full.as_str()) {
                continue;
            }
            let meta = entry.metadata();
            if meta.mode().is_dir() {
                continue;
            }
            out.push(ObjectInfo {
                key: self.strip_root(path).to_string(),
                last_modified: meta.last_modified(),
            });
        }
        out.sort_by(|a, b| a.key.cmp(&b.key));
        debug!(target = "cloud", provider = self.provider, prefix = %prefix, count = out.len(), "listed objects");
        Ok(out)
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        let path = self.join(key);
        match self.op.read(&path).await {
            Ok(buf) => Ok(Some(buf.to_vec())),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StorageError::backend("get", path, e)),
        }
    }

    async fn put(&self, key: &str, bytes: Vec<u8>) -> Result<(), StorageError> {
        let path = self.join(key);
        let size = bytes.len();
        // Writer-based API lets the backend use multipart uploads; close() is the durability point.
        let mut writer = self
            .op
            .writer(&path)
            .await
            .map_err(|e| StorageError::backend("writer", path.clone(), e))?;
        writer
            .write(opendal::Buffer::from(bytes))
            .await
            .map_err(|e| StorageError::backend("write", path.clone(), e))?;
        writer
            .close()
            .await
            .map_err(|e| StorageError::backend("close", path.clone(), e))?;
        debug!(target = "cloud", provider = self.provider, key = %key, size, "object written");
        Ok(())
    }

    async fn delete_batch(&self, keys: &[String]) -> Result<BatchDeleteOutcome, StorageError> {
        let mut outcome = BatchDeleteOutcome::default();
        for key in keys {
            let path = self.join(key);
            match self.op.delete(&path).await {
                Ok(()) => outcome.deleted.push(key.clone()),
                Err(e) => {
                    warn!(target = "cloud", provider = self.provider, key = %key, error = %e, "delete failed");
                    outcome.failed.push((key.clone(), e.to_string()));
                }
            }
        }
        Ok(outcome)
    }
}
