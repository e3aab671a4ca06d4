use std::collections::HashMap;

use opendal::{services, Operator};
use pitr_core::storage::StorageError;

#[derive(Debug, Clone)]
pub enum CloudBackend {
    S3,
}

#[derive(Debug, Clone)]
pub enum LocalBackend {
    Fs,
    Memory,
}

#[derive(Debug, Clone)]
pub enum BackendConfig {
    /// Cloud backends hosted out of process (S3 and S3-compatible stores)
    Cloud {
        backend: CloudBackend,
        /// A URI-like root, e.g. s3://bucket/prefix
        root: String,
        /// Optional backend-specific options (endpoint, region, access_key_id, secret_access_key)
        options: HashMap<String, String>,
    },
    /// Local backends colocated with the tool (fs, memory)
    Local {
        backend: LocalBackend,
        /// For fs: an absolute directory like file:///var/lib/backups or /var/lib/backups
        /// For memory: a logical namespace (prefix is used as a virtual root)
        root: String,
    },
}

impl BackendConfig {
    /// Short provider label used in logs and metrics.
    pub fn provider(&self) -> &'static str {
        match self {
            BackendConfig::Cloud {
                backend: CloudBackend::S3,
                ..
            } => "s3",
            BackendConfig::Local {
                backend: LocalBackend::Fs,
                ..
            } => "fs",
            BackendConfig::Local {
                backend: LocalBackend::Memory,
                ..
            } => "memory",
        }
    }

    /// Build the opendal operator and the key prefix the store joins in front of every key.
    pub(crate) fn build_operator(&self) -> Result<(Operator, String), StorageError> {
        match self {
            BackendConfig::Local {
                backend: LocalBackend::Memory,
                root,
            } => {
                let op = Operator::new(services::Memory::default())
                    .map_err(|e| StorageError::Config(format!("memory backend: {}", e)))?
                    .finish();
                Ok((op, root.trim_matches('/').to_string()))
            }
            BackendConfig::Local {
                backend: LocalBackend::Fs,
                root,
            } => {
                let dir = root.strip_prefix("file://").unwrap_or(root);
                if dir.is_empty() {
                    return Err(StorageError::Config("fs backend requires a root".into()));
                }
                let builder = services::Fs::default().root(dir);
                let op = Operator::new(builder)
                    .map_err(|e| StorageError::Config(format!("fs backend {}: {}", dir, e)))?
                    .finish();
                Ok((op, String::new()))
            }
            BackendConfig::Cloud {
                backend: CloudBackend::S3,
                root,
                options,
            } => {
                let (bucket, prefix) = split_bucket_root(root, "s3://")?;
                let mut builder = services::S3::default()
                    .bucket(&bucket)
                    .root(&format!("/{}", prefix));
                if let Some(v) = options.get("region") {
                    builder = builder.region(v);
                }
                if let Some(v) = options.get("endpoint") {
                    builder = builder.endpoint(v);
                }
                if let Some(v) = options.get("access_key_id") {
                    builder = builder.access_key_id(v);
                }
                if let Some(v) = options.get("secret_access_key") {
                    builder = builder.secret_access_key(v);
                }
                if options
                    .get("virtual_host_style")
                    .map(|v| v == "true")
                    .unwrap_or(false)
                {
                    builder = builder.enable_virtual_host_style();
                }
                let op = Operator::new(builder)
                    .map_err(|e| StorageError::Config(format!("s3 backend {}: {}", root, e)))?
                    .finish();
                Ok((op, String::new()))
            }
        }
    }
}

/// Split `scheme://bucket/some/prefix` into `("bucket", "some/prefix")`.
fn split_bucket_root(root: &str, scheme: &str) -> Result<(String, String), StorageError> {
    let rest = root
        .strip_prefix(scheme)
        .ok_or_else(|| StorageError::Config(format!("expected {}bucket[/prefix], got {}", scheme, root)))?;
    let (bucket, prefix) = match rest.split_once('/') {
        Some((b, p)) => (b, p.trim_matches('/')),
        None => (rest, ""),
    };
    if bucket.is_empty() {
        return Err(StorageError::Config(format!("missing bucket in {}", root)));
    }
    Ok((bucket.to_string(), prefix.to_string()))
}
