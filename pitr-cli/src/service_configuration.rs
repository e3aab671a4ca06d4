use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use pitr_chronology::{BackendConfig, ChronologyConfig, CloudBackend, LocalBackend};
use serde::{Deserialize, Serialize};

use crate::args_parse::GlobalArgs;
use crate::mongo_tools::MongoToolsConfig;

/// configuration settings loaded from the optional YAML config file
#[derive(Debug, Default, Serialize, Deserialize)]
pub(crate) struct LoadConfiguration {
    /// Object store holding backups and oplog chunks
    pub(crate) storage: Option<StorageConfig>,
    #[serde(default)]
    pub(crate) chronology: ChronologyNode,
    #[serde(default)]
    pub(crate) mongo: MongoNode,
}

/// Storage configuration enum (tagged by `backend`)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "backend")]
pub(crate) enum StorageConfig {
    #[serde(rename = "memory")]
    Memory { root: String },
    #[serde(rename = "fs")]
    Fs { root: String },
    #[serde(rename = "s3")]
    S3 {
        /// "s3://bucket" or "s3://bucket/prefix"
        root: String,
        region: Option<String>,
        endpoint: Option<String>,
        access_key: Option<String>,
        secret_key: Option<String>,
        /// MinIO commonly requires path-style (leave unset or false).
        virtual_host_style: Option<bool>,
    },
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub(crate) struct ChronologyNode {
    /// Key prefix inside the bucket
    pub(crate) prefix: Option<String>,
    /// Full backups to keep; 0 disables pruning
    pub(crate) keep_recent_n: Option<u32>,
    /// Local directory for dumps and extracted chunks
    pub(crate) backup_dir: Option<String>,
    pub(crate) gzip: Option<bool>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub(crate) struct MongoNode {
    pub(crate) connection_string: Option<String>,
    pub(crate) database: Option<String>,
    pub(crate) collection: Option<String>,
    #[serde(default)]
    pub(crate) excluded_collections: Vec<String>,
    pub(crate) mongodump_path: Option<String>,
    pub(crate) mongorestore_path: Option<String>,
    /// Drop collections before a full restore
    pub(crate) drop: Option<bool>,
}

/// Fully resolved settings for one invocation.
#[derive(Debug, Clone)]
pub(crate) struct ToolConfiguration {
    pub(crate) backend: BackendConfig,
    pub(crate) chronology: ChronologyConfig,
    pub(crate) mongo: MongoToolsConfig,
}

const DEFAULT_KEEP_RECENT_N: u32 = 5;
const DEFAULT_BACKUP_DIR: &str = "/backup";

impl LoadConfiguration {
    pub(crate) fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))
    }

    /// Overlay command-line flags (and their environment variables) on the file values.
    pub(crate) fn resolve(self, args: &GlobalArgs) -> Result<ToolConfiguration> {
        let backend = resolve_backend(self.storage.as_ref(), args)?;

        let chronology = ChronologyConfig {
            prefix: args
                .prefix
                .clone()
                .or(self.chronology.prefix)
                .unwrap_or_default(),
            database: args.mongo_database.clone().or(self.mongo.database),
            collection: args.mongo_collection.clone().or(self.mongo.collection),
            excluded_collections: if args.excluded_collections.is_empty() {
                self.mongo.excluded_collections
            } else {
                args.excluded_collections.clone()
            },
            keep_recent_n: args
                .keep_recent_n
                .or(self.chronology.keep_recent_n)
                .unwrap_or(DEFAULT_KEEP_RECENT_N),
            scratch_dir: PathBuf::from(
                args.backup_dir
                    .clone()
                    .or(self.chronology.backup_dir)
                    .unwrap_or_else(|| DEFAULT_BACKUP_DIR.to_string()),
            ),
            gzip: args.gzip.or(self.chronology.gzip).unwrap_or(true),
        };

        // Checked when a tool runs; `list` and `prune` only touch the object store.
        let mongo = MongoToolsConfig {
            connection_string: args.connection_string.clone().or(self.mongo.connection_string),
            mongodump_path: self
                .mongo
                .mongodump_path
                .unwrap_or_else(|| "mongodump".to_string()),
            mongorestore_path: self
                .mongo
                .mongorestore_path
                .unwrap_or_else(|| "mongorestore".to_string()),
            drop: args.drop || self.mongo.drop.unwrap_or(false),
        };

        Ok(ToolConfiguration {
            backend,
            chronology,
            mongo,
        })
    }
}

/// Flags win over the file; an S3 bucket flag selects S3, a local root flag selects fs.
fn resolve_backend(file: Option<&StorageConfig>, args: &GlobalArgs) -> Result<BackendConfig> {
    if let Some(bucket) = &args.s3_bucket {
        let mut options = match file {
            Some(StorageConfig::S3 { .. }) => s3_options(file),
            _ => HashMap::new(),
        };
        let flags = [
            ("region", &args.s3_region),
            ("endpoint", &args.s3_endpoint),
            ("access_key_id", &args.s3_access_key),
            ("secret_access_key", &args.s3_secret_key),
        ];
        for (name, value) in flags {
            if let Some(v) = value {
                options.insert(name.to_string(), v.clone());
            }
        }
        return Ok(BackendConfig::Cloud {
            backend: CloudBackend::S3,
            root: format!("s3://{}", bucket.trim_start_matches("s3://")),
            options,
        });
    }
    if let Some(root) = &args.local_root {
        return Ok(BackendConfig::Local {
            backend: LocalBackend::Fs,
            root: root.clone(),
        });
    }
    file.map(BackendConfig::from)
        .ok_or_else(|| anyhow!("No storage backend configured (set --s3-bucket, --local-root or `storage` in the config file)"))
}

fn s3_options(cfg: Option<&StorageConfig>) -> HashMap<String, String> {
    let mut options = HashMap::new();
    if let Some(StorageConfig::S3 {
        region,
        endpoint,
        access_key,
        secret_key,
        virtual_host_style,
        ..
    }) = cfg
    {
        let values = [
            ("region", region.clone()),
            ("endpoint", endpoint.clone()),
            ("access_key_id", access_key.clone()),
            ("secret_access_key", secret_key.clone()),
            ("virtual_host_style", virtual_host_style.map(|v| v.to_string())),
        ];
        for (name, value) in values {
            if let Some(v) = value {
                options.insert(name.to_string(), v);
            }
        }
    }
    options
}

// Provide a conversion from the file StorageConfig to the storage BackendConfig
impl From<&StorageConfig> for BackendConfig {
    fn from(cfg: &StorageConfig) -> Self {
        match cfg {
            StorageConfig::Memory { root } => BackendConfig::Local {
                backend: LocalBackend::Memory,
                root: root.clone(),
            },
            StorageConfig::Fs { root } => BackendConfig::Local {
                backend: LocalBackend::Fs,
                root: root.clone(),
            },
            StorageConfig::S3 { root, .. } => BackendConfig::Cloud {
                backend: CloudBackend::S3,
                root: root.clone(),
                options: s3_options(Some(cfg)),
            },
        }
    }
}
