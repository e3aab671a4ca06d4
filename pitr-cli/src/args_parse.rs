use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::list::ListArgs;
use crate::restore::{PitrRestoreArgs, RestoreArgs};

#[derive(Debug, Parser)]
#[command(name = "pitr")]
#[command(about = "Full backups, incremental oplog capture and point-in-time restore for MongoDB", long_about = None)]
pub(crate) struct Cli {
    #[command(flatten)]
    pub(crate) global: GlobalArgs,

    #[command(subcommand)]
    pub(crate) command: Commands,
}

#[derive(Debug, Subcommand)]
pub(crate) enum Commands {
    #[command(about = "Take a full backup, upload it and apply retention")]
    Dump,
    #[command(name = "oplog-dump", about = "Capture the oplog since the last chunk and apply retention")]
    OplogDump,
    #[command(name = "pitr-restore", about = "Replay oplog chunks over a time window")]
    PitrRestore(PitrRestoreArgs),
    #[command(about = "Restore a single full backup")]
    Restore(RestoreArgs),
    #[command(about = "List oplog chunks or full backups")]
    List(ListArgs),
    #[command(about = "Apply retention without taking a backup")]
    Prune,
}

/// Connection and storage settings shared by every subcommand; each one may also come from
/// the environment or the config file.
#[derive(Debug, Args)]
pub(crate) struct GlobalArgs {
    #[arg(long, global = true, env = "PITR_CONFIG_FILE", help = "Path to a YAML config file")]
    pub(crate) config_file: Option<PathBuf>,

    #[arg(long, global = true, env = "S3__BUCKET", help = "S3 bucket holding the backups")]
    pub(crate) s3_bucket: Option<String>,
    #[arg(long, global = true, env = "S3__ENDPOINT", help = "S3 endpoint URL")]
    pub(crate) s3_endpoint: Option<String>,
    #[arg(long, global = true, env = "S3__REGION")]
    pub(crate) s3_region: Option<String>,
    #[arg(long, global = true, env = "S3__ACCESS_KEY")]
    pub(crate) s3_access_key: Option<String>,
    #[arg(long, global = true, env = "S3__SECRET_ACCESS_KEY", hide_env_values = true)]
    pub(crate) s3_secret_key: Option<String>,
    #[arg(long, global = true, env = "S3__PREFIX", help = "Key prefix inside the bucket")]
    pub(crate) prefix: Option<String>,
    #[arg(long, global = true, env = "S3__KEEP_RECENT_N", help = "Full backups to keep (0 disables pruning)")]
    pub(crate) keep_recent_n: Option<u32>,
    #[arg(long, global = true, env = "PITR_LOCAL_ROOT", help = "Use a local directory instead of S3")]
    pub(crate) local_root: Option<String>,

    #[arg(long, global = true, env = "MONGO__CONNECTION_STRING", hide_env_values = true)]
    pub(crate) connection_string: Option<String>,
    #[arg(long, global = true, env = "MONGO__DATABASE", help = "Back up or restore a single database")]
    pub(crate) mongo_database: Option<String>,
    #[arg(long, global = true, env = "MONGO__COLLECTION")]
    pub(crate) mongo_collection: Option<String>,
    #[arg(long = "exclude-collection", global = true, help = "Collections left out of full backups (repeatable)")]
    pub(crate) excluded_collections: Vec<String>,
    #[arg(long, global = true, env = "MONGO__BACKUP_DIR", help = "Scratch directory for dumps")]
    pub(crate) backup_dir: Option<String>,
    #[arg(long, global = true, env = "MONGO__GZIP")]
    pub(crate) gzip: Option<bool>,
    #[arg(long, global = true, default_value_t = false, help = "Drop collections before a full restore")]
    pub(crate) drop: bool,
}
