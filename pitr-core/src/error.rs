use thiserror::Error;

use crate::chunk::Instant;
use crate::engine::EngineError;
use crate::storage::StorageError;

pub type Result<T> = std::result::Result<T, ChronologyError>;

#[derive(Debug, Error)]
pub enum ChronologyError {
    /// A key under a managed prefix does not decode; corruption or a foreign object.
    #[error("catalog corruption at {key}: {reason}")]
    CatalogCorruption { key: String, reason: String },

    #[error(
        "coverage gap: {previous_key} ends at {previous_to} but {next_key} starts at {next_from}"
    )]
    CoverageGap {
        previous_key: String,
        previous_to: Instant,
        next_key: String,
        next_from: Instant,
    },

    #[error(
        "chain starts at {chain_start}, after anchor {anchor_key} created at {anchor_created_at}"
    )]
    UnanchoredChain {
        anchor_key: String,
        anchor_created_at: Instant,
        chain_start: Instant,
    },

    #[error("invalid restore window: from {from} is after to {to}")]
    InvalidWindow { from: Instant, to: Instant },

    #[error("invalid time range: {0}")]
    InvalidRange(String),

    #[error("unable to parse instant: {0}")]
    InvalidInstant(String),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("engine error: {0}")]
    Engine(#[from] EngineError),

    #[error("archive error: {0}")]
    Archive(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Retention removed some objects but not all; nothing is rolled back.
    #[error("partial delete: {deleted} objects deleted, {} failed", failed.len())]
    PartialDelete { deleted: usize, failed: Vec<String> },
}
