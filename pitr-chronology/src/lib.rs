//! Incremental oplog backup chronology.
//!
//! Captures the database change log as a gapless chain of immutable chunks stored next to
//! periodic full backups, selects and replays the chunks covering a restore window, and
//! prunes both under a keep-N policy.

// Object store adapter (opendal)
pub mod cloud;
pub use cloud::{BackendConfig, CloudBackend, CloudStore, LocalBackend};

pub mod archive;

pub mod catalog;
pub use catalog::{build_chain, ChainView, ChunkCatalog};

pub mod cursor;
pub use cursor::{ChainCursor, CursorStore};

pub mod selection;
pub use selection::{select_for_window, SelectedChunk, Selection};

pub mod manager;
pub use manager::{validate_anchor, ChronologyConfig, ChronologyManager};

// Manager operations, one file per phase
pub mod capture;
pub use capture::{CaptureOutcome, DeferReason};
pub mod replay;
pub use replay::ReplaySummary;
pub mod retention;
pub use retention::{plan_retention, RetentionPlan, RetentionReport};

pub mod chronology_metrics;
