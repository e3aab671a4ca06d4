pub mod chunk;
pub mod engine;
pub mod error;
pub mod keys;
pub mod storage;

pub use chunk::{Chunk, FullBackup, Instant, RestoreWindow, TimeRange};
pub use error::{ChronologyError, Result};
