// Object store adapter: backend selection and the opendal-backed `ObjectStore`

pub mod storage;
pub mod storage_config;

pub use storage::CloudStore;
pub use storage_config::{BackendConfig, CloudBackend, LocalBackend};

#[cfg(test)]
mod storage_test;
