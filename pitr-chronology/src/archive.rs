use std::fs::File;
use std::path::{Path, PathBuf};

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use pitr_core::{ChronologyError, Result};
use tracing::debug;

/// Package `src_dir` into a gzip-compressed tar at `dest`. Entries are relative to `src_dir`.
pub async fn pack_directory(src_dir: &Path, dest: &Path) -> Result<u64> {
    let src = src_dir.to_path_buf();
    let out = dest.to_path_buf();
    let size = tokio::task::spawn_blocking(move || pack_blocking(&src, &out))
        .await
        .map_err(|e| ChronologyError::Archive(format!("pack task failed: {}", e)))??;
    debug!(target = "archive", src = %src_dir.display(), dest = %dest.display(), size, "packed directory");
    Ok(size)
}

/// Extract a gzip-compressed tar into `dest_dir`, creating it if needed.
pub async fn unpack_archive(archive: &Path, dest_dir: &Path) -> Result<PathBuf> {
    let src = archive.to_path_buf();
    let out = dest_dir.to_path_buf();
    let extracted = tokio::task::spawn_blocking(move || unpack_blocking(&src, &out))
        .await
        .map_err(|e| ChronologyError::Archive(format!("unpack task failed: {}", e)))??;
    debug!(target = "archive", archive = %archive.display(), dest = %extracted.display(), "unpacked archive");
    Ok(extracted)
}

fn pack_blocking(src: &Path, dest: &Path) -> Result<u64> {
    if !src.is_dir() {
        return Err(ChronologyError::Archive(format!(
            "{} is not a directory",
            src.display()
        )));
    }
    let file = File::create(dest)?;
    let encoder = GzEncoder::new(file, Compression::default());
    let mut builder = tar::Builder::new(encoder);
    builder
        .append_dir_all(".", src)
        .map_err(|e| ChronologyError::Archive(format!("tar {}: {}", src.display(), e)))?;
    let encoder = builder
        .into_inner()
        .map_err(|e| ChronologyError::Archive(format!("finish tar: {}", e)))?;
    let file = encoder
        .finish()
        .map_err(|e| ChronologyError::Archive(format!("finish gzip: {}", e)))?;
    file.sync_all()?;
    Ok(file.metadata()?.len())
}

fn unpack_blocking(src: &Path, dest: &Path) -> Result<PathBuf> {
    std::fs::create_dir_all(dest)?;
    let file = File::open(src)?;
    let mut archive = tar::Archive::new(GzDecoder::new(file));
    archive
        .unpack(dest)
        .map_err(|e| ChronologyError::Archive(format!("untar {}: {}", src.display(), e)))?;
    Ok(dest.to_path_buf())
}
