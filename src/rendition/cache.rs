//! Lazily built, never evicted bitrate-limited renditions.

use super::locks::{BuildLockScope, BuildLocks};
use crate::media::{MediaError, MediaToolkit};
use crate::storage::{ensure_dir, published_tempfile, StoreError};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tokio::fs;
use tracing::{debug, info, warn};

/// Container every rendition is encoded to.
pub const RENDITION_EXTENSION: &str = "mp3";

/// Errors that can occur while resolving a rendition.
#[derive(Debug, Error)]
pub enum RenditionError {
    #[error("Bitrate 0 selects the original file, not a rendition")]
    OriginalRequested,

    #[error("Invalid cache entry, {0:?} is not a regular file")]
    InvalidCacheEntry(PathBuf),

    #[error("Storage error: {0}")]
    Storage(#[from] StoreError),

    #[error("Media error: {0}")]
    Media(#[from] MediaError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// File name of the rendition of `source` at `bitrate`.
///
/// Depends on the source base name and the bitrate only.
pub fn rendition_file_name(source: &Path, bitrate: u64) -> Option<String> {
    let base = source.file_name()?.to_string_lossy();
    Some(format!("{}.{}.{}", base, bitrate, RENDITION_EXTENSION))
}

/// Cache of renditions stored in a single directory.
///
/// A file present at a rendition path is served as-is, its content is never
/// verified. Builds write to a temporary file and are renamed into place, so
/// only complete renditions ever appear at those paths.
pub struct RenditionCache {
    dir: PathBuf,
    toolkit: Arc<dyn MediaToolkit>,
    locks: BuildLocks,
}

impl RenditionCache {
    pub fn new(dir: impl Into<PathBuf>, toolkit: Arc<dyn MediaToolkit>, scope: BuildLockScope) -> Self {
        Self {
            dir: dir.into(),
            toolkit,
            locks: BuildLocks::new(scope),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn lock_scope(&self) -> BuildLockScope {
        self.locks.scope()
    }

    pub fn rendition_path(&self, source: &Path, bitrate: u64) -> Option<PathBuf> {
        rendition_file_name(source, bitrate).map(|name| self.dir.join(name))
    }

    /// Path of the rendition of `source` at `bitrate`, building it first if
    /// it does not exist yet.
    pub async fn get_or_build(&self, source: &Path, bitrate: u64) -> Result<PathBuf, RenditionError> {
        if bitrate == 0 {
            return Err(RenditionError::OriginalRequested);
        }
        let path = self
            .rendition_path(source, bitrate)
            .ok_or_else(|| MediaError::NotFound(source.to_path_buf()))?;

        ensure_dir(&self.dir).await?;

        if Self::cached(&path).await? {
            debug!("Serving cached rendition {:?}", path);
            return Ok(path);
        }

        self.build(source, &path, bitrate).await?;

        if Self::cached(&path).await? {
            Ok(path)
        } else {
            Err(MediaError::TranscodeFailed(format!("rendition {:?} missing after build", path)).into())
        }
    }

    async fn build(&self, source: &Path, path: &Path, bitrate: u64) -> Result<(), RenditionError> {
        let _guard = self.locks.acquire(path).await;

        if Self::cached(path).await? {
            debug!("Rendition {:?} was built while waiting for the lock", path);
            return Ok(());
        }

        info!("Building {} bps rendition of {:?}", bitrate, source);
        let started = Instant::now();

        let temp_path =
            published_tempfile(&self.dir, ".build-", &format!(".{}", RENDITION_EXTENSION))?
                .into_temp_path();

        self.toolkit.transcode(source, &temp_path, bitrate).await?;
        if fs::metadata(&temp_path).await?.len() == 0 {
            return Err(MediaError::TranscodeFailed(format!(
                "empty rendition of {:?} at {} bps",
                source, bitrate
            ))
            .into());
        }
        temp_path.persist(path).map_err(|e| e.error)?;

        info!(
            "Built rendition {:?} in {:.1}s",
            path,
            started.elapsed().as_secs_f64()
        );
        Ok(())
    }

    /// Whether a regular file sits at `path`. Anything else there is an
    /// invalid entry.
    async fn cached(path: &Path) -> Result<bool, RenditionError> {
        match fs::metadata(path).await {
            Ok(metadata) if metadata.is_file() => Ok(true),
            Ok(metadata) => {
                warn!(
                    "Non-regular file found at rendition path {:?} ({:?})",
                    path,
                    metadata.file_type()
                );
                Err(RenditionError::InvalidCacheEntry(path.to_path_buf()))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}
