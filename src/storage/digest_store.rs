//! Content-addressed file storage.
//!
//! Uploads are named after the SHA-256 digest of their bytes, so identical
//! content (with the same extension) is only ever written once.

use sha2::{Digest, Sha256};
use tempfile::NamedTempFile;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tracing::{debug, info};

const COPY_BUFFER_SIZE: usize = 64 * 1024;

/// Mode of stored files and renditions.
#[cfg(unix)]
pub(crate) const PUBLISHED_FILE_MODE: u32 = 0o644;

/// Errors that can occur while storing or resolving files.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Size mismatch: expected {expected} bytes, read {actual}")]
    SizeMismatch { expected: u64, actual: u64 },

    #[error("Storage unavailable at {path:?}: {reason}")]
    StorageUnavailable { path: PathBuf, reason: String },

    #[error("Invalid filename: {0}")]
    InvalidFilename(String),

    #[error("Stored file not found: {0}")]
    NotFound(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// A file placed in the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredFile {
    /// Name relative to the store root, `<digest>[.<ext>]`.
    pub filename: String,
    pub path: PathBuf,
    /// Lowercase hex SHA-256 of the content.
    pub digest: String,
    /// Name the content was uploaded with.
    pub original_name: String,
}

/// Content-addressed store rooted at a single directory.
#[derive(Debug, Clone)]
pub struct DigestStore {
    root: PathBuf,
}

impl DigestStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create the root directory if needed.
    pub async fn init(&self) -> Result<(), StoreError> {
        ensure_dir(&self.root).await
    }

    /// Stream `content` into the store.
    ///
    /// `size` must match the number of bytes `content` yields. The extension
    /// comes from `extension_hint` when given, otherwise from `suggested_name`.
    pub async fn store<R>(
        &self,
        suggested_name: &str,
        mut content: R,
        size: u64,
        extension_hint: Option<&str>,
    ) -> Result<StoredFile, StoreError>
    where
        R: AsyncRead + Unpin,
    {
        self.init().await?;

        let (file, temp_path) = published_tempfile(&self.root, ".upload-", "")?.into_parts();
        let mut file = fs::File::from_std(file);

        let mut hasher = Sha256::new();
        let mut buf = vec![0u8; COPY_BUFFER_SIZE];
        let mut read: u64 = 0;
        loop {
            let n = content.read(&mut buf).await?;
            if n == 0 {
                break;
            }
            read += n as u64;
            if read > size {
                return Err(StoreError::SizeMismatch {
                    expected: size,
                    actual: read,
                });
            }
            hasher.update(&buf[..n]);
            file.write_all(&buf[..n]).await?;
        }
        if read != size {
            return Err(StoreError::SizeMismatch {
                expected: size,
                actual: read,
            });
        }
        file.flush().await?;
        file.sync_all().await?;
        drop(file);

        let digest = format!("{:x}", hasher.finalize());
        let filename = match pick_extension(suggested_name, extension_hint) {
            Some(ext) => format!("{}.{}", digest, ext),
            None => digest.clone(),
        };
        let path = self.root.join(&filename);

        match temp_path.persist_noclobber(&path) {
            Ok(()) => info!("Stored {:?} as {} ({} bytes)", suggested_name, filename, size),
            Err(e) if e.error.kind() == std::io::ErrorKind::AlreadyExists => {
                debug!("{} already stored, discarding upload {:?}", filename, suggested_name);
            }
            Err(e) => return Err(e.error.into()),
        }

        Ok(StoredFile {
            filename,
            path,
            digest,
            original_name: suggested_name.to_string(),
        })
    }

    /// Path of a previously stored file.
    pub async fn resolve(&self, filename: &str) -> Result<PathBuf, StoreError> {
        validate_filename(filename)?;
        let path = self.root.join(filename);
        match fs::metadata(&path).await {
            Ok(metadata) if metadata.is_file() => Ok(path),
            Ok(_) => Err(StoreError::NotFound(filename.to_string())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StoreError::NotFound(filename.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }
}

/// Create `dir` if absent, failing if something else occupies the path.
pub(crate) async fn ensure_dir(dir: &Path) -> Result<(), StoreError> {
    let unavailable = |reason: String| StoreError::StorageUnavailable {
        path: dir.to_path_buf(),
        reason,
    };
    match fs::metadata(dir).await {
        Ok(metadata) if metadata.is_dir() => Ok(()),
        Ok(_) => Err(unavailable("not a directory".to_string())),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => fs::create_dir_all(dir)
            .await
            .map_err(|e| unavailable(e.to_string())),
        Err(e) => Err(unavailable(e.to_string())),
    }
}

/// Temp file in `dir` that is readable by everyone once persisted.
///
/// Stored files are served by whatever process fronts the store, which need
/// not run as the same user.
pub(crate) fn published_tempfile(
    dir: &Path,
    prefix: &str,
    suffix: &str,
) -> std::io::Result<NamedTempFile> {
    let file = tempfile::Builder::new()
        .prefix(prefix)
        .suffix(suffix)
        .tempfile_in(dir)?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        file.as_file()
            .set_permissions(std::fs::Permissions::from_mode(PUBLISHED_FILE_MODE))?;
    }
    Ok(file)
}

fn pick_extension(suggested_name: &str, extension_hint: Option<&str>) -> Option<String> {
    let hinted = extension_hint
        .map(|ext| ext.trim_start_matches('.'))
        .filter(|ext| !ext.is_empty());
    let ext = match hinted {
        Some(ext) => ext,
        None => Path::new(suggested_name).extension()?.to_str()?,
    };
    if ext.is_empty() || !ext.chars().all(|c| c.is_ascii_alphanumeric()) {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}

/// Stored names are single path components produced by [`DigestStore::store`].
fn validate_filename(filename: &str) -> Result<(), StoreError> {
    if filename.is_empty()
        || filename.starts_with('.')
        || filename.contains(['/', '\\', '\0'])
    {
        return Err(StoreError::InvalidFilename(filename.to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SHA256_HELLO: &str = "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824";

    fn list_dir(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    #[tokio::test]
    async fn test_store_names_file_after_digest() {
        let temp_dir = tempfile::tempdir().unwrap();
        let store = DigestStore::new(temp_dir.path());

        let stored = store.store("track.FLAC", &b"hello"[..], 5, None).await.unwrap();

        assert_eq!(stored.digest, SHA256_HELLO);
        assert_eq!(stored.filename, format!("{}.flac", SHA256_HELLO));
        assert_eq!(stored.original_name, "track.FLAC");
        assert_eq!(std::fs::read(&stored.path).unwrap(), b"hello");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_stored_files_are_world_readable() {
        use std::os::unix::fs::PermissionsExt;

        let temp_dir = tempfile::tempdir().unwrap();
        let store = DigestStore::new(temp_dir.path());

        let stored = store.store("a.mp3", &b"abc"[..], 3, None).await.unwrap();

        let mode = std::fs::metadata(&stored.path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, PUBLISHED_FILE_MODE);
    }

    #[tokio::test]
    async fn test_identical_content_is_stored_once() {
        let temp_dir = tempfile::tempdir().unwrap();
        let store = DigestStore::new(temp_dir.path());

        let first = store.store("a.mp3", &b"same bytes"[..], 10, None).await.unwrap();
        let second = store.store("b.mp3", &b"same bytes"[..], 10, None).await.unwrap();

        assert_eq!(first.filename, second.filename);
        assert_eq!(first.digest, second.digest);
        assert_eq!(list_dir(temp_dir.path()), vec![first.filename]);
    }

    #[tokio::test]
    async fn test_concurrent_identical_uploads() {
        let temp_dir = tempfile::tempdir().unwrap();
        let store = DigestStore::new(temp_dir.path());
        let content = vec![7u8; 300 * 1024];

        let (a, b) = tokio::join!(
            store.store("a.ogg", &content[..], content.len() as u64, None),
            store.store("b.ogg", &content[..], content.len() as u64, None),
        );

        let (a, b) = (a.unwrap(), b.unwrap());
        assert_eq!(a.path, b.path);
        assert_eq!(list_dir(temp_dir.path()), vec![a.filename.clone()]);
        assert_eq!(std::fs::read(&a.path).unwrap(), content);
    }

    #[tokio::test]
    async fn test_extension_hint_overrides_name() {
        let temp_dir = tempfile::tempdir().unwrap();
        let store = DigestStore::new(temp_dir.path());

        let stored = store.store("upload.bin", &b"hello"[..], 5, Some(".png")).await.unwrap();
        assert_eq!(stored.filename, format!("{}.png", SHA256_HELLO));

        let bare = store.store("no_extension", &b"hello"[..], 5, None).await.unwrap();
        assert_eq!(bare.filename, SHA256_HELLO);
    }

    #[tokio::test]
    async fn test_oversized_stream_is_rejected() {
        let temp_dir = tempfile::tempdir().unwrap();
        let store = DigestStore::new(temp_dir.path());

        let result = store.store("track.mp3", &b"hello!"[..], 5, None).await;

        assert!(matches!(
            result,
            Err(StoreError::SizeMismatch { expected: 5, .. })
        ));
        assert!(list_dir(temp_dir.path()).is_empty());
    }

    #[tokio::test]
    async fn test_short_stream_is_rejected() {
        let temp_dir = tempfile::tempdir().unwrap();
        let store = DigestStore::new(temp_dir.path());

        let result = store.store("track.mp3", &b"hell"[..], 5, None).await;

        assert!(matches!(
            result,
            Err(StoreError::SizeMismatch {
                expected: 5,
                actual: 4
            })
        ));
        assert!(list_dir(temp_dir.path()).is_empty());
    }

    #[tokio::test]
    async fn test_root_is_created() {
        let temp_dir = tempfile::tempdir().unwrap();
        let root = temp_dir.path().join("static").join("nested");
        let store = DigestStore::new(&root);

        store.store("a.mp3", &b"x"[..], 1, None).await.unwrap();
        assert!(root.is_dir());
    }

    #[tokio::test]
    async fn test_root_that_is_a_file_is_unavailable() {
        let temp_file = tempfile::NamedTempFile::new().unwrap();
        let store = DigestStore::new(temp_file.path());

        let result = store.store("a.mp3", &b"x"[..], 1, None).await;
        assert!(matches!(
            result,
            Err(StoreError::StorageUnavailable { .. })
        ));
    }

    #[tokio::test]
    async fn test_resolve() {
        let temp_dir = tempfile::tempdir().unwrap();
        let store = DigestStore::new(temp_dir.path());
        let stored = store.store("a.mp3", &b"x"[..], 1, None).await.unwrap();

        assert_eq!(store.resolve(&stored.filename).await.unwrap(), stored.path);
        assert!(matches!(
            store.resolve("missing.mp3").await,
            Err(StoreError::NotFound(_))
        ));
        assert!(matches!(
            store.resolve("../etc/passwd").await,
            Err(StoreError::InvalidFilename(_))
        ));
        assert!(matches!(
            store.resolve(".hidden").await,
            Err(StoreError::InvalidFilename(_))
        ));
    }

    #[test]
    fn test_pick_extension() {
        assert_eq!(pick_extension("a.Mp3", None), Some("mp3".to_string()));
        assert_eq!(pick_extension("a.mp3", Some("")), Some("mp3".to_string()));
        assert_eq!(pick_extension("a.mp3", Some("jpg")), Some("jpg".to_string()));
        assert_eq!(pick_extension("a", None), None);
        assert_eq!(pick_extension("a.m p3", None), None);
    }
}
