//! Ingestion of uploaded songs.
//!
//! An upload goes through these steps, stopping at the first failure:
//! 1. Content-addressed storage of the audio bytes
//! 2. MIME sniffing of the stored file
//! 3. ffprobe of the stored file
//! 4. Cover extraction, reusing the probe, unless the record already has one
//! 5. Content-addressed storage of the cover as `cover.<ext>`

use super::models::{Ingested, SongFields, StoredCover, Upload};
use crate::media::{extract_cover, CoverAsset, MediaError, MediaToolkit, ProbeResult};
use crate::storage::{DigestStore, StoreError, StoredFile};
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;
use tokio::fs;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tracing::{debug, info};

/// Bytes read from the head of a file for MIME sniffing.
const SNIFF_LEN: u64 = 8192;

/// Errors that can occur during ingestion.
#[derive(Debug, Error)]
pub enum IngestionError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Media error: {0}")]
    Media(#[from] MediaError),

    #[error("Incomplete upload: expected {expected} bytes, got {actual}")]
    IncompleteUpload { expected: u64, actual: u64 },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub struct Ingestor {
    store: DigestStore,
    toolkit: Arc<dyn MediaToolkit>,
}

impl Ingestor {
    pub fn new(store: DigestStore, toolkit: Arc<dyn MediaToolkit>) -> Self {
        Self { store, toolkit }
    }

    pub fn store(&self) -> &DigestStore {
        &self.store
    }

    /// Store `upload` and derive the song fields from it.
    ///
    /// Without an upload, or with an empty one, `fields` pass through as-is.
    /// An upload declared empty that still yields bytes is a size mismatch.
    pub async fn ingest<R>(
        &self,
        mut fields: SongFields,
        upload: Option<Upload<R>>,
    ) -> Result<Ingested, IngestionError>
    where
        R: AsyncRead + Unpin,
    {
        let passthrough = |fields: SongFields| Ingested {
            fields,
            stored: None,
            probe: None,
            cover: None,
        };
        let Some(mut upload) = upload else {
            debug!("No audio payload, keeping caller fields");
            return Ok(passthrough(fields));
        };
        if upload.size == 0 {
            // A declared-empty upload must really be empty
            let actual = tokio::io::copy(&mut upload.reader, &mut tokio::io::sink()).await?;
            if actual > 0 {
                return Err(StoreError::SizeMismatch {
                    expected: 0,
                    actual,
                }
                .into());
            }
            debug!("Empty audio payload, keeping caller fields");
            return Ok(passthrough(fields));
        }

        let stored = self
            .store
            .store(&upload.suggested_name, upload.reader, upload.size, None)
            .await?;
        fields.filename = Some(stored.filename.clone());
        fields.digest = Some(stored.digest.clone());

        fields.mime = sniff_mime(&stored.path).await?;

        let probe = self.toolkit.probe(&stored.path).await?;
        fields.ffprobe_info = Some(probe.raw_json.clone());

        let mut cover = None;
        if !fields.has_cover() {
            let extracted =
                extract_cover(self.toolkit.as_ref(), &stored.path, Some(&probe)).await?;
            if let Some(asset) = extracted {
                let file = self.store_cover(&asset).await?;
                fields.cover = Some(file.filename.clone());
                cover = Some(StoredCover { asset, file });
            }
        }

        info!(
            "Ingested {:?} as {} (mime: {:?}, cover: {:?})",
            upload.suggested_name, stored.filename, fields.mime, fields.cover
        );

        Ok(Ingested {
            fields,
            stored: Some(stored),
            probe: Some(probe),
            cover,
        })
    }

    async fn store_cover(&self, asset: &CoverAsset) -> Result<StoredFile, StoreError> {
        let name = format!("cover.{}", asset.extension());
        self.store
            .store(&name, &asset.bytes[..], asset.bytes.len() as u64, None)
            .await
    }

    /// Extract the cover of an uploaded file without storing anything.
    ///
    /// When `declared_len` is non-zero the stream must yield exactly that many bytes.
    pub async fn preview_cover<R>(
        &self,
        mut reader: R,
        declared_len: Option<u64>,
    ) -> Result<Option<CoverAsset>, IngestionError>
    where
        R: AsyncRead + Unpin,
    {
        let (file, temp_path) = tempfile::Builder::new()
            .prefix("song-")
            .tempfile()?
            .into_parts();
        let mut file = fs::File::from_std(file);
        let copied = tokio::io::copy(&mut reader, &mut file).await?;
        file.flush().await?;
        drop(file);

        if let Some(expected) = declared_len.filter(|len| *len > 0) {
            if copied != expected {
                return Err(IngestionError::IncompleteUpload {
                    expected,
                    actual: copied,
                });
            }
        }

        Ok(extract_cover(self.toolkit.as_ref(), &temp_path, None).await?)
    }

    /// Probe an uploaded stream without storing it.
    pub async fn probe_stream<R>(&self, mut reader: R) -> Result<ProbeResult, IngestionError>
    where
        R: AsyncRead + Send + Unpin,
    {
        Ok(self.toolkit.probe_reader(&mut reader).await?)
    }
}

async fn sniff_mime(path: &Path) -> Result<Option<String>, std::io::Error> {
    let file = fs::File::open(path).await?;
    let mut head = Vec::with_capacity(SNIFF_LEN as usize);
    file.take(SNIFF_LEN).read_to_end(&mut head).await?;
    Ok(infer::get(&head).map(|kind| kind.mime_type().to_string()))
}
