//! The media toolkit capability used by the rest of the crate.

use super::probe::ProbeResult;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};

/// Errors that can occur while probing or encoding media.
#[derive(Debug, Error)]
pub enum MediaError {
    #[error("Media file not found: {0}")]
    NotFound(PathBuf),

    #[error("ffprobe failed: {0}")]
    ProbeFailed(String),

    #[error("Cover extraction failed: {0}")]
    ExtractionFailed(String),

    #[error("Transcode failed: {0}")]
    TranscodeFailed(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Probing and encoding operations backed by an external tool.
///
/// The production implementation shells out to ffprobe/ffmpeg
/// (see [`super::Ffmpeg`]); tests substitute their own.
#[async_trait]
pub trait MediaToolkit: Send + Sync {
    /// Probe a file on disk.
    async fn probe(&self, path: &Path) -> Result<ProbeResult, MediaError>;

    /// Probe a stream, feeding it to the prober as it is read.
    async fn probe_reader(
        &self,
        reader: &mut (dyn AsyncRead + Send + Unpin),
    ) -> Result<ProbeResult, MediaError>;

    /// Probe an in-memory byte stream.
    async fn probe_bytes(&self, data: &[u8]) -> Result<ProbeResult, MediaError> {
        let mut reader = data;
        self.probe_reader(&mut reader).await
    }

    /// Re-encode `input` into `output` at `bitrate` bits per second, keeping
    /// audio streams only and dropping metadata tags.
    async fn transcode(&self, input: &Path, output: &Path, bitrate: u64)
        -> Result<(), MediaError>;

    /// Extract a single frame of stream `stream_index` as an encoded image.
    async fn extract_frame(&self, input: &Path, stream_index: u32) -> Result<Vec<u8>, MediaError>;

    /// Encode `input` to MP3, writing the encoded stream into `writer`.
    async fn convert_to_mp3(
        &self,
        input: &Path,
        writer: &mut (dyn AsyncWrite + Send + Unpin),
    ) -> Result<u64, MediaError>;
}

/// Fails with [`MediaError::NotFound`] unless `path` is an existing non-directory.
pub(crate) async fn ensure_media_file(path: &Path) -> Result<(), MediaError> {
    match tokio::fs::metadata(path).await {
        Ok(metadata) if !metadata.is_dir() => Ok(()),
        Ok(_) => Err(MediaError::NotFound(path.to_path_buf())),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            Err(MediaError::NotFound(path.to_path_buf()))
        }
        Err(e) => Err(e.into()),
    }
}
