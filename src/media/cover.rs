//! Embedded cover art detection and extraction.

use super::probe::{CodecType, ProbeResult, StreamInfo};
use super::toolkit::{MediaError, MediaToolkit};
use std::path::Path;
use tracing::debug;

/// Codec names recognised as still images.
pub const IMAGE_CODECS: &[&str] = &["png", "mjpeg", "jpeg", "jpg", "bmp", "gif", "tiff", "webp"];

/// Extension used for codecs missing from [`extension_for_codec`]'s table.
pub const FALLBACK_IMAGE_EXTENSION: &str = "jpg";

/// File extension (without the dot) to persist an image of `codec` with.
pub fn extension_for_codec(codec: &str) -> &'static str {
    match codec {
        "png" => "png",
        "bmp" => "bmp",
        "gif" => "gif",
        "tiff" => "tiff",
        "webp" => "webp",
        _ => FALLBACK_IMAGE_EXTENSION,
    }
}

/// An embedded cover image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoverAsset {
    pub bytes: Vec<u8>,
    pub codec_name: String,
}

impl CoverAsset {
    pub fn extension(&self) -> &'static str {
        extension_for_codec(&self.codec_name)
    }

    /// MIME type for serving the image.
    pub fn content_type(&self) -> String {
        format!("image/{}", self.extension())
    }
}

/// First video stream carrying a recognised image codec.
pub fn find_cover_stream(probe: &ProbeResult) -> Option<&StreamInfo> {
    probe.streams.iter().find(|stream| {
        stream.codec_type == CodecType::Video && IMAGE_CODECS.contains(&stream.codec_name.as_str())
    })
}

/// Extract the embedded cover of `path`.
///
/// Pass the probe result when it is already known to avoid probing twice.
/// A file without a cover yields `Ok(None)`.
pub async fn extract_cover(
    toolkit: &dyn MediaToolkit,
    path: &Path,
    probe: Option<&ProbeResult>,
) -> Result<Option<CoverAsset>, MediaError> {
    let probed;
    let probe = match probe {
        Some(probe) => probe,
        None => {
            probed = toolkit.probe(path).await?;
            &probed
        }
    };

    let Some(stream) = find_cover_stream(probe) else {
        debug!("No cover stream in {:?}", path);
        return Ok(None);
    };

    let bytes = toolkit
        .extract_frame(path, stream.index)
        .await
        .map_err(|e| match e {
            MediaError::ExtractionFailed(_) | MediaError::NotFound(_) => e,
            other => MediaError::ExtractionFailed(other.to_string()),
        })?;

    debug!(
        "Extracted {} byte {} cover from stream {} of {:?}",
        bytes.len(),
        stream.codec_name,
        stream.index,
        path
    );

    Ok(Some(CoverAsset {
        bytes,
        codec_name: stream.codec_name.clone(),
    }))
}
