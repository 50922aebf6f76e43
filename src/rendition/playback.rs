//! Resolving which file to serve for a stored song.

use super::cache::{RenditionCache, RenditionError};
use crate::storage::DigestStore;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::debug;

/// Picks the original or a rendition of a stored file.
pub struct Playback {
    store: DigestStore,
    cache: Arc<RenditionCache>,
}

impl Playback {
    pub fn new(store: DigestStore, cache: Arc<RenditionCache>) -> Self {
        Self { store, cache }
    }

    /// File to serve for `filename` at `bitrate`; bitrate 0 is the original.
    pub async fn resolve(&self, filename: &str, bitrate: u64) -> Result<PathBuf, RenditionError> {
        let original = self.store.resolve(filename).await?;
        if bitrate == 0 {
            debug!("Serving original {:?}", original);
            return Ok(original);
        }
        self.cache.get_or_build(&original, bitrate).await
    }
}

/// `Content-Disposition` value offering `download_name` as an attachment.
pub fn content_disposition(download_name: &str) -> String {
    if download_name.is_ascii() {
        let escaped = download_name.replace('\\', "\\\\").replace('"', "\\\"");
        format!("attachment; filename=\"{}\"", escaped)
    } else {
        format!(
            "attachment; filename*=UTF-8''{}",
            urlencoding::encode(download_name)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ascii_disposition() {
        assert_eq!(
            content_disposition("My Song.mp3"),
            "attachment; filename=\"My Song.mp3\""
        );
        assert_eq!(
            content_disposition("say \"hi\".mp3"),
            "attachment; filename=\"say \\\"hi\\\".mp3\""
        );
    }

    #[test]
    fn test_non_ascii_disposition() {
        assert_eq!(
            content_disposition("café au lait.mp3"),
            "attachment; filename*=UTF-8''caf%C3%A9%20au%20lait.mp3"
        );
    }
}
