//! Data passed in and out of ingestion.

use crate::media::{CoverAsset, ProbeResult};
use crate::storage::StoredFile;
use serde::{Deserialize, Serialize};

/// Song record fields produced by ingestion, persisted by the caller.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SongFields {
    /// Stored filename of the cover image.
    pub cover: Option<String>,
    /// Stored filename of the audio.
    pub filename: Option<String>,
    pub digest: Option<String>,
    pub mime: Option<String>,
    /// Raw ffprobe JSON.
    pub ffprobe_info: Option<String>,
}

impl SongFields {
    pub fn has_cover(&self) -> bool {
        self.cover.as_deref().is_some_and(|cover| !cover.is_empty())
    }
}

/// An uploaded audio payload.
pub struct Upload<R> {
    pub reader: R,
    /// Declared length of the payload in bytes.
    pub size: u64,
    pub suggested_name: String,
}

impl<R> Upload<R> {
    pub fn new(reader: R, size: u64, suggested_name: impl Into<String>) -> Self {
        Self {
            reader,
            size,
            suggested_name: suggested_name.into(),
        }
    }
}

/// A cover that was extracted during ingestion and stored.
#[derive(Debug, Clone)]
pub struct StoredCover {
    pub asset: CoverAsset,
    pub file: StoredFile,
}

/// Outcome of [`super::Ingestor::ingest`].
#[derive(Debug, Clone)]
pub struct Ingested {
    pub fields: SongFields,
    /// `None` when no audio payload was supplied.
    pub stored: Option<StoredFile>,
    pub probe: Option<ProbeResult>,
    pub cover: Option<StoredCover>,
}
