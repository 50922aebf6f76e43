//! tunevault library
//!
//! Content-addressed song storage with probing, cover extraction and a
//! lazily built cache of bitrate-limited renditions.

pub mod config;
pub mod ingestion;
pub mod media;
pub mod rendition;
pub mod storage;

// Re-export commonly used types for convenience
pub use ingestion::{Ingested, IngestionError, Ingestor, SongFields, Upload};
pub use media::{CoverAsset, Ffmpeg, MediaError, MediaToolkit, ProbeResult};
pub use rendition::{BuildLockScope, Playback, RenditionCache, RenditionError};
pub use storage::{DigestStore, StoreError, StoredFile};
