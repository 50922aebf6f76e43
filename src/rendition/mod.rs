//! On-demand bitrate-limited renditions of stored audio.

mod cache;
mod locks;
mod playback;

pub use cache::{rendition_file_name, RenditionCache, RenditionError, RENDITION_EXTENSION};
pub use locks::{BuildLockScope, BuildLocks};
pub use playback::{content_disposition, Playback};
