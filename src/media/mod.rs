//! Media probing and encoding.
//!
//! Everything that talks to ffprobe/ffmpeg goes through the [`MediaToolkit`]
//! trait so that callers can swap the external tools for a test double.

mod cover;
mod ffmpeg;
mod probe;
mod toolkit;

pub use cover::{
    extension_for_codec, extract_cover, find_cover_stream, CoverAsset, FALLBACK_IMAGE_EXTENSION,
    IMAGE_CODECS,
};
pub use ffmpeg::Ffmpeg;
pub use probe::{CodecType, FormatInfo, ProbeResult, StreamInfo};
pub use toolkit::{MediaError, MediaToolkit};
