//! ffprobe document model.

use serde::{Deserialize, Deserializer};

/// Kind of a media stream as reported by ffprobe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CodecType {
    Audio,
    Video,
    Other(String),
}

impl<'de> Deserialize<'de> for CodecType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = String::deserialize(deserializer)?;
        Ok(match value.as_str() {
            "audio" => CodecType::Audio,
            "video" => CodecType::Video,
            _ => CodecType::Other(value),
        })
    }
}

impl Default for CodecType {
    fn default() -> Self {
        CodecType::Other(String::new())
    }
}

/// A single stream entry of the probe document.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct StreamInfo {
    pub index: u32,
    pub codec_name: String,
    pub codec_long_name: String,
    pub profile: String,
    pub codec_type: CodecType,
    pub codec_tag_string: String,
    pub nb_frames: Option<String>,
    pub width: u32,
    pub height: u32,
}

/// Container-level information of the probe document.
///
/// Numeric values are kept in ffprobe's textual form, use the accessors to
/// parse them.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct FormatInfo {
    pub filename: String,
    pub nb_streams: u32,
    pub format_name: String,
    pub format_long_name: String,
    pub start_time: Option<String>,
    pub duration: Option<String>,
    pub size: Option<String>,
    pub bit_rate: Option<String>,
    pub probe_score: u32,
    pub tags: Option<serde_json::Value>,
}

impl FormatInfo {
    /// Duration in seconds.
    pub fn duration_secs(&self) -> Option<f64> {
        self.duration.as_deref().and_then(|d| d.parse().ok())
    }

    /// Overall bit rate in bits per second.
    pub fn bit_rate(&self) -> Option<u64> {
        self.bit_rate.as_deref().and_then(|b| b.parse().ok())
    }

    /// Size in bytes.
    pub fn size(&self) -> Option<u64> {
        self.size.as_deref().and_then(|s| s.parse().ok())
    }
}

#[derive(Debug, Deserialize)]
struct ProbeDocument {
    #[serde(default)]
    streams: Vec<StreamInfo>,
    format: FormatInfo,
}

/// Parsed probe output, together with the raw JSON it came from.
#[derive(Debug, Clone)]
pub struct ProbeResult {
    pub streams: Vec<StreamInfo>,
    pub format: FormatInfo,
    pub raw_json: String,
}

impl ProbeResult {
    /// Parse an ffprobe `-print_format json -show_format -show_streams` document.
    pub fn parse(raw_json: impl Into<String>) -> Result<Self, serde_json::Error> {
        let raw_json = raw_json.into();
        let document: ProbeDocument = serde_json::from_str(&raw_json)?;
        Ok(Self {
            streams: document.streams,
            format: document.format,
            raw_json,
        })
    }

    /// First audio stream, if any.
    pub fn audio_stream(&self) -> Option<&StreamInfo> {
        self.streams
            .iter()
            .find(|s| s.codec_type == CodecType::Audio)
    }
}
