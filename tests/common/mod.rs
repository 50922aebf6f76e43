//! Common test infrastructure
//!
//! [`FakeToolkit`] stands in for ffmpeg/ffprobe and counts how often each
//! operation runs, so tests can assert on external tool invocations.

#![allow(dead_code)]

use async_trait::async_trait;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tunevault::media::{MediaError, MediaToolkit, ProbeResult};

/// Three minute FLAC with an embedded PNG front cover.
pub const FLAC_WITH_PNG_COVER: &str = r#"{
    "streams": [
        {"index": 0, "codec_name": "flac", "codec_type": "audio"},
        {"index": 1, "codec_name": "png", "codec_type": "video", "width": 500, "height": 500}
    ],
    "format": {"filename": "track.flac", "nb_streams": 2, "format_name": "flac", "duration": "180.000000", "bit_rate": "900000"}
}"#;

/// MP3 without any picture stream.
pub const MP3_WITHOUT_COVER: &str = r#"{
    "streams": [{"index": 0, "codec_name": "mp3", "codec_type": "audio"}],
    "format": {"filename": "track.mp3", "nb_streams": 1, "format_name": "mp3", "duration": "95.5"}
}"#;

/// Bytes returned as the extracted cover frame.
pub const FAKE_COVER: &[u8] = b"\x89PNG\r\n\x1a\nfake cover";

/// Bytes starting with the FLAC magic, enough for MIME sniffing.
pub fn flac_bytes(tag: &str) -> Vec<u8> {
    let mut bytes = b"fLaC\x00\x00\x00\x22".to_vec();
    bytes.extend_from_slice(tag.as_bytes());
    bytes
}

#[derive(Default)]
pub struct FakeToolkit {
    probe_json: String,
    fail_probe: bool,
    fail_extraction: bool,
    fail_transcode: AtomicUsize,
    transcode_delay: Duration,

    pub probes: AtomicUsize,
    pub probed_bytes: AtomicUsize,
    pub extractions: AtomicUsize,
    pub transcodes: AtomicUsize,
    in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
}

impl FakeToolkit {
    pub fn new(probe_json: &str) -> Self {
        Self {
            probe_json: probe_json.to_string(),
            ..Default::default()
        }
    }

    pub fn with_transcode_delay(mut self, delay: Duration) -> Self {
        self.transcode_delay = delay;
        self
    }

    pub fn failing_probe(mut self) -> Self {
        self.fail_probe = true;
        self
    }

    pub fn failing_extraction(mut self) -> Self {
        self.fail_extraction = true;
        self
    }

    /// Make the next `count` transcodes fail.
    pub fn failing_transcodes(self, count: usize) -> Self {
        self.fail_transcode.store(count, Ordering::SeqCst);
        self
    }

    pub fn count(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }

    fn parse(&self) -> Result<ProbeResult, MediaError> {
        if self.fail_probe {
            return Err(MediaError::ProbeFailed("Invalid data found when processing input".to_string()));
        }
        ProbeResult::parse(self.probe_json.clone())
            .map_err(|e| MediaError::ProbeFailed(e.to_string()))
    }

    async fn require_file(path: &Path) -> Result<(), MediaError> {
        match tokio::fs::metadata(path).await {
            Ok(metadata) if metadata.is_file() => Ok(()),
            _ => Err(MediaError::NotFound(path.to_path_buf())),
        }
    }
}

#[async_trait]
impl MediaToolkit for FakeToolkit {
    async fn probe(&self, path: &Path) -> Result<ProbeResult, MediaError> {
        Self::require_file(path).await?;
        self.probes.fetch_add(1, Ordering::SeqCst);
        self.parse()
    }

    async fn probe_reader(
        &self,
        reader: &mut (dyn AsyncRead + Send + Unpin),
    ) -> Result<ProbeResult, MediaError> {
        self.probes.fetch_add(1, Ordering::SeqCst);
        let fed = tokio::io::copy(reader, &mut tokio::io::sink()).await?;
        self.probed_bytes.fetch_add(fed as usize, Ordering::SeqCst);
        self.parse()
    }

    async fn transcode(&self, input: &Path, output: &Path, bitrate: u64) -> Result<(), MediaError> {
        Self::require_file(input).await?;
        self.transcodes.fetch_add(1, Ordering::SeqCst);

        let in_flight = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(in_flight, Ordering::SeqCst);
        tokio::time::sleep(self.transcode_delay).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        let should_fail = self
            .fail_transcode
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if should_fail {
            tokio::fs::write(output, b"partial").await?;
            return Err(MediaError::TranscodeFailed("Conversion failed!".to_string()));
        }

        let mut rendition = format!("rendition@{}:", bitrate).into_bytes();
        rendition.extend(tokio::fs::read(input).await?);
        tokio::fs::write(output, rendition).await?;
        Ok(())
    }

    async fn extract_frame(&self, input: &Path, _stream_index: u32) -> Result<Vec<u8>, MediaError> {
        Self::require_file(input).await?;
        self.extractions.fetch_add(1, Ordering::SeqCst);
        if self.fail_extraction {
            return Err(MediaError::ExtractionFailed("Output file is empty".to_string()));
        }
        Ok(FAKE_COVER.to_vec())
    }

    async fn convert_to_mp3(
        &self,
        input: &Path,
        writer: &mut (dyn AsyncWrite + Send + Unpin),
    ) -> Result<u64, MediaError> {
        let content = tokio::fs::read(input).await?;
        writer.write_all(&content).await?;
        Ok(content.len() as u64)
    }
}

/// Names of the entries of `dir`, sorted.
pub fn list_dir(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}
