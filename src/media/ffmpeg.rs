//! [`MediaToolkit`] backed by the ffmpeg/ffprobe command line tools.

use super::probe::ProbeResult;
use super::toolkit::{ensure_media_file, MediaError, MediaToolkit};
use async_trait::async_trait;
use std::path::Path;
use std::process::{Output, Stdio};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::process::Command;
use tracing::debug;

/// Shells out to ffmpeg/ffprobe found at the configured paths.
#[derive(Debug, Clone)]
pub struct Ffmpeg {
    ffmpeg_path: String,
    ffprobe_path: String,
}

impl Default for Ffmpeg {
    fn default() -> Self {
        Self::new("ffmpeg", "ffprobe")
    }
}

impl Ffmpeg {
    pub fn new(ffmpeg_path: impl Into<String>, ffprobe_path: impl Into<String>) -> Self {
        Self {
            ffmpeg_path: ffmpeg_path.into(),
            ffprobe_path: ffprobe_path.into(),
        }
    }

    /// Check if ffmpeg and ffprobe are available.
    pub async fn check_available(&self) -> Result<(), MediaError> {
        if !Self::runs(&self.ffprobe_path).await {
            return Err(MediaError::ProbeFailed(format!(
                "{} not found or not working",
                self.ffprobe_path
            )));
        }
        if !Self::runs(&self.ffmpeg_path).await {
            return Err(MediaError::TranscodeFailed(format!(
                "{} not found or not working",
                self.ffmpeg_path
            )));
        }
        Ok(())
    }

    async fn runs(program: &str) -> bool {
        Command::new(program)
            .arg("-version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .map(|status| status.success())
            .unwrap_or(false)
    }

    fn probe_command(&self) -> Command {
        let mut command = Command::new(&self.ffprobe_path);
        command.args([
            "-v",
            "error",
            "-print_format",
            "json",
            "-show_format",
            "-show_streams",
        ]);
        command
    }

    fn parse_probe_output(output: Output) -> Result<ProbeResult, MediaError> {
        if !output.status.success() {
            return Err(MediaError::ProbeFailed(combined_output(&output)));
        }
        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        debug!("ffprobe output: {}", stdout);
        ProbeResult::parse(stdout)
            .map_err(|e| MediaError::ProbeFailed(format!("JSON parse error: {}", e)))
    }
}

/// Stdout and stderr joined, for attaching to errors.
fn combined_output(output: &Output) -> String {
    let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
    text.push_str(&String::from_utf8_lossy(&output.stderr));
    format!("{} ({})", text.trim(), output.status)
}

#[async_trait]
impl MediaToolkit for Ffmpeg {
    async fn probe(&self, path: &Path) -> Result<ProbeResult, MediaError> {
        ensure_media_file(path).await?;

        let output = self
            .probe_command()
            .arg(path)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await?;

        Self::parse_probe_output(output)
    }

    async fn probe_reader(
        &self,
        reader: &mut (dyn AsyncRead + Send + Unpin),
    ) -> Result<ProbeResult, MediaError> {
        let mut child = self
            .probe_command()
            .arg("pipe:0")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| MediaError::ProbeFailed("ffprobe stdin unavailable".to_string()))?;
        let feed = async move {
            // ffprobe may stop reading as soon as it has seen enough, so a
            // broken pipe here is expected.
            let fed = tokio::io::copy(reader, &mut stdin).await;
            drop(stdin);
            match fed {
                Ok(bytes) => debug!("Fed {} bytes to ffprobe", bytes),
                Err(e) => debug!("ffprobe stopped reading its input: {}", e),
            }
        };

        let ((), output) = tokio::join!(feed, child.wait_with_output());

        Self::parse_probe_output(output?)
    }

    async fn transcode(
        &self,
        input: &Path,
        output_path: &Path,
        bitrate: u64,
    ) -> Result<(), MediaError> {
        ensure_media_file(input).await?;

        let output = Command::new(&self.ffmpeg_path)
            .args(["-y", "-v", "error", "-i"])
            .arg(input)
            .args(["-map", "a", "-map_metadata", "-1", "-b:a"])
            .arg(bitrate.to_string())
            .args(["-f", "mp3"])
            .arg(output_path)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await?;

        debug!("ffmpeg transcode output: {}", combined_output(&output));
        if !output.status.success() {
            return Err(MediaError::TranscodeFailed(combined_output(&output)));
        }

        let written = tokio::fs::metadata(output_path).await?.len();
        if written == 0 {
            return Err(MediaError::TranscodeFailed(format!(
                "ffmpeg produced an empty file: {}",
                combined_output(&output)
            )));
        }

        Ok(())
    }

    async fn extract_frame(&self, input: &Path, stream_index: u32) -> Result<Vec<u8>, MediaError> {
        ensure_media_file(input).await?;

        let output = Command::new(&self.ffmpeg_path)
            .args(["-v", "error", "-i"])
            .arg(input)
            .arg("-map")
            .arg(format!("0:{}", stream_index))
            .args(["-frames:v", "1", "-c:v", "copy", "-f", "image2pipe", "-"])
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(MediaError::ExtractionFailed(format!(
                "{} ({})",
                stderr.trim(),
                output.status
            )));
        }
        if output.stdout.is_empty() {
            return Err(MediaError::ExtractionFailed(format!(
                "no frame produced for stream {}",
                stream_index
            )));
        }

        Ok(output.stdout)
    }

    async fn convert_to_mp3(
        &self,
        input: &Path,
        writer: &mut (dyn AsyncWrite + Send + Unpin),
    ) -> Result<u64, MediaError> {
        ensure_media_file(input).await?;

        let mut child = Command::new(&self.ffmpeg_path)
            .args(["-hide_banner", "-loglevel", "error", "-i"])
            .arg(input)
            .args(["-map", "0:a", "-c:a", "mp3", "-f", "mp3", "-"])
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;

        let mut stdout = child
            .stdout
            .take()
            .ok_or_else(|| MediaError::TranscodeFailed("ffmpeg stdout unavailable".to_string()))?;
        let mut stderr = child
            .stderr
            .take()
            .ok_or_else(|| MediaError::TranscodeFailed("ffmpeg stderr unavailable".to_string()))?;
        let diagnostics = tokio::spawn(async move {
            let mut buf = Vec::new();
            let _ = stderr.read_to_end(&mut buf).await;
            buf
        });

        let copied = tokio::io::copy(&mut stdout, &mut *writer).await?;
        writer.flush().await?;

        let status = child.wait().await?;
        let diagnostics = diagnostics.await.unwrap_or_default();
        let diagnostics = String::from_utf8_lossy(&diagnostics);
        debug!("ffmpeg mp3 conversion output: {}", diagnostics);

        if !status.success() {
            return Err(MediaError::TranscodeFailed(format!(
                "{} ({})",
                diagnostics.trim(),
                status
            )));
        }

        Ok(copied)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_probe_missing_file_is_not_found() {
        let ffmpeg = Ffmpeg::default();
        let result = ffmpeg.probe(Path::new("/nonexistent/track.flac")).await;
        assert!(matches!(result, Err(MediaError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_probe_directory_is_not_found() {
        let temp_dir = tempfile::tempdir().unwrap();
        let ffmpeg = Ffmpeg::default();
        let result = ffmpeg.probe(temp_dir.path()).await;
        assert!(matches!(result, Err(MediaError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_missing_binaries_are_reported() {
        let ffmpeg = Ffmpeg::new("/nonexistent/ffmpeg", "/nonexistent/ffprobe");
        assert!(matches!(
            ffmpeg.check_available().await,
            Err(MediaError::ProbeFailed(_))
        ));
    }
}
