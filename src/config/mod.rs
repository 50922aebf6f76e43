mod file_config;

pub use file_config::{FfmpegConfig, FileConfig};

use crate::media::Ffmpeg;
use crate::rendition::BuildLockScope;
use anyhow::{bail, Result};
use clap::ValueEnum;
use std::path::{Path, PathBuf};

/// Default name of the renditions directory under the storage root.
pub const DEFAULT_RENDITION_DIR: &str = "compressed";

/// CLI arguments that can be used for config resolution.
/// This struct mirrors the CLI arguments that can be overridden by TOML config.
#[derive(Debug, Clone)]
pub struct CliConfig {
    pub storage_root: Option<PathBuf>,
    pub rendition_dir: String,
    pub build_lock: BuildLockScope,
    pub ffmpeg_path: String,
    pub ffprobe_path: String,
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            storage_root: None,
            rendition_dir: DEFAULT_RENDITION_DIR.to_string(),
            build_lock: BuildLockScope::default(),
            ffmpeg_path: "ffmpeg".to_string(),
            ffprobe_path: "ffprobe".to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub storage_root: PathBuf,
    pub rendition_dir: String,
    pub build_lock: BuildLockScope,
    pub ffmpeg_path: String,
    pub ffprobe_path: String,
}

impl AppConfig {
    /// Resolve configuration from CLI arguments and optional TOML file config.
    /// TOML values override CLI values where present.
    pub fn resolve(cli: &CliConfig, file_config: Option<FileConfig>) -> Result<Self> {
        let file = file_config.unwrap_or_default();

        let storage_root = file
            .storage_root
            .map(PathBuf::from)
            .or_else(|| cli.storage_root.clone())
            .ok_or_else(|| {
                anyhow::anyhow!(
                    "storage_root must be specified via --storage-root or in config file"
                )
            })?;

        // The store creates a missing root, but cannot use a file in its place
        if storage_root.exists() && !storage_root.is_dir() {
            bail!("storage_root is not a directory: {:?}", storage_root);
        }

        let rendition_dir = file
            .rendition_dir
            .unwrap_or_else(|| cli.rendition_dir.clone());
        if !is_single_component(&rendition_dir) {
            bail!(
                "rendition_dir must be a plain directory name: {:?}",
                rendition_dir
            );
        }

        let build_lock = match file.build_lock {
            Some(s) => match parse_build_lock(&s) {
                Some(scope) => scope,
                None => bail!("Unknown build_lock {:?}, expected global or per-key", s),
            },
            None => cli.build_lock,
        };

        let ffmpeg_file = file.ffmpeg.unwrap_or_default();
        let ffmpeg_path = ffmpeg_file
            .ffmpeg_path
            .unwrap_or_else(|| cli.ffmpeg_path.clone());
        let ffprobe_path = ffmpeg_file
            .ffprobe_path
            .unwrap_or_else(|| cli.ffprobe_path.clone());

        Ok(Self {
            storage_root,
            rendition_dir,
            build_lock,
            ffmpeg_path,
            ffprobe_path,
        })
    }

    pub fn rendition_path(&self) -> PathBuf {
        self.storage_root.join(&self.rendition_dir)
    }

    pub fn ffmpeg(&self) -> Ffmpeg {
        Ffmpeg::new(&self.ffmpeg_path, &self.ffprobe_path)
    }
}

fn is_single_component(name: &str) -> bool {
    let mut components = Path::new(name).components();
    matches!(
        (components.next(), components.next()),
        (Some(std::path::Component::Normal(_)), None)
    )
}

/// Parses a build lock scope string into BuildLockScope.
/// Uses clap's ValueEnum trait for parsing.
fn parse_build_lock(s: &str) -> Option<BuildLockScope> {
    BuildLockScope::from_str(&s.replace('_', "-"), true).ok()
}
