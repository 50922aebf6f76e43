use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, level_filters::LevelFilter};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use tunevault::config::{self, AppConfig, FileConfig};
use tunevault::ingestion::{Ingestor, SongFields, Upload};
use tunevault::media::{extract_cover, MediaToolkit};
use tunevault::rendition::{content_disposition, BuildLockScope, Playback, RenditionCache};
use tunevault::storage::DigestStore;

fn parse_path(s: &str) -> Result<PathBuf, String> {
    let path_buf = PathBuf::from(s);
    let original_path = match path_buf.canonicalize() {
        Ok(path) => path,
        Err(msg) => {
            if msg.kind() == std::io::ErrorKind::NotFound {
                path_buf
            } else {
                return Err(format!("Error resolving path '{}': {}", s, msg));
            }
        }
    };
    if original_path.is_absolute() {
        return Ok(original_path);
    }
    let cwd = std::env::current_dir().map_err(|e| format!("Failed to get current dir: {}", e))?;
    Ok(cwd.join(original_path))
}

#[derive(Parser, Debug)]
#[command(version = env!("TUNEVAULT_VERSION"))]
struct CliArgs {
    /// Path to TOML configuration file. Values in the file override CLI arguments.
    #[clap(long, value_parser = parse_path)]
    pub config: Option<PathBuf>,

    /// Directory holding the content-addressed files.
    /// Can also be specified in config file.
    #[clap(long, value_parser = parse_path)]
    pub storage_root: Option<PathBuf>,

    /// Name of the renditions directory inside the storage root.
    #[clap(long, default_value = config::DEFAULT_RENDITION_DIR)]
    pub rendition_dir: String,

    /// How rendition builds are serialised.
    #[clap(long, value_enum, default_value = "global")]
    pub build_lock: BuildLockScope,

    #[clap(long, default_value = "ffmpeg")]
    pub ffmpeg_path: String,

    #[clap(long, default_value = "ffprobe")]
    pub ffprobe_path: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Stores an audio file, probes it and extracts its cover.
    /// Prints the resulting song fields as JSON.
    Ingest {
        #[clap(value_parser = parse_path)]
        file: PathBuf,

        /// Name to store the upload under, defaults to the file name.
        #[clap(long)]
        name: Option<String>,

        /// Stored filename of an already known cover, skips extraction.
        #[clap(long)]
        cover: Option<String>,
    },

    /// Prints the ffprobe JSON of a file.
    Probe {
        #[clap(value_parser = parse_path)]
        file: PathBuf,

        /// Feed the file to ffprobe through a pipe instead of by path.
        #[clap(long)]
        stream: bool,
    },

    /// Extracts the embedded cover of a file.
    Cover {
        #[clap(value_parser = parse_path)]
        file: PathBuf,

        /// Where to write the image, defaults to `<file>.<ext>`.
        #[clap(long, value_parser = parse_path)]
        out: Option<PathBuf>,
    },

    /// Prints the path to serve for a stored file, building the rendition if needed.
    Render {
        filename: String,

        /// Target bitrate in bits per second, 0 selects the original file.
        #[clap(long, default_value_t = 0)]
        bitrate: u64,

        /// Also print the Content-Disposition header for this download name.
        #[clap(long)]
        download: Option<String>,
    },

    /// Encodes a file to MP3.
    Convert {
        #[clap(value_parser = parse_path)]
        input: PathBuf,

        #[clap(value_parser = parse_path)]
        output: PathBuf,
    },

    /// Checks that ffmpeg and ffprobe can be run.
    Check,
}

/// Convert CLI args to CliConfig for config resolution
impl From<&CliArgs> for config::CliConfig {
    fn from(args: &CliArgs) -> Self {
        config::CliConfig {
            storage_root: args.storage_root.clone(),
            rendition_dir: args.rendition_dir.clone(),
            build_lock: args.build_lock,
            ffmpeg_path: args.ffmpeg_path.clone(),
            ffprobe_path: args.ffprobe_path.clone(),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli_args = CliArgs::parse();

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .with_env_var("LOG_LEVEL")
                .from_env_lossy(),
        )
        .try_init()
        .context("Failed to initialize logging")?;

    info!("tunevault {}", env!("TUNEVAULT_VERSION"));

    let file_config = match &cli_args.config {
        Some(path) => {
            info!("Loading config from {:?}", path);
            Some(FileConfig::load(path)?)
        }
        None => None,
    };
    let app_config = AppConfig::resolve(&config::CliConfig::from(&cli_args), file_config)?;

    let ffmpeg = app_config.ffmpeg();
    let toolkit: Arc<dyn MediaToolkit> = Arc::new(ffmpeg.clone());
    let store = DigestStore::new(&app_config.storage_root);

    match cli_args.command {
        Command::Ingest { file, name, cover } => {
            let suggested_name = match name {
                Some(name) => name,
                None => file
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default(),
            };
            let reader = tokio::fs::File::open(&file)
                .await
                .with_context(|| format!("Failed to open {:?}", file))?;
            let size = reader.metadata().await?.len();

            let ingestor = Ingestor::new(store, toolkit);
            let fields = SongFields {
                cover,
                ..Default::default()
            };
            let ingested = ingestor
                .ingest(fields, Some(Upload::new(reader, size, suggested_name)))
                .await?;
            println!("{}", serde_json::to_string_pretty(&ingested.fields)?);
        }
        Command::Probe { file, stream } => {
            let probe = if stream {
                let reader = tokio::fs::File::open(&file)
                    .await
                    .with_context(|| format!("Failed to open {:?}", file))?;
                Ingestor::new(store, toolkit).probe_stream(reader).await?
            } else {
                toolkit.probe(&file).await?
            };
            println!("{}", probe.raw_json);
        }
        Command::Cover { file, out } => match extract_cover(toolkit.as_ref(), &file, None).await? {
            Some(cover) => {
                let out = out.unwrap_or_else(|| {
                    let mut name = file.clone().into_os_string();
                    name.push(format!(".{}", cover.extension()));
                    PathBuf::from(name)
                });
                tokio::fs::write(&out, &cover.bytes)
                    .await
                    .with_context(|| format!("Failed to write {:?}", out))?;
                println!("{} ({})", out.display(), cover.content_type());
            }
            None => println!("No cover found in {}", file.display()),
        },
        Command::Render {
            filename,
            bitrate,
            download,
        } => {
            let cache = RenditionCache::new(
                app_config.rendition_path(),
                toolkit,
                app_config.build_lock,
            );
            let playback = Playback::new(store, Arc::new(cache));
            let path = playback.resolve(&filename, bitrate).await?;
            println!("{}", path.display());
            if let Some(download) = download {
                println!("Content-Disposition: {}", content_disposition(&download));
            }
        }
        Command::Convert { input, output } => {
            let mut writer = tokio::fs::File::create(&output)
                .await
                .with_context(|| format!("Failed to create {:?}", output))?;
            let written = toolkit.convert_to_mp3(&input, &mut writer).await?;
            info!("Wrote {} bytes to {:?}", written, output);
        }
        Command::Check => {
            ffmpeg.check_available().await?;
            println!("ffmpeg and ffprobe are available");
        }
    }

    Ok(())
}
