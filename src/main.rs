use std::path::{Path, PathBuf};
use std::sync::Arc;
use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use solara_video::cache::LocalCache;
use solara_video::core::{MetadataUpdate, TransferUpdate, UploadSession};
use solara_video::simulation::{simulate, SimulationInput};
use solara_video::utils::{format_bytes, format_eta, format_speed};
use solara_video::{
    Config,
    HttpVideoApi,
    UploadContext,
    UploadEvent,
    UploadQueue,
    VideoApi,
    VideoFile,
    VideoId,
    VideoUploadService,
};

#[derive(Parser, Debug)]
#[command(name = "solara-video")]
#[command(about = "Upload and manage training videos")]
#[command(version)]
struct Args {
    /// Configuration file
    #[arg(short, long, default_value = "config.toml", env = "SOLARA_VIDEO_CONFIG")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Upload a video and wait for processing
    Upload {
        file: PathBuf,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        description: Option<String>,
        /// Comma separated
        #[arg(long, value_delimiter = ',')]
        tags: Vec<String>,
        /// Write the chunked upload session here so it can be resumed
        #[arg(long)]
        session_file: Option<PathBuf>,
    },
    /// Resume an interrupted chunked upload
    Resume {
        file: PathBuf,
        #[arg(long)]
        session_file: PathBuf,
    },
    /// Show the processing status of a video
    Status { video_id: String },
    /// Delete a video
    Delete { video_id: String },
    /// Check the video API is reachable
    Health,
    /// List videos mirrored in the local cache
    Videos,
    /// Estimate photovoltaic generation from a TOML system description
    Simulate { input: Option<PathBuf> },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "solara_video=info".into()))
        .init();

    let args = Args::parse();

    if let Command::Simulate { input } = &args.command {
        return run_simulation(input.as_deref());
    }

    let config = if args.config.exists() {
        Config::load_config(&args.config).context("Failed to load configuration")?
    } else {
        info!("{} not found, using defaults", args.config.display());
        Config::default()
    };

    let api = Arc::new(HttpVideoApi::from_config(&config)?);
    let service = Arc::new(VideoUploadService::new(api, config.upload.clone())?);
    let cache = config.cache.dir.clone().map(LocalCache::new);

    match args.command {
        Command::Upload { file, title, description, tags, session_file } => {
            let update = MetadataUpdate {
                title,
                description,
                tags: (!tags.is_empty()).then_some(tags),
                ..Default::default()
            };
            upload(service, &config, cache, &file, update, session_file).await?;
        }
        Command::Resume { file, session_file } => {
            resume(&service, &file, &session_file).await?;
        }
        Command::Status { video_id } => {
            let status = service.api().processing_status(&VideoId::from(video_id.as_str())).await?;
            println!("{}", serde_json::to_string_pretty(&status)?);
        }
        Command::Delete { video_id } => {
            let video_id = VideoId::from(video_id.as_str());
            service.delete_video(&video_id).await?;
            if let Some(cache) = &cache {
                cache.remove_video(&video_id).await?;
            }
            println!("Deleted {}", video_id);
        }
        Command::Health => {
            service.health_check().await?;
            println!("OK");
        }
        Command::Videos => {
            let Some(cache) = &cache else {
                bail!("No cache directory configured");
            };
            for video in cache.videos().await? {
                println!("{}\t{}\t{:?}", video.id, video.title, video.status);
            }
        }
        Command::Simulate { .. } => {}
    }

    Ok(())
}

async fn upload(
    service: Arc<VideoUploadService<HttpVideoApi>>,
    config: &Config,
    cache: Option<LocalCache>,
    path: &Path,
    update: MetadataUpdate,
    session_file: Option<PathBuf>,
) -> Result<()> {
    let file = VideoFile::open(path).await?;
    let handle = UploadQueue::new(service, config.queue.clone(), cache)?;
    let queue = handle.queue.clone();
    let mut events = queue.subscribe();

    let outcome = queue.add_files(vec![file]).await?;
    if let Some(rejected) = outcome.rejected.first() {
        bail!("{} rejected: {}", rejected.name, rejected.message);
    }
    let Some(file_id) = outcome.added.first().copied() else {
        bail!("Nothing to upload");
    };

    queue.update_file_metadata(file_id, update).await?;
    queue.start_upload(Some(file_id)).await?;

    let result = loop {
        let event = tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                warn!("Interrupted, cancelling upload");
                queue.cancel_upload(file_id).await?;
                continue;
            }
            event = events.recv() => event,
        };

        match event {
            Ok(UploadEvent::SessionCreated { session, .. }) => {
                if let Some(path) = &session_file {
                    write_session(path, &session).await?;
                }
            }
            Ok(UploadEvent::Progress { progress, .. }) => {
                info!(
                    "{:.1}% {} / {} at {}, {} left",
                    progress.percentage,
                    format_bytes(progress.loaded),
                    format_bytes(progress.total),
                    format_speed(progress.speed),
                    format_eta(progress.eta)
                );
            }
            Ok(UploadEvent::StateChanged { new_status, .. }) => info!("Upload is {:?}", new_status),
            Ok(UploadEvent::Completed { video, .. }) => {
                println!("{}", serde_json::to_string_pretty(&video)?);
                break Ok(());
            }
            Ok(UploadEvent::Failed { error, .. }) => break Err(anyhow::anyhow!(error)),
            Ok(UploadEvent::Cancelled { .. }) => break Err(anyhow::anyhow!("Upload cancelled")),
            Ok(_) => {}
            Err(RecvError::Lagged(skipped)) => warn!("Skipped {} upload events", skipped),
            Err(RecvError::Closed) => break Err(anyhow::anyhow!("Upload queue stopped")),
        }
    };

    handle.shutdown().await?;
    if result.is_ok() {
        if let Some(path) = &session_file {
            let _ = tokio::fs::remove_file(path).await;
        }
    }
    result
}

async fn resume(service: &VideoUploadService<HttpVideoApi>, path: &Path, session_file: &Path) -> Result<()> {
    let data = tokio::fs::read_to_string(session_file)
        .await
        .with_context(|| format!("Failed to read {}", session_file.display()))?;
    let session: UploadSession = serde_json::from_str(&data)?;
    let file = VideoFile::open(path).await?;

    let cancel = CancellationToken::new();
    let ctx = UploadContext::new()
        .with_cancel(cancel.clone())
        .on_update(|update| {
            if let TransferUpdate::Progress(progress) = update {
                info!("{:.1}% {}", progress.percentage, format_speed(progress.speed));
            }
        });

    let upload = async {
        let result = service.resume_upload(&session, &file, &ctx).await?;
        service.wait_for_processing(&result.video_id, &cancel).await
    };

    let video = tokio::select! {
        video = upload => video?,
        _ = tokio::signal::ctrl_c() => {
            cancel.cancel();
            bail!("Interrupted");
        }
    };

    let _ = tokio::fs::remove_file(session_file).await;
    println!("{}", serde_json::to_string_pretty(&video)?);
    Ok(())
}

async fn write_session(path: &Path, session: &UploadSession) -> Result<()> {
    let data = serde_json::to_string_pretty(session)?;
    tokio::fs::write(path, data)
        .await
        .with_context(|| format!("Failed to write {}", path.display()))
}

fn run_simulation(input: Option<&Path>) -> Result<()> {
    let input = match input {
        Some(path) => {
            let data = std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
            toml::from_str(&data)?
        }
        None => SimulationInput::default(),
    };

    let result = simulate(&input)?;
    println!("{}", serde_json::to_string_pretty(&result)?);
    if !result.is_oversize_optimal() {
        warn!("Oversize {:.0}% is outside the ideal range", result.oversize);
    }
    if !result.is_generation_sufficient() {
        warn!("Estimated generation doesn't cover the required consumption");
    }
    Ok(())
}
