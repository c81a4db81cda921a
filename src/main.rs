//! Fiddlehead - personal music site.
//!
//! One binary serves the website and manages its S3-backed assets:
//! - `serve`: HTTP server with snapshot-cached audio and sheet-music pages
//! - `upload-audio` / `delete-audio`: manage recordings
//! - `upload-sheet-music` / `delete-sheet-music` / `list-sheet-music`:
//!   manage transcription links

mod admin;
mod blog;
mod cache;
mod config;
mod error;
mod keyofday;
mod metrics;
mod notify;
mod storage;
mod traffic;
mod web;

use crate::admin::AdminOps;
use crate::cache::triggers::{spawn_periodic_refresh, NotificationPoller};
use crate::cache::{AudioSource, Cache, SheetMusicSource};
use crate::config::Config;
use crate::metrics::create_metrics;
use crate::notify::sqs::SqsQueue;
use crate::storage::s3::S3Storage;
use crate::storage::StorageBackend;
use crate::traffic::TrafficLog;
use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::watch;
use tracing::{info, warn, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "fiddlehead")]
#[command(author, version, about = "Personal music site server and asset CLI", long_about = None)]
struct Args {
    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Enable JSON logging output
    #[arg(long)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the web server
    Serve {
        /// Server port (overrides PORT env var)
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Upload an audio file to storage
    UploadAudio {
        /// Path to the audio file (.wav or .mp3)
        #[arg(short, long)]
        file: PathBuf,
    },
    /// Delete an audio file from storage
    DeleteAudio {
        /// Object key or bare file name under the audio prefix
        #[arg(short, long)]
        key: String,
    },
    /// Upload a sheet-music entry (display name + Dropbox link)
    UploadSheetMusic {
        /// Display name, e.g. "Jerusalem Ridge"
        #[arg(short, long)]
        name: String,
        /// Dropbox URL to the PDF
        #[arg(short, long)]
        url: String,
    },
    /// Delete a sheet-music entry from storage
    DeleteSheetMusic {
        /// Object key or bare slug under the sheet prefix
        #[arg(short, long)]
        key: String,
    },
    /// List sheet-music entries currently in storage
    ListSheetMusic,
}

/// Everything the serve path and the CLI mutations share.
struct App {
    config: Config,
    storage: Arc<dyn StorageBackend>,
    audio_cache: Arc<Cache<AudioSource>>,
    sheet_cache: Arc<Cache<SheetMusicSource>>,
    metrics: metrics::SharedMetrics,
}

impl App {
    fn new(config: Config) -> anyhow::Result<Self> {
        // No lazy client construction: a bucket we cannot reach is fatal at
        // boot, not mid-request.
        let storage: Arc<dyn StorageBackend> = Arc::new(S3Storage::new(&config.storage)?);
        let metrics = create_metrics();

        let audio_cache = Arc::new(Cache::new(
            "audio",
            AudioSource::new(
                storage.clone(),
                config.storage.audio_prefix.clone(),
                config.storage.fallback_image_key.clone(),
                config.storage.presign_ttl,
            ),
            Some(metrics.clone()),
        ));
        let sheet_cache = Arc::new(Cache::new(
            "sheetmusic",
            SheetMusicSource::new(storage.clone(), config.storage.sheet_prefix.clone()),
            Some(metrics.clone()),
        ));

        Ok(Self {
            config,
            storage,
            audio_cache,
            sheet_cache,
            metrics,
        })
    }

    fn admin(&self) -> AdminOps {
        AdminOps::new(
            self.storage.clone(),
            self.audio_cache.clone(),
            self.sheet_cache.clone(),
            self.config.storage.audio_prefix.clone(),
            self.config.storage.sheet_prefix.clone(),
        )
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let boot_start = Instant::now();

    dotenvy::dotenv().ok();
    let args = Args::parse();
    init_logging(&args.log_level, args.json_logs)?;

    let mut config = Config::from_env()?;
    if let Command::Serve { port: Some(port) } = &args.command {
        config.server.port = *port;
    }

    let app = App::new(config)?;

    match args.command {
        Command::Serve { .. } => serve(app, boot_start).await,
        Command::UploadAudio { file } => {
            let key = app.admin().upload_audio(&file).await?;
            info!(key = %key, "Upload complete");
            Ok(())
        }
        Command::DeleteAudio { key } => {
            let key = app.admin().delete_audio(&key).await?;
            info!(key = %key, "Delete complete");
            Ok(())
        }
        Command::UploadSheetMusic { name, url } => {
            let key = app.admin().put_sheet_json(&name, &url).await?;
            info!(key = %key, "Sheet music entry uploaded");
            Ok(())
        }
        Command::DeleteSheetMusic { key } => {
            let key = app.admin().delete_sheet_music(&key).await?;
            info!(key = %key, "Sheet music entry deleted");
            Ok(())
        }
        Command::ListSheetMusic => {
            app.sheet_cache.refresh().await;
            for record in app.sheet_cache.get().await.iter() {
                println!("{}\t{}\t{}", record.storage_key, record.display_name, record.external_url);
            }
            Ok(())
        }
    }
}

async fn serve(app: App, boot_start: Instant) -> anyhow::Result<()> {
    info!("Starting fiddlehead v{}", env!("CARGO_PKG_VERSION"));

    // Eager first refresh before serving traffic. A failure here is logged
    // inside the engines and the site starts with empty lists rather than
    // refusing to boot.
    tokio::join!(app.audio_cache.refresh(), app.sheet_cache.refresh());

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // Trigger 1: periodic tickers keyed to URL expiry (audio) and a slower
    // housekeeping interval (sheet music).
    let ticker_handles = vec![
        spawn_periodic_refresh(
            app.audio_cache.clone(),
            app.config.audio_refresh_interval(),
            shutdown_rx.clone(),
        ),
        spawn_periodic_refresh(
            app.sheet_cache.clone(),
            app.config.sheet_refresh_interval,
            shutdown_rx.clone(),
        ),
    ];

    // Trigger 2: storage-change notification poller, when a queue is configured.
    let poller_handle = match &app.config.notify.queue_url {
        Some(queue_url) => {
            let queue = SqsQueue::new(queue_url.clone(), app.config.storage.region.clone()).await;
            let poller = NotificationPoller::new(
                Arc::new(queue),
                app.audio_cache.clone(),
                app.sheet_cache.clone(),
                app.config.storage.audio_prefix.clone(),
                app.config.storage.sheet_prefix.clone(),
                app.config.notify.poll_interval,
                Some(app.metrics.clone()),
            );
            Some(poller.spawn(shutdown_rx.clone()))
        }
        None => {
            warn!("No SQS_QUEUE_URL configured, notification poller disabled");
            None
        }
    };

    // Request logging is best-effort: an unopenable database disables it
    // rather than blocking boot.
    let traffic = match &app.config.traffic_db_path {
        Some(path) => match TrafficLog::open(path) {
            Ok(log) => Some(Arc::new(log)),
            Err(e) => {
                warn!(path = %path, error = %e, "Traffic log disabled");
                None
            }
        },
        None => None,
    };

    let state = web::AppState {
        audio_cache: app.audio_cache.clone(),
        sheet_cache: app.sheet_cache.clone(),
        metrics: app.metrics.clone(),
        blog_dir: app.config.blog_dir.clone(),
        resume_url: app.config.resume_url.clone(),
        traffic,
    };
    let router = web::router(state);

    app.metrics.set_boot_duration(boot_start.elapsed().as_secs_f64());

    let addr = SocketAddr::from(([0, 0, 0, 0], app.config.server.port));
    info!("Listening on http://{}", addr);

    let shutdown_signal = async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for ctrl-c");
        }
        info!("Shutdown signal received");
        let _ = shutdown_tx.send(true);
    };

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal)
    .await?;

    for handle in ticker_handles {
        let _ = handle.await;
    }
    if let Some(handle) = poller_handle {
        let _ = handle.await;
    }

    info!("Shutdown complete");
    Ok(())
}

fn init_logging(level: &str, json: bool) -> anyhow::Result<()> {
    let level = level.parse::<Level>().unwrap_or(Level::INFO);
    let filter = EnvFilter::new(format!("fiddlehead={},tower_http=info,hyper=warn", level));

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false),
            )
            .init();
    }

    Ok(())
}
