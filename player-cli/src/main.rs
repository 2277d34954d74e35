use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;

use clap::Parser;
use course_player::{AppConfig, AppError, Args, HeadlessEngine, PlaybackOptions, Result};
use segment_loader::{HttpTransport, JsonFileStore, VideoIdentity};
use tokio_util::sync::CancellationToken;
use tracing::{Level, error, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{filter::EnvFilter, fmt, prelude::*};

#[tokio::main]
async fn main() {
    let args = Args::parse();

    let _guard = match init_logging(args.verbose, args.quiet, args.log_dir.as_deref()) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Error: {e}");
            process::exit(1);
        }
    };

    if let Err(e) = run(args).await {
        error!("Application error: {}", e);
        eprintln!("Error: {e}");
        let code = match e {
            AppError::Cancelled => 130,
            _ => 1,
        };
        process::exit(code);
    }
}

async fn run(args: Args) -> Result<()> {
    let mut config = AppConfig::load(args.config.as_deref())?;
    config.apply_args(&args);
    let loader_config = config.segment_loader_config()?;

    let identity: VideoIdentity = args.video.parse()?;
    let store = Arc::new(JsonFileStore::open(&config.preferences_file)?);
    let transport = Arc::new(HttpTransport::new(&loader_config.transport)?);

    let token = CancellationToken::new();
    let ctrl_c_token = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Ctrl+C received, stopping playback");
            ctrl_c_token.cancel();
        }
    });

    let output = args
        .output
        .clone()
        .unwrap_or_else(|| default_output(&identity));
    let options = PlaybackOptions {
        output: output.clone(),
        level: args.level.clone(),
        volume: args.volume,
        max_segments: args.max_segments,
    };

    let mut engine = HeadlessEngine::new(
        identity,
        &loader_config,
        transport,
        store,
        config.playback_rate,
        token,
    )?;
    let summary = engine.run(&options).await?;

    info!(
        segments = summary.segments,
        bytes = summary.bytes,
        level = ?summary.level,
        volume = summary.volume,
        ended = summary.ended,
        output = %output.display(),
        "Playback complete"
    );
    println!(
        "Wrote {} segments ({} bytes) at {} to {}",
        summary.segments,
        summary.bytes,
        summary.level.as_deref().unwrap_or("default level"),
        output.display()
    );
    Ok(())
}

fn default_output(identity: &VideoIdentity) -> PathBuf {
    PathBuf::from(format!("{}.ts", identity.to_string().replace('/', "_")))
}

fn init_logging(verbose: bool, quiet: bool, log_dir: Option<&Path>) -> Result<Option<WorkerGuard>> {
    let filter = if quiet {
        EnvFilter::new("error")
    } else if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::from_default_env().add_directive(Level::INFO.into())
    };

    let (file_layer, guard) = match log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)?;
            let file_appender = tracing_appender::rolling::daily(dir, "course-player.log");
            let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
            let layer = fmt::layer().with_writer(non_blocking).with_ansi(false);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .with_level(verbose),
        )
        .with(file_layer)
        .try_init()
        .map_err(|e| AppError::Config(format!("Failed to set global default subscriber: {e}")))?;

    Ok(guard)
}
