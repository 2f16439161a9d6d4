//! muxfetch
//!
//! A small HTTP service that lists the stream formats of an online video
//! and downloads its best video-only and audio-only streams in the
//! background, muxing them into a single MP4 with ffmpeg.

mod error;
mod extractor;
mod job;
mod merge;
mod protocol;
mod server;
mod state;
mod utils;

#[cfg(test)]
mod testing;

use std::net::IpAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing::{error, warn, Level};
use tracing_subscriber::FmtSubscriber;

use crate::extractor::{find_deno, find_ytdlp, YtDlpExtractor};
use crate::merge::{ffmpeg_available, FfmpegMerger};

/// muxfetch - download and mux online video streams
#[derive(Parser, Debug)]
#[command(name = "muxfetch")]
#[command(about = "HTTP service that downloads and muxes the best video and audio streams")]
#[command(version)]
struct Args {
    /// Port to listen on
    #[arg(short, long, default_value = "3000")]
    port: u16,

    /// Address to bind
    #[arg(long, default_value = "127.0.0.1")]
    host: IpAddr,

    /// Directory downloads are written to, one subdirectory per job
    #[arg(long, default_value_os_t = utils::default_download_dir())]
    download_dir: PathBuf,

    /// Path to yt-dlp (auto-detected when omitted)
    #[arg(long)]
    ytdlp: Option<PathBuf>,

    /// Path to ffmpeg
    #[arg(long, default_value = "ffmpeg")]
    ffmpeg: PathBuf,

    /// Give up on metadata lookups after this many seconds
    #[arg(long)]
    metadata_timeout_secs: Option<u64>,

    /// Finished jobs kept for status queries
    #[arg(long, default_value_t = job::DEFAULT_JOB_HISTORY)]
    job_history: usize,

    /// Run in background (minimal output)
    #[arg(long)]
    background: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize logging
    if !args.background {
        let level = match args.log_level.to_lowercase().as_str() {
            "trace" => Level::TRACE,
            "debug" => Level::DEBUG,
            "info" => Level::INFO,
            "warn" => Level::WARN,
            "error" => Level::ERROR,
            _ => Level::INFO,
        };

        FmtSubscriber::builder()
            .with_max_level(level)
            .with_target(false)
            .compact()
            .init();
    }

    let ytdlp_path = args
        .ytdlp
        .clone()
        .or_else(find_ytdlp)
        .unwrap_or_else(|| PathBuf::from("yt-dlp"));

    let extractor = YtDlpExtractor::new(ytdlp_path.clone())?
        .with_metadata_timeout(args.metadata_timeout_secs.map(Duration::from_secs));
    let merger = FfmpegMerger::new(args.ffmpeg.clone());

    utils::ensure_dir(&args.download_dir).with_context(|| {
        format!("Failed to create download directory {}", args.download_dir.display())
    })?;

    let ffmpeg_ok = ffmpeg_available(&args.ffmpeg);
    if !ffmpeg_ok {
        warn!("ffmpeg not found at {}, downloads will fail to merge", args.ffmpeg.display());
    }

    // Print startup banner
    if !args.background {
        let ytdlp_ok = ytdlp_path.exists() || find_ytdlp().is_some();

        println!();
        println!("========================================================");
        println!("  muxfetch v{}", env!("CARGO_PKG_VERSION"));
        println!("========================================================");
        println!("  HTTP:      http://{}:{}", args.host, args.port);
        println!("  yt-dlp:    {} [{}]", ytdlp_path.display(), if ytdlp_ok { "OK" } else { "NOT FOUND" });
        println!("  deno:      {}", if find_deno().is_some() { "OK" } else { "not found (optional)" });
        println!("  ffmpeg:    {} [{}]", args.ffmpeg.display(), if ffmpeg_ok { "OK" } else { "NOT FOUND" });
        println!("  Downloads: {}", args.download_dir.display());
        println!("========================================================");
        println!();
    }

    let state = Arc::new(
        state::AppState::new(Arc::new(extractor), Arc::new(merger), args.download_dir.clone())
            .with_job_history(args.job_history),
    );

    let config = server::ServerConfig {
        host: args.host,
        port: args.port,
    };

    if let Err(e) = server::run(config, state).await {
        error!("Server error: {}", e);
        return Err(e);
    }

    Ok(())
}
