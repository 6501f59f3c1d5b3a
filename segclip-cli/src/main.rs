//! segclip CLI — run the highlight-aware segmentation pipeline
//! against a video file.
//!
//! Usage:
//!     segclip segment video.mp4 --project-dir ./.segclip --json

use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::time::Instant;

use segclip_core::config::Config;
use segclip_core::decoder::FfmpegDecoder;
use segclip_core::runner::{run_pipeline, ProgressCallback};

#[derive(Parser)]
#[command(
    name = "segclip",
    version,
    about = "segclip — highlight-aware video segmentation CLI",
    long_about = "Finds highlight-worthy clips in a video by combining audio loudness, \
                  motion, and scene-cut signals, then reports them as a list of \
                  start/end timestamps."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Segment a video into highlight clips.
    Segment {
        /// Video file to segment.
        video: String,

        /// Directory for the feature cache and debug artifacts.
        #[arg(long, default_value = ".segclip")]
        project_dir: PathBuf,

        /// Override the Config loaded from JSON, if given.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Override the feature cache version token.
        #[arg(long)]
        cache_version: Option<String>,

        /// Output results as JSON to stdout.
        #[arg(long)]
        json: bool,

        /// Verbose logging.
        #[arg(short, long)]
        verbose: bool,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let Commands::Segment { verbose, .. } = &cli.command;
    let level = if *verbose { "debug" } else { "info" };
    // SAFETY: called before any threads are spawned, at program start.
    unsafe {
        std::env::set_var("RUST_LOG", format!("segclip={level}"));
    }
    env_logger::init();

    match cli.command {
        Commands::Segment { video, project_dir, config, cache_version, json, .. } => {
            cmd_segment(video, project_dir, config, cache_version, json)
        }
    }
}

fn cmd_segment(video: String, project_dir: PathBuf, config_path: Option<PathBuf>, cache_version: Option<String>, json: bool) -> anyhow::Result<()> {
    let t0 = Instant::now();

    let mut config = match &config_path {
        Some(path) => {
            let text = std::fs::read_to_string(path)?;
            serde_json::from_str(&text)?
        }
        None => Config::default(),
    };
    if let Some(version) = cache_version {
        config.cache_version = version;
    }

    let decoder = FfmpegDecoder::default();

    let progress: Option<ProgressCallback> = if !json {
        Some(Box::new(|pct, msg| {
            eprintln!("[{pct:>3}%] {msg}");
        }))
    } else {
        None
    };

    let result = run_pipeline(&decoder, &video, &project_dir, &config, &progress, &None)
        .map_err(|e| anyhow::anyhow!(e.to_string()))?;
    let elapsed = t0.elapsed().as_secs_f64();

    if json {
        let output = serde_json::json!({
            "clips": result.clips,
            "anchors": result.anchors,
            "elapsed_s": elapsed,
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        print_report(&video, &result.clips, elapsed);
    }

    Ok(())
}

fn print_report(video: &str, clips: &[segclip_core::windows::ClipWindow], elapsed_s: f64) {
    eprintln!("\n============================");
    eprintln!("  segclip — Results");
    eprintln!("============================\n");

    eprintln!("Video:    {}", Path::new(video).file_name().unwrap_or_default().to_string_lossy());
    eprintln!("Clips:    {}", clips.len());
    eprintln!("Elapsed:  {elapsed_s:.2} s\n");

    for (i, clip) in clips.iter().enumerate() {
        eprintln!(
            "  [{:>3}] {:>7.1}s -> {:>7.1}s  (quality={:.2}, anchor={:.1}s)",
            i + 1,
            clip.start_sec,
            clip.end_sec,
            clip.quality_score,
            clip.anchor_time_sec
        );
    }
}
