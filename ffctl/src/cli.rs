use clap::Parser;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "ffctl")]
#[command(about = "Control plane for long-running FFmpeg transcoding jobs", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Path to the YAML configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Bind address (overrides config)
    #[arg(long)]
    pub bind: Option<String>,

    /// FFmpeg binary (overrides config)
    #[arg(long)]
    pub ffmpeg: Option<PathBuf>,
}
