use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "soundpaint", about = "Paints music as a scrolling field of note marks and renders it to video")]
pub struct Cli {
    /// Input audio file (WAV, MP3, FLAC, OGG, AAC)
    pub input: Option<PathBuf>,

    /// Output video file
    #[arg(short, long, default_value = "output.mp4")]
    pub output: PathBuf,

    /// Parameter preset name
    #[arg(long, default_value = "default")]
    pub preset: String,

    /// Video width in pixels
    #[arg(long, default_value_t = 1280)]
    pub width: u32,

    /// Video height in pixels
    #[arg(long, default_value_t = 720)]
    pub height: u32,

    /// Frames per second
    #[arg(long, default_value_t = 30)]
    pub fps: u32,

    /// H.264 CRF quality (0-51, lower = better). Ignored when --bitrate is set.
    #[arg(long, default_value_t = 18)]
    pub crf: u32,

    /// Video bitrate (e.g. 2400k, 5M). When set, uses -b:v instead of -crf.
    #[arg(short, long)]
    pub bitrate: Option<String>,

    /// FFmpeg video codec
    #[arg(long, default_value = "libx264")]
    pub codec: String,

    /// FFmpeg pixel format
    #[arg(long, default_value = "yuv420p")]
    pub pix_fmt: String,

    /// GPU effects: glow, vignette, grain, dreamy or none (comma-separated)
    #[arg(long, value_delimiter = ',')]
    pub effects: Vec<String>,

    /// Parameter override, e.g. --param drift=6 or --param emphasis=20,50,80
    #[arg(short, long = "param")]
    pub params: Vec<String>,

    /// Title text overlay
    #[arg(long)]
    pub title: Option<String>,

    /// Show elapsed time overlay
    #[arg(long)]
    pub show_time: bool,

    /// TTF/OTF font for text overlays
    #[arg(long)]
    pub font: Option<PathBuf>,

    /// Also save the last frame as PNG
    #[arg(long)]
    pub png: Option<PathBuf>,

    /// List available presets and exit
    #[arg(long)]
    pub list_presets: bool,

    /// Config file (defaults to ./soundpaint.toml or the user config)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Seed for mark drift, for reproducible renders
    #[arg(long)]
    pub seed: Option<u64>,
}
