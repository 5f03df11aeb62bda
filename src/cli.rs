use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "fxscope",
    about = "Gain/distortion effect with frequency analysis recording"
)]
pub struct Cli {
    /// Input audio file (WAV, MP3, FLAC, OGG)
    pub input: PathBuf,

    /// Report file (extension is forced to .json). Defaults to a timestamped
    /// file in the report directory.
    #[arg(short, long)]
    pub report: Option<PathBuf>,

    /// Write the processed audio to this WAV file
    #[arg(short = 'w', long)]
    pub render: Option<PathBuf>,

    /// Gain multiplier (0.0-3.0)
    #[arg(short, long, default_value_t = 1.0)]
    pub gain: f32,

    /// Distortion amount (0.0-1.0)
    #[arg(short, long, default_value_t = 0.0)]
    pub distortion: f32,

    /// Samples per processing block
    #[arg(long, default_value_t = 512)]
    pub block_size: usize,

    /// FFT length for the analysis (power of two)
    #[arg(long, default_value_t = 1024)]
    pub fft_size: usize,

    /// Deliver blocks at playback speed on a separate audio thread
    #[arg(long)]
    pub realtime: bool,

    /// Stop recording after this many seconds (processing continues)
    #[arg(long)]
    pub record_seconds: Option<f64>,

    /// Process without recording an analysis
    #[arg(long)]
    pub no_record: bool,

    /// Pass audio through untouched
    #[arg(long)]
    pub bypass: bool,

    /// Base directory for default report paths
    #[arg(long)]
    pub output_dir: Option<PathBuf>,

    /// Config file (TOML)
    #[arg(short, long)]
    pub config: Option<PathBuf>,
}
