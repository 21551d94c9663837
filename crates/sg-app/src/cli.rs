use std::path::PathBuf;

use clap::Parser;
use sg_core::config::DeviceSelector;

/// sonicgeo — real-time audio features (RMS, log bands, centroid, onsets) over OSC.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Fichier de configuration TOML (ou JSON). Défaut : config/default.toml.
    #[arg(short, long, default_value = "config/default.toml")]
    pub config: PathBuf,

    /// Input device: index from --list-devices, or part of its name.
    #[arg(long)]
    pub device: Option<DeviceSelector>,

    /// Sample rate in Hz.
    #[arg(long)]
    pub sr: Option<u32>,

    /// Block size in samples (also the FFT size).
    #[arg(long)]
    pub block: Option<usize>,

    /// Number of log-spaced bands.
    #[arg(long)]
    pub bands: Option<usize>,

    /// Analyze an audio file (WAV, FLAC, MP3, OGG, AAC) instead of a live device.
    #[arg(long)]
    pub input: Option<PathBuf>,

    /// With --input: replay as fast as analysis allows instead of in real time.
    #[arg(long, default_value_t = false, requires = "input")]
    pub fast: bool,

    /// Désactiver la détection d'onsets (onset toujours false).
    #[arg(long, default_value_t = false)]
    pub no_onset: bool,

    /// Print JSON lines on stdout instead of sending OSC.
    #[arg(long, default_value_t = false)]
    pub stdout: bool,

    /// OSC target host.
    #[arg(long)]
    pub host: Option<String>,

    /// OSC target port.
    #[arg(long)]
    pub port: Option<u16>,

    /// List input devices and exit.
    #[arg(long, default_value_t = false)]
    pub list_devices: bool,

    /// Niveau de log : error, warn, info, debug, trace.
    #[arg(long, default_value = "warn")]
    pub log_level: String,
}
