use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::clock::TimestampSource;
use crate::error::PipelineError;

/// Configuration complète du pipeline.
///
/// Loads from TOML, or from JSON when the file ends in `.json` (the shape
/// used by existing deployments: `audio.samplerate`, `audio.blocksize`,
/// `features.bands`, `osc.host`...). Every field has a default.
///
/// # Example
/// ```
/// use sg_core::config::SonicConfig;
/// let config = SonicConfig::default();
/// assert_eq!(config.audio.sample_rate, 44100);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct SonicConfig {
    pub audio: AudioConfig,
    pub features: FeaturesConfig,
    pub onset: OnsetConfig,
    pub queue: QueueConfig,
    pub emitter: EmitterConfig,
    pub osc: OscConfig,
}

/// Capture parameters.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Sample rate in Hz.
    #[serde(alias = "samplerate")]
    pub sample_rate: u32,
    /// Samples per block; also the FFT size.
    #[serde(alias = "blocksize")]
    pub block_size: usize,
    /// Input device. `None` = host default.
    pub device: Option<DeviceSelector>,
    /// Source of record timestamps.
    pub timestamp: TimestampSource,
}

/// Input device, by position in the host's device list or by name.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum DeviceSelector {
    Index(usize),
    /// Case-insensitive substring of the device name.
    Name(String),
}

impl std::fmt::Display for DeviceSelector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Index(i) => write!(f, "#{i}"),
            Self::Name(name) => write!(f, "\"{name}\""),
        }
    }
}

impl std::str::FromStr for DeviceSelector {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(s.parse::<usize>()
            .map_or_else(|_| Self::Name(s.to_string()), Self::Index))
    }
}

/// Band layout.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct FeaturesConfig {
    /// Number of log-spaced bands.
    pub bands: usize,
    /// Lower edge of the first band, Hz.
    pub f_min: f32,
    /// Upper edge of the last band, Hz. `None` = Nyquist.
    pub f_max: Option<f32>,
}

/// Onset detector settings. See [`OnsetParams`] for the meaning of each knob.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct OnsetConfig {
    pub enabled: bool,
    pub history_blocks: usize,
    pub threshold_k: f32,
    pub min_rise_db: f32,
    pub min_gap_blocks: u32,
    pub silence_floor: f32,
}

/// Tuning of the energy-rise onset detector.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct OnsetParams {
    /// Trailing window of novelty values used for the adaptive threshold.
    pub history_blocks: usize,
    /// Weight of the median absolute deviation in the threshold.
    pub threshold_k: f32,
    /// Minimum energy rise over the previous block, dB.
    pub min_rise_db: f32,
    /// Blocks that must separate two onsets.
    pub min_gap_blocks: u32,
    /// Mean-square energy below which a block counts as silence.
    pub silence_floor: f32,
}

/// Onset capability, chosen at configuration time.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum OnsetMode {
    Enabled(OnsetParams),
    /// The detector always answers `false`.
    Disabled,
}

/// What happens to queued blocks when the pipeline stops.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StopPolicy {
    /// Analyze and emit every block still queued.
    #[default]
    Drain,
    /// Throw queued blocks away.
    Discard,
}

/// Capture → analysis hand-off.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Blocks held before the oldest is dropped.
    pub max_depth: usize,
    pub on_stop: StopPolicy,
}

/// Which emitters receive the records.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EmitterKind {
    #[default]
    Osc,
    /// JSON lines on stdout.
    Stdout,
    Both,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct EmitterConfig {
    pub kind: EmitterKind,
    /// Records buffered in front of the transport thread.
    pub queue_depth: usize,
}

/// OSC target.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct OscConfig {
    pub host: String,
    pub port: u16,
    /// Address prefix, e.g. `/sonic` → `/sonic/rms`.
    pub base_path: String,
    /// Send the five messages of a block as one OSC bundle.
    pub bundle: bool,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: 44100,
            block_size: 1024,
            device: None,
            timestamp: TimestampSource::Wall,
        }
    }
}

impl Default for FeaturesConfig {
    fn default() -> Self {
        Self {
            bands: 12,
            f_min: 20.0,
            f_max: None,
        }
    }
}

impl Default for OnsetConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            // ~1 s of history at 44.1 kHz / 1024
            history_blocks: 43,
            threshold_k: 3.0,
            min_rise_db: 6.0,
            min_gap_blocks: 4,
            silence_floor: 1e-8,
        }
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_depth: 32,
            on_stop: StopPolicy::Drain,
        }
    }
}

impl Default for EmitterConfig {
    fn default() -> Self {
        Self {
            kind: EmitterKind::Osc,
            queue_depth: 64,
        }
    }
}

impl Default for OscConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8000,
            base_path: "/sonic".to_string(),
            bundle: false,
        }
    }
}

impl SonicConfig {
    /// Upper band edge actually used: `features.f_max` or Nyquist.
    #[must_use]
    pub fn f_max(&self) -> f32 {
        self.features
            .f_max
            .unwrap_or(self.audio.sample_rate as f32 / 2.0)
    }

    /// Onset capability selected by `[onset]`.
    #[must_use]
    pub fn onset_mode(&self) -> OnsetMode {
        let o = &self.onset;
        if !o.enabled {
            return OnsetMode::Disabled;
        }
        OnsetMode::Enabled(OnsetParams {
            history_blocks: o.history_blocks,
            threshold_k: o.threshold_k,
            min_rise_db: o.min_rise_db,
            min_gap_blocks: o.min_gap_blocks,
            silence_floor: o.silence_floor,
        })
    }

    /// Check every parameter before any device is touched.
    ///
    /// # Errors
    /// Returns [`PipelineError::Config`] naming the first invalid parameter.
    pub fn validate(&self) -> Result<(), PipelineError> {
        let a = &self.audio;
        if a.sample_rate == 0 {
            return Err(PipelineError::config("audio.sample_rate", "must be > 0"));
        }
        if a.block_size < 2 {
            return Err(PipelineError::config(
                "audio.block_size",
                format!("must be >= 2 (got {})", a.block_size),
            ));
        }

        let f = &self.features;
        if f.bands == 0 {
            return Err(PipelineError::config("features.bands", "must be > 0 (got 0)"));
        }
        if !f.f_min.is_finite() || f.f_min <= 0.0 {
            return Err(PipelineError::config(
                "features.f_min",
                format!("must be a positive frequency (got {})", f.f_min),
            ));
        }
        let f_max = self.f_max();
        let nyquist = a.sample_rate as f32 / 2.0;
        if !f_max.is_finite() || f_max > nyquist {
            return Err(PipelineError::config(
                "features.f_max",
                format!("must not exceed Nyquist {nyquist} Hz (got {f_max})"),
            ));
        }
        if f.f_min >= f_max {
            return Err(PipelineError::config(
                "features.f_min",
                format!("must be below f_max {f_max} Hz (got {})", f.f_min),
            ));
        }

        if self.queue.max_depth == 0 {
            return Err(PipelineError::config("queue.max_depth", "must be > 0"));
        }

        let o = &self.onset;
        if o.enabled {
            if o.history_blocks == 0 {
                return Err(PipelineError::config("onset.history_blocks", "must be > 0"));
            }
            if o.threshold_k.is_nan() || o.threshold_k < 0.0 {
                return Err(PipelineError::config(
                    "onset.threshold_k",
                    format!("must be >= 0 (got {})", o.threshold_k),
                ));
            }
            if o.min_rise_db.is_nan() || o.min_rise_db < 0.0 {
                return Err(PipelineError::config(
                    "onset.min_rise_db",
                    format!("must be >= 0 (got {})", o.min_rise_db),
                ));
            }
            if o.silence_floor.is_nan() || o.silence_floor <= 0.0 {
                return Err(PipelineError::config(
                    "onset.silence_floor",
                    format!("must be > 0 (got {})", o.silence_floor),
                ));
            }
        }

        if self.emitter.kind != EmitterKind::Stdout {
            if self.osc.host.trim().is_empty() {
                return Err(PipelineError::config("osc.host", "must not be empty"));
            }
            if !self.osc.base_path.starts_with('/') {
                return Err(PipelineError::config(
                    "osc.base_path",
                    format!("must start with '/' (got {:?})", self.osc.base_path),
                ));
            }
        }
        if self.emitter.queue_depth == 0 {
            return Err(PipelineError::config("emitter.queue_depth", "must be > 0"));
        }

        Ok(())
    }
}

/// Charge la configuration depuis un fichier TOML ou JSON.
///
/// # Errors
/// Returns an error if the file cannot be read or parsed. Values are not
/// validated here; call [`SonicConfig::validate`].
pub fn load_config(path: &Path) -> Result<SonicConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Cannot read config file: {}", path.display()))?;
    let is_json = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("json"));
    let config: SonicConfig = if is_json {
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse JSON config: {}", path.display()))?
    } else {
        toml::from_str(&content)
            .with_context(|| format!("Failed to parse TOML config: {}", path.display()))?
    };
    log::info!("Config loaded from {}", path.display());
    Ok(config)
}
