use std::sync::Arc;

use sg_core::block::AudioBlock;
use sg_core::error::PipelineError;

use crate::bands::BandTable;
use crate::fft::FftPipeline;

/// Guard added to the centroid denominator so silence yields 0 Hz.
pub const CENTROID_EPSILON: f64 = 1e-9;

/// Amplitude and spectral features of one block.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SpectralFeatures {
    /// sqrt(mean(x²)).
    pub rms: f32,
    /// Magnitude-weighted mean frequency, Hz.
    pub centroid: f32,
    /// Mean magnitude per band.
    pub bands: Vec<f32>,
}

/// Spectral analyzer: RMS, band energies and centroid for one block.
///
/// Holds its FFT plan and buffers; the band table is shared read-only.
///
/// # Example
/// ```
/// use std::sync::Arc;
/// use sg_audio::analyzer::SpectralAnalyzer;
/// use sg_audio::bands::BandTable;
/// use sg_core::block::AudioBlock;
///
/// let table = Arc::new(BandTable::build(12, 1024, 44100, 20.0, None).unwrap());
/// let mut analyzer = SpectralAnalyzer::new(1024, 44100, table);
/// let features = analyzer.analyze(&AudioBlock::new(0, vec![0.0; 1024])).unwrap();
/// assert_eq!(features.rms, 0.0);
/// assert_eq!(features.centroid, 0.0);
/// ```
pub struct SpectralAnalyzer {
    fft: FftPipeline,
    bands: Arc<BandTable>,
    /// Frequency of each spectrum bin, `k * sr / fft`.
    bin_freqs: Vec<f64>,
}

impl SpectralAnalyzer {
    /// # Panics
    /// Panics if `block_size` is 0.
    #[must_use]
    pub fn new(block_size: usize, sample_rate: u32, bands: Arc<BandTable>) -> Self {
        let fft = FftPipeline::new(block_size);
        debug_assert_eq!(fft.num_bins(), bands.num_bins(), "band table built for another FFT size");
        let bin_hz = f64::from(sample_rate) / block_size as f64;
        let bin_freqs = (0..fft.num_bins()).map(|k| k as f64 * bin_hz).collect();
        Self {
            fft,
            bands,
            bin_freqs,
        }
    }

    /// Block size this analyzer expects.
    #[must_use]
    pub fn block_size(&self) -> usize {
        self.fft.fft_size()
    }

    #[must_use]
    pub fn band_table(&self) -> &BandTable {
        &self.bands
    }

    /// Analyze one block.
    ///
    /// # Errors
    /// Returns [`PipelineError::InvalidInput`] for an empty block, a block of
    /// the wrong length, or one holding NaN/infinite samples.
    pub fn analyze(&mut self, block: &AudioBlock) -> Result<SpectralFeatures, PipelineError> {
        let mut features = SpectralFeatures::default();
        self.analyze_into(block, &mut features)?;
        Ok(features)
    }

    /// Same as [`analyze`](Self::analyze), reusing `out.bands`' allocation.
    ///
    /// # Errors
    /// See [`analyze`](Self::analyze).
    pub fn analyze_into(
        &mut self,
        block: &AudioBlock,
        out: &mut SpectralFeatures,
    ) -> Result<(), PipelineError> {
        let samples = &block.samples;
        if samples.is_empty() {
            return Err(PipelineError::InvalidInput {
                block_index: block.index,
                reason: "empty block".into(),
            });
        }
        if samples.len() != self.fft.fft_size() {
            return Err(PipelineError::InvalidInput {
                block_index: block.index,
                reason: format!(
                    "expected {} samples, got {}",
                    self.fft.fft_size(),
                    samples.len()
                ),
            });
        }
        if let Some(pos) = samples.iter().position(|s| !s.is_finite()) {
            return Err(PipelineError::InvalidInput {
                block_index: block.index,
                reason: format!("non-finite sample at offset {pos}"),
            });
        }

        // RMS
        let sum_sq: f64 = samples.iter().map(|&s| f64::from(s) * f64::from(s)).sum();
        out.rms = (sum_sq / samples.len() as f64).sqrt() as f32;

        let spectrum = self.fft.process(samples);

        // Frequency band energies
        self.bands.energies_into(spectrum, &mut out.bands);

        // Spectral centroid
        let (weighted, total) = spectrum
            .iter()
            .zip(&self.bin_freqs)
            .fold((0.0f64, 0.0f64), |(w, t), (&mag, &hz)| {
                (w + f64::from(mag) * hz, t + f64::from(mag))
            });
        out.centroid = (weighted / (total + CENTROID_EPSILON)) as f32;

        Ok(())
    }
}
