use std::sync::Arc;

use sg_core::block::AudioBlock;
use sg_core::clock::{BlockClock, TimestampSource};
use sg_core::config::{OnsetMode, SonicConfig};
use sg_core::error::PipelineError;
use sg_core::record::FeatureRecord;

use crate::analyzer::{SpectralAnalyzer, SpectralFeatures};
use crate::bands::BandTable;
use crate::onset::OnsetDetector;

/// One block in, one [`FeatureRecord`] out.
///
/// Combines the spectral analyzer, the onset detector and the block clock.
/// Blocks must be fed in capture order.
///
/// # Example
/// ```
/// use sg_audio::features::FeatureExtractor;
/// use sg_core::block::AudioBlock;
/// use sg_core::config::SonicConfig;
///
/// let mut extractor = FeatureExtractor::from_config(&SonicConfig::default()).unwrap();
/// let record = extractor.process(&AudioBlock::new(0, vec![0.0; 1024])).unwrap();
/// assert_eq!(record.bands, vec![0.0; 12]);
/// assert!(!record.onset);
/// ```
pub struct FeatureExtractor {
    analyzer: SpectralAnalyzer,
    onset: OnsetDetector,
    clock: BlockClock,
    spectral: SpectralFeatures,
}

impl FeatureExtractor {
    /// # Panics
    /// Panics if `block_size` is 0.
    #[must_use]
    pub fn new(
        block_size: usize,
        sample_rate: u32,
        bands: Arc<BandTable>,
        onset: OnsetMode,
        timestamps: TimestampSource,
    ) -> Self {
        Self {
            analyzer: SpectralAnalyzer::new(block_size, sample_rate, bands),
            onset: OnsetDetector::new(onset),
            clock: BlockClock::new(timestamps, sample_rate, block_size),
            spectral: SpectralFeatures::default(),
        }
    }

    /// Validate `config` and build the band table and extractor it describes.
    ///
    /// # Errors
    /// Returns [`PipelineError::Config`] for an invalid configuration.
    pub fn from_config(config: &SonicConfig) -> Result<Self, PipelineError> {
        config.validate()?;
        let audio = &config.audio;
        let table = BandTable::build(
            config.features.bands,
            audio.block_size,
            audio.sample_rate,
            config.features.f_min,
            config.features.f_max,
        )?;
        Ok(Self::new(
            audio.block_size,
            audio.sample_rate,
            Arc::new(table),
            config.onset_mode(),
            audio.timestamp,
        ))
    }

    /// Compute the record for `block`.
    ///
    /// # Errors
    /// Returns [`PipelineError::InvalidInput`] for a malformed block; the
    /// onset history is left untouched in that case.
    pub fn process(&mut self, block: &AudioBlock) -> Result<FeatureRecord, PipelineError> {
        self.analyzer.analyze_into(block, &mut self.spectral)?;
        let onset = self.onset.detect(&block.samples);
        Ok(FeatureRecord {
            rms: self.spectral.rms,
            centroid: self.spectral.centroid,
            bands: self.spectral.bands.clone(),
            onset,
            timestamp: self.clock.stamp(block.index),
            block_index: block.index,
        })
    }

    #[must_use]
    pub fn num_bands(&self) -> usize {
        self.analyzer.band_table().len()
    }

    #[must_use]
    pub fn onset_enabled(&self) -> bool {
        self.onset.is_enabled()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn one_record_per_block_in_order() {
        let mut config = SonicConfig::default();
        config.audio.timestamp = TimestampSource::Stream;
        let mut extractor = FeatureExtractor::from_config(&config).unwrap();
        let mut last_ts = f64::NEG_INFINITY;
        for i in 0..20u64 {
            let amp = i as f32 / 20.0;
            let block = AudioBlock::new(i, vec![amp; 1024]);
            let record = extractor.process(&block).unwrap();
            assert_eq!(record.block_index, i);
            assert!((record.rms - amp).abs() < 1e-6);
            assert!(record.timestamp >= last_ts);
            last_ts = record.timestamp;
        }
    }

    #[test]
    fn invalid_block_is_reported_with_index() {
        let mut extractor = FeatureExtractor::from_config(&SonicConfig::default()).unwrap();
        let err = extractor.process(&AudioBlock::new(42, vec![0.0; 10])).unwrap_err();
        assert!(matches!(err, PipelineError::InvalidInput { block_index: 42, .. }));
    }

    #[test]
    fn invalid_config_never_builds() {
        let mut config = SonicConfig::default();
        config.features.bands = 0;
        assert!(FeatureExtractor::from_config(&config).is_err());
    }

    #[test]
    fn disabled_onset_mode_is_explicit() {
        let mut config = SonicConfig::default();
        config.onset.enabled = false;
        let mut extractor = FeatureExtractor::from_config(&config).unwrap();
        assert!(!extractor.onset_enabled());
        extractor.process(&AudioBlock::new(0, vec![0.0; 1024])).unwrap();
        let loud = extractor.process(&AudioBlock::new(1, vec![0.9; 1024])).unwrap();
        assert!(!loud.onset);
    }
}
