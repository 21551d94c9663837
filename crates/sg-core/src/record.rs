use serde::{Deserialize, Serialize};

/// Features computed for one block, handed to the emitter then discarded.
///
/// Serialized field order is part of the wire contract with existing
/// consumers: `rms`, `centroid`, `bands`, `onset`, `timestamp`.
///
/// # Example
/// ```
/// use sg_core::record::FeatureRecord;
/// let r = FeatureRecord::silent(12, 0.0);
/// assert_eq!(r.bands.len(), 12);
/// assert!(!r.onset);
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FeatureRecord {
    /// Root-mean-square amplitude, >= 0.
    pub rms: f32,
    /// Spectral centroid in Hz, >= 0.
    pub centroid: f32,
    /// Mean magnitude per log-spaced band, in band order.
    pub bands: Vec<f32>,
    /// `true` when a transient onset was detected in this block.
    pub onset: bool,
    /// Seconds; non-decreasing across a run.
    pub timestamp: f64,
    /// Index of the source block. Diagnostic only, not on the wire.
    #[serde(skip)]
    pub block_index: u64,
}

impl FeatureRecord {
    /// Record of an all-zero block.
    #[must_use]
    pub fn silent(num_bands: usize, timestamp: f64) -> Self {
        Self {
            rms: 0.0,
            centroid: 0.0,
            bands: vec![0.0; num_bands],
            onset: false,
            timestamp,
            block_index: 0,
        }
    }
}
