/// One capture period of mono samples.
///
/// Owned by exactly one stage at a time: the capture callback fills it, the
/// block queue moves it, the analyzer reads it and hands the buffer back for
/// reuse. Never shared.
///
/// # Example
/// ```
/// use sg_core::block::AudioBlock;
/// let block = AudioBlock::new(0, vec![0.0; 1024]);
/// assert_eq!(block.len(), 1024);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBlock {
    /// Capture-order index, starting at 0. Keeps counting across dropped blocks.
    pub index: u64,
    /// Mono samples, nominally in [-1.0, 1.0].
    pub samples: Vec<f32>,
}

impl AudioBlock {
    #[must_use]
    pub fn new(index: u64, samples: Vec<f32>) -> Self {
        Self { index, samples }
    }

    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Give the sample buffer back, e.g. to a recycling pool.
    #[must_use]
    pub fn into_samples(self) -> Vec<f32> {
        self.samples
    }
}
