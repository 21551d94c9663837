use std::collections::VecDeque;

use sg_core::config::{OnsetMode, OnsetParams};

/// Détection d'onsets bloc par bloc.
///
/// Novelty is the rise of block energy over the previous block, in dB. An
/// onset fires when novelty exceeds an adaptive threshold
/// (`median + k·MAD + min_rise_db` over the trailing history), the block is
/// above the silence floor, and at least `min_gap_blocks` blocks have passed
/// since the previous onset.
///
/// Stateful: call [`detect`](Self::detect) exactly once per block, in
/// capture order.
///
/// # Example
/// ```
/// use sg_audio::onset::OnsetDetector;
/// use sg_core::config::OnsetMode;
/// let mut detector = OnsetDetector::new(OnsetMode::Disabled);
/// assert!(!detector.detect(&[1.0; 256]));
/// ```
pub enum OnsetDetector {
    Enabled(EnergyNovelty),
    /// Always answers `false`.
    Disabled,
}

impl OnsetDetector {
    #[must_use]
    pub fn new(mode: OnsetMode) -> Self {
        match mode {
            OnsetMode::Enabled(params) => Self::Enabled(EnergyNovelty::new(params)),
            OnsetMode::Disabled => Self::Disabled,
        }
    }

    /// Feed the next block; `true` if it carries an onset.
    pub fn detect(&mut self, block: &[f32]) -> bool {
        match self {
            Self::Enabled(state) => state.process(block),
            Self::Disabled => false,
        }
    }

    #[must_use]
    pub fn is_enabled(&self) -> bool {
        matches!(self, Self::Enabled(_))
    }
}

/// History and tuning of the energy-rise detector.
pub struct EnergyNovelty {
    params: OnsetParams,
    /// Energy of the previous block, floored at `silence_floor`.
    prev_energy: Option<f32>,
    /// Trailing novelty values, newest at the back.
    history: VecDeque<f32>,
    /// Pre-allocated sort buffer for median/MAD.
    scratch: Vec<f32>,
    /// Blocks since the last onset; starts saturated so the first block may fire.
    since_onset: u32,
}

impl EnergyNovelty {
    #[must_use]
    pub fn new(params: OnsetParams) -> Self {
        let cap = params.history_blocks.max(1);
        Self {
            params,
            prev_energy: None,
            history: VecDeque::with_capacity(cap),
            scratch: Vec::with_capacity(cap),
            since_onset: u32::MAX,
        }
    }

    fn process(&mut self, block: &[f32]) -> bool {
        let floor = self.params.silence_floor;
        let energy = mean_square(block);
        let current = energy.max(floor);
        let previous = self.prev_energy.unwrap_or(floor);
        let novelty = (10.0 * (current / previous).log10()).max(0.0);

        let threshold = self.threshold();
        self.since_onset = self.since_onset.saturating_add(1);

        let onset = energy > floor
            && novelty > threshold
            && self.since_onset >= self.params.min_gap_blocks;

        if onset {
            self.since_onset = 0;
            log::trace!("onset: rise {novelty:.1} dB > threshold {threshold:.1} dB");
        }

        // history excludes the block being judged
        if self.history.len() == self.params.history_blocks.max(1) {
            self.history.pop_front();
        }
        self.history.push_back(novelty);
        self.prev_energy = Some(current);

        onset
    }

    /// `median + k·MAD + min_rise_db` over the current history.
    fn threshold(&mut self) -> f32 {
        if self.history.is_empty() {
            return self.params.min_rise_db;
        }
        self.scratch.clear();
        self.scratch.extend(self.history.iter().copied());
        let median = median_in_place(&mut self.scratch);
        for v in &mut self.scratch {
            *v = (*v - median).abs();
        }
        let mad = median_in_place(&mut self.scratch);
        median + self.params.threshold_k * mad + self.params.min_rise_db
    }
}

fn mean_square(block: &[f32]) -> f32 {
    if block.is_empty() {
        return 0.0;
    }
    let sum: f64 = block.iter().map(|&s| f64::from(s) * f64::from(s)).sum();
    (sum / block.len() as f64) as f32
}

/// Median of a non-empty slice; reorders it.
fn median_in_place(values: &mut [f32]) -> f32 {
    let mid = values.len() / 2;
    let (_, &mut upper, _) = values.select_nth_unstable_by(mid, f32::total_cmp);
    if values.len() % 2 == 1 {
        upper
    } else {
        let lower = values[..mid]
            .iter()
            .copied()
            .fold(f32::NEG_INFINITY, f32::max);
        (lower + upper) * 0.5
    }
}
