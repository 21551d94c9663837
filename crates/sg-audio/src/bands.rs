use std::ops::Range;

use sg_core::error::PipelineError;

/// One log-spaced band: the FFT bins whose energy it averages.
#[derive(Clone, Debug, PartialEq)]
pub struct Band {
    bins: Range<usize>,
    low_hz: f32,
    high_hz: f32,
    fallback: bool,
}

impl Band {
    /// Bin indices aggregated by this band. Never empty.
    #[must_use]
    pub fn bins(&self) -> Range<usize> {
        self.bins.clone()
    }

    /// Nominal frequency edges `[low, high)` in Hz.
    #[must_use]
    pub fn edges(&self) -> (f32, f32) {
        (self.low_hz, self.high_hz)
    }

    /// `true` when no bin fell inside the band and it borrows the single
    /// bin at its own index instead.
    #[must_use]
    pub fn is_fallback(&self) -> bool {
        self.fallback
    }
}

/// Table bins → bandes, calculée une fois par configuration.
///
/// Boundaries are geometric between `f_min` and `f_max`:
/// `edge[i] = f_min * (f_max / f_min)^(i / n)`. Bin `k` (at `k * sr / fft`)
/// joins band `i` when `edge[i] <= f < edge[i + 1]`; bins below `f_min` join
/// band 0 and bins at or above `f_max` join the last band, so the natural
/// assignment partitions `[0, fft/2]`. A band left empty gets the single
/// fallback bin equal to its index.
///
/// Immutable; shared read-only (`Arc`) by the analysis stage.
///
/// # Example
/// ```
/// use sg_audio::bands::BandTable;
/// let table = BandTable::build(12, 1024, 44100, 20.0, None).unwrap();
/// assert_eq!(table.len(), 12);
/// assert_eq!(table.band_of(440.0), Some(5)); // 370-664 Hz
/// ```
#[derive(Clone, Debug)]
pub struct BandTable {
    bands: Vec<Band>,
    edges: Vec<f64>,
    num_bins: usize,
}

impl BandTable {
    /// Build the table for `num_bands` bands over an FFT of `fft_size` points.
    ///
    /// `f_max` defaults to `sample_rate / 2`.
    ///
    /// # Errors
    /// Returns [`PipelineError::Config`] if `num_bands == 0`, `fft_size == 0`,
    /// `sample_rate == 0`, `f_min <= 0` or `f_min >= f_max`.
    pub fn build(
        num_bands: usize,
        fft_size: usize,
        sample_rate: u32,
        f_min: f32,
        f_max: Option<f32>,
    ) -> Result<Self, PipelineError> {
        if num_bands == 0 {
            return Err(PipelineError::config("features.bands", "must be > 0 (got 0)"));
        }
        if fft_size == 0 {
            return Err(PipelineError::config("audio.block_size", "must be > 0 (got 0)"));
        }
        if sample_rate == 0 {
            return Err(PipelineError::config("audio.sample_rate", "must be > 0"));
        }
        let sr = f64::from(sample_rate);
        let f_min = f64::from(f_min);
        let f_max = f_max.map_or(sr / 2.0, f64::from);
        if !f_min.is_finite() || f_min <= 0.0 {
            return Err(PipelineError::config(
                "features.f_min",
                format!("must be a positive frequency (got {f_min})"),
            ));
        }
        if !f_max.is_finite() || f_min >= f_max {
            return Err(PipelineError::config(
                "features.f_min",
                format!("must be below f_max {f_max} Hz (got {f_min})"),
            ));
        }

        let ratio = f_max / f_min;
        let mut edges: Vec<f64> = (0..=num_bands)
            .map(|i| f_min * ratio.powf(i as f64 / num_bands as f64))
            .collect();
        // pin both ends against powf rounding
        edges[0] = f_min;
        edges[num_bands] = f_max;

        let num_bins = fft_size / 2 + 1;
        let bin_hz = sr / fft_size as f64;

        // Bins are visited in increasing frequency, so each band's natural
        // bins form one contiguous run.
        let mut natural: Vec<Option<Range<usize>>> = vec![None; num_bands];
        for k in 0..num_bins {
            let band = band_index(&edges, k as f64 * bin_hz);
            match &mut natural[band] {
                Some(run) => run.end = k + 1,
                slot @ None => *slot = Some(k..k + 1),
            }
        }

        let bands = natural
            .into_iter()
            .enumerate()
            .map(|(i, run)| {
                let (bins, fallback) = match run {
                    Some(run) => (run, false),
                    None => {
                        let k = i.min(num_bins - 1);
                        (k..k + 1, true)
                    }
                };
                Band {
                    bins,
                    low_hz: edges[i] as f32,
                    high_hz: edges[i + 1] as f32,
                    fallback,
                }
            })
            .collect::<Vec<_>>();

        let fallbacks = bands.iter().filter(|b| b.fallback).count();
        if fallbacks > 0 {
            log::debug!(
                "BandTable: {fallbacks}/{num_bands} bands have no natural bin at {bin_hz:.1} Hz resolution"
            );
        }

        Ok(Self {
            bands,
            edges,
            num_bins,
        })
    }

    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.bands.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bands.is_empty()
    }

    #[must_use]
    pub fn bands(&self) -> &[Band] {
        &self.bands
    }

    /// Length of the one-sided spectrum this table indexes (`fft/2 + 1`).
    #[must_use]
    pub fn num_bins(&self) -> usize {
        self.num_bins
    }

    /// Band whose nominal edges contain `hz`, if any.
    #[must_use]
    pub fn band_of(&self, hz: f32) -> Option<usize> {
        let hz = f64::from(hz);
        let n = self.bands.len();
        if hz < self.edges[0] || hz >= self.edges[n] {
            return None;
        }
        Some(band_index(&self.edges, hz))
    }

    /// Mean magnitude per band, written into `out` (resized to `len()`).
    ///
    /// `spectrum` must hold `num_bins()` magnitudes.
    pub fn energies_into(&self, spectrum: &[f32], out: &mut Vec<f32>) {
        debug_assert_eq!(spectrum.len(), self.num_bins, "spectrum/table mismatch");
        out.clear();
        out.extend(self.bands.iter().map(|band| {
            let end = band.bins.end.min(spectrum.len());
            let bins = &spectrum[band.bins.start.min(end)..end];
            if bins.is_empty() {
                0.0
            } else {
                bins.iter().sum::<f32>() / bins.len() as f32
            }
        }));
    }
}

/// Band for frequency `f`, clamping out-of-range frequencies to the edge bands.
fn band_index(edges: &[f64], f: f64) -> usize {
    let n = edges.len() - 1;
    // number of edges <= f, minus one, is the band whose lower edge is <= f
    edges.partition_point(|&e| e <= f).saturating_sub(1).min(n - 1)
}
