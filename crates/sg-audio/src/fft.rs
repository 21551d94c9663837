use std::sync::Arc;

use realfft::num_complex::Complex;
use realfft::{RealFftPlanner, RealToComplex};

/// FFT pipeline: Hann-windowed real FFT using realfft.
///
/// Pre-allocates the FFT plan and every buffer, so `process` does not
/// allocate.
///
/// # Example
/// ```
/// use sg_audio::fft::FftPipeline;
/// let fft = FftPipeline::new(1024);
/// assert_eq!(fft.num_bins(), 513);
/// ```
pub struct FftPipeline {
    fft_size: usize,
    input_buf: Vec<f32>,
    spectrum_buf: Vec<Complex<f32>>,
    scratch: Vec<Complex<f32>>,
    magnitude: Vec<f32>,
    plan: Arc<dyn RealToComplex<f32>>,
    /// Hann window coefficients.
    window: Vec<f32>,
}

impl FftPipeline {
    /// Create a new FFT pipeline with the given window size.
    ///
    /// # Panics
    /// Panics if `size` is 0.
    #[must_use]
    pub fn new(size: usize) -> Self {
        assert!(size > 0, "FFT size must be > 0");

        let mut planner = RealFftPlanner::<f32>::new();
        let plan = planner.plan_fft_forward(size);

        let input_buf = plan.make_input_vec();
        let spectrum_buf = plan.make_output_vec();
        let scratch = plan.make_scratch_vec();
        let magnitude = vec![0.0; spectrum_buf.len()];

        Self {
            fft_size: size,
            input_buf,
            spectrum_buf,
            scratch,
            magnitude,
            plan,
            window: hann_window(size),
        }
    }

    /// Window `samples` and return the one-sided magnitude spectrum
    /// (`N/2 + 1` bins, unscaled `|X[k]|`).
    ///
    /// Shorter input is zero-padded, longer input is truncated.
    ///
    /// # Example
    /// ```
    /// use sg_audio::fft::FftPipeline;
    /// let mut fft = FftPipeline::new(256);
    /// let samples = vec![0.0f32; 256];
    /// let spectrum = fft.process(&samples);
    /// assert_eq!(spectrum.len(), 129); // N/2 + 1
    /// ```
    pub fn process(&mut self, samples: &[f32]) -> &[f32] {
        let n = self.fft_size.min(samples.len());

        // Copy and window
        for (i, slot) in self.input_buf.iter_mut().enumerate() {
            *slot = if i < n {
                samples[i] * self.window[i]
            } else {
                0.0
            };
        }

        // Forward FFT
        if let Err(e) = self.plan.process_with_scratch(
            &mut self.input_buf,
            &mut self.spectrum_buf,
            &mut self.scratch,
        ) {
            log::error!("FFT failed: {e}");
            self.magnitude.fill(0.0);
            return &self.magnitude;
        }

        // Magnitude
        for (mag, c) in self.magnitude.iter_mut().zip(&self.spectrum_buf) {
            *mag = c.norm();
        }
        &self.magnitude
    }

    /// FFT window size.
    #[must_use]
    pub fn fft_size(&self) -> usize {
        self.fft_size
    }

    /// Length of the one-sided spectrum.
    #[must_use]
    pub fn num_bins(&self) -> usize {
        self.magnitude.len()
    }
}

/// Symmetric Hann window, `0.5 - 0.5 cos(2πn / (N-1))`.
#[must_use]
pub fn hann_window(size: usize) -> Vec<f32> {
    if size == 1 {
        return vec![1.0];
    }
    (0..size)
        .map(|i| {
            0.5 * (1.0 - (2.0 * std::f64::consts::PI * i as f64 / (size as f64 - 1.0)).cos())
                as f32
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hann_is_symmetric_and_zero_at_edges() {
        let w = hann_window(64);
        assert!(w[0].abs() < 1e-7);
        assert!(w[63].abs() < 1e-7);
        for i in 0..32 {
            assert!((w[i] - w[63 - i]).abs() < 1e-6);
        }
        assert!(w.iter().all(|&x| (0.0..=1.0).contains(&x)));
    }

    #[test]
    fn sine_peaks_at_its_bin() {
        let size = 512;
        let sr = 8000.0f64;
        // exactly on bin 32
        let freq = 32.0 * sr / size as f64;
        let samples: Vec<f32> = (0..size)
            .map(|i| (2.0 * std::f64::consts::PI * freq * i as f64 / sr).sin() as f32)
            .collect();
        let mut fft = FftPipeline::new(size);
        let spectrum = fft.process(&samples);
        let (peak, _) = spectrum
            .iter()
            .enumerate()
            .fold((0, 0.0f32), |acc, (i, &m)| if m > acc.1 { (i, m) } else { acc });
        assert_eq!(peak, 32);
    }

    #[test]
    fn silence_has_empty_spectrum() {
        let mut fft = FftPipeline::new(128);
        assert!(fft.process(&[0.0; 128]).iter().all(|&m| m == 0.0));
    }
}
