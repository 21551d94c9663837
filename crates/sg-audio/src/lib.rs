// Capture, block queue, spectral analysis and onset detection for sonicgeo.

pub mod analyzer;
pub mod bands;
pub mod capture;
pub mod decode;
pub mod features;
pub mod fft;
pub mod file;
pub mod onset;
pub mod pipeline;
pub mod queue;
