use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use sg_core::config::DeviceSelector;
use sg_core::error::PipelineError;

use crate::capture::{CaptureSource, FaultSender};
use crate::decode;
use crate::queue::BlockProducer;

/// How a file source paces its blocks.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Pacing {
    /// One block per block period, like a live device.
    #[default]
    Realtime,
    /// As fast as analysis keeps up; waits while the queue is full, so no
    /// block is dropped.
    Backpressure,
}

/// Replays decoded (or synthesized) mono audio as a capture source.
///
/// Feeds the queue from its own thread. When the samples run out the
/// producer is dropped, which ends the pipeline once the queue is drained.
/// A trailing partial block is not delivered.
///
/// # Example
/// ```
/// use sg_audio::file::{FileCapture, Pacing};
/// let source = FileCapture::from_samples(vec![0.0; 4096], 44100).with_pacing(Pacing::Backpressure);
/// assert_eq!(source.sample_rate(), 44100);
/// ```
pub struct FileCapture {
    samples: Arc<Vec<f32>>,
    sample_rate: u32,
    pacing: Pacing,
    stop: Arc<AtomicBool>,
    feeder: Option<JoinHandle<()>>,
}

impl FileCapture {
    /// Decode `path` to mono at its native rate.
    ///
    /// # Errors
    /// Returns an error if the file cannot be decoded.
    pub fn open(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let audio = decode::decode_file(path)?;
        Ok(Self::from_samples(audio.samples, audio.sample_rate))
    }

    #[must_use]
    pub fn from_samples(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples: Arc::new(samples),
            sample_rate,
            pacing: Pacing::Realtime,
            stop: Arc::new(AtomicBool::new(false)),
            feeder: None,
        }
    }

    #[must_use]
    pub fn with_pacing(mut self, pacing: Pacing) -> Self {
        self.pacing = pacing;
        self
    }

    /// Native sample rate of the material.
    #[must_use]
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }
}

impl CaptureSource for FileCapture {
    fn start(
        &mut self,
        sample_rate: u32,
        block_size: usize,
        device: Option<&DeviceSelector>,
        mut sink: BlockProducer,
        _faults: FaultSender,
    ) -> Result<(), PipelineError> {
        if sample_rate != self.sample_rate {
            return Err(PipelineError::CaptureFault(format!(
                "file is {} Hz, pipeline expects {sample_rate} Hz",
                self.sample_rate
            )));
        }
        if let Some(device) = device {
            log::warn!("Ignoring device {device}: replaying a file");
        }
        self.stop();
        self.stop.store(false, Ordering::Relaxed);

        let samples = Arc::clone(&self.samples);
        let stop = Arc::clone(&self.stop);
        let pacing = self.pacing;
        let period = Duration::from_secs_f64(block_size as f64 / f64::from(sample_rate));

        let handle = thread::Builder::new()
            .name("sg-file-capture".to_string())
            .spawn(move || {
                let started = Instant::now();
                for (i, chunk) in samples.chunks_exact(block_size).enumerate() {
                    if stop.load(Ordering::Relaxed) {
                        break;
                    }
                    match pacing {
                        Pacing::Realtime => {
                            let due = started + period * i as u32;
                            if let Some(wait) = due.checked_duration_since(Instant::now()) {
                                thread::sleep(wait);
                            }
                        }
                        Pacing::Backpressure => {
                            while sink.is_full() && !stop.load(Ordering::Relaxed) {
                                thread::sleep(Duration::from_millis(1));
                            }
                        }
                    }
                    sink.push_mono(chunk);
                }
                log::info!("File capture finished ({} blocks)", sink.stats().completed());
            })
            .map_err(|e| PipelineError::CaptureFault(format!("cannot spawn file feeder: {e}")))?;

        log::info!(
            "Replaying {:.1} s of audio @ {sample_rate} Hz ({:?})",
            self.samples.len() as f64 / f64::from(sample_rate),
            self.pacing
        );
        self.feeder = Some(handle);
        Ok(())
    }

    fn stop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(handle) = self.feeder.take()
            && handle.join().is_err()
        {
            log::error!("File capture thread panicked");
        }
    }

    fn name(&self) -> &'static str {
        "file"
    }
}

impl Drop for FileCapture {
    fn drop(&mut self) {
        self.stop();
    }
}
