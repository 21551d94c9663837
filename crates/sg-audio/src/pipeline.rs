use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use sg_core::block::AudioBlock;
use sg_core::config::{SonicConfig, StopPolicy};
use sg_core::error::PipelineError;
use sg_core::record::FeatureRecord;
use sg_core::traits::FeatureEmitter;

use crate::capture::CaptureSource;
use crate::features::FeatureExtractor;
use crate::queue::{BlockConsumer, QueueStats, RecvTimeoutError, block_queue};

/// How long the analysis thread waits for a block before re-checking the
/// stop flag and the fault channel.
const POLL: Duration = Duration::from_millis(20);

/// Summary of a run, returned by [`Pipeline::stop`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PipelineReport {
    pub blocks_processed: u64,
    /// Index of the last block that produced a record.
    pub last_block: Option<u64>,
    /// Blocks evicted because analysis fell behind.
    pub dropped_blocks: u64,
    /// Blocks thrown away at stop under [`StopPolicy::Discard`].
    pub discarded_blocks: u64,
    pub emitter_faults: u64,
    pub peak_queue_depth: usize,
    /// Fault that ended the run, if any.
    pub fault: Option<PipelineError>,
    /// The analysis thread panicked; counters are unreliable.
    pub panicked: bool,
}

impl PipelineReport {
    /// `true` when the run ended on request, without fault.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.fault.is_none() && !self.panicked
    }
}

impl fmt::Display for PipelineReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} blocks processed", self.blocks_processed)?;
        match self.last_block {
            Some(i) => write!(f, " (last #{i})")?,
            None => write!(f, " (none)")?,
        }
        write!(
            f,
            ", {} dropped, {} discarded, {} emitter faults, peak queue {}",
            self.dropped_blocks, self.discarded_blocks, self.emitter_faults, self.peak_queue_depth
        )?;
        if let Some(fault) = &self.fault {
            write!(f, "; stopped by {fault}")?;
        }
        if self.panicked {
            write!(f, "; analysis thread panicked")?;
        }
        Ok(())
    }
}

/// Owns one run: the capture source, the block queue and the analysis thread.
///
/// ```text
/// capture ──push──▶ [block queue] ──recv──▶ sg-analysis ──send──▶ emitter
///    ▲                                        │
///    └───────────── recycled buffers ◀────────┘
/// ```
///
/// Dropping a running pipeline stops it like [`stop`](Self::stop) and
/// discards the report.
///
/// # Example
/// ```no_run
/// use sg_audio::capture::CpalCapture;
/// use sg_audio::pipeline::Pipeline;
/// use sg_core::config::SonicConfig;
/// # use sg_core::{FeatureEmitter, FeatureRecord, PipelineError};
/// # struct Print;
/// # impl FeatureEmitter for Print {
/// #     fn send(&mut self, r: &FeatureRecord) -> Result<(), PipelineError> { println!("{r:?}"); Ok(()) }
/// #     fn name(&self) -> &'static str { "print" }
/// # }
///
/// let config = SonicConfig::default();
/// let pipeline = Pipeline::start(&config, Box::new(CpalCapture::new()), Box::new(Print)).unwrap();
/// std::thread::sleep(std::time::Duration::from_secs(5));
/// println!("{}", pipeline.stop());
/// ```
pub struct Pipeline {
    capture: Box<dyn CaptureSource>,
    shutdown: Arc<AtomicBool>,
    worker: Option<JoinHandle<PipelineReport>>,
    stats: Arc<QueueStats>,
}

impl Pipeline {
    /// Validate `config`, spawn the analysis thread, then start `capture`.
    ///
    /// # Errors
    /// [`PipelineError::Config`] before anything is started, or the
    /// [`PipelineError::CaptureFault`] returned by `capture.start`.
    pub fn start(
        config: &SonicConfig,
        mut capture: Box<dyn CaptureSource>,
        emitter: Box<dyn FeatureEmitter>,
    ) -> Result<Self, PipelineError> {
        let extractor = FeatureExtractor::from_config(config)?;
        let audio = &config.audio;

        let (producer, consumer) = block_queue(audio.block_size, config.queue.max_depth);
        let stats = Arc::clone(consumer.stats());
        let (fault_tx, fault_rx) = flume::bounded(4);
        let shutdown = Arc::new(AtomicBool::new(false));

        log::info!(
            "Starting pipeline: {} Hz, blocks of {}, {} bands, onset {}, {} → {}",
            audio.sample_rate,
            audio.block_size,
            extractor.num_bands(),
            if extractor.onset_enabled() { "on" } else { "off" },
            capture.name(),
            emitter.name(),
        );

        let worker = AnalysisWorker {
            extractor,
            consumer,
            emitter,
            faults: fault_rx,
            shutdown: Arc::clone(&shutdown),
            on_stop: config.queue.on_stop,
            emitter_failing: false,
        };
        let handle = thread::Builder::new()
            .name("sg-analysis".to_string())
            .spawn(move || worker.run())
            .map_err(|e| PipelineError::CaptureFault(format!("cannot spawn analysis thread: {e}")))?;

        if let Err(e) = capture.start(
            audio.sample_rate,
            audio.block_size,
            audio.device.as_ref(),
            producer,
            fault_tx,
        ) {
            shutdown.store(true, Ordering::Release);
            if handle.join().is_err() {
                log::error!("Analysis thread panicked during aborted start");
            }
            return Err(e);
        }

        Ok(Self {
            capture,
            shutdown,
            worker: Some(handle),
            stats,
        })
    }

    /// `true` once the analysis thread has exited on its own: capture fault,
    /// invalid block, or a source that ran out.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.worker.as_ref().is_none_or(JoinHandle::is_finished)
    }

    /// Live queue counters.
    #[must_use]
    pub fn queue_stats(&self) -> &Arc<QueueStats> {
        &self.stats
    }

    /// Stop capture, drain or discard the queue per `queue.on_stop`, join the
    /// analysis thread.
    #[must_use]
    pub fn stop(mut self) -> PipelineReport {
        self.halt().unwrap_or_default()
    }

    fn halt(&mut self) -> Option<PipelineReport> {
        let handle = self.worker.take()?;
        self.capture.stop();
        self.shutdown.store(true, Ordering::Release);
        let report = handle.join().unwrap_or_else(|_| {
            log::error!("Analysis thread panicked");
            PipelineReport {
                dropped_blocks: self.stats.dropped(),
                peak_queue_depth: self.stats.peak_depth(),
                panicked: true,
                ..PipelineReport::default()
            }
        });
        log::info!("Pipeline stopped: {report}");
        Some(report)
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        let _ = self.halt();
    }
}

/// State moved into the `sg-analysis` thread.
struct AnalysisWorker {
    extractor: FeatureExtractor,
    consumer: BlockConsumer,
    emitter: Box<dyn FeatureEmitter>,
    faults: flume::Receiver<PipelineError>,
    shutdown: Arc<AtomicBool>,
    on_stop: StopPolicy,
    emitter_failing: bool,
}

impl AnalysisWorker {
    fn run(mut self) -> PipelineReport {
        let mut report = PipelineReport::default();

        // Blocks still taken after a capture fault: only those queued when it
        // arrived. A faulted source may keep pushing.
        let mut after_fault: Option<usize> = None;

        loop {
            if report.fault.is_none()
                && let Ok(fault) = self.faults.try_recv()
            {
                log::error!("{fault}; stopping analysis");
                report.fault = Some(fault);
                after_fault = Some(self.consumer.len());
            }
            let stopping = report.fault.is_some() || self.shutdown.load(Ordering::Acquire);

            let block = match &mut after_fault {
                Some(0) => break,
                Some(left) => {
                    *left -= 1;
                    match self.consumer.try_recv() {
                        Some(block) => block,
                        None => break,
                    }
                }
                None => match self.consumer.recv_timeout(POLL) {
                    Ok(block) => block,
                    Err(RecvTimeoutError::Timeout) if stopping => break,
                    Err(RecvTimeoutError::Timeout) => continue,
                    Err(RecvTimeoutError::Disconnected) => {
                        log::debug!("Capture side closed, queue empty");
                        break;
                    }
                },
            };

            let new_drops = self.consumer.take_new_drops();
            if new_drops > 0 {
                log::warn!(
                    "Analysis fell behind: dropped {new_drops} oldest block(s) ({} total)",
                    self.consumer.stats().dropped()
                );
            }

            if stopping && self.on_stop == StopPolicy::Discard {
                report.discarded_blocks += 1;
                self.consumer.recycle(block);
                continue;
            }

            let outcome = self.process(&block, &mut report);
            self.consumer.recycle(block);
            if let Err(e) = outcome {
                log::error!("{e}; stopping analysis");
                report.fault = Some(e);
                break;
            }
        }

        // a fault sent just before the source closed the queue
        if report.fault.is_none()
            && let Ok(fault) = self.faults.try_recv()
        {
            log::error!("{fault}");
            report.fault = Some(fault);
        }
        if report.discarded_blocks > 0 {
            log::info!("Discarded {} queued block(s) at stop", report.discarded_blocks);
        }
        let stats = self.consumer.stats();
        report.dropped_blocks = stats.dropped();
        report.peak_queue_depth = stats.peak_depth();
        report
    }

    /// Analyze one block and hand the record to the emitter. Only analysis
    /// errors come back; emitter faults are counted and logged here.
    fn process(
        &mut self,
        block: &AudioBlock,
        report: &mut PipelineReport,
    ) -> Result<(), PipelineError> {
        let record = self.extractor.process(block)?;
        report.blocks_processed += 1;
        report.last_block = Some(block.index);
        log::trace!(
            "#{} rms {:.4} centroid {:.1} onset {}",
            block.index,
            record.rms,
            record.centroid,
            record.onset
        );
        self.emit(&record, report);
        Ok(())
    }

    fn emit(&mut self, record: &FeatureRecord, report: &mut PipelineReport) {
        match self.emitter.send(record) {
            Ok(()) => {
                if self.emitter_failing {
                    log::info!("Emitter {} recovered", self.emitter.name());
                    self.emitter_failing = false;
                }
            }
            Err(e) => {
                report.emitter_faults += 1;
                if !self.emitter_failing {
                    log::warn!("Emitter {}: {e}", self.emitter.name());
                    self.emitter_failing = true;
                }
            }
        }
    }
}
