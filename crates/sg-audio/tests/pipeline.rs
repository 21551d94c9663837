use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use sg_audio::bands::BandTable;
use sg_audio::capture::{CaptureSource, FaultSender};
use sg_audio::file::{FileCapture, Pacing};
use sg_audio::pipeline::{Pipeline, PipelineReport};
use sg_audio::queue::BlockProducer;
use sg_core::clock::TimestampSource;
use sg_core::config::{DeviceSelector, SonicConfig, StopPolicy};
use sg_core::{FeatureEmitter, FeatureRecord, PipelineError};

#[derive(Clone, Default)]
struct Collector {
    records: Arc<Mutex<Vec<FeatureRecord>>>,
    delay: Duration,
}

impl Collector {
    fn slow(delay: Duration) -> Self {
        Self {
            delay,
            ..Self::default()
        }
    }

    fn take(&self) -> Vec<FeatureRecord> {
        std::mem::take(&mut *self.records.lock().unwrap())
    }
}

impl FeatureEmitter for Collector {
    fn send(&mut self, record: &FeatureRecord) -> Result<(), PipelineError> {
        if !self.delay.is_zero() {
            thread::sleep(self.delay);
        }
        self.records.lock().unwrap().push(record.clone());
        Ok(())
    }

    fn name(&self) -> &'static str {
        "collector"
    }
}

/// Pushes its blocks from `start` and keeps the queue open until `stop`.
struct Held {
    blocks: Vec<Vec<f32>>,
    sink: Option<BlockProducer>,
    started: Arc<AtomicBool>,
}

impl Held {
    fn new(blocks: Vec<Vec<f32>>) -> Self {
        Self {
            blocks,
            sink: None,
            started: Arc::new(AtomicBool::new(false)),
        }
    }
}

impl CaptureSource for Held {
    fn start(
        &mut self,
        _sample_rate: u32,
        _block_size: usize,
        _device: Option<&DeviceSelector>,
        mut sink: BlockProducer,
        _faults: FaultSender,
    ) -> Result<(), PipelineError> {
        self.started.store(true, Ordering::SeqCst);
        for block in &self.blocks {
            sink.push_mono(block);
        }
        self.sink = Some(sink);
        Ok(())
    }

    fn stop(&mut self) {
        self.sink = None;
    }

    fn name(&self) -> &'static str {
        "held"
    }
}

/// Keeps pushing blocks from its own thread, even after reporting a fault.
struct Faulty {
    fault_after: u64,
    running: Arc<AtomicBool>,
    feeder: Option<JoinHandle<()>>,
}

impl Faulty {
    fn new(fault_after: u64) -> Self {
        Self {
            fault_after,
            running: Arc::new(AtomicBool::new(false)),
            feeder: None,
        }
    }
}

impl CaptureSource for Faulty {
    fn start(
        &mut self,
        _sample_rate: u32,
        block_size: usize,
        _device: Option<&DeviceSelector>,
        mut sink: BlockProducer,
        faults: FaultSender,
    ) -> Result<(), PipelineError> {
        self.running.store(true, Ordering::SeqCst);
        let running = Arc::clone(&self.running);
        let fault_after = self.fault_after;
        self.feeder = Some(thread::spawn(move || {
            let block = vec![0.1; block_size];
            let mut pushed = 0;
            while running.load(Ordering::SeqCst) {
                sink.push_mono(&block);
                pushed += 1;
                if pushed == fault_after {
                    let _ = faults.send(PipelineError::CaptureFault("xrun".into()));
                }
                thread::sleep(Duration::from_millis(5));
            }
        }));
        Ok(())
    }

    fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(feeder) = self.feeder.take() {
            feeder.join().unwrap();
        }
    }

    fn name(&self) -> &'static str {
        "faulty"
    }
}

fn sine(freq: f32, amplitude: f32, len: usize, sample_rate: u32) -> Vec<f32> {
    (0..len)
        .map(|n| amplitude * (2.0 * std::f32::consts::PI * freq * n as f32 / sample_rate as f32).sin())
        .collect()
}

fn run_to_end(config: &SonicConfig, samples: Vec<f32>, emitter: Collector) -> PipelineReport {
    let source = FileCapture::from_samples(samples, config.audio.sample_rate)
        .with_pacing(Pacing::Backpressure);
    let pipeline = Pipeline::start(config, Box::new(source), Box::new(emitter)).unwrap();
    for _ in 0..1000 {
        if pipeline.is_finished() {
            break;
        }
        thread::sleep(Duration::from_millis(5));
    }
    assert!(pipeline.is_finished(), "pipeline did not reach end of input");
    pipeline.stop()
}

#[test]
fn silence_then_tone_end_to_end() {
    let mut config = SonicConfig::default();
    config.audio.sample_rate = 44100;
    config.audio.block_size = 1024;
    config.features.bands = 12;

    let mut samples = vec![0.0f32; 1024];
    samples.extend(sine(440.0, 1.0, 1024, 44100));

    let collector = Collector::default();
    let report = run_to_end(&config, samples, collector.clone());
    assert!(report.is_clean(), "{report}");
    assert_eq!(report.blocks_processed, 2);

    let records = collector.take();
    assert_eq!(records.len(), 2);

    let silent = &records[0];
    assert_eq!(silent.rms, 0.0);
    assert_eq!(silent.centroid, 0.0);
    assert_eq!(silent.bands, vec![0.0; 12]);
    assert!(!silent.onset);

    let tone = &records[1];
    assert!((tone.rms - std::f32::consts::FRAC_1_SQRT_2).abs() < 0.007, "rms {}", tone.rms);
    let table = BandTable::build(12, 1024, 44100, 20.0, None).unwrap();
    let band = table.band_of(440.0).unwrap();
    for (i, &energy) in tone.bands.iter().enumerate() {
        if i != band {
            assert!(tone.bands[band] > energy, "band {i} rivals the 440 Hz band");
        }
    }
}

#[test]
fn one_record_per_block_in_order() {
    let mut config = SonicConfig::default();
    config.audio.block_size = 512;
    config.audio.timestamp = TimestampSource::Stream;

    let blocks = 60;
    let samples: Vec<f32> = (0..blocks)
        .flat_map(|b| sine(200.0 + 50.0 * b as f32, 0.5, 512, 44100))
        .collect();

    let collector = Collector::default();
    let report = run_to_end(&config, samples, collector.clone());
    assert_eq!(report.dropped_blocks, 0);
    assert_eq!(report.last_block, Some(blocks - 1));

    let records = collector.take();
    assert_eq!(records.len(), blocks as usize);
    for (i, pair) in records.windows(2).enumerate() {
        assert_eq!(pair[0].block_index, i as u64);
        assert_eq!(pair[1].block_index, i as u64 + 1);
        assert!(pair[1].timestamp >= pair[0].timestamp);
    }
}

#[test]
fn drain_on_stop_processes_everything_queued() {
    let mut config = SonicConfig::default();
    config.audio.block_size = 256;
    config.queue.on_stop = StopPolicy::Drain;

    let collector = Collector::slow(Duration::from_millis(10));
    let capture = Held::new(vec![vec![0.2; 256]; 10]);
    let pipeline = Pipeline::start(&config, Box::new(capture), Box::new(collector.clone())).unwrap();
    let report = pipeline.stop();
    assert_eq!(report.blocks_processed, 10);
    assert_eq!(report.discarded_blocks, 0);
    assert_eq!(collector.take().len(), 10);
}

#[test]
fn discard_on_stop_skips_queued_blocks() {
    let mut config = SonicConfig::default();
    config.audio.block_size = 256;
    config.queue.on_stop = StopPolicy::Discard;

    let collector = Collector::slow(Duration::from_millis(50));
    let capture = Held::new(vec![vec![0.2; 256]; 10]);
    let pipeline = Pipeline::start(&config, Box::new(capture), Box::new(collector)).unwrap();
    let report = pipeline.stop();
    assert!(report.discarded_blocks > 0, "{report}");
    assert_eq!(report.blocks_processed + report.discarded_blocks, 10);
}

#[test]
fn invalid_config_never_touches_capture() {
    let mut config = SonicConfig::default();
    config.features.bands = 0;

    let capture = Held::new(Vec::new());
    let started = Arc::clone(&capture.started);
    let err = Pipeline::start(&config, Box::new(capture), Box::new(Collector::default()))
        .err()
        .unwrap();
    assert!(matches!(err, PipelineError::Config { param: "features.bands", .. }));
    assert!(!started.load(Ordering::SeqCst));
}

#[test]
fn non_finite_block_stops_with_last_good_index() {
    let mut config = SonicConfig::default();
    config.audio.block_size = 256;

    let mut bad = vec![0.1; 256];
    bad[17] = f32::NAN;
    let capture = Held::new(vec![vec![0.1; 256], vec![0.1; 256], bad, vec![0.1; 256]]);
    let pipeline = Pipeline::start(&config, Box::new(capture), Box::new(Collector::default())).unwrap();
    for _ in 0..400 {
        if pipeline.is_finished() {
            break;
        }
        thread::sleep(Duration::from_millis(5));
    }
    let report = pipeline.stop();
    assert!(matches!(
        report.fault,
        Some(PipelineError::InvalidInput { block_index: 2, .. })
    ));
    assert_eq!(report.last_block, Some(1));
    assert_eq!(report.blocks_processed, 2);
}

#[test]
fn capture_fault_ends_run_while_source_keeps_pushing() {
    let mut config = SonicConfig::default();
    config.audio.block_size = 256;
    config.queue.on_stop = StopPolicy::Drain;

    let pipeline = Pipeline::start(&config, Box::new(Faulty::new(3)), Box::new(Collector::default())).unwrap();
    let started = Instant::now();
    while !pipeline.is_finished() && started.elapsed() < Duration::from_secs(2) {
        thread::sleep(Duration::from_millis(5));
    }
    assert!(pipeline.is_finished(), "analysis kept waiting on a faulted source");
    assert!(started.elapsed() < Duration::from_secs(1));

    let report = pipeline.stop();
    assert!(matches!(report.fault, Some(PipelineError::CaptureFault(_))), "{report}");
    assert!(report.blocks_processed >= 1);
    assert!(report.blocks_processed < 20, "{report}");
}
