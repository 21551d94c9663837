use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{FromSample, Sample, SampleFormat, SizedSample};
use sg_core::config::DeviceSelector;
use sg_core::error::PipelineError;

use crate::queue::BlockProducer;

/// Where capture sources report faults after `start` returned.
pub type FaultSender = flume::Sender<PipelineError>;

/// Fournit des blocs audio au pipeline.
///
/// Implémenté par : `CpalCapture` (live device), `FileCapture` (decoded file).
///
/// CONTRAT : the delivery path (driver callback or feeder thread) must never
/// block on the analysis side. It only pushes into `sink`.
pub trait CaptureSource {
    /// Start delivering mono samples into `sink`.
    ///
    /// # Errors
    /// Returns [`PipelineError::CaptureFault`] if the device or file cannot
    /// deliver `sample_rate` Hz audio.
    fn start(
        &mut self,
        sample_rate: u32,
        block_size: usize,
        device: Option<&DeviceSelector>,
        sink: BlockProducer,
        faults: FaultSender,
    ) -> Result<(), PipelineError>;

    /// Halt delivery. Idempotent. Dropping the sink discards any partial block.
    fn stop(&mut self);

    /// Nom lisible pour les logs.
    fn name(&self) -> &'static str;
}

/// Audio capture via cpal.
///
/// Downmixes the device's channels to mono inside the driver callback and
/// hands samples to the block queue.
///
/// # Example
/// ```no_run
/// use sg_audio::capture::{CaptureSource, CpalCapture};
/// use sg_audio::queue::block_queue;
///
/// let (producer, _consumer) = block_queue(1024, 32);
/// let (faults, _fault_rx) = flume::bounded(4);
/// let mut capture = CpalCapture::new();
/// capture.start(44100, 1024, None, producer, faults).unwrap();
/// ```
#[derive(Default)]
pub struct CpalCapture {
    stream: Option<cpal::Stream>,
    device_name: Option<String>,
}

impl CpalCapture {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Name of the opened device, once started.
    #[must_use]
    pub fn device_name(&self) -> Option<&str> {
        self.device_name.as_deref()
    }
}

impl CaptureSource for CpalCapture {
    fn start(
        &mut self,
        sample_rate: u32,
        block_size: usize,
        device: Option<&DeviceSelector>,
        sink: BlockProducer,
        faults: FaultSender,
    ) -> Result<(), PipelineError> {
        debug_assert_eq!(sink.block_size(), block_size);
        self.stop();

        let host = cpal::default_host();
        let device = select_device(&host, device)?;
        let name = device.name().unwrap_or_else(|_| "<unnamed>".to_string());

        let range = device
            .supported_input_configs()
            .map_err(|e| fault(format!("cannot query input configs of {name}: {e}")))?
            .filter(|r| {
                format_rank(r.sample_format()).is_some()
                    && r.min_sample_rate().0 <= sample_rate
                    && sample_rate <= r.max_sample_rate().0
            })
            .min_by_key(|r| (format_rank(r.sample_format()), r.channels()))
            .ok_or_else(|| fault(format!("{name} cannot capture at {sample_rate} Hz")))?;

        let supported = range.with_sample_rate(cpal::SampleRate(sample_rate));
        let format = supported.sample_format();
        let config: cpal::StreamConfig = supported.into();

        let stream = match format {
            SampleFormat::F32 => build_stream::<f32>(&device, &config, sink, faults),
            SampleFormat::I16 => build_stream::<i16>(&device, &config, sink, faults),
            SampleFormat::U16 => build_stream::<u16>(&device, &config, sink, faults),
            other => return Err(fault(format!("unsupported sample format {other}"))),
        }
        .map_err(|e| fault(format!("cannot open input stream on {name}: {e}")))?;

        stream
            .play()
            .map_err(|e| fault(format!("cannot start input stream on {name}: {e}")))?;

        log::info!(
            "Capture started on {name}: {sample_rate} Hz, {} ch {format}, blocks of {block_size}",
            config.channels
        );
        self.stream = Some(stream);
        self.device_name = Some(name);
        Ok(())
    }

    fn stop(&mut self) {
        if let Some(stream) = self.stream.take() {
            if let Err(e) = stream.pause() {
                log::debug!("Pausing input stream failed: {e}");
            }
            // dropping the stream drops the callback and with it the queue producer
            drop(stream);
            log::info!("Capture stopped");
        }
    }

    fn name(&self) -> &'static str {
        "cpal"
    }
}

impl Drop for CpalCapture {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Input devices of the default host, as `(index, name)`.
///
/// Indices match [`DeviceSelector::Index`].
///
/// # Errors
/// Returns an error if the host cannot enumerate devices.
pub fn list_input_devices() -> anyhow::Result<Vec<(usize, String)>> {
    let host = cpal::default_host();
    Ok(host
        .input_devices()?
        .enumerate()
        .map(|(i, d)| (i, d.name().unwrap_or_else(|_| "<unnamed>".to_string())))
        .collect())
}

fn select_device(
    host: &cpal::Host,
    selector: Option<&DeviceSelector>,
) -> Result<cpal::Device, PipelineError> {
    let Some(selector) = selector else {
        return host
            .default_input_device()
            .ok_or_else(|| fault("no default input device"));
    };

    let mut devices = host
        .input_devices()
        .map_err(|e| fault(format!("cannot enumerate input devices: {e}")))?;
    let found = match selector {
        DeviceSelector::Index(i) => devices.nth(*i),
        DeviceSelector::Name(needle) => {
            let needle = needle.to_lowercase();
            devices.find(|d| {
                d.name()
                    .is_ok_and(|n| n.to_lowercase().contains(&needle))
            })
        }
    };
    found.ok_or_else(|| fault(format!("input device {selector} not found")))
}

/// Preference order among the formats the callback can convert.
fn format_rank(format: SampleFormat) -> Option<u8> {
    match format {
        SampleFormat::F32 => Some(0),
        SampleFormat::I16 => Some(1),
        SampleFormat::U16 => Some(2),
        _ => None,
    }
}

fn build_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    mut sink: BlockProducer,
    faults: FaultSender,
) -> Result<cpal::Stream, cpal::BuildStreamError>
where
    T: SizedSample,
    f32: FromSample<T>,
{
    let channels = usize::from(config.channels);
    device.build_input_stream(
        config,
        move |data: &[T], _: &cpal::InputCallbackInfo| {
            sink.push_interleaved(data, channels, <f32 as Sample>::from_sample::<T>);
        },
        move |err| {
            log::error!("Audio stream error: {err}");
            let _ = faults.try_send(PipelineError::CaptureFault(err.to_string()));
        },
        None,
    )
}

fn fault(msg: impl Into<String>) -> PipelineError {
    PipelineError::CaptureFault(msg.into())
}
