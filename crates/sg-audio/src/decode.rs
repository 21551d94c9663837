use std::fs::File;
use std::path::Path;

use anyhow::{Context, Result};
use symphonia::core::audio::{Channels, SampleBuffer};
use symphonia::core::codecs::DecoderOptions;
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::{MediaSourceStream, MediaSourceStreamOptions};
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

/// A whole file decoded to mono.
#[derive(Debug, Clone)]
pub struct DecodedAudio {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
    /// Channel count before the downmix.
    pub source_channels: usize,
}

impl DecodedAudio {
    /// Duration in seconds.
    #[must_use]
    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f64 / f64::from(self.sample_rate)
    }
}

/// Decode an audio file into mono f32 samples at its native rate.
///
/// Supports WAV, MP3, FLAC, OGG, AAC via symphonia.
///
/// # Errors
/// Returns an error if the file cannot be opened, probed, or has no track
/// with a known sample rate.
///
/// # Example
/// ```no_run
/// use sg_audio::decode::decode_file;
/// let audio = decode_file("take.wav").unwrap();
/// println!("{} s @ {} Hz", audio.duration_secs(), audio.sample_rate);
/// ```
pub fn decode_file(path: impl AsRef<Path>) -> Result<DecodedAudio> {
    let path = path.as_ref();
    let file =
        File::open(path).with_context(|| format!("Cannot open audio file: {}", path.display()))?;
    let mss = MediaSourceStream::new(Box::new(file), MediaSourceStreamOptions::default());

    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .context("Failed to probe audio format")?;

    let mut format = probed.format;
    let track = format
        .default_track()
        .context("No default audio track found")?;

    let sample_rate = track
        .codec_params
        .sample_rate
        .context("Audio track does not declare a sample rate")?;
    let channels = track.codec_params.channels.map_or(1, Channels::count);

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .context("Failed to create audio decoder")?;

    let track_id = track.id;
    let mut samples: Vec<f32> = Vec::new();
    let mut sample_buf: Option<SampleBuffer<f32>> = None;

    loop {
        let packet = match format.next_packet() {
            Ok(p) => p,
            Err(SymphoniaError::IoError(ref e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                break;
            }
            Err(SymphoniaError::ResetRequired) => {
                log::warn!("Stream reset mid-file, stopping decode: {}", path.display());
                break;
            }
            Err(e) => {
                log::warn!("Audio decode packet error: {e}");
                break;
            }
        };

        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(d) => d,
            Err(SymphoniaError::DecodeError(e)) => {
                log::warn!("Skipping corrupt audio frame: {e}");
                continue;
            }
            Err(e) => {
                log::warn!("Audio decode frame error: {e}");
                break;
            }
        };

        let spec = *decoded.spec();
        let frames = decoded.capacity();
        // reallocate only when a packet outgrows the buffer
        if sample_buf
            .as_ref()
            .is_none_or(|b| b.capacity() < frames * spec.channels.count())
        {
            sample_buf = Some(SampleBuffer::<f32>::new(frames as u64, spec));
        }
        let Some(buf) = sample_buf.as_mut() else {
            continue;
        };
        buf.copy_interleaved_ref(decoded);

        let ch = spec.channels.count().max(1);
        samples.extend(
            buf.samples()
                .chunks(ch)
                .map(|frame| frame.iter().sum::<f32>() / ch as f32),
        );
    }

    log::info!(
        "Decoded {:.1} s ({} samples, {channels} ch → mono) @ {sample_rate} Hz from {}",
        samples.len() as f64 / f64::from(sample_rate.max(1)),
        samples.len(),
        path.display()
    );

    Ok(DecodedAudio {
        samples,
        sample_rate,
        source_channels: channels,
    })
}
