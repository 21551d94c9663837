use anyhow::{Context, Result};
use sg_audio::capture::{CaptureSource, CpalCapture};
use sg_audio::file::{FileCapture, Pacing};
use sg_core::config::{EmitterKind, SonicConfig};
use sg_core::traits::FeatureEmitter;
use sg_emit::{BufferedEmitter, FanOut, JsonLinesEmitter, OscEmitter};

/// Build the emitter chain for `[emitter]`/`[osc]`.
///
/// Every transport runs on its own thread behind a queue of
/// `emitter.queue_depth` records, so the analysis thread never waits on it.
///
/// # Errors
/// Returns an error if the OSC host does not resolve or a thread cannot start.
pub fn build_emitter(config: &SonicConfig) -> Result<Box<dyn FeatureEmitter>> {
    let depth = config.emitter.queue_depth;
    let osc = || -> Result<Box<dyn FeatureEmitter>> {
        let emitter = OscEmitter::connect(&config.osc).context("OSC emitter")?;
        Ok(Box::new(BufferedEmitter::spawn(emitter, depth)?))
    };
    let stdout = || -> Result<Box<dyn FeatureEmitter>> {
        Ok(Box::new(BufferedEmitter::spawn(JsonLinesEmitter::stdout(), depth)?))
    };

    Ok(match config.emitter.kind {
        EmitterKind::Osc => osc()?,
        EmitterKind::Stdout => stdout()?,
        EmitterKind::Both => Box::new(FanOut::new(vec![osc()?, stdout()?])),
    })
}

/// Live device capture, or replay of an already decoded file.
#[must_use]
pub fn build_capture(file: Option<FileCapture>, fast: bool) -> Box<dyn CaptureSource> {
    match file {
        Some(file) => {
            let pacing = if fast { Pacing::Backpressure } else { Pacing::Realtime };
            Box::new(file.with_pacing(pacing))
        }
        None => Box::new(CpalCapture::new()),
    }
}
