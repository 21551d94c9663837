use std::io::{self, Write};

use sg_core::error::PipelineError;
use sg_core::record::FeatureRecord;
use sg_core::traits::FeatureEmitter;

/// Writes one JSON object per record, one per line.
///
/// Field order follows the wire contract:
/// `{"rms":..,"centroid":..,"bands":[..],"onset":..,"timestamp":..}`.
/// Each line is flushed as soon as it is written.
///
/// # Example
/// ```
/// use sg_core::{FeatureEmitter, FeatureRecord};
/// use sg_emit::JsonLinesEmitter;
///
/// let mut emitter = JsonLinesEmitter::new(Vec::new());
/// emitter.send(&FeatureRecord::silent(2, 1.0)).unwrap();
/// let line = String::from_utf8(emitter.into_inner()).unwrap();
/// assert!(line.starts_with("{\"rms\":0.0,"));
/// ```
pub struct JsonLinesEmitter<W> {
    out: W,
}

impl JsonLinesEmitter<io::Stdout> {
    #[must_use]
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl<W: Write + Send + 'static> JsonLinesEmitter<W> {
    #[must_use]
    pub fn new(out: W) -> Self {
        Self { out }
    }

    /// Give back the writer.
    #[must_use]
    pub fn into_inner(self) -> W {
        self.out
    }

    fn write_line(&mut self, record: &FeatureRecord) -> io::Result<()> {
        serde_json::to_writer(&mut self.out, record)?;
        self.out.write_all(b"\n")?;
        self.out.flush()
    }
}

impl<W: Write + Send + 'static> FeatureEmitter for JsonLinesEmitter<W> {
    fn send(&mut self, record: &FeatureRecord) -> Result<(), PipelineError> {
        self.write_line(record)
            .map_err(|e| PipelineError::EmitterFault(format!("JSON line write failed: {e}")))
    }

    fn name(&self) -> &'static str {
        "json-lines"
    }
}
