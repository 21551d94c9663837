use sg_core::error::PipelineError;
use sg_core::record::FeatureRecord;
use sg_core::traits::FeatureEmitter;

/// Sends every record to several emitters.
///
/// A failing emitter does not keep the record from the others; the first
/// failure of the round is returned.
#[derive(Default)]
pub struct FanOut {
    emitters: Vec<Box<dyn FeatureEmitter>>,
}

impl FanOut {
    #[must_use]
    pub fn new(emitters: Vec<Box<dyn FeatureEmitter>>) -> Self {
        Self { emitters }
    }

    pub fn push(&mut self, emitter: Box<dyn FeatureEmitter>) {
        self.emitters.push(emitter);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.emitters.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.emitters.is_empty()
    }
}

impl FeatureEmitter for FanOut {
    fn send(&mut self, record: &FeatureRecord) -> Result<(), PipelineError> {
        let mut first = None;
        for emitter in &mut self.emitters {
            if let Err(e) = emitter.send(record) {
                log::trace!("{} failed: {e}", emitter.name());
                first.get_or_insert(e);
            }
        }
        first.map_or(Ok(()), Err)
    }

    fn name(&self) -> &'static str {
        "fan-out"
    }
}
