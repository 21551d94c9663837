use crate::error::PipelineError;
use crate::record::FeatureRecord;

/// Reçoit un `FeatureRecord` par bloc traité et le transmet en aval.
///
/// Implémenté par : `OscEmitter`, `JsonLinesEmitter`, `BufferedEmitter`, `FanOut`.
///
/// CONTRAT : `send` must return within a negligible, bounded time. An
/// emitter that may stall has to buffer or drop on its own side
/// (`BufferedEmitter` does this for any inner emitter).
///
/// # Example
/// ```
/// use sg_core::traits::FeatureEmitter;
/// use sg_core::record::FeatureRecord;
/// use sg_core::error::PipelineError;
///
/// struct Discard;
/// impl FeatureEmitter for Discard {
///     fn send(&mut self, _record: &FeatureRecord) -> Result<(), PipelineError> { Ok(()) }
///     fn name(&self) -> &'static str { "discard" }
/// }
/// ```
pub trait FeatureEmitter: Send + 'static {
    /// Forward one record.
    ///
    /// # Errors
    /// Returns [`PipelineError::EmitterFault`] when the record could not be
    /// delivered. The pipeline logs it and keeps going.
    fn send(&mut self, record: &FeatureRecord) -> Result<(), PipelineError>;

    /// Nom lisible pour les logs.
    fn name(&self) -> &'static str;
}

impl<E: FeatureEmitter + ?Sized> FeatureEmitter for Box<E> {
    fn send(&mut self, record: &FeatureRecord) -> Result<(), PipelineError> {
        (**self).send(record)
    }

    fn name(&self) -> &'static str {
        (**self).name()
    }
}
