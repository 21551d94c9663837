use thiserror::Error;

/// Errors surfaced by the feature-extraction pipeline.
///
/// Each variant names one failure kind and carries enough context
/// (offending parameter, block index) to diagnose it from a log line.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PipelineError {
    /// Invalid band/FFT/sample-rate parameters. Detected at startup, fatal.
    #[error("invalid configuration: {param} {reason}")]
    Config {
        /// Config path of the offending parameter (e.g. `features.bands`).
        param: &'static str,
        /// What is wrong with it.
        reason: String,
    },

    /// Capture device unavailable or stream dropped mid-run.
    #[error("capture fault: {0}")]
    CaptureFault(String),

    /// A malformed block reached the analyzer.
    #[error("invalid input at block {block_index}: {reason}")]
    InvalidInput {
        /// Index of the block that was rejected.
        block_index: u64,
        /// What is wrong with it.
        reason: String,
    },

    /// Downstream send failure. Never stops feature computation.
    #[error("emitter fault: {0}")]
    EmitterFault(String),
}

impl PipelineError {
    /// Shorthand for a [`PipelineError::Config`].
    pub fn config(param: &'static str, reason: impl Into<String>) -> Self {
        Self::Config {
            param,
            reason: reason.into(),
        }
    }

    /// `true` for the kinds that must end a run.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::EmitterFault(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_error_names_parameter() {
        let err = PipelineError::config("features.bands", "must be > 0 (got 0)");
        assert_eq!(
            err.to_string(),
            "invalid configuration: features.bands must be > 0 (got 0)"
        );
        assert!(err.is_fatal());
    }

    #[test]
    fn emitter_fault_is_not_fatal() {
        assert!(!PipelineError::EmitterFault("socket closed".into()).is_fatal());
    }
}
