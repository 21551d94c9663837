/// Configuration, types, and shared structures for sonicgeo.
///
/// This crate holds the data model of the pipeline (blocks, feature records),
/// its configuration, the error taxonomy, and the emitter seam shared by the
/// analysis and transport crates.

pub mod block;
pub mod clock;
pub mod config;
pub mod error;
pub mod record;
pub mod traits;

pub use block::AudioBlock;
pub use config::{OnsetMode, OnsetParams, SonicConfig};
pub use error::PipelineError;
pub use record::FeatureRecord;
pub use traits::FeatureEmitter;
