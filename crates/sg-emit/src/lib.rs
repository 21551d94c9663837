// Feature emitters: where records go once a block has been analyzed.

pub mod buffered;
pub mod fanout;
pub mod json;
pub mod osc;

pub use buffered::BufferedEmitter;
pub use fanout::FanOut;
pub use json::JsonLinesEmitter;
pub use osc::OscEmitter;
