pub mod config;
pub mod flatten;
pub mod metadata;
pub mod pipeline;
pub mod rebalance;
pub mod scaler;
pub mod sequence;
pub mod split;
pub mod writer;

pub use config::PipelineConfig;
pub use pipeline::Pipeline;
pub use sequence::SequenceSet;
