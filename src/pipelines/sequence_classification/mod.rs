/// Virality classification: text plus side features
pub mod virality;

/// Common batcher operations for Sequence Classification
pub mod batcher;

/// Per-epoch checkpoint selection
pub mod checkpoint;

/// Common config for Sequence Classification
pub mod config;

/// Accuracy computation
pub mod metrics;

/// Batch order strategies
pub mod sampler;

pub use batcher::Batcher;
pub use config::Config;
