/// Batching
pub mod batcher;

/// Inference routine
pub mod inference;

/// Item trait
pub mod item;

/// Loss selection by label cardinality
pub mod loss;

/// Model traits
pub mod model;

/// Model output
pub mod output;

/// Training routine
pub mod training;

pub use batcher::Batcher;
pub use inference::infer;
pub use item::Item;
pub use loss::Objective;
pub use model::{Model, ModelConfig};
pub use output::Output;
pub use training::train;
