/// BERT with a feature-fusion head Configuration
pub mod config;

/// BERT with a feature-fusion head
pub mod model;

/// Training routine
pub mod train;

pub use config::Config;
pub use model::{Model, ModelRecord};
