/// CLI Indexes: BERT models
pub mod bert;

/// CLI Indexes: Available models
pub mod index;

pub use index::{Model, ModelError};
