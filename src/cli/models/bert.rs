/// Model Variants
/// --------------

/// The base model type
pub static MODEL_TYPE: &str = "bert";

/// BERT-Tiny: 2 layers, hidden size 128, 2 attention heads
pub static TINY_UNCASED: &str = "google/bert_uncased_L-2_H-128_A-2";

/// BERT-Mini: 4 layers, hidden size 256, 4 attention heads
pub static MINI_UNCASED: &str = "google/bert_uncased_L-4_H-256_A-4";

/// bert-base-uncased
pub static BASE_UNCASED: &str = "bert-base-uncased";

/// bert-base-cased
pub static BASE_CASED: &str = "bert-base-cased";

/// All available BERT models
pub static ALL_MODELS: &[&str; 4] = &[TINY_UNCASED, MINI_UNCASED, BASE_UNCASED, BASE_CASED];

/// Virality Classification
/// -----------------------

/// The default model to use
pub static DEFAULT_VIRALITY_MODEL: &str = TINY_UNCASED;
