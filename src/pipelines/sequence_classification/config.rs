use std::collections::BTreeMap;

use burn::LearningRate;

use crate::datasets::tweets;

/// The common model configuration properties needed for the pipeline
#[derive(Clone, Debug)]
pub struct Config {
    /// The padding token ID
    pub pad_token_id: usize,

    /// The max position embeddings
    pub max_position_embeddings: usize,

    /// The size of the hidden state
    pub hidden_size: usize,

    /// An optional max sequence length, if different from max position embeddings
    pub max_seq_len: Option<usize>,

    /// The hidden dropout probability
    pub hidden_dropout_prob: f64,

    /// A mapping from class ids to class name labels
    pub id2label: BTreeMap<usize, String>,

    /// The number of side features each item carries
    pub n_features: usize,
}

/// Define configuration struct for the experiment
#[derive(burn::config::Config)]
pub struct Training {
    /// Maximum sequence length, in tokens
    #[config(default = 128)]
    pub max_seq_length: usize,

    /// Batch size
    #[config(default = 128)]
    pub batch_size: usize,

    /// Maximum number of epochs
    #[config(default = 20)]
    pub num_epochs: usize,

    /// Adam epsilon
    #[config(default = 1e-8)]
    pub adam_epsilon: f32,

    /// Initial learning rate
    #[config(default = 5e-5)]
    pub learning_rate: LearningRate,

    /// AdamW weight decay
    #[config(default = 1e-2)]
    pub weight_decay: f32,

    /// Learning rate warmup steps
    #[config(default = 1000)]
    pub warmup_steps: usize,

    /// Dropout rate in front of the classification head
    #[config(default = 0.2)]
    pub dropout: f64,

    /// Stop after this many epochs without a validation accuracy improvement
    #[config(default = 3)]
    pub early_stopping_patience: usize,

    /// Seed for the dataset split and the training sampler
    #[config(default = 69)]
    pub seed: u64,

    /// Report training metrics every this many steps
    #[config(default = 50)]
    pub logging_steps: usize,

    /// Keep the pretrained encoder weights fixed
    #[config(default = false)]
    pub freeze_encoder: bool,

    /// Draw training batches with inverse class frequency weights
    #[config(default = true)]
    pub weighted_sampling: bool,

    /// The location of the top-level data directory
    #[config(default = "\"data\".to_string()")]
    pub data_dir: String,

    /// Where to fetch the dataset from
    #[config(default = "tweets::DEFAULT_URL.to_string()")]
    pub dataset_url: String,

    /// Model name (e.g., "google/bert_uncased_L-2_H-128_A-2")
    pub model_name: String,

    /// Name of this training run
    pub run_name: String,

    /// Class labels, indexed by class id
    pub labels: Vec<String>,

    /// Side feature columns fed to the fusion head (empty for text only)
    pub features: Vec<String>,
}

impl Training {
    /// The directory holding checkpoints, tracking output and the best model for this run
    pub fn artifact_dir(&self) -> String {
        format!("{}/runs/{}", self.data_dir, self.run_name)
    }
}
