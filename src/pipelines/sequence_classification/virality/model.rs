use std::{fmt::Display, path::PathBuf};

use burn::{
    module::AutodiffModule,
    tensor::{backend::AutodiffBackend, Tensor},
    train::TrainStep,
};

use crate::pipelines::sequence_classification::{self, config::Training};

use super::{
    batcher::{Input, Train},
    Objective, Output,
};

/// A trait for models that can be used for Virality Classification
pub trait Model<B>: AutodiffModule<B> + TrainStep<Train<B>, Output<B>> + Display
where
    B: AutodiffBackend,
{
    /// The model configuration
    type Config: ModelConfig;

    /// Perform a forward pass
    fn forward(&self, item: Train<B>) -> Output<B>;

    /// Defines forward pass for inference, returning activated outputs: [batch_size, n_classes]
    fn infer(&self, input: Input<B>) -> Tensor<B, 2>;

    /// Load the pretrained encoder from a file, with a freshly initialized head
    fn load_from_safetensors(
        device: &B::Device,
        model_file: PathBuf,
        config: Self::Config,
    ) -> anyhow::Result<Self>;
}

/// A trait for configs that can be used for Virality Classification models
pub trait ModelConfig: burn::config::Config + Clone {
    /// Initialize the model
    fn init<B: AutodiffBackend>(&self, device: &B::Device) -> impl Model<B>;

    /// Load a pretrained model configuration and attach the run's labels and features
    fn load_pretrained(
        config_file: PathBuf,
        training: &Training,
    ) -> impl std::future::Future<Output = anyhow::Result<Self>> + Send;

    /// Return the Config needed for the sequence classification pipeline
    fn get_config(&self) -> sequence_classification::Config;

    /// The pretrained checkpoint name, used to fetch the matching tokenizer
    fn model_name(&self) -> &str;

    /// The same configuration with every dropout probability set to zero
    fn without_dropout(self) -> Self;

    /// The loss family implied by the configured labels
    fn objective(&self) -> Objective {
        Objective::for_classes(self.get_config().id2label.len())
    }
}
