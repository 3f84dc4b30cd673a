use burn::{
    config::Config as _,
    data::dataloader::batcher::Batcher as BatcherTrait,
    module::Module,
    record::{CompactRecorder, Recorder},
    tensor::{
        backend::{AutodiffBackend, Backend},
        Tensor,
    },
};
use tokenizers::Tokenizer;

use crate::pipelines::sequence_classification::config::Training;

use super::{
    batcher::{Input, Query},
    Batcher, Model, ModelConfig,
};

/// Define inference function
pub fn infer<B: AutodiffBackend, M: Model<B> + 'static>(
    device: B::Device,     // Device on which to perform computation (e.g., CPU or CUDA device)
    artifact_dir: &str,    // The run directory holding `training.json` and `best/`
    queries: Vec<Query>,   // Tweets to classify
) -> anyhow::Result<(Tensor<B, 2>, M::Config)> {
    let best_dir = format!("{artifact_dir}/best");

    // Load experiment configuration
    let training = Training::load(format!("{artifact_dir}/training.json").as_str())
        .map_err(|e| anyhow!("Unable to load training config file: {}", e))?;

    let model_config = M::Config::load(format!("{best_dir}/config.json").as_str())
        .map_err(|e| anyhow!("Unable to load config file: {}", e))?
        .without_dropout();

    // Initialize tokenizer
    let tokenizer = Tokenizer::from_pretrained(model_config.model_name(), None).map_err(|e| {
        anyhow!(
            "Unable to load the tokenizer for {}: {}",
            model_config.model_name(),
            e
        )
    })?;

    // Initialize batcher for batching samples
    let batcher = Batcher::<B>::new(
        tokenizer,
        model_config.get_config(),
        training.max_seq_length,
        device.clone(),
    )?;

    if let Some(query) = queries
        .iter()
        .find(|query| query.features.len() != batcher.n_features())
    {
        return Err(anyhow!(
            "Expected {} features per tweet but got {} for {:?}",
            batcher.n_features(),
            query.features.len(),
            query.text
        ));
    }

    // Load trained model weights
    let record = CompactRecorder::new()
        .load(format!("{best_dir}/model").into(), &device)
        .map_err(|e| anyhow!("Unable to load trained model weights: {}", e))?;

    // Create model using loaded weights
    let model = model_config.init::<B>(&device).load_record(record);

    let input: Input<B> = batcher.batch(queries);
    let predictions = model.infer(input);

    // Return the config for reference
    Ok((predictions, model_config))
}

/// The most likely class for each row of a `[batch_size, n_classes]` prediction
pub fn predicted_classes<B: Backend>(predictions: Tensor<B, 2>) -> Vec<usize> {
    predictions
        .argmax(1)
        .into_data()
        .convert::<i64>()
        .value
        .into_iter()
        .map(|class| class as usize)
        .collect()
}

#[cfg(test)]
mod tests {
    use burn::backend::NdArray;
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn picks_the_most_likely_class_per_row() {
        let predictions = Tensor::<NdArray, 2>::from_floats(
            [[0.1, 0.7, 0.1, 0.1], [0.05, 0.05, 0.1, 0.8], [0.4, 0.3, 0.2, 0.1]],
            &Default::default(),
        );

        assert_eq!(predicted_classes(predictions), vec![1, 3, 0]);
    }

    #[test]
    fn missing_run_directory_is_an_error() {
        type A = burn::backend::Autodiff<NdArray>;
        let dir = tempfile::tempdir().unwrap();

        let result = infer::<A, crate::models::bert::virality::Model<A>>(
            Default::default(),
            dir.path().to_str().unwrap(),
            vec![Query::new("hello".to_string(), vec![])],
        );

        assert!(result.is_err());
    }
}
