use std::{fs, path::PathBuf, sync::Arc};

use burn::{
    config::Config as _,
    data::{
        dataloader::{DataLoader, DataLoaderBuilder},
        dataset::InMemDataset,
    },
    lr_scheduler::noam::NoamLrSchedulerConfig,
    module::{AutodiffModule, Module},
    optim::AdamWConfig,
    record::{CompactRecorder, Recorder},
    tensor::backend::{AutodiffBackend, Backend},
    train::{
        checkpoint::KeepLastNCheckpoints,
        metric::{
            store::{Aggregate, Direction, Split},
            AccuracyMetric, CudaMetric, LearningRateMetric, LossMetric,
        },
        LearnerBuilder, MetricEarlyStoppingStrategy, StoppingCondition, ValidStep,
    },
};
use log::{debug, info};
use serde::Serialize;
use tokenizers::Tokenizer;

use crate::{
    datasets::Splits,
    pipelines::sequence_classification::{
        self, checkpoint,
        metrics::AccuracyAccumulator,
        sampler::{BatchOrder, SampledDataset},
    },
    tracking::{ArtifactKind, TrackingClient, TrackingRenderer},
    utils::hugging_face::download_hf_model,
};

use super::{batcher::Train, Batcher, Item, Model, ModelConfig, Output};

/// Training Config
pub type Config = sequence_classification::config::Training;

/// Training Error
#[derive(thiserror::Error, Debug)]
pub enum TrainingError {
    /// A split has no items
    #[error("the {0} split is empty")]
    EmptyDataset(&'static str),

    /// No device was given to train on
    #[error("no training device was given")]
    NoDevice,

    /// No saved epoch has a recorded validation accuracy
    #[error("no checkpoint with a recorded validation accuracy in {0}")]
    NoCheckpoint(String),
}

/// What a finished training run produced
#[derive(Clone, Debug, Serialize)]
pub struct Summary {
    /// The epoch whose checkpoint was kept
    pub best_epoch: usize,

    /// Epochs that completed validation before training stopped
    pub epochs: usize,

    /// Validation accuracy of the pretrained encoder with a fresh head
    pub baseline_accuracy: f64,

    /// Mean validation accuracy of the best epoch
    pub valid_accuracy: f64,

    /// Accuracy of the best checkpoint on the test split
    pub test_accuracy: f64,

    /// Where the best model and its config were exported
    pub best_dir: PathBuf,
}

/// Accuracy of a model over every batch of a data loader
pub fn evaluate<B, V>(model: &V, dataloader: Arc<dyn DataLoader<Train<B>>>) -> f64
where
    B: Backend,
    V: ValidStep<Train<B>, Output<B>>,
{
    let mut accuracy = AccuracyAccumulator::default();

    for batch in dataloader.iter() {
        let output = model.step(batch);
        accuracy.update(output.output, output.targets);
    }

    debug!("Evaluated {} items", accuracy.total());

    accuracy.value()
}

/// Define train function
pub async fn train<B, M, I>(
    devices: Vec<B::Device>,    // Device on which to perform computation (e.g., CPU or CUDA device)
    splits: Splits<I>,          // Stratified train, validation and test items
    order: Box<dyn BatchOrder>, // Order in which training items are served
    config: Config,             // Experiment configuration
    tracker: TrackingClient,    // Run tracking
) -> anyhow::Result<Summary>
where
    B: AutodiffBackend,
    M: Model<B> + 'static,
    I: Item + 'static,
    M::InnerModule: ValidStep<Train<B::InnerBackend>, Output<B::InnerBackend>>,
{
    for (split, items) in [
        ("training", &splits.train),
        ("validation", &splits.valid),
        ("test", &splits.test),
    ] {
        if items.is_empty() {
            return Err(TrainingError::EmptyDataset(split).into());
        }
    }

    let device = devices.first().cloned().ok_or(TrainingError::NoDevice)?;
    let artifact_dir = config.artifact_dir();

    fs::create_dir_all(&artifact_dir)?;
    config
        .save(format!("{artifact_dir}/training.json"))
        .map_err(|e| anyhow!("Unable to save the training config: {}", e))?;

    let (config_file, model_file) = download_hf_model(&config.model_name).await?;

    let model_config = M::Config::load_pretrained(config_file, &config)
        .await
        .map_err(|e| anyhow!("Unable to load pre-trained model config file: {}", e))?;

    let model = M::load_from_safetensors(&device, model_file, model_config.clone())?;

    info!(
        "Loaded {} with {} parameters",
        config.model_name,
        model.num_params()
    );

    // Initialize tokenizer
    let tokenizer = Tokenizer::from_pretrained(&config.model_name, None)
        .map_err(|e| anyhow!("Unable to load the tokenizer for {}: {}", config.model_name, e))?;

    // Initialize batchers for training and evaluation data
    let batcher_train = Batcher::<B>::new(
        tokenizer.clone(),
        model_config.get_config(),
        config.max_seq_length,
        device.clone(),
    )?;
    let batcher_valid = Batcher::<B::InnerBackend>::new(
        tokenizer,
        model_config.get_config(),
        config.max_seq_length,
        device.clone(),
    )?;

    let workers: usize = std::thread::available_parallelism()?.into();

    info!(
        "Training on {} items, validating on {}, testing on {}",
        splits.train.len(),
        splits.valid.len(),
        splits.test.len()
    );

    // The batch order decides which item each position serves
    let dataset_train = SampledDataset::new(InMemDataset::new(splits.train), order)?;

    let dataloader_train: Arc<dyn DataLoader<Train<B>>> = DataLoaderBuilder::new(batcher_train)
        .batch_size(config.batch_size)
        .shuffle(config.seed)
        .num_workers(workers)
        .build(dataset_train);

    let dataloader_valid: Arc<dyn DataLoader<Train<B::InnerBackend>>> =
        DataLoaderBuilder::new(batcher_valid.clone())
            .batch_size(config.batch_size * 2)
            .num_workers(workers)
            .build(InMemDataset::new(splits.valid));

    let dataloader_test: Arc<dyn DataLoader<Train<B::InnerBackend>>> =
        DataLoaderBuilder::new(batcher_valid)
            .batch_size(config.batch_size * 2)
            .num_workers(workers)
            .build(InMemDataset::new(splits.test));

    let baseline_accuracy = evaluate(&model.valid(), dataloader_valid.clone());
    info!("Validation accuracy before training: {:.4}", baseline_accuracy);
    tracker.log_metrics(0, [("eval/accuracy", baseline_accuracy)])?;

    // Initialize optimizer
    let optimizer = AdamWConfig::new()
        .with_epsilon(config.adam_epsilon)
        .with_weight_decay(config.weight_decay)
        .init();

    // Initialize learning rate scheduler
    let lr_scheduler = NoamLrSchedulerConfig::new(config.learning_rate)
        .with_warmup_steps(config.warmup_steps)
        .with_model_size(model_config.get_config().hidden_size)
        .init();

    let renderer = TrackingRenderer::new(tracker.clone(), config.logging_steps);

    // Initialize learner
    let learner = LearnerBuilder::new(&artifact_dir)
        .metric_train(CudaMetric::new())
        .metric_valid(CudaMetric::new())
        .metric_train_numeric(AccuracyMetric::new())
        .metric_valid_numeric(AccuracyMetric::new())
        .metric_train_numeric(LossMetric::new())
        .metric_valid_numeric(LossMetric::new())
        .metric_train_numeric(LearningRateMetric::new())
        .with_file_checkpointer(CompactRecorder::new())
        .with_checkpointing_strategy(KeepLastNCheckpoints::new(config.num_epochs))
        .early_stopping(MetricEarlyStoppingStrategy::new::<AccuracyMetric<B>>(
            Aggregate::Mean,
            Direction::Highest,
            Split::Valid,
            StoppingCondition::NoImprovementSince {
                n_epochs: config.early_stopping_patience,
            },
        ))
        .renderer(renderer.clone())
        .devices(devices)
        .num_epochs(config.num_epochs)
        .summary()
        .build(model, optimizer, lr_scheduler);

    // Train the model
    let model_trained = learner.fit(dataloader_train, dataloader_valid);
    renderer.finish();

    // The learner returns the last epoch; reload the epoch with the best validation accuracy
    let checkpoint_dir = checkpoint::directory(&artifact_dir);
    let history = renderer.validation_accuracy();
    let available = checkpoint::list_epochs(&checkpoint_dir)?;

    let best_epoch = checkpoint::select_best(&history, &available)
        .ok_or_else(|| TrainingError::NoCheckpoint(checkpoint_dir.display().to_string()))?;
    let valid_accuracy = history[&best_epoch];

    info!(
        "Best epoch {} of {} with validation accuracy {:.4}",
        best_epoch,
        history.len(),
        valid_accuracy
    );

    let record = CompactRecorder::new()
        .load(checkpoint::model_path(&checkpoint_dir, best_epoch), &device)
        .map_err(|e| {
            anyhow!(
                "Unable to load the checkpoint for epoch {}: {}",
                best_epoch,
                e
            )
        })?;
    let model_best = model_trained.load_record(record);

    let removed = checkpoint::retain_only(&checkpoint_dir, best_epoch)?;
    debug!("Removed {} checkpoint files", removed);

    // Save the configuration and the best model
    let best_dir = PathBuf::from(&artifact_dir).join("best");
    fs::create_dir_all(&best_dir)?;

    model_config
        .save(best_dir.join("config.json"))
        .map_err(|e| anyhow!("Unable to save the model config: {}", e))?;

    CompactRecorder::new()
        .record(model_best.clone().into_record(), best_dir.join("model"))
        .map_err(|e| anyhow!("Unable to save the best model: {}", e))?;

    let test_accuracy = evaluate(&model_best.valid(), dataloader_test);
    info!("Test accuracy of the best checkpoint: {:.4}", test_accuracy);

    tracker.log_metrics(renderer.step(), [("test/accuracy", test_accuracy)])?;
    tracker.log_artifact("best-model", ArtifactKind::Model, &best_dir)?;
    tracker.flush()?;

    let summary = Summary {
        best_epoch,
        epochs: history.len(),
        baseline_accuracy,
        valid_accuracy,
        test_accuracy,
        best_dir,
    };

    fs::write(
        format!("{artifact_dir}/summary.json"),
        serde_json::to_string_pretty(&summary)?,
    )?;

    Ok(summary)
}

#[cfg(test)]
mod tests {
    use burn::{
        backend::{Autodiff, NdArray},
        data::dataloader::batcher::Batcher as BatcherTrait,
        tensor::{Int, Tensor},
        train::ValidStep,
    };

    use crate::{
        datasets::tweets,
        models::bert,
        pipelines::sequence_classification::{
            batcher::Infer,
            sampler::Sequential,
            virality::batcher::Input,
        },
        tracking::tests::MemoryTracker,
    };

    use super::*;

    type B = NdArray;

    /// Collates bare labels into batches with placeholder text
    #[derive(Clone)]
    struct LabelBatcher;

    impl BatcherTrait<usize, Train<B>> for LabelBatcher {
        fn batch(&self, items: Vec<usize>) -> Train<B> {
            let device = Default::default();
            let batch_size = items.len();

            let tokens = Tensor::<B, 2, Int>::zeros([batch_size, 2], &device);
            let mask_pad = tokens.clone().equal_elem(1);

            let labels: Vec<i32> = items.iter().map(|&label| label as i32).collect();
            let targets = Tensor::<B, 1, Int>::from_ints(labels.as_slice(), &device);

            Train::new(Input::new(Infer::new(tokens, mask_pad), None), targets)
        }
    }

    /// Always predicts class 0
    struct Constant;

    impl ValidStep<Train<B>, Output<B>> for Constant {
        fn step(&self, item: Train<B>) -> Output<B> {
            let device = Default::default();
            let [batch_size] = item.targets.dims();

            let output = Tensor::<B, 2>::zeros([batch_size, 4], &device)
                .slice_assign([0..batch_size, 0..1], Tensor::ones([batch_size, 1], &device));

            Output::new(
                Tensor::zeros([1], &device),
                output,
                item.targets,
                Tensor::zeros([batch_size, 1, 1], &device),
            )
        }
    }

    #[test]
    fn evaluation_weights_batches_by_size() {
        let dataloader = DataLoaderBuilder::new(LabelBatcher)
            .batch_size(2)
            .build(InMemDataset::new(vec![0usize, 0, 1, 2, 0]));

        let accuracy = evaluate(&Constant, dataloader);

        assert!((accuracy - 0.6).abs() < 1e-9);
    }

    #[tokio::test]
    async fn rejects_an_empty_training_split() {
        type A = Autodiff<NdArray>;

        let item = tweets::Item::new("hello".to_string(), vec![], 0);
        let splits = Splits {
            train: vec![],
            valid: vec![item.clone()],
            test: vec![item],
        };

        let dir = tempfile::tempdir().unwrap();
        let config = Config::new(
            "google/bert_uncased_L-2_H-128_A-2".to_string(),
            "empty".to_string(),
            tweets::Virality::labels(),
            vec![],
        )
        .with_data_dir(dir.path().display().to_string());

        let tracker = TrackingClient::new(MemoryTracker::default());

        let err = train::<A, bert::virality::Model<A>, tweets::Item>(
            vec![Default::default()],
            splits,
            Box::new(Sequential),
            config,
            tracker,
        )
        .await
        .unwrap_err();

        assert!(matches!(
            err.downcast_ref::<TrainingError>(),
            Some(TrainingError::EmptyDataset("training"))
        ));
        assert!(!dir.path().join("runs").exists());
    }
}
