//! Command line tool to fine-tune a virality classifier

use anyhow::anyhow;
use burn::{
    backend::{libtorch::LibTorchDevice, Autodiff, LibTorch},
    config::Config as _,
};
use pico_args::Arguments;
use tweet_virality::{
    cli::{datasets::Dataset, models::Model},
    datasets::{tweets, Splits},
    models::bert,
    pipelines::sequence_classification::{
        config::Training,
        sampler::{BatchOrder, Sequential, WeightedRandom},
        virality,
    },
    tracking::{ArtifactKind, FileTracker, TrackingClient},
};

type Backend = Autodiff<LibTorch>;

const HELP: &str = "\
Usage: train [OPTIONS] [DATASET]

Arguments:
  DATASET                  The dataset to use (defaults to 'tweets')

Options:
  -h, --help               Print help
  -m, --model              The model to use (defaults to 'google/bert_uncased_L-2_H-128_A-2')
  -d, --data-dir           The path to the top-level data directory (defaults to 'data')
  -n, --num-epochs         Maximum number of epochs to train for
  -b, --batch-size         Batch size
  -l, --learning-rate      Initial learning rate
  -p, --patience           Epochs without validation improvement before stopping
  --run-name               Name of the run directory under <data-dir>/runs
  --config                 Load a saved training config (flags still override it)
  --no-features            Classify on text alone
  --freeze-encoder         Keep the pretrained encoder weights fixed
  --no-weighted-sampling   Draw training batches in shuffled order instead
  --cpu                    Train on the CPU instead of the first CUDA device
";

#[derive(Debug)]
struct Args {
    dataset: Option<String>,
    model: Option<String>,
    data_dir: Option<String>,
    num_epochs: Option<usize>,
    batch_size: Option<usize>,
    learning_rate: Option<f64>,
    patience: Option<usize>,
    run_name: Option<String>,
    config: Option<String>,
    no_features: bool,
    freeze_encoder: bool,
    no_weighted_sampling: bool,
    cpu: bool,
}

impl Args {
    fn parse() -> anyhow::Result<Option<Self>> {
        let mut pargs = Arguments::from_env();

        // Help has a higher priority and should be handled separately.
        if pargs.contains(["-h", "--help"]) {
            return Ok(None);
        }

        let args = Args {
            model: pargs.opt_value_from_str(["-m", "--model"])?,
            data_dir: pargs.opt_value_from_str(["-d", "--data-dir"])?,
            num_epochs: pargs.opt_value_from_str(["-n", "--num-epochs"])?,
            batch_size: pargs.opt_value_from_str(["-b", "--batch-size"])?,
            learning_rate: pargs.opt_value_from_str(["-l", "--learning-rate"])?,
            patience: pargs.opt_value_from_str(["-p", "--patience"])?,
            run_name: pargs.opt_value_from_str("--run-name")?,
            config: pargs.opt_value_from_str("--config")?,
            no_features: pargs.contains("--no-features"),
            freeze_encoder: pargs.contains("--freeze-encoder"),
            no_weighted_sampling: pargs.contains("--no-weighted-sampling"),
            cpu: pargs.contains("--cpu"),
            dataset: pargs.opt_free_from_str()?,
        };

        let remaining = pargs.finish();
        if !remaining.is_empty() {
            return Err(anyhow!("Unexpected arguments: {:?}", remaining));
        }

        Ok(Some(args))
    }

    /// Build the training config: a saved config if one was given, then the flags on top
    fn training(&self, dataset: &Dataset) -> anyhow::Result<Training> {
        let mut config = match &self.config {
            Some(path) => Training::load(path)
                .map_err(|e| anyhow!("Unable to load training config {}: {}", path, e))?,
            None => Training::new(
                Model::default_virality().to_string(),
                dataset.to_string(),
                dataset.labels(),
                dataset.features(),
            ),
        };

        if let Some(model) = &self.model {
            config.model_name = Model::try_from(model.as_str())?.to_string();
        }

        if let Some(data_dir) = &self.data_dir {
            config.data_dir = data_dir.to_string();
        }

        if let Some(num_epochs) = self.num_epochs {
            config.num_epochs = num_epochs;
        }

        if let Some(batch_size) = self.batch_size {
            config.batch_size = batch_size;
        }

        if let Some(learning_rate) = self.learning_rate {
            config.learning_rate = learning_rate;
        }

        if let Some(patience) = self.patience {
            config.early_stopping_patience = patience;
        }

        if let Some(run_name) = &self.run_name {
            config.run_name = run_name.to_string();
        }

        if self.no_features {
            config.features.clear();
        }

        if self.freeze_encoder {
            config.freeze_encoder = true;
        }

        if self.no_weighted_sampling {
            config.weighted_sampling = false;
        }

        Ok(config)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    pretty_env_logger::formatted_builder()
        .parse_filters(&std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()))
        .init();

    let Some(args) = Args::parse()? else {
        print!("{}", HELP);

        return Ok(());
    };

    let dataset = match &args.dataset {
        Some(name) => Dataset::try_from(name.as_str())?,
        None => Dataset::Tweets,
    };

    let config = args.training(&dataset)?;

    let items = match dataset {
        Dataset::Tweets => {
            tweets::load(&config.data_dir, &config.dataset_url, &config.features).await?
        }
    };

    let splits = Splits::stratified(items, config.seed);

    let order: Box<dyn BatchOrder> = if config.weighted_sampling {
        Box::new(WeightedRandom::by_class(&splits.train_labels(), config.seed)?)
    } else {
        Box::new(Sequential)
    };

    let tracker = TrackingClient::new(FileTracker::create(format!(
        "{}/tracking",
        config.artifact_dir()
    ))?);

    tracker.init(&config.run_name, &dataset.to_string(), &config)?;
    tracker.log_artifact(
        "training-script",
        ArtifactKind::Code,
        concat!(env!("CARGO_MANIFEST_DIR"), "/", file!()),
    )?;

    let device = if args.cpu {
        LibTorchDevice::Cpu
    } else {
        LibTorchDevice::Cuda(0)
    };

    let result = virality::train::<Backend, bert::virality::Model<Backend>, tweets::Item>(
        vec![device],
        splits,
        order,
        config,
        tracker.clone(),
    )
    .await;

    tracker.close()?;

    let summary = result?;

    println!(
        "Best epoch {}: validation accuracy {:.4}, test accuracy {:.4} (baseline {:.4})\nSaved to {}",
        summary.best_epoch,
        summary.valid_accuracy,
        summary.test_accuracy,
        summary.baseline_accuracy,
        summary.best_dir.display()
    );

    Ok(())
}
