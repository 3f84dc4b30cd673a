//! Command line tool for classifying tweets with a trained model

use anyhow::anyhow;
use burn::backend::{libtorch::LibTorchDevice, Autodiff, LibTorch};
use pico_args::Arguments;
use tweet_virality::{
    models::bert,
    pipelines::sequence_classification::virality::{
        batcher::Query, infer, inference::predicted_classes,
    },
};

type Backend = Autodiff<LibTorch>;

const HELP: &str = "\
Usage: infer [OPTIONS] TEXT...

Arguments:
  TEXT                 One or more tweets to classify

Options:
  -h, --help           Print help
  -a, --artifact-dir   The run directory to load (defaults to '<data-dir>/runs/<run-name>')
  -d, --data-dir       The path to the top-level data directory (defaults to 'data')
  --run-name           The training run to load (defaults to 'tweets')
  -f, --features       Comma-separated side feature values, applied to every tweet
  --cpu                Run on the CPU instead of the first CUDA device
";

#[derive(Debug)]
struct Args {
    artifact_dir: String,
    features: Vec<i32>,
    cpu: bool,
    texts: Vec<String>,
}

impl Args {
    fn parse() -> anyhow::Result<Option<Self>> {
        let mut pargs = Arguments::from_env();

        if pargs.contains(["-h", "--help"]) {
            return Ok(None);
        }

        let artifact_dir: Option<String> = pargs.opt_value_from_str(["-a", "--artifact-dir"])?;
        let data_dir: Option<String> = pargs.opt_value_from_str(["-d", "--data-dir"])?;
        let run_name: Option<String> = pargs.opt_value_from_str("--run-name")?;
        let features: Option<String> = pargs.opt_value_from_str(["-f", "--features"])?;
        let cpu = pargs.contains("--cpu");

        let artifact_dir = artifact_dir.unwrap_or_else(|| {
            format!(
                "{}/runs/{}",
                data_dir.as_deref().unwrap_or("data"),
                run_name.as_deref().unwrap_or("tweets")
            )
        });

        let features = match features {
            Some(values) => parse_features(&values)?,
            None => vec![],
        };

        let texts = pargs
            .finish()
            .into_iter()
            .map(|arg| {
                arg.into_string()
                    .map_err(|arg| anyhow!("Text is not valid UTF-8: {:?}", arg))
            })
            .collect::<anyhow::Result<Vec<_>>>()?;

        if texts.is_empty() {
            return Err(anyhow!("No text to classify. Run with --help for usage."));
        }

        Ok(Some(Args {
            artifact_dir,
            features,
            cpu,
            texts,
        }))
    }
}

fn parse_features(values: &str) -> anyhow::Result<Vec<i32>> {
    values
        .split(',')
        .filter(|value| !value.trim().is_empty())
        .map(|value| {
            value
                .trim()
                .parse::<i32>()
                .map_err(|e| anyhow!("Invalid feature value {:?}: {}", value, e))
        })
        .collect()
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    pretty_env_logger::formatted_builder()
        .parse_filters(&std::env::var("RUST_LOG").unwrap_or_else(|_| "warn".to_string()))
        .init();

    let Some(args) = Args::parse()? else {
        print!("{}", HELP);

        return Ok(());
    };

    let device = if args.cpu {
        LibTorchDevice::Cpu
    } else {
        LibTorchDevice::Cuda(0)
    };

    let queries = args
        .texts
        .iter()
        .map(|text| Query::new(text.clone(), args.features.clone()))
        .collect();

    // Get model predictions
    let (predictions, config) =
        infer::<Backend, bert::virality::Model<Backend>>(device, &args.artifact_dir, queries)?;

    let probabilities = predictions.clone().into_data().convert::<f32>().value;
    let n_classes = predictions.dims()[1];

    for (i, (text, class)) in args
        .texts
        .iter()
        .zip(predicted_classes(predictions))
        .enumerate()
    {
        let label = config
            .id2label
            .get(&class)
            .map(String::as_str)
            .unwrap_or("unknown");

        let row = &probabilities[i * n_classes..(i + 1) * n_classes];

        println!(
            "\n=== Tweet {i} ===\
             \n- Text: {text}\
             \n- Class: {label}\
             \n- Scores: {row:.3?}\
             \n================"
        );
    }

    Ok(())
}
