use std::path::PathBuf;

use bert_burn::{
    data::BertInferenceBatch,
    model::{BertModel, BertModelOutput},
};
use burn::{
    module::Module,
    nn::{Dropout, Linear},
    tensor::{
        activation::relu,
        backend::{AutodiffBackend, Backend},
        Int, Tensor,
    },
};

use crate::{
    models::bert::virality::Config,
    pipelines::sequence_classification::virality::{
        self,
        batcher::{Input, Train},
        Objective, Output,
    },
};

/// Down-projection from the encoder's summary vector
#[derive(Module, Debug)]
pub struct Reducer<B: Backend> {
    /// Dropout applied to the summary vector
    pub dropout: Dropout,

    /// hidden_size -> hidden_size / 3
    pub hidden: Linear<B>,

    /// hidden_size / 3 -> class count, or feature count when fusing features
    pub output: Linear<B>,
}

impl<B: Backend> Reducer<B> {
    /// Project a [batch_size, hidden_size] summary
    pub fn forward(&self, summary: Tensor<B, 2>) -> Tensor<B, 2> {
        let x = self.dropout.forward(summary);
        let x = relu(self.hidden.forward(x));

        self.output.forward(x)
    }
}

/// Feed-forward classifier over the reduced text vector concatenated with the side features
#[derive(Module, Debug)]
pub struct Classifier<B: Backend> {
    /// 2 * n_features -> n_features
    pub hidden: Linear<B>,

    /// n_features -> n_classes
    pub output: Linear<B>,
}

impl<B: Backend> Classifier<B> {
    /// Classify a [batch_size, 2 * n_features] fused vector
    pub fn forward(&self, fused: Tensor<B, 2>) -> Tensor<B, 2> {
        let x = relu(self.hidden.forward(fused));

        self.output.forward(x)
    }
}

/// BERT with a feature-fusion head for virality classification
#[derive(Module, Debug)]
pub struct Model<B: Backend> {
    /// The base BERT model
    pub encoder: BertModel<B>,

    /// Down-projection of the first token's hidden state
    pub reducer: Reducer<B>,

    /// Fusion classifier, present when side features are configured
    pub classifier: Option<Classifier<B>>,

    /// Total number of classes
    pub n_classes: usize,
}

/// Define model behavior
impl<B: Backend> Model<B> {
    /// The loss family for this head
    pub fn objective(&self) -> Objective {
        Objective::for_classes(self.n_classes)
    }

    /// Keep the encoder weights fixed; only the head receives gradients
    pub fn freeze_encoder(mut self) -> Self {
        self.encoder = self.encoder.no_grad();
        self
    }

    /// Logits and the encoder's last hidden states
    fn logits(&self, input: Input<B>) -> (Tensor<B, 2>, Tensor<B, 3>) {
        let [batch_size, _seq_length] = input.text.tokens.dims();

        let BertModelOutput { hidden_states, .. } = self.encoder.forward(BertInferenceBatch {
            tokens: input.text.tokens,
            mask_pad: input.text.mask_pad,
        });

        let [_, _, hidden_size] = hidden_states.dims();

        // The first position summarizes the sequence
        let summary = hidden_states
            .clone()
            .slice([0..batch_size, 0..1])
            .reshape([batch_size, hidden_size]);

        let reduced = self.reducer.forward(summary);

        let Some(classifier) = &self.classifier else {
            return (reduced, hidden_states);
        };

        let features = input
            .features
            .expect("the model fuses side features but the batch carries none")
            .to_device(&reduced.device())
            .float();

        let logits = classifier.forward(Tensor::cat(vec![reduced, features], 1));

        (logits, hidden_states)
    }

    /// Defines forward pass for training
    pub fn forward(&self, input: Input<B>, targets: Tensor<B, 1, Int>) -> Output<B> {
        let (output, hidden_states) = self.logits(input);
        let targets = targets.to_device(&output.device());

        let loss = self.objective().loss(output.clone(), targets.clone());

        Output {
            loss,
            output,
            targets,
            hidden_states,
        }
    }

    /// Defines forward pass for inference
    pub fn infer(&self, input: Input<B>) -> Tensor<B, 2> {
        let (output, _) = self.logits(input);

        self.objective().activate(output)
    }
}

impl<B: AutodiffBackend> virality::Model<B> for Model<B> {
    /// The model configuration
    type Config = Config;

    /// Perform a forward pass
    fn forward(&self, item: Train<B>) -> Output<B> {
        self.forward(item.input, item.targets)
    }

    /// Defines forward pass for inference
    fn infer(&self, input: Input<B>) -> Tensor<B, 2> {
        self.infer(input)
    }

    /// Load a model from a file
    fn load_from_safetensors(
        device: &B::Device,
        model_file: PathBuf,
        config: Self::Config,
    ) -> anyhow::Result<Self> {
        if config.id2label.is_empty() {
            return Err(anyhow!("Classes are not defined in the model configuration"));
        }

        // The head keeps its fresh initialization; only the encoder is pretrained
        let model = config.init::<B>(device);
        let mut record = model.clone().into_record();
        record.encoder = BertModel::from_safetensors(model_file, device, config.encoder.clone());

        let model = model.load_record(record);

        if config.freeze_encoder {
            log::info!("Freezing the encoder weights");

            return Ok(model.freeze_encoder());
        }

        Ok(model)
    }
}

#[cfg(test)]
mod tests {
    use bert_burn::model::BertModelConfig;
    use burn::{
        backend::{Autodiff, NdArray},
        optim::GradientsParams,
    };
    use pretty_assertions::assert_eq;

    use crate::pipelines::sequence_classification::batcher::Infer;

    use super::*;

    type B = NdArray;

    fn config(n_classes: usize, features: &[&str]) -> Config {
        let encoder =
            BertModelConfig::new(2, 1, 1e-12, 12, 24, 50, 16, 2, 0.0, "bert".to_string(), 0);

        Config::new(
            encoder,
            (0..n_classes).map(|i| (i, i.to_string())).collect(),
            features.iter().map(|s| s.to_string()).collect(),
            "tiny".to_string(),
        )
        .with_dropout(0.0)
    }

    fn input<B: Backend>(n_features: usize) -> Input<B> {
        let device = Default::default();

        let tokens = Tensor::<B, 2, Int>::from_ints([[1, 7, 9, 0], [4, 5, 0, 0]], &device);
        let mask_pad = tokens.clone().equal_elem(0);

        let features = (n_features > 0).then(|| {
            let values: Vec<i32> = (0..2 * n_features as i32).collect();

            Tensor::<B, 1, Int>::from_ints(values.as_slice(), &device).reshape([2, n_features])
        });

        Input::new(Infer::new(tokens, mask_pad), features)
    }

    fn targets<B: Backend>() -> Tensor<B, 1, Int> {
        Tensor::from_ints([0, 1], &Default::default())
    }

    #[test]
    fn text_only_head_emits_one_logit_per_class() {
        let model = config(4, &[]).init::<B>(&Default::default());

        let output = model.forward(input(0), targets());

        assert!(model.classifier.is_none());
        assert_eq!(output.output.dims(), [2, 4]);
        assert_eq!(output.loss.dims(), [1]);
        assert_eq!(output.hidden_states.dims(), [2, 4, 12]);
    }

    #[test]
    fn fusion_head_emits_one_logit_per_class() {
        let features = ["hashtags_count", "mentions_count", "is_quote_tweet"];
        let model = config(4, &features).init::<B>(&Default::default());

        let output = model.forward(input(3), targets());

        assert!(model.classifier.is_some());
        assert_eq!(output.output.dims(), [2, 4]);
    }

    #[test]
    fn regression_head_emits_a_single_value() {
        let model = config(1, &[]).init::<B>(&Default::default());

        let probabilities = model.infer(input(0));

        assert_eq!(probabilities.dims(), [2, 1]);
    }

    #[test]
    fn inference_returns_probabilities() {
        let model = config(4, &["hashtags_count"]).init::<B>(&Default::default());

        let probabilities = model.infer(input(1));
        let totals = probabilities.sum_dim(1).into_data().convert::<f32>().value;

        for total in totals {
            assert!((total - 1.0).abs() < 1e-5);
        }
    }

    #[test]
    fn frozen_encoder_leaves_only_head_gradients() {
        type A = Autodiff<NdArray>;
        let device = Default::default();

        let trainable = config(4, &[]).init::<A>(&device);
        let frozen = config(4, &[]).init::<A>(&device).freeze_encoder();

        let grads = trainable.forward(input(0), targets()).loss.backward();
        let trainable_params = GradientsParams::from_grads(grads, &trainable).len();

        let grads = frozen.forward(input(0), targets()).loss.backward();
        let frozen_params = GradientsParams::from_grads(grads, &frozen).len();

        // Two linear layers with weights and biases
        assert_eq!(frozen_params, 4);
        assert!(trainable_params > frozen_params);
    }
}
