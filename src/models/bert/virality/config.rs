//! Adapt Bert with a feature-fusion head to the Virality Classification pipeline

use std::{collections::BTreeMap, path::PathBuf};

use bert_burn::model::BertModelConfig;
use burn::{
    config::Config as _,
    nn::{DropoutConfig, LinearConfig},
    tensor::backend::{AutodiffBackend, Backend},
};

use crate::pipelines::sequence_classification::{self, config::Training, virality};

use super::model::{Classifier, Model, Reducer};

/// The Model Configuration
#[derive(burn::config::Config)]
pub struct Config {
    /// The base BERT config
    pub encoder: BertModelConfig,

    /// A map from class ids to class name labels
    pub id2label: BTreeMap<usize, String>,

    /// Side feature columns, in the order the head expects them
    pub features: Vec<String>,

    /// The pretrained checkpoint this model was fine-tuned from
    pub model_name: String,

    /// Dropout in front of the down-projection
    #[config(default = 0.2)]
    pub dropout: f64,

    /// Keep the encoder weights fixed during training
    #[config(default = false)]
    pub freeze_encoder: bool,
}

impl Config {
    /// Build a configuration for a training run on top of a pretrained encoder config
    pub fn for_training(encoder: BertModelConfig, training: &Training) -> Self {
        let id2label = training
            .labels
            .iter()
            .enumerate()
            .map(|(i, s)| (i, s.trim().to_string()))
            .collect();

        Config::new(
            encoder,
            id2label,
            training.features.clone(),
            training.model_name.clone(),
        )
        .with_dropout(training.dropout)
        .with_freeze_encoder(training.freeze_encoder)
    }

    /// Initializes the model with default weights
    pub fn init<B: Backend>(&self, device: &B::Device) -> Model<B> {
        let hidden_size = self.encoder.hidden_size;
        let reduced_size = hidden_size / 3;

        let n_classes = self.id2label.len();
        let n_features = self.features.len();

        // With features the down-projection yields one value per feature, to be fused with them
        let width = if n_features == 0 { n_classes } else { n_features };

        let reducer = Reducer {
            dropout: DropoutConfig::new(self.dropout).init(),
            hidden: LinearConfig::new(hidden_size, reduced_size).init(device),
            output: LinearConfig::new(reduced_size, width).init(device),
        };

        let classifier = (n_features > 0).then(|| Classifier {
            hidden: LinearConfig::new(2 * n_features, n_features).init(device),
            output: LinearConfig::new(n_features, n_classes).init(device),
        });

        Model {
            encoder: self.encoder.init(device),
            reducer,
            classifier,
            n_classes,
        }
    }
}

impl virality::ModelConfig for Config {
    /// Initialize the model
    fn init<B: AutodiffBackend>(&self, device: &B::Device) -> impl virality::Model<B> {
        self.init(device)
    }

    /// Load a pretrained model configuration
    async fn load_pretrained(config_file: PathBuf, training: &Training) -> anyhow::Result<Self> {
        let encoder = BertModelConfig::load(config_file)
            .map_err(|e| anyhow!("Unable to load Hugging Face Config file: {}", e))?;

        let model_config = Config::for_training(encoder, training);

        if model_config.id2label.is_empty() {
            return Err(anyhow!("Classes are not defined in the model configuration"));
        }

        if model_config.encoder.hidden_size < 3 {
            return Err(anyhow!(
                "Hidden size {} is too small for the down-projection",
                model_config.encoder.hidden_size
            ));
        }

        Ok(model_config)
    }

    fn get_config(&self) -> sequence_classification::Config {
        sequence_classification::Config {
            pad_token_id: self.encoder.pad_token_id,
            max_position_embeddings: self.encoder.max_position_embeddings,
            hidden_size: self.encoder.hidden_size,
            max_seq_len: self.encoder.max_seq_len,
            hidden_dropout_prob: self.encoder.hidden_dropout_prob,
            id2label: self.id2label.clone(),
            n_features: self.features.len(),
        }
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }

    fn without_dropout(mut self) -> Self {
        self.dropout = 0.0;
        self.encoder.hidden_dropout_prob = 0.0;
        self
    }
}

#[cfg(test)]
mod tests {
    use burn::config::Config as _;
    use pretty_assertions::assert_eq;

    use crate::{datasets::tweets, pipelines::sequence_classification::virality::ModelConfig};

    use super::*;

    fn encoder() -> BertModelConfig {
        BertModelConfig::new(2, 1, 1e-12, 12, 24, 50, 16, 2, 0.1, "bert".to_string(), 0)
    }

    fn training(features: &[&str]) -> Training {
        Training::new(
            "google/bert_uncased_L-2_H-128_A-2".to_string(),
            "test".to_string(),
            tweets::Virality::labels(),
            features.iter().map(|s| s.to_string()).collect(),
        )
    }

    #[test]
    fn carries_labels_and_features_from_training() {
        let config = Config::for_training(encoder(), &training(&["hashtags_count"]));

        assert_eq!(config.id2label.len(), 4);
        assert_eq!(config.id2label[&3], "100+");
        assert_eq!(config.features, vec!["hashtags_count".to_string()]);
        assert_eq!(config.get_config().n_features, 1);
        assert_eq!(config.objective(), virality::Objective::Multiclass);
    }

    #[test]
    fn dropout_can_be_disabled_for_inference() {
        let config = Config::for_training(encoder(), &training(&[])).without_dropout();

        assert_eq!(config.dropout, 0.0);
        assert_eq!(config.encoder.hidden_dropout_prob, 0.0);
    }

    #[tokio::test]
    async fn loads_a_hugging_face_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        encoder().save(&path).unwrap();

        let config = Config::load_pretrained(path, &training(&["mentions_count"]))
            .await
            .unwrap();

        assert_eq!(config.encoder.hidden_size, 12);
        assert_eq!(config.model_name(), "google/bert_uncased_L-2_H-128_A-2");
    }

    #[tokio::test]
    async fn rejects_a_run_without_labels() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        encoder().save(&path).unwrap();

        let mut training = training(&[]);
        training.labels.clear();

        assert!(Config::load_pretrained(path, &training).await.is_err());
    }
}
