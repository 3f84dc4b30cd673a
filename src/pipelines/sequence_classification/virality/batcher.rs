use burn::{
    data::dataloader::{self, batcher::Batcher as _},
    tensor::{backend::Backend, Int, Tensor},
};
use derive_new::new;
use serde::{Deserialize, Serialize};
use tokenizers::Tokenizer;

use crate::pipelines::sequence_classification::{self, batcher::Infer};

use super::Item;

/// Model input: tokenized text and, when features are configured, the side features
#[derive(Clone, Debug, new)]
pub struct Input<B: Backend> {
    /// Bert Model input
    pub text: Infer<B>,

    /// Side features as 2D tensor: [batch_size, n_features]
    pub features: Option<Tensor<B, 2, Int>>,
}

/// A training batch for virality classification
#[derive(Clone, Debug, new)]
pub struct Train<B: Backend> {
    /// Model input
    pub input: Input<B>,

    /// Class ids for the batch
    pub targets: Tensor<B, 1, Int>,
}

/// An unlabeled tweet for inference
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, new)]
pub struct Query {
    /// The tweet body
    pub text: String,

    /// Side features, in the configured feature order
    pub features: Vec<i32>,
}

/// Struct for batching virality items
#[derive(Clone)]
pub struct Batcher<B: Backend> {
    /// Wrap the Sequence Classification batcher for the text half of the input
    batcher: sequence_classification::Batcher<B>,
}

impl<B: Backend> Batcher<B> {
    /// Creates a new batcher
    pub fn new(
        tokenizer: Tokenizer,
        config: sequence_classification::Config,
        max_seq_length: usize,
        device: B::Device,
    ) -> anyhow::Result<Self> {
        let batcher =
            sequence_classification::Batcher::new(tokenizer, config, max_seq_length, device)?;

        Ok(Self { batcher })
    }

    /// The number of side features every item must carry
    pub fn n_features(&self) -> usize {
        self.batcher.n_features
    }

    fn features<'a>(
        &self,
        rows: impl ExactSizeIterator<Item = &'a [i32]>,
    ) -> Option<Tensor<B, 2, Int>> {
        let n_features = self.batcher.n_features;
        if n_features == 0 {
            return None;
        }

        let batch_size = rows.len();
        let mut values = Vec::with_capacity(batch_size * n_features);

        for row in rows {
            assert_eq!(
                row.len(),
                n_features,
                "item carries {} features, the model expects {}",
                row.len(),
                n_features
            );

            values.extend(row.iter().map(|&v| v as i64));
        }

        Some(self.batcher.int_tensor(values, batch_size, n_features))
    }

    fn input(&self, texts: Vec<String>, features: Option<Tensor<B, 2, Int>>) -> Input<B> {
        Input {
            text: self.batcher.batch(texts),
            features,
        }
    }
}

/// Implement Batcher trait for Batcher struct for inference
impl<B: Backend> dataloader::batcher::Batcher<Query, Input<B>> for Batcher<B> {
    /// Collects a vector of queries into an inference batch
    fn batch(&self, items: Vec<Query>) -> Input<B> {
        let features = self.features(items.iter().map(|item| item.features.as_slice()));
        let texts = items.into_iter().map(|item| item.text).collect();

        self.input(texts, features)
    }
}

/// Implement Batcher trait for Batcher struct for training
impl<B: Backend, I: Item> dataloader::batcher::Batcher<I, Train<B>> for Batcher<B> {
    /// Collects a vector of virality items into a training batch
    fn batch(&self, items: Vec<I>) -> Train<B> {
        let batch_size = items.len();

        let features = self.features(items.iter().map(|item| item.features()));
        let texts = items.iter().map(|item| item.input().to_string()).collect();

        let class_ids = items.iter().map(|item| item.class_id() as i64).collect();
        let targets = self
            .batcher
            .int_tensor(class_ids, batch_size, 1)
            .reshape([batch_size]);

        Train {
            input: self.input(texts, features),
            targets,
        }
    }
}
