use std::collections::BTreeMap;

use burn::{
    data::dataloader,
    tensor::{backend::Backend, Bool, Data, ElementConversion, Int, Shape, Tensor},
};
use derive_new::new;
use tokenizers::{PaddingParams, PaddingStrategy, Tokenizer, TruncationParams};

use crate::pipelines::sequence_classification;

/// An inference batch for text classification
#[derive(Debug, Clone, new)]
pub struct Infer<B: Backend> {
    /// Tokenized text as 2D tensor: [batch_size, max_seq_length]
    pub tokens: Tensor<B, 2, Int>,

    /// Padding mask for the tokenized text containing booleans for padding locations
    pub mask_pad: Tensor<B, 2, Bool>,
}

/// Struct for batching sequence classification items
#[derive(Clone)]
pub struct Batcher<B: Backend> {
    /// Tokenizer for converting text to token IDs, padding and truncating to `max_seq_length`
    pub tokenizer: Tokenizer,

    /// Fixed sequence length for tokenized text
    pub max_seq_length: usize,

    /// ID of the padding token
    pub pad_token_id: usize,

    /// A mapping from class ids to class name labels
    pub id2label: BTreeMap<usize, String>,

    /// The number of side features each item carries
    pub n_features: usize,

    /// Device on which to perform computation (e.g., CPU or CUDA device)
    pub device: B::Device,
}

impl<B: Backend> Batcher<B> {
    /// Creates a new batcher, configuring the tokenizer to emit sequences of exactly
    /// `max_seq_length` tokens
    pub fn new(
        mut tokenizer: Tokenizer,
        config: sequence_classification::Config,
        max_seq_length: usize,
        device: B::Device,
    ) -> anyhow::Result<Self> {
        let max_seq_length = max_seq_length
            .min(config.max_seq_len.unwrap_or(config.max_position_embeddings))
            .min(config.max_position_embeddings);

        let pad_token = tokenizer
            .id_to_token(config.pad_token_id as u32)
            .unwrap_or_else(|| "[PAD]".to_string());

        tokenizer
            .with_truncation(Some(TruncationParams {
                max_length: max_seq_length,
                ..Default::default()
            }))
            .map_err(|e| anyhow!("Unable to configure tokenizer truncation: {}", e))?
            .with_padding(Some(PaddingParams {
                strategy: PaddingStrategy::Fixed(max_seq_length),
                pad_id: config.pad_token_id as u32,
                pad_token,
                ..Default::default()
            }));

        Ok(Self {
            tokenizer,
            max_seq_length,
            pad_token_id: config.pad_token_id,
            id2label: config.id2label,
            n_features: config.n_features,
            device,
        })
    }

    /// Build a `[batch_size, width]` integer tensor from row-major values
    pub fn int_tensor(
        &self,
        values: Vec<i64>,
        batch_size: usize,
        width: usize,
    ) -> Tensor<B, 2, Int> {
        let data: Data<B::IntElem, 2> = Data::new(
            values.into_iter().map(|v| v.elem()).collect(),
            Shape::new([batch_size, width]),
        );

        Tensor::from_data(data, &self.device)
    }
}

/// Implement Batcher trait for Batcher struct for inference
impl<B: Backend> dataloader::batcher::Batcher<String, Infer<B>> for Batcher<B> {
    /// Collects a vector of texts into an inference batch
    fn batch(&self, items: Vec<String>) -> Infer<B> {
        let batch_size = items.len();

        let mut token_ids = Vec::with_capacity(batch_size * self.max_seq_length);
        let mut attention = Vec::with_capacity(batch_size * self.max_seq_length);

        for input in items {
            let encoding = self
                .tokenizer
                .encode(input, true)
                .expect("unable to encode");

            assert_eq!(
                encoding.get_ids().len(),
                self.max_seq_length,
                "tokenizer produced a sequence of unexpected length"
            );

            token_ids.extend(encoding.get_ids().iter().map(|&t| t as i64));
            attention.extend(encoding.get_attention_mask().iter().map(|&m| m as i64));
        }

        let tokens = self.int_tensor(token_ids, batch_size, self.max_seq_length);
        let mask_pad = self
            .int_tensor(attention, batch_size, self.max_seq_length)
            .equal_elem(0);

        Infer { tokens, mask_pad }
    }
}
