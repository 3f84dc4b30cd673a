//! The training objective follows from the number of configured labels alone

use burn::{
    nn::loss::CrossEntropyLossConfig,
    tensor::{
        activation::{sigmoid, softmax},
        backend::Backend,
        Int, Tensor,
    },
};
use serde::{Deserialize, Serialize};

/// Loss family for a classification head
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Objective {
    /// A single output scored with mean squared error against the label as a float
    Regression,

    /// Two outputs scored with binary cross-entropy against one-hot targets
    Binary,

    /// Categorical cross-entropy over three or more classes
    Multiclass,
}

impl Objective {
    /// Select the objective for a head with `n_classes` outputs
    pub fn for_classes(n_classes: usize) -> Self {
        match n_classes {
            0 | 1 => Objective::Regression,
            2 => Objective::Binary,
            _ => Objective::Multiclass,
        }
    }

    /// Mean loss of `[batch_size, n_classes]` logits against class ids
    pub fn loss<B: Backend>(
        &self,
        logits: Tensor<B, 2>,
        targets: Tensor<B, 1, Int>,
    ) -> Tensor<B, 1> {
        let [batch_size, n_classes] = logits.dims();
        let device = logits.device();
        let targets = targets.to_device(&device);

        match self {
            Objective::Regression => {
                let diff = logits.reshape([batch_size]) - targets.float();

                (diff.clone() * diff).mean()
            }
            Objective::Binary => {
                let one_hot = Tensor::<B, 2>::zeros([batch_size, n_classes], &device).scatter(
                    1,
                    targets.reshape([batch_size, 1]),
                    Tensor::ones([batch_size, 1], &device),
                );

                // max(x, 0) - x * z + log(1 + exp(-|x|))
                let loss = logits.clone().clamp_min(0.0) - logits.clone() * one_hot
                    + logits.abs().neg().exp().add_scalar(1.0).log();

                loss.mean()
            }
            Objective::Multiclass => CrossEntropyLossConfig::new()
                .init(&device)
                .forward(logits, targets),
        }
    }

    /// Turn logits into the values reported at inference time
    pub fn activate<B: Backend>(&self, logits: Tensor<B, 2>) -> Tensor<B, 2> {
        match self {
            Objective::Regression => logits,
            Objective::Binary => sigmoid(logits),
            Objective::Multiclass => softmax(logits, 1),
        }
    }
}
