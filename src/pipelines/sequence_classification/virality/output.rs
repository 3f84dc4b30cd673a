use burn::{
    tensor::{backend::Backend, Int, Tensor},
    train::metric::{AccuracyInput, Adaptor, LossInput},
};
use derive_new::new;

/// Virality classification output adapted for multiple metrics.
#[derive(new)]
pub struct Output<B: Backend> {
    /// The loss.
    pub loss: Tensor<B, 1>,

    /// The logits: [batch_size, n_classes]
    pub output: Tensor<B, 2>,

    /// The targets.
    pub targets: Tensor<B, 1, Int>,

    /// The encoder's last hidden states: [batch_size, seq_length, hidden_size]
    pub hidden_states: Tensor<B, 3>,
}

impl<B: Backend> Adaptor<AccuracyInput<B>> for Output<B> {
    fn adapt(&self) -> AccuracyInput<B> {
        AccuracyInput::new(self.output.clone(), self.targets.clone())
    }
}

impl<B: Backend> Adaptor<LossInput<B>> for Output<B> {
    fn adapt(&self) -> LossInput<B> {
        LossInput::new(self.loss.clone())
    }
}
