use burn::tensor::{backend::Backend, ElementConversion, Int, Tensor};

/// Top-1 accuracy: the fraction of rows whose highest logit is the target class
pub fn accuracy<B: Backend>(logits: Tensor<B, 2>, targets: Tensor<B, 1, Int>) -> f64 {
    let [batch_size, _n_classes] = logits.dims();
    if batch_size == 0 {
        return 0.0;
    }

    let targets = targets.to_device(&logits.device());
    let predictions = logits.argmax(1).reshape([batch_size]);

    let correct: i64 = predictions
        .equal(targets)
        .int()
        .sum()
        .into_scalar()
        .elem();

    correct as f64 / batch_size as f64
}

/// Accumulates accuracy over batches of different sizes
#[derive(Clone, Copy, Debug, Default)]
pub struct AccuracyAccumulator {
    correct: f64,
    total: usize,
}

impl AccuracyAccumulator {
    /// Add a batch
    pub fn update<B: Backend>(&mut self, logits: Tensor<B, 2>, targets: Tensor<B, 1, Int>) {
        let [batch_size, _] = logits.dims();

        self.correct += accuracy(logits, targets) * batch_size as f64;
        self.total += batch_size;
    }

    /// Accuracy over every batch seen so far
    pub fn value(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.correct / self.total as f64
        }
    }

    /// Number of items seen so far
    pub fn total(&self) -> usize {
        self.total
    }
}
