//! Batch order strategies for the training data loader
//!
//! The learner reads items by position. A [SampledDataset] maps every position of an epoch onto a
//! dataset index through a [BatchOrder], leaving the wrapped dataset and the batcher untouched.

use std::{marker::PhantomData, sync::Mutex};

use burn::data::dataset::Dataset;
use rand::{
    distributions::{Distribution, WeightedError, WeightedIndex},
    rngs::StdRng,
    SeedableRng,
};

use crate::datasets::split::class_counts;

/// Sampler Error
#[derive(thiserror::Error, Debug)]
pub enum SamplerError {
    /// The weights could not form a distribution
    #[error("invalid sample weights: {0}")]
    Weights(#[from] WeightedError),

    /// The order was built for a different number of items than the dataset holds
    #[error("batch order covers {order} items but the dataset holds {dataset}")]
    LengthMismatch {
        /// Items covered by the batch order
        order: usize,

        /// Items in the dataset
        dataset: usize,
    },
}

/// Decides which dataset item is served at each position of an epoch
pub trait BatchOrder: Send + Sync {
    /// The dataset index to read for the given position
    fn index(&self, position: usize) -> usize;

    /// The number of items this order was built for, if it is tied to one
    fn n_items(&self) -> Option<usize> {
        None
    }
}

/// Serve items in dataset order
#[derive(Clone, Copy, Debug, Default)]
pub struct Sequential;

impl BatchOrder for Sequential {
    fn index(&self, position: usize) -> usize {
        position
    }
}

/// Independent draws with replacement, with probability proportional to each item's weight
#[derive(Debug)]
pub struct WeightedRandom {
    distribution: WeightedIndex<f64>,
    n_items: usize,
    rng: Mutex<StdRng>,
}

impl WeightedRandom {
    /// Create a sampler over the given per-item weights
    pub fn new(weights: &[f64], seed: u64) -> Result<Self, SamplerError> {
        let distribution = WeightedIndex::new(weights)?;

        Ok(Self {
            distribution,
            n_items: weights.len(),
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        })
    }

    /// Create a sampler that equalizes the expected mass of every class
    pub fn by_class(labels: &[usize], seed: u64) -> Result<Self, SamplerError> {
        Self::new(&sample_weights(labels), seed)
    }

    /// Draw one dataset index
    pub fn draw(&self) -> usize {
        let mut rng = self
            .rng
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        self.distribution.sample(&mut *rng)
    }
}

impl BatchOrder for WeightedRandom {
    fn index(&self, _position: usize) -> usize {
        self.draw()
    }

    fn n_items(&self) -> Option<usize> {
        Some(self.n_items)
    }
}

/// One weight per item: the reciprocal of the item's class count
pub fn sample_weights(labels: &[usize]) -> Vec<f64> {
    let counts = class_counts(labels);

    labels
        .iter()
        .map(|label| 1.0 / counts[label] as f64)
        .collect()
}

/// A dataset transform that reads the wrapped dataset through a [BatchOrder]
pub struct SampledDataset<D, I> {
    dataset: D,
    order: Box<dyn BatchOrder>,
    input: PhantomData<I>,
}

impl<D, I> SampledDataset<D, I>
where
    D: Dataset<I>,
{
    /// Wrap a dataset, checking that the order was built for it
    pub fn new(dataset: D, order: Box<dyn BatchOrder>) -> Result<Self, SamplerError> {
        if let Some(n) = order.n_items() {
            if n != dataset.len() {
                return Err(SamplerError::LengthMismatch {
                    order: n,
                    dataset: dataset.len(),
                });
            }
        }

        Ok(Self {
            dataset,
            order,
            input: PhantomData,
        })
    }
}

impl<D, I> Dataset<I> for SampledDataset<D, I>
where
    D: Dataset<I>,
    I: Send + Sync,
{
    fn get(&self, index: usize) -> Option<I> {
        if index >= self.dataset.len() {
            return None;
        }

        self.dataset.get(self.order.index(index))
    }

    fn len(&self) -> usize {
        self.dataset.len()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use burn::data::dataset::InMemDataset;
    use pretty_assertions::assert_eq;

    use super::*;

    const TOY_LABELS: [usize; 8] = [0, 0, 0, 0, 1, 1, 2, 3];

    fn class_frequencies(
        labels: &[usize],
        sampler: &WeightedRandom,
        draws: usize,
    ) -> BTreeMap<usize, usize> {
        let mut frequencies = BTreeMap::new();
        for _ in 0..draws {
            *frequencies.entry(labels[sampler.draw()]).or_insert(0) += 1;
        }

        frequencies
    }

    #[test]
    fn toy_weights_are_inverse_class_counts() {
        let weights = sample_weights(&TOY_LABELS);

        assert_eq!(weights, vec![0.25, 0.25, 0.25, 0.25, 0.5, 0.5, 1.0, 1.0]);
    }

    #[test]
    fn weights_equalize_class_mass() {
        let label_sets: [&[usize]; 3] = [
            &TOY_LABELS,
            &[0, 1, 1, 1, 2, 2, 2, 2, 2, 2, 2],
            &[3, 3, 0, 3, 1, 3, 3, 3, 0, 2],
        ];

        for labels in label_sets {
            let weights = sample_weights(labels);

            let mut mass: BTreeMap<usize, f64> = BTreeMap::new();
            for (label, weight) in labels.iter().zip(&weights) {
                *mass.entry(*label).or_insert(0.0) += weight;
            }

            for (label, total) in mass {
                assert!((total - 1.0).abs() < 1e-9, "class {label} has mass {total}");
            }
        }
    }

    #[test]
    fn singleton_class_gets_unit_weight() {
        let weights = sample_weights(&[0, 0, 0, 1]);

        assert_eq!(weights[3], 1.0);
    }

    #[test]
    fn toy_draws_are_close_to_uniform() {
        let sampler = WeightedRandom::by_class(&TOY_LABELS, 69).unwrap();

        let frequencies = class_frequencies(&TOY_LABELS, &sampler, 8000);

        assert_eq!(frequencies.len(), 4);
        for (label, count) in frequencies {
            assert!(
                (1900..=2100).contains(&count),
                "class {label} drawn {count} times"
            );
        }
    }

    #[test]
    fn heavy_skew_converges_to_uniform() {
        let mut labels = vec![0; 10_000];
        labels.extend(vec![1; 100]);

        let sampler = WeightedRandom::by_class(&labels, 7).unwrap();
        let frequencies = class_frequencies(&labels, &sampler, 100_000);

        for (label, count) in frequencies {
            let share = count as f64 / 100_000.0;
            assert!((share - 0.5).abs() < 0.02, "class {label} share {share}");
        }
    }

    #[test]
    fn draws_with_replacement() {
        let labels = [0, 1, 2, 3];
        let sampler = WeightedRandom::by_class(&labels, 1).unwrap();

        let mut seen = vec![0; labels.len()];
        for _ in 0..labels.len() * 10 {
            seen[sampler.draw()] += 1;
        }

        assert!(seen.iter().any(|&n| n > 1));
    }

    #[test]
    fn rejects_unusable_weights() {
        assert!(matches!(
            WeightedRandom::new(&[], 0),
            Err(SamplerError::Weights(WeightedError::NoItem))
        ));
        assert!(matches!(
            WeightedRandom::new(&[0.0, 0.0], 0),
            Err(SamplerError::Weights(WeightedError::AllWeightsZero))
        ));
        assert!(matches!(
            WeightedRandom::new(&[1.0, -1.0], 0),
            Err(SamplerError::Weights(WeightedError::InvalidWeight))
        ));
    }

    #[test]
    fn sampled_dataset_keeps_length_and_items() {
        let items: Vec<String> = ["a", "b", "c"].iter().map(|s| s.to_string()).collect();
        let dataset = SampledDataset::new(InMemDataset::new(items), Box::new(Sequential)).unwrap();

        assert_eq!(dataset.len(), 3);
        assert_eq!(dataset.get(1), Some("b".to_string()));
        assert_eq!(dataset.get(3), None);
    }

    #[test]
    fn sampled_dataset_serves_weighted_draws() {
        let items = vec![0usize, 1];
        let order = WeightedRandom::new(&[0.0, 1.0], 3).unwrap();
        let dataset = SampledDataset::new(InMemDataset::new(items), Box::new(order)).unwrap();

        assert_eq!(dataset.get(0), Some(1));
        assert_eq!(dataset.get(1), Some(1));
    }

    #[test]
    fn sampled_dataset_rejects_mismatched_order() {
        let order = WeightedRandom::by_class(&TOY_LABELS, 0).unwrap();

        let result = SampledDataset::new(InMemDataset::new(vec![1usize, 2, 3]), Box::new(order));

        assert!(matches!(
            result,
            Err(SamplerError::LengthMismatch { order: 8, dataset: 3 })
        ));
    }
}
