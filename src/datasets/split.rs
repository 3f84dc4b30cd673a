use std::collections::BTreeMap;

use rand::{rngs::StdRng, seq::SliceRandom, SeedableRng};

use crate::pipelines::sequence_classification::virality::Item;

/// Fraction of the corpus held out of training (split evenly into validation and test)
pub const HOLDOUT_FRACTION: f64 = 0.3;

/// Fraction of the holdout assigned to the test split
pub const TEST_FRACTION: f64 = 0.5;

/// Train, validation and test partitions of a labeled corpus
#[derive(Clone, Debug)]
pub struct Splits<I> {
    /// Items used for training
    pub train: Vec<I>,

    /// Items used for evaluation between epochs and checkpoint selection
    pub valid: Vec<I>,

    /// Items held back for the final evaluation
    pub test: Vec<I>,
}

impl<I: Item> Splits<I> {
    /// Split 70/15/15, stratified on the label
    pub fn stratified(items: Vec<I>, seed: u64) -> Self {
        Self::stratified_with(items, HOLDOUT_FRACTION, TEST_FRACTION, seed)
    }

    /// Split into train and holdout, then the holdout into validation and test. Both stages are
    /// stratified on the label and use the same seeded generator.
    pub fn stratified_with(items: Vec<I>, holdout: f64, test: f64, seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);

        let labels: Vec<usize> = items.iter().map(Item::class_id).collect();
        let (train_idx, holdout_idx) = stratified_partition(&labels, holdout, &mut rng);

        let holdout_labels: Vec<usize> = holdout_idx.iter().map(|&i| labels[i]).collect();
        let (valid_pos, test_pos) = stratified_partition(&holdout_labels, test, &mut rng);

        let valid_idx: Vec<usize> = valid_pos.into_iter().map(|p| holdout_idx[p]).collect();
        let test_idx: Vec<usize> = test_pos.into_iter().map(|p| holdout_idx[p]).collect();

        let mut slots: Vec<Option<I>> = items.into_iter().map(Some).collect();
        let mut take = |indices: Vec<usize>| -> Vec<I> {
            indices
                .into_iter()
                .filter_map(|i| slots[i].take())
                .collect()
        };

        Self {
            train: take(train_idx),
            valid: take(valid_idx),
            test: take(test_idx),
        }
    }

    /// Labels of the training split, in dataset order
    pub fn train_labels(&self) -> Vec<usize> {
        self.train.iter().map(Item::class_id).collect()
    }
}

/// Count occurrences of each label
pub fn class_counts(labels: &[usize]) -> BTreeMap<usize, usize> {
    let mut counts = BTreeMap::new();
    for &label in labels {
        *counts.entry(label).or_insert(0) += 1;
    }

    counts
}

/// Partition indices into `(kept, held_out)`, holding out `fraction` of every class. Each output is
/// shuffled so classes are interleaved.
pub fn stratified_partition(
    labels: &[usize],
    fraction: f64,
    rng: &mut StdRng,
) -> (Vec<usize>, Vec<usize>) {
    let mut by_class: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
    for (index, &label) in labels.iter().enumerate() {
        by_class.entry(label).or_default().push(index);
    }

    let mut kept = Vec::with_capacity(labels.len());
    let mut held_out = Vec::new();

    for (_, mut indices) in by_class {
        indices.shuffle(rng);

        let n_held = ((indices.len() as f64) * fraction).round() as usize;
        let n_held = n_held.min(indices.len());

        held_out.extend_from_slice(&indices[..n_held]);
        kept.extend_from_slice(&indices[n_held..]);
    }

    kept.shuffle(rng);
    held_out.shuffle(rng);

    (kept, held_out)
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::datasets::tweets;

    fn corpus(counts: &[(usize, usize)]) -> Vec<tweets::Item> {
        counts
            .iter()
            .flat_map(|&(label, n)| {
                (0..n).map(move |i| tweets::Item::new(format!("tweet {label}-{i}"), vec![], label))
            })
            .collect()
    }

    fn proportions(items: &[tweets::Item]) -> BTreeMap<usize, f64> {
        let labels: Vec<usize> = items.iter().map(|item| item.label).collect();

        class_counts(&labels)
            .into_iter()
            .map(|(label, n)| (label, n as f64 / items.len() as f64))
            .collect()
    }

    #[test]
    fn splits_seventy_fifteen_fifteen() {
        let splits = Splits::stratified(corpus(&[(0, 600), (1, 260), (2, 100), (3, 40)]), 69);

        assert_eq!(splits.train.len(), 700);
        assert_eq!(splits.valid.len(), 150);
        assert_eq!(splits.test.len(), 150);
    }

    #[test]
    fn preserves_class_proportions() {
        let items = corpus(&[(0, 5_230), (1, 2_870), (2, 1_410), (3, 190)]);
        let overall = proportions(&items);

        let splits = Splits::stratified(items, 69);

        for split in [&splits.train, &splits.valid, &splits.test] {
            let observed = proportions(split);

            for (label, expected) in &overall {
                let actual = observed.get(label).copied().unwrap_or(0.0);
                assert!(
                    (actual - expected).abs() <= 0.02,
                    "class {label}: {actual} vs {expected}"
                );
            }
        }
    }

    #[test]
    fn every_item_lands_in_exactly_one_split() {
        let items = corpus(&[(0, 37), (1, 11), (2, 5), (3, 1)]);
        let mut expected: Vec<String> = items.iter().map(|item| item.text.clone()).collect();

        let splits = Splits::stratified(items, 7);

        let mut seen: Vec<String> = splits
            .train
            .iter()
            .chain(&splits.valid)
            .chain(&splits.test)
            .map(|item| item.text.clone())
            .collect();

        expected.sort();
        seen.sort();
        assert_eq!(seen, expected);
    }

    #[test]
    fn is_reproducible_for_a_seed() {
        let first = Splits::stratified(corpus(&[(0, 50), (1, 30), (2, 20)]), 69);
        let second = Splits::stratified(corpus(&[(0, 50), (1, 30), (2, 20)]), 69);

        assert_eq!(first.train, second.train);
        assert_eq!(first.valid, second.valid);
        assert_eq!(first.test, second.test);
    }

    #[test]
    fn counts_classes() {
        assert_eq!(
            class_counts(&[0, 0, 0, 0, 1, 1, 2, 3]),
            BTreeMap::from([(0, 4), (1, 2), (2, 1), (3, 1)])
        );
    }
}
