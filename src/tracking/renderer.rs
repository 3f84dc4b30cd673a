use std::{
    collections::BTreeMap,
    sync::{Arc, Mutex, MutexGuard},
};

use burn::train::renderer::{MetricState, MetricsRenderer, TrainingProgress};

use super::TrackingClient;

/// Name under which the learner reports accuracy (in percent)
pub const ACCURACY: &str = "Accuracy";

/// Tracking key for a learner metric: lowercase, words joined by underscores
fn metric_key(split: &str, name: &str) -> String {
    let name = name
        .split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join("_");

    format!("{split}/{name}")
}

/// Accuracy is tracked as a fraction, like every other accuracy this crate reports
fn scale(name: &str, value: f64) -> f64 {
    if name == ACCURACY {
        value / 100.0
    } else {
        value
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct Mean {
    sum: f64,
    count: usize,
}

impl Mean {
    fn add(&mut self, value: f64) {
        self.sum += value;
        self.count += 1;
    }

    fn value(&self) -> f64 {
        self.sum / self.count.max(1) as f64
    }
}

/// Metric bookkeeping behind the renderer
#[derive(Debug, Default)]
pub(crate) struct State {
    step: usize,
    train: BTreeMap<String, f64>,
    valid_batch: BTreeMap<String, f64>,
    valid: BTreeMap<usize, BTreeMap<String, Mean>>,
    reported: usize,
}

impl State {
    pub(crate) fn train_value(&mut self, name: &str, value: f64) {
        self.train.insert(name.to_string(), value);
    }

    /// Count one optimizer step, returning the metrics to report if this step is on the interval
    pub(crate) fn train_step(&mut self, logging_steps: usize) -> Option<BTreeMap<String, f64>> {
        self.step += 1;

        if logging_steps == 0 || self.step % logging_steps != 0 {
            return None;
        }

        Some(
            self.train
                .iter()
                .map(|(name, value)| (metric_key("train", name), scale(name, *value)))
                .collect(),
        )
    }

    pub(crate) fn valid_value(&mut self, name: &str, value: f64) {
        self.valid_batch.insert(name.to_string(), value);
    }

    /// Fold the latest validation batch into the epoch's running means
    pub(crate) fn valid_step(&mut self, epoch: usize) {
        let means = self.valid.entry(epoch).or_default();

        for (name, value) in std::mem::take(&mut self.valid_batch) {
            means.entry(name).or_default().add(value);
        }
    }

    /// Validation means for epochs before `until` that were not reported yet
    pub(crate) fn completed_epochs(
        &mut self,
        until: Option<usize>,
    ) -> Vec<(usize, BTreeMap<String, f64>)> {
        let completed: Vec<_> = self
            .valid
            .iter()
            .filter(|(epoch, _)| **epoch > self.reported && until.map_or(true, |u| **epoch < u))
            .map(|(&epoch, means)| {
                let values = means
                    .iter()
                    .map(|(name, mean)| (metric_key("eval", name), scale(name, mean.value())))
                    .collect();

                (epoch, values)
            })
            .collect();

        if let Some((epoch, _)) = completed.last() {
            self.reported = *epoch;
        }

        completed
    }

    /// Mean validation accuracy per epoch, as a fraction
    pub(crate) fn validation_accuracy(&self) -> BTreeMap<usize, f64> {
        self.valid
            .iter()
            .filter_map(|(&epoch, means)| {
                means
                    .get(ACCURACY)
                    .map(|mean| (epoch, scale(ACCURACY, mean.value())))
            })
            .collect()
    }

    pub(crate) fn step(&self) -> usize {
        self.step
    }
}

/// Forwards learner metrics to the log and the tracking sink
///
/// Training metrics are reported every `logging_steps` optimizer steps. Validation metrics are
/// averaged over each epoch and reported once the next epoch starts, or on
/// [TrackingRenderer::finish]. Clones share their state, so a clone kept outside the learner can
/// read the history after `fit`.
#[derive(Clone)]
pub struct TrackingRenderer {
    state: Arc<Mutex<State>>,
    tracker: TrackingClient,
    logging_steps: usize,
}

impl TrackingRenderer {
    /// Create a renderer reporting to the given run
    pub fn new(tracker: TrackingClient, logging_steps: usize) -> Self {
        Self {
            state: Arc::default(),
            tracker,
            logging_steps,
        }
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn report_epochs(&self, until: Option<usize>) {
        let mut state = self.lock();
        let step = state.step();

        for (epoch, values) in state.completed_epochs(until) {
            log::info!(
                "Epoch {} validation: {}",
                epoch,
                values
                    .iter()
                    .map(|(name, value)| format!("{name}={value:.4}"))
                    .collect::<Vec<_>>()
                    .join(" ")
            );

            if let Err(e) = self.tracker.log_metrics(step, values) {
                log::warn!("Unable to track validation metrics: {}", e);
            }
        }
    }

    /// Report any pending validation metrics
    pub fn finish(&self) {
        self.report_epochs(None);
    }

    /// Mean validation accuracy per epoch, as a fraction
    pub fn validation_accuracy(&self) -> BTreeMap<usize, f64> {
        self.lock().validation_accuracy()
    }

    /// Optimizer steps seen so far
    pub fn step(&self) -> usize {
        self.lock().step()
    }
}

impl MetricsRenderer for TrackingRenderer {
    fn update_train(&mut self, state: MetricState) {
        if let MetricState::Numeric(entry, value) = state {
            self.lock().train_value(&entry.name, value);
        }
    }

    fn update_valid(&mut self, state: MetricState) {
        if let MetricState::Numeric(entry, value) = state {
            self.lock().valid_value(&entry.name, value);
        }
    }

    fn render_train(&mut self, item: TrainingProgress) {
        self.report_epochs(Some(item.epoch));

        let (step, values) = {
            let mut state = self.lock();
            let values = state.train_step(self.logging_steps);

            (state.step(), values)
        };

        let Some(values) = values else {
            return;
        };

        log::info!(
            "Epoch {}/{} step {} ({}/{} items): {}",
            item.epoch,
            item.epoch_total,
            step,
            item.progress.items_processed,
            item.progress.items_total,
            values
                .iter()
                .map(|(name, value)| format!("{name}={value:.4}"))
                .collect::<Vec<_>>()
                .join(" ")
        );

        if let Err(e) = self.tracker.log_metrics(step, values) {
            log::warn!("Unable to track training metrics: {}", e);
        }
    }

    fn render_valid(&mut self, item: TrainingProgress) {
        self.lock().valid_step(item.epoch);
    }
}
