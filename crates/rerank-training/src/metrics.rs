//! Training metrics collection and ranking quality measures.
//!
//! [`Metrics`] carries one epoch's loss and optional accuracy/AUC;
//! [`MetricsRecorder`] averages them over several epochs or evaluation runs.
//! [`roc_auc`] and [`accuracy`] compute the quality measures from raw scores
//! and labels.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Metrics collected for one epoch or evaluation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Metrics {
    /// The objective value.
    pub loss: f64,
    /// Classification accuracy (0.0 to 1.0).
    pub accuracy: Option<f64>,
    /// Area under the ROC curve.
    pub auc: Option<f64>,
    /// Custom metrics with string keys.
    pub custom: HashMap<String, f64>,
    /// The epoch (0-based) these metrics belong to.
    pub epoch: usize,
}

impl Metrics {
    /// Creates metrics with the given loss and epoch.
    ///
    /// # Examples
    ///
    /// ```
    /// use rerank_training::metrics::Metrics;
    ///
    /// let metrics = Metrics::new(0.5, 3).with_auc(0.9);
    /// assert_eq!(metrics.loss, 0.5);
    /// assert_eq!(metrics.epoch, 3);
    /// assert_eq!(metrics.auc, Some(0.9));
    /// ```
    pub fn new(loss: f64, epoch: usize) -> Self {
        Self {
            loss,
            accuracy: None,
            auc: None,
            custom: HashMap::new(),
            epoch,
        }
    }

    /// Sets the accuracy metric.
    pub fn with_accuracy(mut self, accuracy: f64) -> Self {
        self.accuracy = Some(accuracy);
        self
    }

    /// Sets the AUC metric.
    pub fn with_auc(mut self, auc: f64) -> Self {
        self.auc = Some(auc);
        self
    }

    /// Adds a custom metric.
    pub fn with_custom(mut self, name: impl Into<String>, value: f64) -> Self {
        self.custom.insert(name.into(), value);
        self
    }
}

/// Accumulates metrics and reports their averages.
#[derive(Debug, Clone, Default)]
pub struct MetricsRecorder {
    loss_sum: f64,
    accuracy_sum: f64,
    auc_sum: f64,
    accuracy_count: u64,
    auc_count: u64,
    custom_sums: HashMap<String, f64>,
    custom_counts: HashMap<String, u64>,
    count: u64,
}

impl MetricsRecorder {
    /// Creates a new empty recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a set of metrics.
    pub fn record(&mut self, metrics: &Metrics) {
        self.loss_sum += metrics.loss;
        self.count += 1;

        if let Some(acc) = metrics.accuracy {
            self.accuracy_sum += acc;
            self.accuracy_count += 1;
        }
        if let Some(auc) = metrics.auc {
            self.auc_sum += auc;
            self.auc_count += 1;
        }
        for (name, value) in &metrics.custom {
            *self.custom_sums.entry(name.clone()).or_insert(0.0) += value;
            *self.custom_counts.entry(name.clone()).or_insert(0) += 1;
        }
    }

    /// Returns the number of metrics recorded.
    pub fn count(&self) -> u64 {
        self.count
    }

    /// Returns the average loss, or 0.0 if nothing was recorded.
    pub fn average_loss(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.loss_sum / self.count as f64
        }
    }

    /// Returns the average accuracy, if any accuracy values were recorded.
    pub fn average_accuracy(&self) -> Option<f64> {
        (self.accuracy_count > 0).then(|| self.accuracy_sum / self.accuracy_count as f64)
    }

    /// Returns the average AUC, if any AUC values were recorded.
    pub fn average_auc(&self) -> Option<f64> {
        (self.auc_count > 0).then(|| self.auc_sum / self.auc_count as f64)
    }

    /// Returns the average value of a custom metric.
    pub fn average_custom(&self, name: &str) -> Option<f64> {
        match (self.custom_sums.get(name), self.custom_counts.get(name)) {
            (Some(&sum), Some(&count)) if count > 0 => Some(sum / count as f64),
            _ => None,
        }
    }

    /// Averages everything recorded into one [`Metrics`] tagged with `epoch`.
    ///
    /// ```
    /// use rerank_training::metrics::{Metrics, MetricsRecorder};
    ///
    /// let mut recorder = MetricsRecorder::new();
    /// recorder.record(&Metrics::new(0.5, 0).with_accuracy(0.8));
    /// recorder.record(&Metrics::new(0.3, 1).with_accuracy(0.9));
    ///
    /// let avg = recorder.aggregate(1);
    /// assert!((avg.loss - 0.4).abs() < 1e-10);
    /// assert!((avg.accuracy.unwrap() - 0.85).abs() < 1e-10);
    /// ```
    pub fn aggregate(&self, epoch: usize) -> Metrics {
        let mut metrics = Metrics::new(self.average_loss(), epoch);
        if let Some(acc) = self.average_accuracy() {
            metrics = metrics.with_accuracy(acc);
        }
        if let Some(auc) = self.average_auc() {
            metrics = metrics.with_auc(auc);
        }
        for name in self.custom_sums.keys() {
            if let Some(avg) = self.average_custom(name) {
                metrics = metrics.with_custom(name.clone(), avg);
            }
        }
        metrics
    }

    /// Resets the recorder to its initial state.
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Area under the ROC curve of `scores` against binary `labels`.
///
/// Labels above 0.5 count as positives. Computed as the normalized
/// Mann-Whitney U statistic, with tied scores sharing their average rank.
/// Returns `None` when the lengths differ, when either class is absent, or
/// when a score is NaN.
///
/// ```
/// use rerank_training::metrics::roc_auc;
///
/// assert_eq!(roc_auc(&[0.1, 0.4, 0.35, 0.8], &[0.0, 0.0, 1.0, 1.0]), Some(0.75));
/// assert_eq!(roc_auc(&[0.1, 0.2], &[1.0, 1.0]), None);
/// ```
pub fn roc_auc(scores: &[f32], labels: &[f32]) -> Option<f64> {
    if scores.len() != labels.len() || scores.iter().any(|s| s.is_nan()) {
        return None;
    }
    let positives = labels.iter().filter(|l| **l > 0.5).count();
    let negatives = labels.len() - positives;
    if positives == 0 || negatives == 0 {
        return None;
    }

    let mut order: Vec<usize> = (0..scores.len()).collect();
    order.sort_by(|&a, &b| scores[a].total_cmp(&scores[b]));

    let mut positive_rank_sum = 0.0f64;
    let mut i = 0;
    while i < order.len() {
        let mut j = i;
        while j + 1 < order.len() && scores[order[j + 1]] == scores[order[i]] {
            j += 1;
        }
        // 1-based ranks i+1..=j+1 share their mean
        let rank = (i + j) as f64 / 2.0 + 1.0;
        for &idx in &order[i..=j] {
            if labels[idx] > 0.5 {
                positive_rank_sum += rank;
            }
        }
        i = j + 1;
    }

    let p = positives as f64;
    let n = negatives as f64;
    Some((positive_rank_sum - p * (p + 1.0) / 2.0) / (p * n))
}

/// Fraction of samples whose score rounds to their label.
///
/// Returns `None` for empty or mismatched inputs.
pub fn accuracy(scores: &[f32], labels: &[f32]) -> Option<f64> {
    if scores.is_empty() || scores.len() != labels.len() {
        return None;
    }
    let correct = scores
        .iter()
        .zip(labels)
        .filter(|(s, l)| (**s - **l).abs() < 0.5)
        .count();
    Some(correct as f64 / scores.len() as f64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_new() {
        let metrics = Metrics::new(0.5, 100);
        assert_eq!(metrics.loss, 0.5);
        assert_eq!(metrics.epoch, 100);
        assert!(metrics.accuracy.is_none());
        assert!(metrics.auc.is_none());
        assert!(metrics.custom.is_empty());
    }

    #[test]
    fn test_recorder_averages_only_present_values() {
        let mut recorder = MetricsRecorder::new();
        recorder.record(&Metrics::new(1.0, 0).with_auc(0.5).with_custom("lr", 0.01));
        recorder.record(&Metrics::new(3.0, 1));
        assert_eq!(recorder.count(), 2);
        assert_eq!(recorder.average_loss(), 2.0);
        assert_eq!(recorder.average_auc(), Some(0.5));
        assert_eq!(recorder.average_accuracy(), None);
        assert_eq!(recorder.average_custom("lr"), Some(0.01));

        recorder.reset();
        assert_eq!(recorder.count(), 0);
        assert_eq!(recorder.average_loss(), 0.0);
    }

    #[test]
    fn test_auc_perfect_and_inverted() {
        let labels = [0.0, 0.0, 1.0, 1.0];
        assert_eq!(roc_auc(&[0.1, 0.2, 0.8, 0.9], &labels), Some(1.0));
        assert_eq!(roc_auc(&[0.9, 0.8, 0.2, 0.1], &labels), Some(0.0));
    }

    #[test]
    fn test_auc_ties_count_half() {
        assert_eq!(roc_auc(&[0.5, 0.5], &[0.0, 1.0]), Some(0.5));
        assert_eq!(roc_auc(&[0.5; 6], &[0.0, 1.0, 0.0, 1.0, 1.0, 0.0]), Some(0.5));
    }

    #[test]
    fn test_auc_degenerate_inputs() {
        assert_eq!(roc_auc(&[0.1, 0.2], &[0.0, 0.0]), None);
        assert_eq!(roc_auc(&[0.1], &[0.0, 1.0]), None);
        assert_eq!(roc_auc(&[f32::NAN, 0.2], &[0.0, 1.0]), None);
        assert_eq!(roc_auc(&[], &[]), None);
    }

    #[test]
    fn test_accuracy() {
        assert_eq!(accuracy(&[0.2, 0.7, 0.6, 0.1], &[0.0, 1.0, 0.0, 0.0]), Some(0.75));
        assert_eq!(accuracy(&[], &[]), None);
        assert_eq!(accuracy(&[0.2], &[0.0, 1.0]), None);
    }
}
