//! Patience-based early stopping on the epoch objective.

use tracing::{debug, info};

use crate::hooks::HookAction;

/// Tracks the best epoch objective and stops after `patience` consecutive
/// epochs without improvement.
///
/// An epoch improves when its loss is below `best - min_delta`. With a
/// patience of zero the tracker still records the best loss but never asks
/// to stop.
///
/// # Examples
///
/// ```
/// use rerank_training::early_stopping::EarlyStopping;
/// use rerank_training::hooks::HookAction;
///
/// let mut stopper = EarlyStopping::new(2);
/// assert_eq!(stopper.observe(0, 1.0), HookAction::Continue);
/// assert_eq!(stopper.observe(1, 1.5), HookAction::Continue);
/// assert_eq!(stopper.observe(2, 1.2), HookAction::Stop);
/// assert_eq!(stopper.best_epoch(), Some(0));
/// ```
#[derive(Debug, Clone)]
pub struct EarlyStopping {
    patience: usize,
    min_delta: f32,
    best_loss: Option<f32>,
    best_epoch: Option<usize>,
    epochs_without_improvement: usize,
}

impl EarlyStopping {
    /// Creates a tracker; `patience == 0` disables stopping.
    pub fn new(patience: usize) -> Self {
        Self {
            patience,
            min_delta: 0.0,
            best_loss: None,
            best_epoch: None,
            epochs_without_improvement: 0,
        }
    }

    /// Sets the minimum decrease that counts as an improvement.
    pub fn with_min_delta(mut self, min_delta: f32) -> Self {
        self.min_delta = min_delta.max(0.0);
        self
    }

    /// Returns whether this tracker can stop training.
    pub fn is_enabled(&self) -> bool {
        self.patience > 0
    }

    /// Records the objective of `epoch` and decides whether to continue.
    pub fn observe(&mut self, epoch: usize, loss: f32) -> HookAction {
        let improved = match self.best_loss {
            None => true,
            Some(best) => loss < best - self.min_delta,
        };

        if improved {
            debug!(epoch, loss, previous = ?self.best_loss, "Objective improved");
            self.best_loss = Some(loss);
            self.best_epoch = Some(epoch);
            self.epochs_without_improvement = 0;
            return HookAction::Continue;
        }

        self.epochs_without_improvement += 1;
        debug!(
            epoch,
            stale = self.epochs_without_improvement,
            patience = self.patience,
            "No improvement"
        );
        if self.is_enabled() && self.epochs_without_improvement >= self.patience {
            info!(
                epoch,
                best_epoch = ?self.best_epoch,
                "Stopping early: no improvement for {} epochs",
                self.epochs_without_improvement
            );
            return HookAction::Stop;
        }
        HookAction::Continue
    }

    /// Lowest objective observed.
    pub fn best_loss(&self) -> Option<f32> {
        self.best_loss
    }

    /// Epoch of the lowest objective.
    pub fn best_epoch(&self) -> Option<usize> {
        self.best_epoch
    }

    /// Consecutive epochs since the last improvement.
    pub fn epochs_without_improvement(&self) -> usize {
        self.epochs_without_improvement
    }

    /// Forgets all observations.
    pub fn reset(&mut self) {
        self.best_loss = None;
        self.best_epoch = None;
        self.epochs_without_improvement = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Feeds losses until a stop; returns the stopping epoch.
    fn stop_epoch(stopper: &mut EarlyStopping, losses: &[f32]) -> Option<usize> {
        losses
            .iter()
            .enumerate()
            .find(|(epoch, loss)| stopper.observe(*epoch, **loss) == HookAction::Stop)
            .map(|(epoch, _)| epoch)
    }

    #[test]
    fn test_stops_at_k_plus_patience() {
        // improves through epoch 3, flat afterwards
        let losses = [5.0, 4.0, 3.0, 2.0, 2.0, 2.5, 2.0, 3.0, 2.1, 2.0];
        for patience in 1..=5 {
            let mut stopper = EarlyStopping::new(patience);
            assert_eq!(stop_epoch(&mut stopper, &losses), Some(3 + patience));
            assert_eq!(stopper.best_epoch(), Some(3));
            assert_eq!(stopper.best_loss(), Some(2.0));
        }
    }

    #[test]
    fn test_zero_patience_never_stops() {
        let mut stopper = EarlyStopping::new(0);
        assert!(!stopper.is_enabled());
        assert_eq!(stop_epoch(&mut stopper, &[1.0, 2.0, 3.0, 4.0]), None);
        assert_eq!(stopper.epochs_without_improvement(), 3);
    }

    #[test]
    fn test_improvement_resets_counter() {
        let mut stopper = EarlyStopping::new(2);
        assert_eq!(stop_epoch(&mut stopper, &[3.0, 3.0, 2.0, 2.5, 1.0, 1.5]), None);
        assert_eq!(stopper.best_epoch(), Some(4));
    }

    #[test]
    fn test_min_delta() {
        let mut stopper = EarlyStopping::new(1).with_min_delta(0.1);
        assert_eq!(stopper.observe(0, 1.0), HookAction::Continue);
        assert_eq!(stopper.observe(1, 0.95), HookAction::Stop);
    }

    #[test]
    fn test_reset() {
        let mut stopper = EarlyStopping::new(1);
        stopper.observe(0, 1.0);
        stopper.observe(1, 2.0);
        stopper.reset();
        assert_eq!(stopper.best_loss(), None);
        assert_eq!(stopper.observe(0, 9.0), HookAction::Continue);
    }
}
