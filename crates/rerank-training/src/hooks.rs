//! Training hooks for customizing the epoch loop.
//!
//! Hooks run after every epoch with that epoch's [`Metrics`] and once more
//! when training ends. Any hook may ask the trainer to stop.

use thiserror::Error;
use tracing::info;

use crate::metrics::Metrics;

/// Errors that can occur during hook execution.
#[derive(Debug, Error)]
pub enum HookError {
    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A custom hook error.
    #[error("Hook error: {0}")]
    Custom(String),
}

/// Result type for hook operations.
pub type HookResult<T> = Result<T, HookError>;

/// Action to take after a hook runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookAction {
    /// Continue training normally.
    Continue,
    /// Stop training after the current epoch.
    Stop,
}

/// Trait for training hooks.
///
/// # Examples
///
/// ```
/// use rerank_training::hooks::{Hook, HookAction, HookResult};
/// use rerank_training::metrics::Metrics;
///
/// struct StopAtLoss(f64);
///
/// impl Hook for StopAtLoss {
///     fn name(&self) -> &str {
///         "stop_at_loss"
///     }
///
///     fn after_epoch(&mut self, _epoch: usize, metrics: &Metrics) -> HookResult<HookAction> {
///         if metrics.loss < self.0 {
///             Ok(HookAction::Stop)
///         } else {
///             Ok(HookAction::Continue)
///         }
///     }
/// }
/// ```
pub trait Hook: Send {
    /// Returns the name of this hook for logging purposes.
    fn name(&self) -> &str;

    /// Called after each epoch (0-based) with the epoch's metrics.
    fn after_epoch(&mut self, _epoch: usize, _metrics: &Metrics) -> HookResult<HookAction> {
        Ok(HookAction::Continue)
    }

    /// Called once when training ends, with the last epoch's metrics if any
    /// epoch completed.
    fn end(&mut self, _epochs_run: usize, _metrics: Option<&Metrics>) -> HookResult<()> {
        Ok(())
    }
}

/// A hook that logs epoch metrics at regular intervals.
#[derive(Debug)]
pub struct LoggingHook {
    every_n_epochs: usize,
}

impl LoggingHook {
    /// Creates a logging hook that logs every `every_n_epochs` epochs.
    pub fn new(every_n_epochs: usize) -> Self {
        Self {
            every_n_epochs: every_n_epochs.max(1),
        }
    }
}

impl Hook for LoggingHook {
    fn name(&self) -> &str {
        "logging_hook"
    }

    fn after_epoch(&mut self, epoch: usize, metrics: &Metrics) -> HookResult<HookAction> {
        if epoch % self.every_n_epochs == 0 {
            let mut msg = format!("Epoch {}: loss = {:.6}", epoch, metrics.loss);
            if let Some(acc) = metrics.accuracy {
                msg.push_str(&format!(", accuracy = {:.4}", acc));
            }
            if let Some(auc) = metrics.auc {
                msg.push_str(&format!(", AUC = {:.4}", auc));
            }
            let mut custom: Vec<_> = metrics.custom.iter().collect();
            custom.sort_by(|a, b| a.0.cmp(b.0));
            for (name, value) in custom {
                msg.push_str(&format!(", {} = {:.4}", name, value));
            }
            info!("{}", msg);
        }
        Ok(HookAction::Continue)
    }

    fn end(&mut self, epochs_run: usize, metrics: Option<&Metrics>) -> HookResult<()> {
        match metrics {
            Some(m) => info!(
                "Training finished after {} epochs: final loss = {:.6}",
                epochs_run, m.loss
            ),
            None => info!("Training finished after {} epochs", epochs_run),
        }
        Ok(())
    }
}

/// A collection of hooks that are run together.
#[derive(Default)]
pub struct HookList {
    hooks: Vec<Box<dyn Hook>>,
}

impl std::fmt::Debug for HookList {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<&str> = self.hooks.iter().map(|h| h.name()).collect();
        f.debug_struct("HookList").field("hooks", &names).finish()
    }
}

impl HookList {
    /// Creates a new empty hook list.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a hook to the list.
    pub fn add<H: Hook + 'static>(&mut self, hook: H) {
        self.hooks.push(Box::new(hook));
    }

    /// Adds an already boxed hook.
    pub fn add_boxed(&mut self, hook: Box<dyn Hook>) {
        self.hooks.push(hook);
    }

    /// Number of registered hooks.
    pub fn len(&self) -> usize {
        self.hooks.len()
    }

    /// Returns whether no hooks are registered.
    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }

    /// Runs `after_epoch` on every hook.
    ///
    /// All hooks see every epoch; the result is `Stop` if any of them asked
    /// to stop.
    pub fn after_epoch(&mut self, epoch: usize, metrics: &Metrics) -> HookResult<HookAction> {
        let mut action = HookAction::Continue;
        for hook in &mut self.hooks {
            if hook.after_epoch(epoch, metrics)? == HookAction::Stop {
                info!(hook = hook.name(), epoch, "Hook requested stop");
                action = HookAction::Stop;
            }
        }
        Ok(action)
    }

    /// Runs `end` on every hook.
    pub fn end(&mut self, epochs_run: usize, metrics: Option<&Metrics>) -> HookResult<()> {
        for hook in &mut self.hooks {
            hook.end(epochs_run, metrics)?;
        }
        Ok(())
    }
}
