//! Gradient optimizers for rerank models.
//!
//! Each optimizer updates one flat parameter buffer in place from the gradient
//! of that buffer. Stateful optimizers such as [`Adam`] keep their moment
//! estimates per instance, so a trainer creates one optimizer per trainable
//! parameter.
//!
//! Two gradient preprocessing steps are shared by every optimizer and applied
//! before the update rule:
//!
//! 1. the gradient is divided by the batch size set with
//!    [`Optimizer::set_batch_size`] (1 by default);
//! 2. L2 regularization adds `weight_decay * param` to the gradient.
//!
//! # Available Optimizers
//!
//! - [`Sgd`] - Stochastic Gradient Descent
//! - [`Adam`] - Adaptive Moment Estimation
//!
//! # Example
//!
//! ```
//! use rerank_optimizer::{Optimizer, Sgd, OptimizerConfig};
//!
//! let config = OptimizerConfig::Sgd { learning_rate: 0.01, weight_decay: 0.0 };
//! let mut optimizer = Sgd::new(config).unwrap();
//!
//! let mut weights = vec![1.0, 2.0, 3.0];
//! let gradients = vec![0.1, 0.2, 0.3];
//!
//! optimizer.apply_gradients(&mut weights, &gradients);
//! ```

use serde::{Deserialize, Serialize};
use thiserror::Error;

mod adam;
mod sgd;

pub use adam::Adam;
pub use sgd::Sgd;

/// Errors that can occur when working with optimizers.
#[derive(Debug, Error)]
pub enum OptimizerError {
    /// Configuration type does not match the optimizer type.
    #[error("Config mismatch: expected {expected}, got {got}")]
    ConfigMismatch {
        /// Optimizer that was being created.
        expected: String,
        /// Configuration variant that was supplied.
        got: String,
    },

    /// Invalid configuration parameter.
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),
}

/// Configuration for different optimizer types.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OptimizerConfig {
    /// Stochastic Gradient Descent configuration.
    Sgd {
        /// Learning rate for gradient updates.
        learning_rate: f32,
        /// L2 regularization coefficient.
        #[serde(default)]
        weight_decay: f32,
    },

    /// Adam configuration.
    Adam {
        /// Learning rate for gradient updates.
        learning_rate: f32,
        /// Exponential decay rate for first moment estimates.
        #[serde(default = "default_beta1")]
        beta1: f32,
        /// Exponential decay rate for second moment estimates.
        #[serde(default = "default_beta2")]
        beta2: f32,
        /// Small constant for numerical stability.
        #[serde(default = "default_epsilon")]
        epsilon: f32,
        /// L2 regularization coefficient.
        #[serde(default)]
        weight_decay: f32,
    },
}

fn default_beta1() -> f32 {
    0.9
}

fn default_beta2() -> f32 {
    0.999
}

fn default_epsilon() -> f32 {
    1e-8
}

impl Default for OptimizerConfig {
    /// Adam with learning rate 0.01 and L2 weight decay 1e-4.
    fn default() -> Self {
        OptimizerConfig::Adam {
            learning_rate: 0.01,
            beta1: default_beta1(),
            beta2: default_beta2(),
            epsilon: default_epsilon(),
            weight_decay: 1e-4,
        }
    }
}

impl OptimizerConfig {
    /// Returns the name of the optimizer type.
    pub fn name(&self) -> &'static str {
        match self {
            OptimizerConfig::Sgd { .. } => "Sgd",
            OptimizerConfig::Adam { .. } => "Adam",
        }
    }

    /// Returns the learning rate for the optimizer.
    pub fn learning_rate(&self) -> f32 {
        match self {
            OptimizerConfig::Sgd { learning_rate, .. } => *learning_rate,
            OptimizerConfig::Adam { learning_rate, .. } => *learning_rate,
        }
    }

    /// Returns the L2 regularization coefficient.
    pub fn weight_decay(&self) -> f32 {
        match self {
            OptimizerConfig::Sgd { weight_decay, .. } => *weight_decay,
            OptimizerConfig::Adam { weight_decay, .. } => *weight_decay,
        }
    }

    /// Checks that every hyperparameter is in range.
    ///
    /// # Errors
    ///
    /// Returns [`OptimizerError::InvalidParameter`] naming the offending value.
    pub fn validate(&self) -> Result<(), OptimizerError> {
        let lr = self.learning_rate();
        if !(lr.is_finite() && lr > 0.0) {
            return Err(OptimizerError::InvalidParameter(format!(
                "learning_rate must be positive, got {}",
                lr
            )));
        }
        let wd = self.weight_decay();
        if !(wd.is_finite() && wd >= 0.0) {
            return Err(OptimizerError::InvalidParameter(format!(
                "weight_decay must be non-negative, got {}",
                wd
            )));
        }
        if let OptimizerConfig::Adam {
            beta1,
            beta2,
            epsilon,
            ..
        } = self
        {
            for (name, beta) in [("beta1", beta1), ("beta2", beta2)] {
                if !(0.0..1.0).contains(beta) {
                    return Err(OptimizerError::InvalidParameter(format!(
                        "{} must be in [0, 1), got {}",
                        name, beta
                    )));
                }
            }
            if *epsilon <= 0.0 {
                return Err(OptimizerError::InvalidParameter(format!(
                    "epsilon must be positive, got {}",
                    epsilon
                )));
            }
        }
        Ok(())
    }
}

/// Trait for parameter optimizers.
///
/// Optimizers are responsible for updating a parameter buffer based on the
/// gradient computed for it.
pub trait Optimizer: Sized {
    /// Creates a new optimizer from the given configuration.
    ///
    /// # Errors
    ///
    /// Returns [`OptimizerError::ConfigMismatch`] if the configuration type
    /// does not match the optimizer type, or
    /// [`OptimizerError::InvalidParameter`] if a hyperparameter is out of range.
    fn new(config: OptimizerConfig) -> Result<Self, OptimizerError>;

    /// Applies gradients to update the parameter buffer in place.
    ///
    /// Extra elements in the longer of the two slices are ignored.
    fn apply_gradients(&mut self, params: &mut [f32], gradients: &[f32]);

    /// Sets the number of samples the gradients were accumulated over.
    fn set_batch_size(&mut self, batch_size: usize);

    /// Returns a reference to the optimizer's configuration.
    fn config(&self) -> &OptimizerConfig;
}

/// Divides by the batch size and adds the L2 term.
pub(crate) fn regularized_gradient(param: f32, grad: f32, batch_size: f32, weight_decay: f32) -> f32 {
    grad / batch_size + weight_decay * param
}

/// Creates an optimizer from the given configuration.
///
/// # Example
///
/// ```
/// use rerank_optimizer::{create_optimizer, OptimizerConfig};
///
/// let mut optimizer = create_optimizer(OptimizerConfig::default()).unwrap();
/// optimizer.set_batch_size(32);
/// ```
pub fn create_optimizer(config: OptimizerConfig) -> Result<Box<dyn OptimizerDyn>, OptimizerError> {
    Ok(match &config {
        OptimizerConfig::Sgd { .. } => Box::new(Sgd::new(config)?),
        OptimizerConfig::Adam { .. } => Box::new(Adam::new(config)?),
    })
}

/// Dynamic dispatch version of the Optimizer trait.
pub trait OptimizerDyn: Send {
    /// Applies gradients to update the parameter buffer in place.
    fn apply_gradients(&mut self, params: &mut [f32], gradients: &[f32]);

    /// Sets the number of samples the gradients were accumulated over.
    fn set_batch_size(&mut self, batch_size: usize);

    /// Returns a reference to the optimizer's configuration.
    fn config(&self) -> &OptimizerConfig;
}

impl<T: Optimizer + Send> OptimizerDyn for T {
    fn apply_gradients(&mut self, params: &mut [f32], gradients: &[f32]) {
        Optimizer::apply_gradients(self, params, gradients)
    }

    fn set_batch_size(&mut self, batch_size: usize) {
        Optimizer::set_batch_size(self, batch_size)
    }

    fn config(&self) -> &OptimizerConfig {
        Optimizer::config(self)
    }
}
