//! Stochastic Gradient Descent (SGD) optimizer.
//!
//! # Example
//!
//! ```
//! use rerank_optimizer::{Optimizer, Sgd, OptimizerConfig};
//!
//! let config = OptimizerConfig::Sgd { learning_rate: 0.01, weight_decay: 0.0 };
//! let mut sgd = Sgd::new(config).unwrap();
//! let mut weights = vec![1.0, 2.0, 3.0];
//! sgd.apply_gradients(&mut weights, &[0.1, 0.2, 0.3]);
//! ```

use crate::{regularized_gradient, Optimizer, OptimizerConfig, OptimizerError};
use serde::{Deserialize, Serialize};

/// Stochastic Gradient Descent optimizer.
///
/// Updates parameters using the formula:
/// `param = param - learning_rate * (gradient / batch_size + weight_decay * param)`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Sgd {
    learning_rate: f32,
    weight_decay: f32,
    batch_size: f32,
    config: OptimizerConfig,
}

impl Sgd {
    /// Creates a new SGD optimizer with the given learning rate.
    pub fn with_learning_rate(learning_rate: f32) -> Self {
        let config = OptimizerConfig::Sgd {
            learning_rate,
            weight_decay: 0.0,
        };
        Self {
            learning_rate,
            weight_decay: 0.0,
            batch_size: 1.0,
            config,
        }
    }
}

impl Optimizer for Sgd {
    fn new(config: OptimizerConfig) -> Result<Self, OptimizerError> {
        config.validate()?;
        match config {
            OptimizerConfig::Sgd {
                learning_rate,
                weight_decay,
            } => Ok(Self {
                learning_rate,
                weight_decay,
                batch_size: 1.0,
                config,
            }),
            _ => Err(OptimizerError::ConfigMismatch {
                expected: "Sgd".to_string(),
                got: config.name().to_string(),
            }),
        }
    }

    fn apply_gradients(&mut self, params: &mut [f32], gradients: &[f32]) {
        for (p, g) in params.iter_mut().zip(gradients.iter()) {
            *p -= self.learning_rate
                * regularized_gradient(*p, *g, self.batch_size, self.weight_decay);
        }
    }

    fn set_batch_size(&mut self, batch_size: usize) {
        self.batch_size = batch_size.max(1) as f32;
    }

    fn config(&self) -> &OptimizerConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sgd_basic_update() {
        let mut sgd = Sgd::with_learning_rate(0.1);

        let mut params = vec![1.0, 2.0, 3.0];
        sgd.apply_gradients(&mut params, &[1.0, 1.0, 1.0]);

        assert!((params[0] - 0.9).abs() < 1e-6);
        assert!((params[1] - 1.9).abs() < 1e-6);
        assert!((params[2] - 2.9).abs() < 1e-6);
    }

    #[test]
    fn test_sgd_weight_decay() {
        let config = OptimizerConfig::Sgd {
            learning_rate: 0.1,
            weight_decay: 0.5,
        };
        let mut sgd = Sgd::new(config).unwrap();

        let mut params = vec![2.0];
        sgd.apply_gradients(&mut params, &[0.0]);

        // 2.0 - 0.1 * (0.5 * 2.0)
        assert!((params[0] - 1.9).abs() < 1e-6);
    }

    #[test]
    fn test_sgd_zero_batch_size_treated_as_one() {
        let mut sgd = Sgd::with_learning_rate(1.0);
        sgd.set_batch_size(0);
        let mut params = vec![1.0];
        sgd.apply_gradients(&mut params, &[1.0]);
        assert!(params[0].abs() < 1e-6);
    }

    #[test]
    fn test_sgd_config_mismatch() {
        assert!(Sgd::new(OptimizerConfig::default()).is_err());
    }
}
