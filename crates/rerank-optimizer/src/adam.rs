//! Adam optimizer.
//!
//! Adam (Adaptive Moment Estimation) combines the benefits of momentum
//! and RMSprop by maintaining exponential moving averages of both the
//! gradients (first moment) and squared gradients (second moment).
//!
//! # Example
//!
//! ```
//! use rerank_optimizer::{Optimizer, Adam, OptimizerConfig};
//!
//! let config = OptimizerConfig::Adam {
//!     learning_rate: 0.01,
//!     beta1: 0.9,
//!     beta2: 0.999,
//!     epsilon: 1e-8,
//!     weight_decay: 1e-4,
//! };
//! let mut adam = Adam::new(config).unwrap();
//! adam.set_batch_size(16);
//! let mut weights = vec![1.0, 2.0, 3.0];
//! let gradients = vec![0.1, 0.2, 0.3];
//! adam.apply_gradients(&mut weights, &gradients);
//! ```

use crate::{regularized_gradient, Optimizer, OptimizerConfig, OptimizerError};
use serde::{Deserialize, Serialize};

/// Adam optimizer with adaptive learning rates and momentum.
///
/// Updates parameters using the formula:
/// ```text
/// g = gradient / batch_size + weight_decay * param
/// m = beta1 * m + (1 - beta1) * g
/// v = beta2 * v + (1 - beta2) * g^2
/// m_hat = m / (1 - beta1^t)
/// v_hat = v / (1 - beta2^t)
/// param = param - learning_rate * m_hat / (sqrt(v_hat) + epsilon)
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Adam {
    learning_rate: f32,
    beta1: f32,
    beta2: f32,
    epsilon: f32,
    weight_decay: f32,
    batch_size: f32,
    /// First moment estimates (mean of gradients).
    m: Vec<f32>,
    /// Second moment estimates (mean of squared gradients).
    v: Vec<f32>,
    /// Current timestep for bias correction.
    t: u64,
    config: OptimizerConfig,
}

impl Adam {
    /// Creates a new Adam optimizer with the given parameters and no weight decay.
    pub fn with_params(learning_rate: f32, beta1: f32, beta2: f32, epsilon: f32) -> Self {
        let config = OptimizerConfig::Adam {
            learning_rate,
            beta1,
            beta2,
            epsilon,
            weight_decay: 0.0,
        };
        Self {
            learning_rate,
            beta1,
            beta2,
            epsilon,
            weight_decay: 0.0,
            batch_size: 1.0,
            m: Vec::new(),
            v: Vec::new(),
            t: 0,
            config,
        }
    }

    /// Returns the current first moment state.
    pub fn first_moment(&self) -> &[f32] {
        &self.m
    }

    /// Returns the current second moment state.
    pub fn second_moment(&self) -> &[f32] {
        &self.v
    }

    /// Returns the current timestep.
    pub fn timestep(&self) -> u64 {
        self.t
    }

    /// Resets the optimizer state.
    pub fn reset_state(&mut self) {
        self.m.clear();
        self.v.clear();
        self.t = 0;
    }
}

impl Optimizer for Adam {
    fn new(config: OptimizerConfig) -> Result<Self, OptimizerError> {
        config.validate()?;
        match config {
            OptimizerConfig::Adam {
                learning_rate,
                beta1,
                beta2,
                epsilon,
                weight_decay,
            } => Ok(Self {
                learning_rate,
                beta1,
                beta2,
                epsilon,
                weight_decay,
                batch_size: 1.0,
                m: Vec::new(),
                v: Vec::new(),
                t: 0,
                config,
            }),
            _ => Err(OptimizerError::ConfigMismatch {
                expected: "Adam".to_string(),
                got: config.name().to_string(),
            }),
        }
    }

    fn apply_gradients(&mut self, params: &mut [f32], gradients: &[f32]) {
        if self.m.len() != params.len() {
            self.m = vec![0.0; params.len()];
            self.v = vec![0.0; params.len()];
        }

        self.t += 1;

        let bias_correction1 = 1.0 - self.beta1.powi(self.t as i32);
        let bias_correction2 = 1.0 - self.beta2.powi(self.t as i32);

        for (i, (p, g)) in params.iter_mut().zip(gradients.iter()).enumerate() {
            let g = regularized_gradient(*p, *g, self.batch_size, self.weight_decay);

            self.m[i] = self.beta1 * self.m[i] + (1.0 - self.beta1) * g;
            self.v[i] = self.beta2 * self.v[i] + (1.0 - self.beta2) * g * g;

            let m_hat = self.m[i] / bias_correction1;
            let v_hat = self.v[i] / bias_correction2;

            *p -= self.learning_rate * m_hat / (v_hat.sqrt() + self.epsilon);
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

    fn config(learning_rate: f32, weight_decay: f32) -> OptimizerConfig {
        OptimizerConfig::Adam {
            learning_rate,
            beta1: 0.9,
            beta2: 0.999,
            epsilon: 1e-8,
            weight_decay,
        }
    }

    #[test]
    fn test_adam_basic_update() {
        let mut adam = Adam::new(config(0.1, 0.0)).unwrap();

        let mut params = vec![1.0, 2.0, 3.0];
        let gradients = vec![1.0, 1.0, 1.0];

        adam.apply_gradients(&mut params, &gradients);

        // First step moves each parameter by roughly the learning rate.
        assert!((params[0] - 0.9).abs() < 1e-4);
        assert!(params[1] < 2.0);
        assert!(params[2] < 3.0);
    }

    #[test]
    fn test_adam_timestep_increment() {
        let mut adam = Adam::new(config(0.001, 0.0)).unwrap();

        let mut params = vec![1.0];
        let gradients = vec![1.0];

        assert_eq!(adam.timestep(), 0);

        adam.apply_gradients(&mut params, &gradients);
        assert_eq!(adam.timestep(), 1);

        adam.apply_gradients(&mut params, &gradients);
        assert_eq!(adam.timestep(), 2);
    }

    #[test]
    fn test_adam_zero_gradient() {
        let mut adam = Adam::new(config(0.001, 0.0)).unwrap();

        let mut params = vec![1.0, 2.0, 3.0];
        adam.apply_gradients(&mut params, &[0.0, 0.0, 0.0]);

        assert!((params[0] - 1.0).abs() < 1e-6);
        assert!((params[1] - 2.0).abs() < 1e-6);
        assert!((params[2] - 3.0).abs() < 1e-6);
    }

    #[test]
    fn test_adam_weight_decay_shrinks_params() {
        let mut adam = Adam::new(config(0.01, 0.1)).unwrap();

        let mut params = vec![1.0, -1.0];
        adam.apply_gradients(&mut params, &[0.0, 0.0]);

        assert!(params[0] < 1.0);
        assert!(params[1] > -1.0);
    }

    #[test]
    fn test_adam_batch_size_scales_moments() {
        let mut unscaled = Adam::new(config(0.01, 0.0)).unwrap();
        let mut scaled = Adam::new(config(0.01, 0.0)).unwrap();
        scaled.set_batch_size(4);

        let mut a = vec![0.0];
        let mut b = vec![0.0];
        unscaled.apply_gradients(&mut a, &[4.0]);
        scaled.apply_gradients(&mut b, &[4.0]);

        assert!((unscaled.first_moment()[0] - 0.4).abs() < 1e-6);
        assert!((scaled.first_moment()[0] - 0.1).abs() < 1e-6);
    }

    #[test]
    fn test_adam_config_mismatch() {
        let config = OptimizerConfig::Sgd {
            learning_rate: 0.01,
            weight_decay: 0.0,
        };
        let result = Adam::new(config);
        assert!(matches!(result, Err(OptimizerError::ConfigMismatch { .. })));
    }

    #[test]
    fn test_adam_reset_state() {
        let mut adam = Adam::with_params(0.001, 0.9, 0.999, 1e-8);
        let mut params = vec![1.0, 2.0];
        adam.apply_gradients(&mut params, &[1.0, 1.0]);
        assert_eq!(adam.timestep(), 1);
        assert_eq!(adam.first_moment().len(), 2);

        adam.reset_state();
        assert_eq!(adam.timestep(), 0);
        assert!(adam.first_moment().is_empty());
        assert!(adam.second_moment().is_empty());
    }
}
