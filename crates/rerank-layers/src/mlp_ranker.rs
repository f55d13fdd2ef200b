//! Plain feed-forward ranking network.
//!
//! [`MlpRanker`] mean-pools the behavior sequence instead of attending over it,
//! then scores `[profile, mean behavior, item, context]` with a ReLU MLP ending
//! in one clamped sigmoid unit. It serves as a cheaper baseline with the same
//! [`Model`] capability as [`crate::din_ranker::DinRanker`].

use rand::rngs::StdRng;
use rand::SeedableRng;
use rerank_tensor::NodeId;
use serde::{Deserialize, Serialize};

use crate::din_ranker::{validate_epsilon, DEFAULT_OUTPUT_EPSILON, DEFAULT_SEED};
use crate::error::{LayerError, LayerResult};
use crate::mlp::{ActivationType, MLPConfig};
use crate::model::{Model, ModelInputs, ModelShape, ModelState};

/// Configuration of an [`MlpRanker`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MlpRankerConfig {
    /// Hidden layer sizes.
    pub hidden_units: Vec<usize>,
    /// Output clamp margin.
    pub output_epsilon: f32,
    /// Seed for parameter initialization.
    pub seed: u64,
}

impl Default for MlpRankerConfig {
    fn default() -> Self {
        Self {
            hidden_units: vec![100],
            output_epsilon: DEFAULT_OUTPUT_EPSILON,
            seed: DEFAULT_SEED,
        }
    }
}

impl MlpRankerConfig {
    /// Sets the hidden layer sizes.
    pub fn with_hidden_units(mut self, units: Vec<usize>) -> Self {
        self.hidden_units = units;
        self
    }

    /// Sets the initialization seed.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }
}

/// Mean-pooling MLP ranker.
#[derive(Debug)]
pub struct MlpRanker {
    config: MlpRankerConfig,
    state: ModelState,
}

impl MlpRanker {
    /// Creates an unbuilt ranker.
    pub fn new(config: MlpRankerConfig) -> Self {
        Self {
            config,
            state: ModelState::new(),
        }
    }

    /// Returns the configuration.
    pub fn config(&self) -> &MlpRankerConfig {
        &self.config
    }
}

impl Model for MlpRanker {
    fn name(&self) -> &str {
        "mlp_ranker"
    }

    fn state(&self) -> &ModelState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut ModelState {
        &mut self.state
    }

    fn build_forward(&mut self, inputs: &ModelInputs, shape: &ModelShape) -> LayerResult<NodeId> {
        validate_epsilon(self.config.output_epsilon)?;
        if self.config.hidden_units.contains(&0) {
            return Err(LayerError::ConfigError {
                message: "hidden layer sizes must be positive".to_string(),
            });
        }
        let mut rng = StdRng::seed_from_u64(self.config.seed);
        let graph = self.state.graph_mut();

        let behaviors = graph.split_seq(inputs.behavior, shape.behavior_seq_len)?;
        let pooled = graph.mean_seq(behaviors)?;
        let joined = graph.concat(&[inputs.profile, pooled, inputs.item, inputs.ctx])?;

        let mut mlp = MLPConfig::new(shape.pooled_width());
        for units in &self.config.hidden_units {
            mlp = mlp.add_layer(*units, ActivationType::ReLU);
        }
        let mlp = mlp
            .add_layer(1, ActivationType::Sigmoid)
            .build(graph, "mlp", &mut rng)?;
        let probability = mlp.apply(graph, joined)?;

        let eps = self.config.output_epsilon;
        let output = graph.clamp(probability, eps, 1.0 - eps)?;

        self.state.add_learnables(mlp.params());
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rerank_tensor::NodeShape;

    #[test]
    fn test_mlp_ranker_builds() {
        let shape = ModelShape {
            batch_size: 2,
            profile_dim: 1,
            behavior_seq_len: 2,
            behavior_dim: 3,
            item_dim: 2,
            ctx_dim: 1,
        };
        let mut model = MlpRanker::new(MlpRankerConfig::default());
        let inputs = ModelInputs::declare(model.graph_mut(), &shape);
        model.forward(inputs, &shape).unwrap();

        assert_eq!(model.learnables().len(), 4);
        let output = model.output().unwrap();
        assert_eq!(
            model.graph().shape(output).unwrap(),
            &NodeShape::Batch { width: 1 }
        );
    }

    #[test]
    fn test_mlp_ranker_rejects_zero_units() {
        let shape = ModelShape {
            batch_size: 1,
            profile_dim: 1,
            behavior_seq_len: 1,
            behavior_dim: 1,
            item_dim: 1,
            ctx_dim: 1,
        };
        let mut model = MlpRanker::new(MlpRankerConfig::default().with_hidden_units(vec![0]));
        let inputs = ModelInputs::declare(model.graph_mut(), &shape);
        assert!(model.forward(inputs, &shape).is_err());
    }
}
