//! Attention-pooling ranking network.
//!
//! [`DinRanker`] scores a (user, item, context) sample by pooling the user's
//! behavior sequence with [`DINAttention`], concatenating
//! `[profile, pooled behavior, item, context]` and passing the row through a
//! ReLU MLP (200 then 80 units by default) that ends in one sigmoid unit.
//!
//! The sigmoid output is clamped into `[eps, 1 - eps]` so scores are strictly
//! inside `(0, 1)` even when the f32 sigmoid saturates.

use rand::rngs::StdRng;
use rand::SeedableRng;
use rerank_tensor::NodeId;
use serde::{Deserialize, Serialize};

use crate::din::{DINAttention, DINConfig, DEFAULT_ATTENTION_HIDDEN};
use crate::error::{LayerError, LayerResult};
use crate::mlp::{ActivationType, MLPConfig};
use crate::model::{Model, ModelInputs, ModelShape, ModelState};

/// Default output clamp margin.
pub const DEFAULT_OUTPUT_EPSILON: f32 = 1e-7;

/// Default initialization seed.
pub const DEFAULT_SEED: u64 = 42;

/// Configuration of a [`DinRanker`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DinRankerConfig {
    /// Hidden layer sizes of the attention scorer.
    pub attention_hidden_units: Vec<usize>,
    /// Hidden layer sizes of the ranking head.
    pub hidden_units: Vec<usize>,
    /// Output clamp margin.
    pub output_epsilon: f32,
    /// Seed for parameter initialization.
    pub seed: u64,
}

impl Default for DinRankerConfig {
    fn default() -> Self {
        Self {
            attention_hidden_units: vec![DEFAULT_ATTENTION_HIDDEN],
            hidden_units: vec![200, 80],
            output_epsilon: DEFAULT_OUTPUT_EPSILON,
            seed: DEFAULT_SEED,
        }
    }
}

impl DinRankerConfig {
    /// Sets the attention scorer hidden sizes.
    pub fn with_attention_hidden_units(mut self, units: Vec<usize>) -> Self {
        self.attention_hidden_units = units;
        self
    }

    /// Sets the ranking head hidden sizes.
    pub fn with_hidden_units(mut self, units: Vec<usize>) -> Self {
        self.hidden_units = units;
        self
    }

    /// Sets the initialization seed.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Sets the output clamp margin.
    pub fn with_output_epsilon(mut self, epsilon: f32) -> Self {
        self.output_epsilon = epsilon;
        self
    }

    /// Validates the configuration.
    pub fn validate(&self) -> LayerResult<()> {
        validate_epsilon(self.output_epsilon)?;
        if self.hidden_units.contains(&0) {
            return Err(LayerError::ConfigError {
                message: "hidden layer sizes must be positive".to_string(),
            });
        }
        Ok(())
    }
}

pub(crate) fn validate_epsilon(epsilon: f32) -> LayerResult<()> {
    if !(epsilon > 0.0 && epsilon < 0.5) {
        return Err(LayerError::ConfigError {
            message: format!("output epsilon must be in (0, 0.5), got {}", epsilon),
        });
    }
    Ok(())
}

/// Deep Interest Network ranker.
#[derive(Debug)]
pub struct DinRanker {
    config: DinRankerConfig,
    state: ModelState,
}

impl DinRanker {
    /// Creates an unbuilt ranker.
    pub fn new(config: DinRankerConfig) -> Self {
        Self {
            config,
            state: ModelState::new(),
        }
    }

    /// Returns the configuration.
    pub fn config(&self) -> &DinRankerConfig {
        &self.config
    }
}

impl Default for DinRanker {
    fn default() -> Self {
        Self::new(DinRankerConfig::default())
    }
}

impl Model for DinRanker {
    fn name(&self) -> &str {
        "din_ranker"
    }

    fn state(&self) -> &ModelState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut ModelState {
        &mut self.state
    }

    fn build_forward(&mut self, inputs: &ModelInputs, shape: &ModelShape) -> LayerResult<NodeId> {
        self.config.validate()?;
        let mut rng = StdRng::seed_from_u64(self.config.seed);
        let graph = self.state.graph_mut();

        let behaviors = graph.split_seq(inputs.behavior, shape.behavior_seq_len)?;
        let attention = DINAttention::build(
            graph,
            "din/attention",
            DINConfig::new(shape.behavior_dim, shape.item_dim)
                .with_attention_hidden_units(self.config.attention_hidden_units.clone()),
            &mut rng,
        )?;
        let pooled = attention.apply(graph, behaviors, inputs.item)?;
        let joined = graph.concat(&[inputs.profile, pooled, inputs.item, inputs.ctx])?;

        let mut head = MLPConfig::new(shape.pooled_width());
        for units in &self.config.hidden_units {
            head = head.add_layer(*units, ActivationType::ReLU);
        }
        let head = head
            .add_layer(1, ActivationType::Sigmoid)
            .build(graph, "din/head", &mut rng)?;
        let probability = head.apply(graph, joined)?;

        let eps = self.config.output_epsilon;
        let output = graph.clamp(probability, eps, 1.0 - eps)?;

        self.state.add_learnables(attention.params());
        self.state.add_learnables(head.params());
        Ok(output)
    }
}
