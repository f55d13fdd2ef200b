//! Deep Interest Network (DIN) attention.
//!
//! [`DINAttention`] pools a user behavior sequence into one vector per sample,
//! weighting each behavior by its learned relevance to the candidate item.
//!
//! # Architecture
//!
//! For every sequence position `t` with behavior vector `b_t` and query `q`:
//! 1. build the interaction features `[b_t, q, b_t * q, b_t - q]`
//! 2. pass them through a small MLP (one hidden layer of 36 sigmoid units by
//!    default) ending in a scalar score
//! 3. scale `b_t` by its score and sum over the sequence
//!
//! Scores are used as-is, without softmax normalization. When the item width
//! differs from the behavior width, the item vector is first projected to the
//! behavior width by a learned dense layer.
//!
//! # References
//!
//! - Zhou, G., et al. "Deep Interest Network for Click-Through Rate Prediction." KDD 2018.

use rand::rngs::StdRng;
use rerank_tensor::{Graph, NodeId, NodeShape};
use serde::{Deserialize, Serialize};

use crate::dense::Dense;
use crate::error::{LayerError, LayerResult};
use crate::mlp::{ActivationType, MLPConfig, MLP};

/// Hidden width of the attention scoring network.
pub const DEFAULT_ATTENTION_HIDDEN: usize = 36;

/// Configuration for DIN attention.
///
/// # Example
///
/// ```
/// use rerank_layers::din::DINConfig;
/// use rerank_layers::mlp::ActivationType;
///
/// let config = DINConfig::new(4, 6)
///     .with_attention_hidden_units(vec![36])
///     .with_activation(ActivationType::Sigmoid);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DINConfig {
    /// Width of one behavior vector
    pub behavior_dim: usize,
    /// Width of the candidate item vector
    pub item_dim: usize,
    /// Hidden layer sizes for the attention MLP
    pub attention_hidden_units: Vec<usize>,
    /// Activation function for the attention MLP hidden layers
    pub attention_activation: ActivationType,
    /// Whether to use bias in MLP layers
    pub use_bias: bool,
}

impl DINConfig {
    /// Creates a configuration for the given behavior and item widths.
    pub fn new(behavior_dim: usize, item_dim: usize) -> Self {
        Self {
            behavior_dim,
            item_dim,
            attention_hidden_units: vec![DEFAULT_ATTENTION_HIDDEN],
            attention_activation: ActivationType::Sigmoid,
            use_bias: true,
        }
    }

    /// Sets the hidden layer sizes for the attention MLP.
    pub fn with_attention_hidden_units(mut self, units: Vec<usize>) -> Self {
        self.attention_hidden_units = units;
        self
    }

    /// Sets the activation function for the attention MLP.
    pub fn with_activation(mut self, activation: ActivationType) -> Self {
        self.attention_activation = activation;
        self
    }

    /// Validates the configuration.
    pub fn validate(&self) -> Result<(), LayerError> {
        if self.behavior_dim == 0 || self.item_dim == 0 {
            return Err(LayerError::ConfigError {
                message: "Behavior and item dimensions must be positive".to_string(),
            });
        }
        if self.attention_hidden_units.is_empty() {
            return Err(LayerError::ConfigError {
                message: "Attention MLP must have at least one hidden layer".to_string(),
            });
        }
        if let Some(i) = self.attention_hidden_units.iter().position(|d| *d == 0) {
            return Err(LayerError::ConfigError {
                message: format!("Attention hidden layer {} has zero units", i),
            });
        }
        Ok(())
    }
}

/// DIN attention pooling whose parameters live in a graph.
#[derive(Debug, Clone)]
pub struct DINAttention {
    query_projection: Option<Dense>,
    scorer: MLP,
    config: DINConfig,
}

impl DINAttention {
    /// Creates the attention parameters in `graph` under `name`.
    pub fn build(
        graph: &mut Graph,
        name: &str,
        config: DINConfig,
        rng: &mut StdRng,
    ) -> LayerResult<Self> {
        config.validate()?;
        let d = config.behavior_dim;
        let query_projection = if config.item_dim != d {
            Some(Dense::build(
                graph,
                &format!("{}/query", name),
                config.item_dim,
                d,
                config.use_bias,
                rng,
            )?)
        } else {
            None
        };

        let mut scorer = MLPConfig::new(4 * d).with_bias(config.use_bias);
        for units in &config.attention_hidden_units {
            scorer = scorer.add_layer(*units, config.attention_activation);
        }
        let scorer = scorer
            .add_layer(1, ActivationType::None)
            .build(graph, &format!("{}/scorer", name), rng)?;

        Ok(Self {
            query_projection,
            scorer,
            config,
        })
    }

    /// Pools `behaviors` (`[B, L, behavior_dim]`) against `item` (`[B, item_dim]`),
    /// returning a `[B, behavior_dim]` node.
    pub fn apply(&self, graph: &mut Graph, behaviors: NodeId, item: NodeId) -> LayerResult<NodeId> {
        let len = match graph.shape(behaviors)? {
            NodeShape::Seq { len, width } if *width == self.config.behavior_dim => *len,
            other => {
                return Err(LayerError::GraphConstruction {
                    message: format!(
                        "behaviors must be [B, L, {}], got {}",
                        self.config.behavior_dim, other
                    ),
                })
            }
        };

        let query = match &self.query_projection {
            Some(projection) => projection.apply(graph, item)?,
            None => item,
        };

        let keys = graph.flatten_seq(behaviors)?;
        let queries = graph.repeat_rows(query, len)?;
        let product = graph.mul(keys, queries)?;
        let difference = graph.sub(keys, queries)?;
        let features = graph.concat(&[keys, queries, product, difference])?;

        let scores = self.scorer.apply(graph, features)?;
        let weights = graph.unflatten_seq(scores)?;
        let weighted = graph.broadcast_mul(weights, behaviors)?;
        Ok(graph.sum_seq(weighted)?)
    }

    /// Returns the configuration.
    pub fn config(&self) -> &DINConfig {
        &self.config
    }

    /// Returns the trainable parameters.
    pub fn params(&self) -> Vec<NodeId> {
        let mut params = Vec::new();
        if let Some(projection) = &self.query_projection {
            params.extend(projection.params());
        }
        params.extend(self.scorer.params());
        params
    }
}
