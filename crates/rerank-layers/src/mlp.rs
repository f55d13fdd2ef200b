//! Multi-layer perceptron (MLP) implementation.
//!
//! This module provides the [`MLP`] struct, which is a stack of dense layers
//! with activation functions between them.

use rand::rngs::StdRng;
use rerank_tensor::{Graph, NodeId};
use serde::{Deserialize, Serialize};

use crate::dense::Dense;
use crate::error::{LayerError, LayerResult};

/// Activation function types supported by MLP.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum ActivationType {
    /// Rectified Linear Unit
    #[default]
    ReLU,
    /// Sigmoid function
    Sigmoid,
    /// No activation (identity)
    None,
}

impl ActivationType {
    /// Appends the activation for `input` and returns the result node.
    pub fn apply(&self, graph: &mut Graph, input: NodeId) -> LayerResult<NodeId> {
        Ok(match self {
            ActivationType::ReLU => graph.relu(input)?,
            ActivationType::Sigmoid => graph.sigmoid(input)?,
            ActivationType::None => input,
        })
    }
}

/// Configuration for building an MLP.
///
/// # Example
///
/// ```
/// use rerank_layers::mlp::{MLPConfig, ActivationType};
///
/// let config = MLPConfig::new(16)
///     .add_layer(200, ActivationType::ReLU)
///     .add_layer(80, ActivationType::ReLU)
///     .add_layer(1, ActivationType::Sigmoid);
/// assert!(config.validate().is_ok());
/// assert_eq!(config.output_dim(), Some(1));
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MLPConfig {
    /// Input dimension
    pub input_dim: usize,
    /// Layer configurations: (output_dim, activation)
    pub layers: Vec<(usize, ActivationType)>,
    /// Whether to use bias in dense layers
    pub use_bias: bool,
}

impl MLPConfig {
    /// Creates a new MLP configuration with the specified input dimension.
    pub fn new(input_dim: usize) -> Self {
        Self {
            input_dim,
            layers: Vec::new(),
            use_bias: true,
        }
    }

    /// Adds a layer to the MLP configuration.
    pub fn add_layer(mut self, output_dim: usize, activation: ActivationType) -> Self {
        self.layers.push((output_dim, activation));
        self
    }

    /// Sets whether to use bias in dense layers.
    pub fn with_bias(mut self, use_bias: bool) -> Self {
        self.use_bias = use_bias;
        self
    }

    /// Output dimension of the last layer.
    pub fn output_dim(&self) -> Option<usize> {
        self.layers.last().map(|(dim, _)| *dim)
    }

    /// Validates the configuration.
    pub fn validate(&self) -> Result<(), LayerError> {
        if self.input_dim == 0 {
            return Err(LayerError::ConfigError {
                message: "Input dimension must be positive".to_string(),
            });
        }
        if self.layers.is_empty() {
            return Err(LayerError::ConfigError {
                message: "MLP must have at least one layer".to_string(),
            });
        }
        for (i, (dim, _)) in self.layers.iter().enumerate() {
            if *dim == 0 {
                return Err(LayerError::ConfigError {
                    message: format!("Layer {} has zero output dimension", i),
                });
            }
        }
        Ok(())
    }

    /// Creates the MLP's parameters in `graph` under `name`.
    pub fn build(self, graph: &mut Graph, name: &str, rng: &mut StdRng) -> LayerResult<MLP> {
        self.validate()?;
        let mut dense_layers = Vec::with_capacity(self.layers.len());
        let mut in_dim = self.input_dim;
        for (i, (out_dim, _)) in self.layers.iter().enumerate() {
            let layer_name = format!("{}/dense_{}", name, i);
            dense_layers.push(Dense::build(
                graph,
                &layer_name,
                in_dim,
                *out_dim,
                self.use_bias,
                rng,
            )?);
            in_dim = *out_dim;
        }
        Ok(MLP {
            dense_layers,
            config: self,
        })
    }
}

/// A multi-layer perceptron whose parameters live in a graph.
#[derive(Debug, Clone)]
pub struct MLP {
    dense_layers: Vec<Dense>,
    config: MLPConfig,
}

impl MLP {
    /// Appends every layer and activation for `input`, returning the last node.
    pub fn apply(&self, graph: &mut Graph, input: NodeId) -> LayerResult<NodeId> {
        let mut x = input;
        for (dense, (_, activation)) in self.dense_layers.iter().zip(&self.config.layers) {
            x = dense.apply(graph, x)?;
            x = activation.apply(graph, x)?;
        }
        Ok(x)
    }

    /// Returns the configuration used to build this MLP.
    pub fn config(&self) -> &MLPConfig {
        &self.config
    }

    /// Returns the trainable parameters of every layer.
    pub fn params(&self) -> Vec<NodeId> {
        self.dense_layers.iter().flat_map(Dense::params).collect()
    }
}
