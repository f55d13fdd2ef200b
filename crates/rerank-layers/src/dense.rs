//! Dense (fully connected) layer.
//!
//! A [`Dense`] layer owns a kernel parameter of shape `[in_features, out_features]`
//! and an optional bias of shape `[out_features]` in a [`Graph`], and appends
//! `y = xW + b` to the graph each time it is applied.

use rand::rngs::StdRng;
use rerank_tensor::{Graph, NodeId};

use crate::error::{LayerError, LayerResult};
use crate::initializer::Initializer;

/// A dense layer whose parameters live in a graph.
///
/// # Example
///
/// ```
/// use rand::{rngs::StdRng, SeedableRng};
/// use rerank_layers::dense::Dense;
/// use rerank_tensor::{Graph, NodeShape};
///
/// let mut graph = Graph::new();
/// let mut rng = StdRng::seed_from_u64(0);
/// let layer = Dense::build(&mut graph, "fc", 8, 4, true, &mut rng).unwrap();
/// let x = graph.input("x", 8);
/// let y = layer.apply(&mut graph, x).unwrap();
/// assert_eq!(graph.shape(y).unwrap(), &NodeShape::Batch { width: 4 });
/// assert_eq!(layer.params().len(), 2);
/// ```
#[derive(Debug, Clone)]
pub struct Dense {
    kernel: NodeId,
    bias: Option<NodeId>,
    in_features: usize,
    out_features: usize,
}

impl Dense {
    /// Creates the layer's parameters under `name`.
    ///
    /// The kernel is Glorot-uniform initialized and the bias starts at zero.
    pub fn build(
        graph: &mut Graph,
        name: &str,
        in_features: usize,
        out_features: usize,
        use_bias: bool,
        rng: &mut StdRng,
    ) -> LayerResult<Self> {
        if in_features == 0 || out_features == 0 {
            return Err(LayerError::ConfigError {
                message: format!(
                    "dense layer {} needs positive dimensions, got {}x{}",
                    name, in_features, out_features
                ),
            });
        }
        let shape = [in_features, out_features];
        let kernel = graph.param(
            format!("{}/kernel", name),
            &shape,
            Initializer::GlorotUniform.initialize(&shape, rng),
        )?;
        let bias = if use_bias {
            Some(graph.param(
                format!("{}/bias", name),
                &[out_features],
                Initializer::Zeros.initialize(&[out_features], rng),
            )?)
        } else {
            None
        };
        Ok(Self {
            kernel,
            bias,
            in_features,
            out_features,
        })
    }

    /// Appends `xW + b` for `input` and returns the result node.
    pub fn apply(&self, graph: &mut Graph, input: NodeId) -> LayerResult<NodeId> {
        let projected = graph.matmul(input, self.kernel)?;
        match self.bias {
            Some(bias) => Ok(graph.add_bias(projected, bias)?),
            None => Ok(projected),
        }
    }

    /// Returns the input dimension.
    pub fn in_features(&self) -> usize {
        self.in_features
    }

    /// Returns the output dimension.
    pub fn out_features(&self) -> usize {
        self.out_features
    }

    /// Returns the trainable parameters of this layer.
    pub fn params(&self) -> Vec<NodeId> {
        let mut params = vec![self.kernel];
        params.extend(self.bias);
        params
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    #[test]
    fn test_dense_rejects_zero_dims() {
        let mut graph = Graph::new();
        let mut rng = StdRng::seed_from_u64(0);
        assert!(Dense::build(&mut graph, "fc", 0, 3, true, &mut rng).is_err());
    }

    #[test]
    fn test_dense_without_bias() {
        let mut graph = Graph::new();
        let mut rng = StdRng::seed_from_u64(0);
        let layer = Dense::build(&mut graph, "fc", 3, 2, false, &mut rng).unwrap();
        assert_eq!(layer.params().len(), 1);
        assert_eq!(graph.node(layer.params()[0]).unwrap().name(), "fc/kernel");
    }

    #[test]
    fn test_dense_apply_rejects_wrong_width() {
        let mut graph = Graph::new();
        let mut rng = StdRng::seed_from_u64(0);
        let layer = Dense::build(&mut graph, "fc", 3, 2, true, &mut rng).unwrap();
        let x = graph.input("x", 4);
        assert!(layer.apply(&mut graph, x).is_err());
    }
}
