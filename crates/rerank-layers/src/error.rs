//! Error types for the rerank-layers crate.

use rerank_tensor::TensorError;
use thiserror::Error;

/// Error type for layer and model operations.
#[derive(Debug, Error)]
pub enum LayerError {
    /// Configuration error for a layer or model.
    #[error("Configuration error: {message}")]
    ConfigError {
        /// Description of the configuration error
        message: String,
    },

    /// The forward graph could not be built from the given inputs.
    #[error("Graph construction error: {message}")]
    GraphConstruction {
        /// Description of the inconsistency
        message: String,
    },

    /// The forward graph was already built for this model.
    #[error("Forward graph already built")]
    AlreadyBuilt,

    /// The operation needs the forward graph, which has not been built yet.
    #[error("Forward graph not built")]
    NotBuilt,

    /// A parameter snapshot does not match the model topology.
    #[error("Snapshot mismatch: {message}")]
    SnapshotMismatch {
        /// Description of the mismatch
        message: String,
    },

    /// Snapshot encoding or decoding failed.
    #[error("Serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    /// Error raised by the graph substrate.
    #[error(transparent)]
    Tensor(#[from] TensorError),
}

impl LayerError {
    /// Reports substrate failures raised while building a graph as construction errors.
    pub(crate) fn into_construction(self) -> LayerError {
        match self {
            LayerError::Tensor(err) => LayerError::GraphConstruction {
                message: err.to_string(),
            },
            other => other,
        }
    }
}

/// Result type alias for layer operations.
pub type LayerResult<T> = Result<T, LayerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = LayerError::ConfigError {
            message: "bad".to_string(),
        };
        assert!(err.to_string().contains("Configuration error"));
        assert!(LayerError::AlreadyBuilt.to_string().contains("already built"));
    }

    #[test]
    fn test_into_construction() {
        let err = LayerError::from(TensorError::InvalidShape("x".to_string()));
        assert!(matches!(
            err.into_construction(),
            LayerError::GraphConstruction { .. }
        ));
        assert!(matches!(
            LayerError::NotBuilt.into_construction(),
            LayerError::NotBuilt
        ));
    }
}
