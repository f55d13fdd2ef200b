//! Error types for training and prediction.

use std::path::PathBuf;

use rerank_layers::LayerError;
use rerank_optimizer::OptimizerError;
use rerank_tensor::TensorError;
use thiserror::Error;

use crate::hooks::HookError;

/// Errors returned by the trainer, the predictor and checkpoint helpers.
///
/// Every failure is returned to the caller; none of them aborts the process.
#[derive(Debug, Error)]
pub enum TrainError {
    /// The sample layout is inconsistent.
    #[error("Invalid layout: {message}")]
    InvalidLayout {
        /// Description of the problem.
        message: String,
    },

    /// A configuration value is out of range.
    #[error("Invalid configuration: {message}")]
    InvalidConfig {
        /// Description of the problem.
        message: String,
    },

    /// A slice or binding did not have the expected dimensions.
    #[error("Shape error: {message}")]
    Shape {
        /// Description of the mismatch.
        message: String,
    },

    /// The model's forward graph could not be built.
    #[error("Graph construction error: {message}")]
    GraphConstruction {
        /// Description of the inconsistency.
        message: String,
    },

    /// The epoch objective stopped being finite.
    #[error("Numeric divergence at epoch {epoch}: objective is {loss}")]
    NumericDivergence {
        /// Epoch (0-based) whose objective diverged.
        epoch: usize,
        /// The non-finite objective value.
        loss: f32,
    },

    /// The model has no execution handle attached.
    #[error("Model has no execution handle attached")]
    MissingMachine,

    /// The attached execution handle was not created by this predictor.
    #[error("Attached execution handle does not belong to this predictor")]
    MachineMismatch,

    /// Any other model failure.
    #[error("Model error: {0}")]
    Model(LayerError),

    /// Any other execution failure.
    #[error("Execution error: {0}")]
    Execution(TensorError),

    /// Optimizer construction failed.
    #[error("Optimizer error: {0}")]
    Optimizer(#[from] OptimizerError),

    /// A training hook failed.
    #[error("Hook error: {0}")]
    Hook(#[from] HookError),

    /// I/O error on a file.
    #[error("I/O error at {path}: {source}")]
    Io {
        /// Path where the error occurred.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// A configuration file could not be parsed.
    #[error("Config parse error in {path}: {source}")]
    ConfigParse {
        /// Path of the file.
        path: PathBuf,
        /// Underlying parse error.
        #[source]
        source: serde_json::Error,
    },
}

impl From<TensorError> for TrainError {
    fn from(err: TensorError) -> Self {
        match err {
            TensorError::ShapeMismatch { .. }
            | TensorError::InvalidShape(_)
            | TensorError::InvalidOperand { .. } => TrainError::Shape {
                message: err.to_string(),
            },
            other => TrainError::Execution(other),
        }
    }
}

impl From<LayerError> for TrainError {
    fn from(err: LayerError) -> Self {
        match err {
            LayerError::GraphConstruction { message } => TrainError::GraphConstruction { message },
            LayerError::Tensor(inner) => inner.into(),
            other => TrainError::Model(other),
        }
    }
}

/// Result type for training operations.
pub type TrainResult<T> = Result<T, TrainError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tensor_shape_errors_become_shape_errors() {
        let err: TrainError = TensorError::ShapeMismatch {
            expected: vec![2, 3],
            actual: vec![1, 3],
        }
        .into();
        assert!(matches!(err, TrainError::Shape { .. }));

        let err: TrainError = TensorError::UnboundInput("x".to_string()).into();
        assert!(matches!(err, TrainError::Execution(_)));
    }

    #[test]
    fn test_layer_construction_errors_are_preserved() {
        let err: TrainError = LayerError::GraphConstruction {
            message: "bad width".to_string(),
        }
        .into();
        assert!(matches!(err, TrainError::GraphConstruction { .. }));

        let err: TrainError = LayerError::AlreadyBuilt.into();
        assert!(matches!(err, TrainError::Model(_)));
    }

    #[test]
    fn test_divergence_display() {
        let err = TrainError::NumericDivergence {
            epoch: 3,
            loss: f32::NAN,
        };
        assert!(err.to_string().contains("epoch 3"));
    }
}
