//! Training, prediction and model configuration.
//!
//! All configs are serde structs with defaults for every field, so a JSON
//! file only needs to name the values it changes.

use std::fs;
use std::path::Path;

use rerank_layers::din_ranker::{DinRanker, DinRankerConfig};
use rerank_layers::mlp_ranker::{MlpRanker, MlpRankerConfig};
use rerank_layers::model::Model;
use rerank_optimizer::OptimizerConfig;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{TrainError, TrainResult};
use crate::objective::Objective;

/// Default training batch size.
pub const DEFAULT_TRAIN_BATCH_SIZE: usize = 20;
/// Default number of epochs.
pub const DEFAULT_EPOCHS: usize = 200;
/// Default early-stop patience.
pub const DEFAULT_PATIENCE: usize = 10;
/// Default prediction batch size.
pub const DEFAULT_PREDICT_BATCH_SIZE: usize = 100;

/// Settings of one [`crate::trainer::Trainer::train`] call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainConfig {
    /// Rows per optimizer step.
    pub batch_size: usize,
    /// Maximum number of epochs.
    pub epochs: usize,
    /// Epochs without improvement before stopping; 0 disables early stopping.
    pub early_stop_patience: usize,
    /// Minimum objective decrease that counts as an improvement.
    pub min_delta: f32,
    /// Optimizer applied to every learnable.
    pub optimizer: OptimizerConfig,
    /// Loss function.
    pub objective: Objective,
    /// Epoch interval of the built-in logging hook; 0 disables it.
    pub log_every_n_epochs: usize,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_TRAIN_BATCH_SIZE,
            epochs: DEFAULT_EPOCHS,
            early_stop_patience: DEFAULT_PATIENCE,
            min_delta: 0.0,
            optimizer: OptimizerConfig::default(),
            objective: Objective::default(),
            log_every_n_epochs: 1,
        }
    }
}

impl TrainConfig {
    /// Sets the batch size.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Sets the number of epochs.
    pub fn with_epochs(mut self, epochs: usize) -> Self {
        self.epochs = epochs;
        self
    }

    /// Sets the early-stop patience.
    pub fn with_early_stop_patience(mut self, patience: usize) -> Self {
        self.early_stop_patience = patience;
        self
    }

    /// Sets the minimum improvement.
    pub fn with_min_delta(mut self, min_delta: f32) -> Self {
        self.min_delta = min_delta;
        self
    }

    /// Sets the optimizer.
    pub fn with_optimizer(mut self, optimizer: OptimizerConfig) -> Self {
        self.optimizer = optimizer;
        self
    }

    /// Sets the objective.
    pub fn with_objective(mut self, objective: Objective) -> Self {
        self.objective = objective;
        self
    }

    /// Sets the logging interval.
    pub fn with_log_every_n_epochs(mut self, every: usize) -> Self {
        self.log_every_n_epochs = every;
        self
    }

    /// Checks every field.
    pub fn validate(&self) -> TrainResult<()> {
        if self.batch_size == 0 {
            return Err(TrainError::InvalidConfig {
                message: "batch_size must be positive".to_string(),
            });
        }
        if !(self.min_delta.is_finite() && self.min_delta >= 0.0) {
            return Err(TrainError::InvalidConfig {
                message: format!("min_delta must be non-negative, got {}", self.min_delta),
            });
        }
        self.optimizer.validate()?;
        self.objective.validate()
    }

    /// Reads a config from a JSON file.
    pub fn from_json_file(path: impl AsRef<Path>) -> TrainResult<Self> {
        read_json(path.as_ref())
    }
}

/// Settings of a [`crate::predictor::Predictor`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PredictConfig {
    /// Rows per forward pass.
    pub batch_size: usize,
}

impl Default for PredictConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_PREDICT_BATCH_SIZE,
        }
    }
}

/// Which network to build, with its settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ModelConfig {
    /// Attention-pooling ranker.
    Din(DinRankerConfig),
    /// Mean-pooling MLP ranker.
    Mlp(MlpRankerConfig),
}

impl Default for ModelConfig {
    fn default() -> Self {
        ModelConfig::Din(DinRankerConfig::default())
    }
}

impl ModelConfig {
    /// Creates an unbuilt model.
    pub fn build(&self) -> Box<dyn Model + Send> {
        match self {
            ModelConfig::Din(config) => Box::new(DinRanker::new(config.clone())),
            ModelConfig::Mlp(config) => Box::new(MlpRanker::new(config.clone())),
        }
    }
}

/// Everything a train-then-predict run needs, as stored in one JSON file.
///
/// ```
/// use rerank_training::config::{ExperimentConfig, ModelConfig};
///
/// let config: ExperimentConfig = serde_json::from_str(
///     r#"{ "model": { "type": "mlp", "hidden_units": [16] }, "train": { "epochs": 5 } }"#,
/// ).unwrap();
/// assert!(matches!(config.model, ModelConfig::Mlp(_)));
/// assert_eq!(config.train.epochs, 5);
/// assert_eq!(config.train.batch_size, 20);
/// assert_eq!(config.predict.batch_size, 100);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExperimentConfig {
    /// Network settings.
    pub model: ModelConfig,
    /// Training settings.
    pub train: TrainConfig,
    /// Prediction settings.
    pub predict: PredictConfig,
}

impl ExperimentConfig {
    /// Reads a config from a JSON file.
    pub fn from_json_file(path: impl AsRef<Path>) -> TrainResult<Self> {
        read_json(path.as_ref())
    }
}

fn read_json<T: DeserializeOwned>(path: &Path) -> TrainResult<T> {
    let text = fs::read_to_string(path).map_err(|source| TrainError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&text).map_err(|source| TrainError::ConfigParse {
        path: path.to_path_buf(),
        source,
    })
}
