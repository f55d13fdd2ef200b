//! CLI Command Implementations
//!
//! This module contains the implementations for all CLI subcommands:
//!
//! - [`train`]: fit a model and save it
//! - [`predict`]: batched scoring with a saved model
//! - [`evaluate`]: objective, accuracy and ROC-AUC on labeled data

mod evaluate;
mod predict;
mod train;

use std::path::Path;

use anyhow::{Context, Result};
use rerank_training::ExperimentConfig;
use tracing::{info, warn};

pub use evaluate::EvaluateCommand;
pub use predict::PredictCommand;
pub use train::TrainCommand;

/// Reads the experiment config, or falls back to defaults.
fn load_experiment(path: Option<&Path>) -> Result<ExperimentConfig> {
    match path {
        Some(path) => {
            info!("Loading config from: {:?}", path);
            ExperimentConfig::from_json_file(path)
                .with_context(|| format!("Failed to load config {}", path.display()))
        }
        None => {
            warn!("No config file provided, using default configuration");
            Ok(ExperimentConfig::default())
        }
    }
}
