//! Rerank CLI Library
//!
//! This crate provides the command-line interface for rerank models:
//!
//! - **Train**: fit a model on a JSON dataset and write a model file
//! - **Predict**: score every row of a dataset with a saved model
//! - **Evaluate**: score a labeled dataset and report loss, accuracy and AUC
//!
//! # Example
//!
//! ```bash
//! # Train a model
//! rerank train --data train.json --layout layout.json --output model.bin
//!
//! # Score rows (one score per line, ROC-AUC when labels are present)
//! rerank predict --data test.json --layout layout.json --model model.bin
//!
//! # Report metrics as JSON
//! rerank evaluate --data test.json --layout layout.json --model model.bin
//! ```

pub mod commands;
pub mod dataset;

use clap::{Parser, Subcommand};

pub use commands::{EvaluateCommand, PredictCommand, TrainCommand};
pub use dataset::Dataset;

/// Rerank - attention-based ranking models
///
/// Trains and serves models that score (user, item, context) samples by the
/// probability of a positive interaction.
#[derive(Parser, Debug)]
#[command(name = "rerank")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// The subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Train a model and save its parameters
    Train(TrainCommand),

    /// Score a dataset with a saved model
    Predict(PredictCommand),

    /// Measure a saved model on a labeled dataset
    Evaluate(EvaluateCommand),
}

/// Result type alias for CLI operations
pub type CliResult<T> = anyhow::Result<T>;
