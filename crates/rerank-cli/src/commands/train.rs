//! Train Command Implementation
//!
//! Fits a ranking model on a JSON dataset and writes the trained parameters
//! to a model file.

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Args;
use rerank_training::{save_model, Compression, TrainReport, Trainer};
use tracing::info;

use super::load_experiment;
use crate::dataset::{load_layout, Dataset};

/// Train a model on a labeled dataset
///
/// Model, optimizer and training settings come from the experiment config
/// file; the flags below override individual training settings.
///
/// # Example
///
/// ```bash
/// rerank train \
///     --data train.json \
///     --layout layout.json \
///     --config experiment.json \
///     --output models/din.bin.gz --gzip
/// ```
#[derive(Args, Debug, Clone)]
pub struct TrainCommand {
    /// Labeled dataset (JSON with `features` and `labels`)
    #[arg(long, short = 'i', env = "RERANK_DATA")]
    pub data: PathBuf,

    /// Sample layout (JSON)
    #[arg(long, short = 'l', env = "RERANK_LAYOUT")]
    pub layout: PathBuf,

    /// Experiment configuration file (JSON)
    #[arg(long, short = 'c', env = "RERANK_CONFIG")]
    pub config: Option<PathBuf>,

    /// Where to write the trained model
    #[arg(long, short = 'o')]
    pub output: PathBuf,

    /// Override the number of epochs
    #[arg(long)]
    pub epochs: Option<usize>,

    /// Override the training batch size
    #[arg(long, short = 'b')]
    pub batch_size: Option<usize>,

    /// Override the early stopping patience (0 disables)
    #[arg(long)]
    pub patience: Option<usize>,

    /// Gzip the model file
    #[arg(long, default_value = "false")]
    pub gzip: bool,
}

impl TrainCommand {
    /// Execute the train command
    pub fn run(&self) -> Result<()> {
        let report = self.execute()?;
        println!(
            "{}",
            serde_json::to_string_pretty(&report).context("Failed to encode train report")?
        );
        Ok(())
    }

    /// Trains and saves the model, returning the training report.
    pub fn execute(&self) -> Result<TrainReport> {
        info!("Starting training...");
        let mut experiment = load_experiment(self.config.as_deref())?;
        if let Some(epochs) = self.epochs {
            experiment.train.epochs = epochs;
        }
        if let Some(batch_size) = self.batch_size {
            experiment.train.batch_size = batch_size;
        }
        if let Some(patience) = self.patience {
            experiment.train.early_stop_patience = patience;
        }

        let layout = load_layout(&self.layout)?;
        let dataset = Dataset::load(&self.data)?;
        if dataset.labels.is_none() {
            bail!("Training data {} has no labels", self.data.display());
        }
        let features = dataset.feature_tensor(&layout)?;
        let labels = dataset.label_tensor()?;

        info!(
            "Training configuration: rows={}, batch_size={}, epochs={}, optimizer={}",
            dataset.len(),
            experiment.train.batch_size,
            experiment.train.epochs,
            experiment.train.optimizer.name()
        );

        let mut model = experiment.model.build();
        let mut trainer = Trainer::new(experiment.train.clone()).context("Invalid training config")?;
        let report = trainer
            .train(model.as_mut(), &layout, &features, &labels)
            .context("Training failed")?;

        let compression = if self.gzip {
            Compression::Gzip
        } else {
            Compression::None
        };
        save_model(&self.output, model.as_ref(), compression)
            .with_context(|| format!("Failed to save model to {}", self.output.display()))?;

        info!(
            epochs = report.epochs_run,
            best_loss = ?report.best_loss,
            early_stopped = report.early_stopped,
            "Training complete"
        );
        Ok(report)
    }
}
