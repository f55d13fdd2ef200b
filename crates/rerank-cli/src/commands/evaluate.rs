//! Evaluate Command Implementation

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Args;
use rerank_training::Metrics;

use super::load_experiment;
use super::predict::prepare;

/// Measure a saved model on a labeled dataset
///
/// Prints the objective value, accuracy and ROC-AUC as JSON.
#[derive(Args, Debug, Clone)]
pub struct EvaluateCommand {
    /// Labeled dataset (JSON with `features` and `labels`)
    #[arg(long, short = 'i', env = "RERANK_DATA")]
    pub data: PathBuf,

    /// Sample layout (JSON)
    #[arg(long, short = 'l', env = "RERANK_LAYOUT")]
    pub layout: PathBuf,

    /// Model file written by `rerank train`
    #[arg(long, short = 'm', env = "RERANK_MODEL")]
    pub model: PathBuf,

    /// Experiment configuration the model was trained with (JSON)
    #[arg(long, short = 'c', env = "RERANK_CONFIG")]
    pub config: Option<PathBuf>,

    /// Override the prediction batch size
    #[arg(long, short = 'b')]
    pub batch_size: Option<usize>,
}

impl EvaluateCommand {
    /// Execute the evaluate command
    pub fn run(&self) -> Result<()> {
        let metrics = self.execute()?;
        println!(
            "{}",
            serde_json::to_string_pretty(&metrics).context("Failed to encode metrics")?
        );
        Ok(())
    }

    /// Evaluates the model, returning its metrics.
    pub fn execute(&self) -> Result<Metrics> {
        let experiment = load_experiment(self.config.as_deref())?;
        let (predictor, mut model, dataset) = prepare(
            &experiment,
            &self.data,
            &self.layout,
            &self.model,
            self.batch_size,
        )?;
        let Some(labels) = dataset.labels.as_deref() else {
            bail!("Evaluation data {} has no labels", self.data.display());
        };
        let features = dataset.feature_tensor(predictor.layout())?;
        predictor
            .evaluate(model.as_mut(), &features, labels, &experiment.train.objective)
            .context("Evaluation failed")
    }
}
