//! Predict Command Implementation

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Args;
use rerank_layers::model::Model;
use rerank_training::{load_model, roc_auc, ExperimentConfig, Predictor};
use tracing::info;

use super::load_experiment;
use crate::dataset::{load_layout, Dataset};

/// Score every row of a dataset with a saved model
///
/// Prints one score per line, in row order. When the dataset carries labels
/// the ROC-AUC of the scores follows on a final line.
///
/// # Example
///
/// ```bash
/// rerank predict --data test.json --layout layout.json --model models/din.bin.gz
/// ```
#[derive(Args, Debug, Clone)]
pub struct PredictCommand {
    /// Dataset to score (JSON; labels optional)
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

impl PredictCommand {
    /// Execute the predict command
    pub fn run(&self) -> Result<()> {
        let (scores, dataset) = self.execute()?;
        for score in &scores {
            println!("{}", score);
        }
        if let Some(labels) = &dataset.labels {
            match roc_auc(&scores, labels) {
                Some(auc) => println!("ROC-AUC: {:.6}", auc),
                None => println!("ROC-AUC: undefined"),
            }
        }
        Ok(())
    }

    /// Scores the dataset, returning the scores with the loaded dataset.
    pub fn execute(&self) -> Result<(Vec<f32>, Dataset)> {
        let experiment = load_experiment(self.config.as_deref())?;
        let (predictor, mut model, dataset) = prepare(
            &experiment,
            &self.data,
            &self.layout,
            &self.model,
            self.batch_size,
        )?;
        let features = dataset.feature_tensor(predictor.layout())?;
        let scores = predictor
            .predict(model.as_mut(), &features)
            .context("Prediction failed")?;
        info!(rows = scores.len(), "Prediction complete");
        Ok((scores, dataset))
    }
}

/// Loads the dataset and restores a saved model behind a predictor.
pub(super) fn prepare(
    experiment: &ExperimentConfig,
    data: &Path,
    layout: &Path,
    model_path: &Path,
    batch_size: Option<usize>,
) -> Result<(Predictor, Box<dyn Model + Send>, Dataset)> {
    let layout = load_layout(layout)?;
    let dataset = Dataset::load(data)?;
    let batch_size = batch_size.unwrap_or(experiment.predict.batch_size);

    let mut model = experiment.model.build();
    let predictor = Predictor::new(model.as_mut(), &layout, batch_size)
        .context("Failed to prepare the model for prediction")?;
    load_model(model_path, model.as_mut())
        .with_context(|| format!("Failed to load model {}", model_path.display()))?;
    info!(
        model = model.name(),
        batch_size,
        rows = dataset.len(),
        "Model restored"
    );
    Ok((predictor, model, dataset))
}
