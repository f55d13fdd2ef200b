//! JSON datasets.
//!
//! A dataset file holds one feature row per sample and, optionally, one
//! label per sample:
//!
//! ```json
//! { "features": [[0.1, 0.2, ...], ...], "labels": [0, 1, ...] }
//! ```

use std::fs;
use std::path::Path;

use anyhow::{bail, Context, Result};
use rerank_tensor::Tensor;
use rerank_training::SampleLayout;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Samples loaded from a JSON file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Dataset {
    /// Feature rows.
    pub features: Vec<Vec<f32>>,
    /// Binary labels, one per row.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub labels: Option<Vec<f32>>,
}

impl Dataset {
    /// Reads a dataset file.
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("Failed to read dataset {}", path.display()))?;
        let dataset: Dataset = serde_json::from_str(&text)
            .with_context(|| format!("Failed to parse dataset {}", path.display()))?;
        if let Some(labels) = &dataset.labels {
            if labels.len() != dataset.features.len() {
                bail!(
                    "Dataset {} has {} labels for {} rows",
                    path.display(),
                    labels.len(),
                    dataset.features.len()
                );
            }
        }
        debug!(path = %path.display(), rows = dataset.len(), "Loaded dataset");
        Ok(dataset)
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.features.len()
    }

    /// Returns whether the dataset has no rows.
    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    /// Feature rows as a `[rows, width]` tensor checked against `layout`.
    pub fn feature_tensor(&self, layout: &SampleLayout) -> Result<Tensor> {
        let tensor = if self.features.is_empty() {
            Tensor::zeros(&[0, layout.total_width()])
        } else {
            Tensor::from_rows(&self.features).context("Feature rows are ragged")?
        };
        layout
            .check_inputs(&tensor)
            .context("Features do not match the layout")?;
        Ok(tensor)
    }

    /// Labels as a `[rows, 1]` tensor.
    pub fn label_tensor(&self) -> Result<Tensor> {
        match &self.labels {
            Some(labels) => Ok(Tensor::column(labels.clone())),
            None => bail!("Dataset has no labels"),
        }
    }
}

/// Reads a layout file.
pub fn load_layout(path: &Path) -> Result<SampleLayout> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("Failed to read layout {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("Invalid layout {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write(text: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(text.as_bytes()).unwrap();
        file
    }

    fn layout() -> SampleLayout {
        SampleLayout::new(0..1, 1..3, 3..4, 4..5, 5, 2, 1).unwrap()
    }

    #[test]
    fn test_load_with_and_without_labels() {
        let file = write(r#"{ "features": [[1,2,3,4,5],[5,4,3,2,1]], "labels": [0, 1] }"#);
        let dataset = Dataset::load(file.path()).unwrap();
        assert_eq!(dataset.len(), 2);
        assert_eq!(dataset.feature_tensor(&layout()).unwrap().shape(), &[2, 5]);
        assert_eq!(dataset.label_tensor().unwrap().data(), &[0.0, 1.0]);

        let file = write(r#"{ "features": [[1,2,3,4,5]] }"#);
        let dataset = Dataset::load(file.path()).unwrap();
        assert!(dataset.label_tensor().is_err());
    }

    #[test]
    fn test_rejects_label_count_mismatch() {
        let file = write(r#"{ "features": [[1,2,3,4,5]], "labels": [0, 1] }"#);
        assert!(Dataset::load(file.path()).is_err());
    }

    #[test]
    fn test_rejects_wrong_width() {
        let file = write(r#"{ "features": [[1,2,3,4]] }"#);
        let dataset = Dataset::load(file.path()).unwrap();
        assert!(dataset.feature_tensor(&layout()).is_err());
    }

    #[test]
    fn test_load_layout() {
        let file = write(
            r#"{ "user_profile": [0, 1], "user_behavior": [1, 3], "item": [3, 4],
                 "context": [4, 5], "total_width": 5, "behavior_seq_len": 2, "behavior_dim": 1 }"#,
        );
        assert_eq!(load_layout(file.path()).unwrap(), layout());

        let file = write(
            r#"{ "user_profile": [0, 2], "user_behavior": [1, 3], "item": [3, 4],
                 "context": [4, 5], "total_width": 5, "behavior_seq_len": 2, "behavior_dim": 1 }"#,
        );
        assert!(load_layout(file.path()).is_err());
    }
}
