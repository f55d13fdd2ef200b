//! Training, batched prediction and evaluation for rerank models.
//!
//! This crate drives any [`rerank_layers::model::Model`] over an in-memory
//! feature tensor:
//!
//! - **Layout**: [`SampleLayout`] maps the four model input blocks onto column
//!   ranges of a wide feature row
//! - **Trainer**: epochs of contiguous batches with one optimizer step per
//!   batch, early stopping, divergence detection and hooks
//! - **Predictor**: forward-only scoring of any number of rows
//! - **Metrics**: ROC-AUC, accuracy and per-epoch metric recording
//! - **Checkpoints**: model files with optional gzip compression
//!
//! # Architecture
//!
//! ```text
//!   features [rows, width] ── SampleLayout ──┬── Trainer ── loss ── optimizer step
//!                                            │      │
//!                                            │   hooks / early stopping
//!                                            │
//!                                            └── Predictor ── scores ── roc_auc
//! ```
//!
//! # Example
//!
//! ```
//! use rerank_layers::prelude::*;
//! use rerank_tensor::Tensor;
//! use rerank_training::{Predictor, SampleLayout, TrainConfig, Trainer};
//!
//! let layout = SampleLayout::new(0..2, 2..8, 8..10, 10..11, 11, 3, 2).unwrap();
//! let features = Tensor::from_data(&[4, 11], (0..44).map(|i| (i % 5) as f32 / 5.0).collect()).unwrap();
//! let labels = Tensor::column(vec![0.0, 1.0, 0.0, 1.0]);
//!
//! let mut model = DinRanker::default();
//! let mut trainer = Trainer::new(TrainConfig::default().with_batch_size(2).with_epochs(2)).unwrap();
//! trainer.train(&mut model, &layout, &features, &labels).unwrap();
//!
//! let predictor = Predictor::new(&mut model, &layout, 3).unwrap();
//! let scores = predictor.predict(&mut model, &features).unwrap();
//! assert_eq!(scores.len(), 4);
//! ```

#![warn(missing_docs)]

pub mod batch;
pub mod checkpoint;
pub mod config;
pub mod early_stopping;
pub mod error;
pub mod hooks;
pub mod layout;
pub mod metrics;
pub mod objective;
pub mod predictor;
pub mod trainer;

pub use batch::{batch_ranges, Batch, TailPolicy};
pub use checkpoint::{load_model, save_model, Compression};
pub use config::{ExperimentConfig, ModelConfig, PredictConfig, TrainConfig};
pub use early_stopping::EarlyStopping;
pub use error::{TrainError, TrainResult};
pub use hooks::{Hook, HookAction, HookError, HookList, HookResult, LoggingHook};
pub use layout::{Block, SampleLayout};
pub use metrics::{accuracy, roc_auc, Metrics, MetricsRecorder};
pub use objective::Objective;
pub use predictor::Predictor;
pub use trainer::{TrainReport, Trainer};
