//! Graph-building layers and ranking models.
//!
//! Layers in this crate do not compute anything themselves: they create their
//! trainable parameters in a [`rerank_tensor::Graph`] and append operation
//! nodes when applied. The resulting graph is compiled and executed by
//! `rerank-tensor`, and trained by `rerank-training`.
//!
//! - **Dense / MLP**: fully connected layers with Glorot-uniform kernels
//! - **DIN**: Deep Interest Network attention over user behavior sequences
//! - **Models**: the [`model::Model`] capability with two rankers,
//!   [`din_ranker::DinRanker`] and [`mlp_ranker::MlpRanker`]
//! - **Snapshots**: parameter export and import for trained models
//!
//! # Quick Start
//!
//! ```
//! use rerank_layers::prelude::*;
//!
//! let shape = ModelShape {
//!     batch_size: 8,
//!     profile_dim: 4,
//!     behavior_seq_len: 5,
//!     behavior_dim: 3,
//!     item_dim: 3,
//!     ctx_dim: 2,
//! };
//! let mut model = DinRanker::default();
//! let inputs = ModelInputs::declare(model.graph_mut(), &shape);
//! model.forward(inputs, &shape).unwrap();
//!
//! let bytes = model.marshal().unwrap();
//! model.unmarshal(&bytes).unwrap();
//! ```

#![warn(missing_docs)]

pub mod dense;
pub mod din;
pub mod din_ranker;
pub mod error;
pub mod initializer;
pub mod mlp;
pub mod mlp_ranker;
pub mod model;
pub mod snapshot;

pub use error::{LayerError, LayerResult};

/// Commonly used types.
pub mod prelude {
    pub use crate::dense::Dense;
    pub use crate::din::{DINAttention, DINConfig};
    pub use crate::din_ranker::{DinRanker, DinRankerConfig};
    pub use crate::error::{LayerError, LayerResult};
    pub use crate::initializer::Initializer;
    pub use crate::mlp::{ActivationType, MLPConfig, MLP};
    pub use crate::mlp_ranker::{MlpRanker, MlpRankerConfig};
    pub use crate::model::{Model, ModelInputs, ModelShape, ModelState, TrainingHead};
    pub use crate::snapshot::{ParamEntry, ParamSnapshot};
}
