//! Parameter snapshots.
//!
//! A [`ParamSnapshot`] records the name, shape and values of every trainable
//! parameter of a model. Restoring requires a model whose graph was built with
//! the identical topology: same architecture, same parameter names and shapes.

use bincode::Options;
use rerank_tensor::{Graph, NodeId, NodeShape};
use serde::{Deserialize, Serialize};

use crate::error::{LayerError, LayerResult};

/// Current snapshot encoding version.
pub const SNAPSHOT_FORMAT_VERSION: u32 = 1;

/// One saved parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamEntry {
    /// Parameter node name.
    pub name: String,
    /// Parameter dimensions.
    pub shape: Vec<usize>,
    /// Row-major values.
    pub data: Vec<f32>,
}

/// Saved trainable parameters of one model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamSnapshot {
    /// Encoding version.
    pub format_version: u32,
    /// Architecture identifier of the model that produced the snapshot.
    pub model: String,
    /// Parameters in registration order.
    pub params: Vec<ParamEntry>,
}

fn param_shape(graph: &Graph, id: NodeId) -> LayerResult<Vec<usize>> {
    match graph.shape(id)? {
        NodeShape::Fixed(dims) => Ok(dims.clone()),
        other => Err(LayerError::SnapshotMismatch {
            message: format!("node {} with shape {} is not a parameter", id.index(), other),
        }),
    }
}

impl ParamSnapshot {
    /// Reads the current values of `params` from `graph`.
    pub fn capture(model: &str, graph: &Graph, params: &[NodeId]) -> LayerResult<Self> {
        let mut entries = Vec::with_capacity(params.len());
        for id in params {
            entries.push(ParamEntry {
                name: graph.node(*id)?.name().to_string(),
                shape: param_shape(graph, *id)?,
                data: graph.param_data(*id)?,
            });
        }
        Ok(Self {
            format_version: SNAPSHOT_FORMAT_VERSION,
            model: model.to_string(),
            params: entries,
        })
    }

    /// Writes the saved values into `params`.
    ///
    /// Every entry is checked before any value is written, so a mismatching
    /// snapshot leaves the graph untouched.
    pub fn restore(&self, model: &str, graph: &Graph, params: &[NodeId]) -> LayerResult<()> {
        if self.model != model {
            return Err(LayerError::SnapshotMismatch {
                message: format!("snapshot is for '{}', model is '{}'", self.model, model),
            });
        }
        if self.params.len() != params.len() {
            return Err(LayerError::SnapshotMismatch {
                message: format!(
                    "snapshot has {} parameters, model has {}",
                    self.params.len(),
                    params.len()
                ),
            });
        }
        for (entry, id) in self.params.iter().zip(params) {
            let name = graph.node(*id)?.name();
            let shape = param_shape(graph, *id)?;
            if entry.name != name || entry.shape != shape {
                return Err(LayerError::SnapshotMismatch {
                    message: format!(
                        "snapshot parameter '{}' {:?} does not match '{}' {:?}",
                        entry.name, entry.shape, name, shape
                    ),
                });
            }
            let expected: usize = shape.iter().product();
            if entry.data.len() != expected {
                return Err(LayerError::SnapshotMismatch {
                    message: format!(
                        "snapshot parameter '{}' has {} values, shape {:?} needs {}",
                        entry.name,
                        entry.data.len(),
                        shape,
                        expected
                    ),
                });
            }
        }
        for (entry, id) in self.params.iter().zip(params) {
            graph.set_param_data(*id, entry.data.clone())?;
        }
        Ok(())
    }

    /// Encodes the snapshot with bincode.
    pub fn to_bytes(&self) -> LayerResult<Vec<u8>> {
        Ok(bincode::serialize(self)?)
    }

    /// Decodes a snapshot produced by [`ParamSnapshot::to_bytes`].
    ///
    /// Length prefixes are bounded by the input size, so a corrupt prefix
    /// fails instead of allocating.
    pub fn from_bytes(bytes: &[u8]) -> LayerResult<Self> {
        let snapshot: ParamSnapshot = bincode::DefaultOptions::new()
            .with_fixint_encoding()
            .allow_trailing_bytes()
            .with_limit(bytes.len() as u64)
            .deserialize(bytes)?;
        if snapshot.format_version != SNAPSHOT_FORMAT_VERSION {
            return Err(LayerError::SnapshotMismatch {
                message: format!(
                    "unsupported snapshot version {} (expected {})",
                    snapshot.format_version, SNAPSHOT_FORMAT_VERSION
                ),
            });
        }
        Ok(snapshot)
    }

    /// Total number of saved values.
    pub fn num_values(&self) -> usize {
        self.params.iter().map(|p| p.data.len()).sum()
    }
}
