//! Row batching.
//!
//! Training and prediction both walk the feature tensor in contiguous row
//! batches. They differ in how the trailing partial batch is handled:
//! training drops it, prediction pads it to full width with zero rows and
//! keeps only the outputs of the real rows.

use std::ops::Range;

use rerank_tensor::{Graph, Machine, NodeId, Tensor};
use serde::{Deserialize, Serialize};

use crate::error::TrainResult;
use crate::layout::{Block, SampleLayout};

/// What to do with rows that do not fill a whole batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TailPolicy {
    /// Skip the trailing partial batch.
    Drop,
    /// Include it, padded up to the batch size.
    Pad,
}

/// Contiguous rows `[start, end)` processed in one execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Batch {
    /// First row.
    pub start: usize,
    /// One past the last real row.
    pub end: usize,
}

impl Batch {
    /// Number of real rows.
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    /// Returns whether the batch has no rows.
    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// Row range of the batch.
    pub fn rows(&self) -> Range<usize> {
        self.start..self.end
    }
}

/// Splits `rows` into consecutive batches of `batch_size`.
///
/// # Example
///
/// ```
/// use rerank_training::batch::{batch_ranges, TailPolicy};
///
/// let train = batch_ranges(10, 3, TailPolicy::Drop);
/// assert_eq!(train.len(), 3);
/// assert_eq!(train.last().unwrap().end, 9);
///
/// let predict = batch_ranges(10, 3, TailPolicy::Pad);
/// assert_eq!(predict.len(), 4);
/// assert_eq!(predict.last().unwrap().rows(), 9..10);
/// ```
pub fn batch_ranges(rows: usize, batch_size: usize, policy: TailPolicy) -> Vec<Batch> {
    if batch_size == 0 {
        return Vec::new();
    }
    let full = rows / batch_size;
    let mut batches: Vec<Batch> = (0..full)
        .map(|b| Batch {
            start: b * batch_size,
            end: (b + 1) * batch_size,
        })
        .collect();
    if policy == TailPolicy::Pad && rows % batch_size != 0 {
        batches.push(Batch {
            start: full * batch_size,
            end: rows,
        });
    }
    batches
}

/// Binds the four feature blocks of `batch` to the model inputs.
///
/// Partial batches are zero-padded to the machine's batch size.
pub(crate) fn bind_features(
    machine: &mut Machine,
    graph: &Graph,
    layout: &SampleLayout,
    input_nodes: &[NodeId; 4],
    features: &Tensor,
    batch: Batch,
) -> TrainResult<()> {
    let batch_size = machine.batch_size();
    for (block, node) in Block::ALL.iter().zip(input_nodes) {
        let slice = layout.slice(features, *block, batch.rows())?.pad_rows(batch_size)?;
        machine.bind(graph, *node, &slice)?;
    }
    Ok(())
}
