//! Sample layout.
//!
//! Every sample is one wide feature row. A [`SampleLayout`] names the four
//! contiguous column ranges of that row that feed the model: user profile,
//! flattened user behavior sequence, item and context.

use std::fmt;
use std::ops::Range;

use rerank_layers::model::ModelShape;
use rerank_tensor::Tensor;
use serde::{Deserialize, Serialize};

use crate::error::{TrainError, TrainResult};

/// A logical block of the feature row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Block {
    /// User-profile features.
    UserProfile,
    /// Flattened user behavior sequence.
    UserBehavior,
    /// Candidate item features.
    Item,
    /// Context features.
    Context,
}

impl Block {
    /// The blocks in model input order.
    pub const ALL: [Block; 4] = [
        Block::UserProfile,
        Block::UserBehavior,
        Block::Item,
        Block::Context,
    ];
}

impl fmt::Display for Block {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Block::UserProfile => "user_profile",
            Block::UserBehavior => "user_behavior",
            Block::Item => "item",
            Block::Context => "context",
        };
        f.write_str(name)
    }
}

/// Serialized form of a layout, with ranges as `[start, end)` pairs.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct LayoutFile {
    user_profile: [usize; 2],
    user_behavior: [usize; 2],
    item: [usize; 2],
    context: [usize; 2],
    total_width: usize,
    behavior_seq_len: usize,
    behavior_dim: usize,
}

/// Validated column layout of a feature row.
///
/// # Example
///
/// ```
/// use rerank_training::layout::{Block, SampleLayout};
///
/// let layout = SampleLayout::new(0..2, 2..8, 8..10, 10..11, 11, 3, 2).unwrap();
/// assert_eq!(layout.range(Block::Item), 8..10);
/// assert_eq!(layout.model_shape(4).behavior_width(), 6);
///
/// // Overlapping ranges are rejected.
/// assert!(SampleLayout::new(0..3, 2..8, 8..10, 10..11, 11, 3, 2).is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "LayoutFile", into = "LayoutFile")]
pub struct SampleLayout {
    ranges: [Range<usize>; 4],
    total_width: usize,
    behavior_seq_len: usize,
    behavior_dim: usize,
}

impl SampleLayout {
    /// Creates a layout, validating that the ranges are non-empty, inside
    /// `total_width`, pairwise disjoint, and that the behavior range holds
    /// exactly `behavior_seq_len * behavior_dim` columns.
    pub fn new(
        user_profile: Range<usize>,
        user_behavior: Range<usize>,
        item: Range<usize>,
        context: Range<usize>,
        total_width: usize,
        behavior_seq_len: usize,
        behavior_dim: usize,
    ) -> TrainResult<Self> {
        let layout = Self {
            ranges: [user_profile, user_behavior, item, context],
            total_width,
            behavior_seq_len,
            behavior_dim,
        };
        layout.validate()?;
        Ok(layout)
    }

    fn validate(&self) -> TrainResult<()> {
        let invalid = |message: String| Err(TrainError::InvalidLayout { message });

        for (block, range) in Block::ALL.iter().zip(&self.ranges) {
            if range.start >= range.end {
                return invalid(format!("{} range {:?} is empty", block, range));
            }
            if range.end > self.total_width {
                return invalid(format!(
                    "{} range {:?} exceeds total width {}",
                    block, range, self.total_width
                ));
            }
        }
        for i in 0..self.ranges.len() {
            for j in i + 1..self.ranges.len() {
                let (a, b) = (&self.ranges[i], &self.ranges[j]);
                if a.start < b.end && b.start < a.end {
                    return invalid(format!(
                        "{} range {:?} overlaps {} range {:?}",
                        Block::ALL[i],
                        a,
                        Block::ALL[j],
                        b
                    ));
                }
            }
        }
        if self.behavior_seq_len == 0 || self.behavior_dim == 0 {
            return invalid("behavior sequence shape must be positive".to_string());
        }
        let behavior = self.width(Block::UserBehavior);
        if behavior != self.behavior_seq_len * self.behavior_dim {
            return invalid(format!(
                "user_behavior range has {} columns, expected {} x {}",
                behavior, self.behavior_seq_len, self.behavior_dim
            ));
        }
        Ok(())
    }

    /// Column range of a block.
    pub fn range(&self, block: Block) -> Range<usize> {
        self.ranges[block as usize].clone()
    }

    /// Number of columns of a block.
    pub fn width(&self, block: Block) -> usize {
        let range = &self.ranges[block as usize];
        range.end - range.start
    }

    /// Width of a full feature row.
    pub fn total_width(&self) -> usize {
        self.total_width
    }

    /// Length of the behavior sequence.
    pub fn behavior_seq_len(&self) -> usize {
        self.behavior_seq_len
    }

    /// Width of one behavior vector.
    pub fn behavior_dim(&self) -> usize {
        self.behavior_dim
    }

    /// Model dimensions implied by this layout.
    pub fn model_shape(&self, batch_size: usize) -> ModelShape {
        ModelShape {
            batch_size,
            profile_dim: self.width(Block::UserProfile),
            behavior_seq_len: self.behavior_seq_len,
            behavior_dim: self.behavior_dim,
            item_dim: self.width(Block::Item),
            ctx_dim: self.width(Block::Context),
        }
    }

    /// Checks that `inputs` is a 2-D tensor of full feature rows.
    pub fn check_inputs(&self, inputs: &Tensor) -> TrainResult<()> {
        if inputs.ndim() != 2 || inputs.cols() != self.total_width {
            return Err(TrainError::Shape {
                message: format!(
                    "feature tensor has shape {:?}, expected [rows, {}]",
                    inputs.shape(),
                    self.total_width
                ),
            });
        }
        Ok(())
    }

    /// Copies the columns of `block` for `rows` out of the feature tensor.
    pub fn slice(&self, inputs: &Tensor, block: Block, rows: Range<usize>) -> TrainResult<Tensor> {
        Ok(inputs.slice_2d(rows, self.range(block))?)
    }
}

impl TryFrom<LayoutFile> for SampleLayout {
    type Error = TrainError;

    fn try_from(file: LayoutFile) -> Result<Self, Self::Error> {
        let range = |pair: [usize; 2]| pair[0]..pair[1];
        SampleLayout::new(
            range(file.user_profile),
            range(file.user_behavior),
            range(file.item),
            range(file.context),
            file.total_width,
            file.behavior_seq_len,
            file.behavior_dim,
        )
    }
}

impl From<SampleLayout> for LayoutFile {
    fn from(layout: SampleLayout) -> Self {
        let pair = |block: Block| {
            let range = layout.range(block);
            [range.start, range.end]
        };
        LayoutFile {
            user_profile: pair(Block::UserProfile),
            user_behavior: pair(Block::UserBehavior),
            item: pair(Block::Item),
            context: pair(Block::Context),
            total_width: layout.total_width,
            behavior_seq_len: layout.behavior_seq_len,
            behavior_dim: layout.behavior_dim,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layout() -> SampleLayout {
        SampleLayout::new(0..2, 2..8, 8..10, 10..11, 11, 3, 2).unwrap()
    }

    #[test]
    fn test_widths_and_shape() {
        let l = layout();
        assert_eq!(l.width(Block::UserProfile), 2);
        assert_eq!(l.width(Block::UserBehavior), 6);
        assert_eq!(l.width(Block::Context), 1);
        let shape = l.model_shape(4);
        assert_eq!(shape.batch_size, 4);
        assert_eq!(shape.item_dim, 2);
        assert_eq!(shape.behavior_seq_len, 3);
    }

    #[test]
    fn test_rejects_empty_range() {
        assert!(matches!(
            SampleLayout::new(0..0, 2..8, 8..10, 10..11, 11, 3, 2),
            Err(TrainError::InvalidLayout { .. })
        ));
    }

    #[test]
    fn test_rejects_out_of_width() {
        assert!(SampleLayout::new(0..2, 2..8, 8..10, 10..12, 11, 3, 2).is_err());
    }

    #[test]
    fn test_rejects_behavior_length_mismatch() {
        assert!(SampleLayout::new(0..2, 2..8, 8..10, 10..11, 11, 2, 2).is_err());
        assert!(SampleLayout::new(0..2, 2..8, 8..10, 10..11, 11, 0, 2).is_err());
    }

    #[test]
    fn test_ranges_may_be_out_of_order() {
        let l = SampleLayout::new(9..11, 0..6, 6..8, 8..9, 11, 3, 2).unwrap();
        assert_eq!(l.range(Block::UserBehavior), 0..6);
    }

    #[test]
    fn test_slice_block() {
        let l = layout();
        let inputs = Tensor::from_data(&[2, 11], (0..22).map(|v| v as f32).collect()).unwrap();
        let item = l.slice(&inputs, Block::Item, 0..2).unwrap();
        assert_eq!(item.data(), &[8.0, 9.0, 19.0, 20.0]);
        assert!(matches!(
            l.slice(&inputs, Block::Item, 1..3),
            Err(TrainError::Shape { .. })
        ));
    }

    #[test]
    fn test_check_inputs() {
        let l = layout();
        assert!(l.check_inputs(&Tensor::zeros(&[3, 11])).is_ok());
        assert!(l.check_inputs(&Tensor::zeros(&[3, 10])).is_err());
    }

    #[test]
    fn test_json_roundtrip_validates() {
        let json = serde_json::to_string(&layout()).unwrap();
        assert!(json.contains("\"item\":[8,10]"));
        let back: SampleLayout = serde_json::from_str(&json).unwrap();
        assert_eq!(back, layout());

        let bad = json.replace("\"item\":[8,10]", "\"item\":[7,10]");
        assert!(serde_json::from_str::<SampleLayout>(&bad).is_err());
    }
}
