//! Static shape metadata for graph nodes.
//!
//! The batch dimension of a graph is only known once a compiled program is
//! bound to concrete inputs, so node shapes are tracked symbolically: a node is
//! either a per-sample row (`[batch, width]`), a per-sample sequence
//! (`[batch, len, width]`), a flattened sequence (`[batch * len, width]`), a
//! scalar, or a fixed-size parameter.

use std::fmt;

/// Symbolic shape of a graph node.
///
/// # Examples
///
/// ```
/// use rerank_tensor::NodeShape;
///
/// let seq = NodeShape::Seq { len: 3, width: 2 };
/// assert_eq!(seq.width(), Some(2));
/// assert_eq!(seq.concrete(4), vec![4, 3, 2]);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum NodeShape {
    /// `[batch, width]`
    Batch {
        /// Number of columns per sample.
        width: usize,
    },
    /// `[batch, len, width]`
    Seq {
        /// Sequence length.
        len: usize,
        /// Width of each sequence element.
        width: usize,
    },
    /// `[batch * len, width]`
    Flat {
        /// Sequence length folded into the row dimension.
        len: usize,
        /// Width of each row.
        width: usize,
    },
    /// A rank-0 value.
    Scalar,
    /// A batch-independent tensor such as a parameter.
    Fixed(Vec<usize>),
}

impl NodeShape {
    /// Returns the innermost dimension when the node has one.
    pub fn width(&self) -> Option<usize> {
        match self {
            NodeShape::Batch { width }
            | NodeShape::Seq { width, .. }
            | NodeShape::Flat { width, .. } => Some(*width),
            NodeShape::Fixed(dims) => dims.last().copied(),
            NodeShape::Scalar => None,
        }
    }

    /// Returns the same shape family with a different innermost width.
    ///
    /// Scalars and fixed shapes are returned unchanged.
    pub fn with_width(&self, width: usize) -> NodeShape {
        match self {
            NodeShape::Batch { .. } => NodeShape::Batch { width },
            NodeShape::Seq { len, .. } => NodeShape::Seq { len: *len, width },
            NodeShape::Flat { len, .. } => NodeShape::Flat { len: *len, width },
            other => other.clone(),
        }
    }

    /// Returns whether the leading dimension depends on the batch size.
    pub fn is_batched(&self) -> bool {
        matches!(
            self,
            NodeShape::Batch { .. } | NodeShape::Seq { .. } | NodeShape::Flat { .. }
        )
    }

    /// Resolves the symbolic shape for a concrete batch size.
    pub fn concrete(&self, batch_size: usize) -> Vec<usize> {
        match self {
            NodeShape::Batch { width } => vec![batch_size, *width],
            NodeShape::Seq { len, width } => vec![batch_size, *len, *width],
            NodeShape::Flat { len, width } => vec![batch_size * len, *width],
            NodeShape::Scalar => vec![],
            NodeShape::Fixed(dims) => dims.clone(),
        }
    }
}

impl fmt::Display for NodeShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeShape::Batch { width } => write!(f, "[B, {}]", width),
            NodeShape::Seq { len, width } => write!(f, "[B, {}, {}]", len, width),
            NodeShape::Flat { len, width } => write!(f, "[B*{}, {}]", len, width),
            NodeShape::Scalar => write!(f, "[]"),
            NodeShape::Fixed(dims) => write!(f, "{:?}", dims),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_width() {
        assert_eq!(NodeShape::Batch { width: 5 }.width(), Some(5));
        assert_eq!(NodeShape::Flat { len: 2, width: 7 }.width(), Some(7));
        assert_eq!(NodeShape::Fixed(vec![3, 4]).width(), Some(4));
        assert_eq!(NodeShape::Scalar.width(), None);
    }

    #[test]
    fn test_with_width_keeps_family() {
        let flat = NodeShape::Flat { len: 3, width: 8 };
        assert_eq!(flat.with_width(1), NodeShape::Flat { len: 3, width: 1 });
        assert_eq!(NodeShape::Scalar.with_width(4), NodeShape::Scalar);
    }

    #[test]
    fn test_concrete() {
        assert_eq!(NodeShape::Batch { width: 2 }.concrete(4), vec![4, 2]);
        assert_eq!(NodeShape::Flat { len: 3, width: 2 }.concrete(4), vec![12, 2]);
        assert!(NodeShape::Scalar.concrete(4).is_empty());
        assert!(!NodeShape::Fixed(vec![2]).is_batched());
    }

    #[test]
    fn test_display() {
        assert_eq!(NodeShape::Seq { len: 3, width: 2 }.to_string(), "[B, 3, 2]");
        assert_eq!(NodeShape::Fixed(vec![2, 3]).to_string(), "[2, 3]");
    }
}
