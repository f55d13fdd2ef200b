#![allow(clippy::needless_range_loop)]
//! Host-side tensor type used to hand feature and label data to the graph.
//!
//! A [`Tensor`] is a dense, row-major `f32` buffer with an explicit shape. It is
//! deliberately small: the heavy numerics happen inside the execution backend,
//! this type only carries data across the API boundary and supports the
//! row/column slicing the training loop needs.

use std::ops::Range;

use serde::{Deserialize, Serialize};

use crate::{TensorError, TensorResult};

/// A dense row-major `f32` array.
///
/// # Example
///
/// ```
/// use rerank_tensor::Tensor;
///
/// let t = Tensor::from_data(&[2, 3], vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]).unwrap();
/// assert_eq!(t.shape(), &[2, 3]);
/// let col = t.slice_2d(0..2, 1..2).unwrap();
/// assert_eq!(col.data(), &[2.0, 5.0]);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tensor {
    /// The shape of the tensor (dimensions)
    shape: Vec<usize>,
    /// The underlying data in row-major order
    data: Vec<f32>,
}

impl Tensor {
    /// Creates a new tensor with the given shape, filled with zeros.
    pub fn zeros(shape: &[usize]) -> Self {
        let numel: usize = shape.iter().product();
        Self {
            shape: shape.to_vec(),
            data: vec![0.0; numel],
        }
    }

    /// Creates a new tensor with the given shape and data.
    ///
    /// # Errors
    ///
    /// Returns [`TensorError::InvalidShape`] if the data length doesn't match the shape.
    pub fn from_data(shape: &[usize], data: Vec<f32>) -> TensorResult<Self> {
        let numel: usize = shape.iter().product();
        if data.len() != numel {
            return Err(TensorError::InvalidShape(format!(
                "data length {} doesn't match shape {:?} (expected {})",
                data.len(),
                shape,
                numel
            )));
        }
        Ok(Self {
            shape: shape.to_vec(),
            data,
        })
    }

    /// Builds a 2-D tensor from equally sized rows.
    ///
    /// # Errors
    ///
    /// Returns [`TensorError::InvalidShape`] if the rows are ragged.
    pub fn from_rows<R: AsRef<[f32]>>(rows: &[R]) -> TensorResult<Self> {
        let cols = rows.first().map(|r| r.as_ref().len()).unwrap_or(0);
        let mut data = Vec::with_capacity(rows.len() * cols);
        for (i, row) in rows.iter().enumerate() {
            let row = row.as_ref();
            if row.len() != cols {
                return Err(TensorError::InvalidShape(format!(
                    "row {} has {} columns, expected {}",
                    i,
                    row.len(),
                    cols
                )));
            }
            data.extend_from_slice(row);
        }
        Self::from_data(&[rows.len(), cols], data)
    }

    /// Builds an `[n, 1]` column tensor, the layout used for labels.
    pub fn column(values: Vec<f32>) -> Self {
        Self {
            shape: vec![values.len(), 1],
            data: values,
        }
    }

    /// Returns the shape of the tensor.
    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    /// Returns the number of dimensions.
    pub fn ndim(&self) -> usize {
        self.shape.len()
    }

    /// Returns the total number of elements.
    pub fn numel(&self) -> usize {
        self.data.len()
    }

    /// Returns a reference to the underlying data.
    pub fn data(&self) -> &[f32] {
        &self.data
    }

    /// Consumes the tensor and returns its data.
    pub fn into_data(self) -> Vec<f32> {
        self.data
    }

    /// Number of rows of a 2-D tensor.
    pub fn rows(&self) -> usize {
        self.shape.first().copied().unwrap_or(0)
    }

    /// Number of columns of a 2-D tensor.
    pub fn cols(&self) -> usize {
        self.shape.get(1).copied().unwrap_or(0)
    }

    fn require_2d(&self) -> TensorResult<(usize, usize)> {
        if self.ndim() != 2 {
            return Err(TensorError::InvalidShape(format!(
                "expected a 2-D tensor, got shape {:?}",
                self.shape
            )));
        }
        Ok((self.shape[0], self.shape[1]))
    }

    /// Returns row `i` of a 2-D tensor.
    pub fn row(&self, i: usize) -> Option<&[f32]> {
        let (rows, cols) = self.require_2d().ok()?;
        if i >= rows {
            return None;
        }
        Some(&self.data[i * cols..(i + 1) * cols])
    }

    /// Copies the `[rows, cols]` window out of a 2-D tensor.
    ///
    /// # Errors
    ///
    /// Returns [`TensorError::ShapeMismatch`] if either range falls outside the tensor.
    pub fn slice_2d(&self, rows: Range<usize>, cols: Range<usize>) -> TensorResult<Tensor> {
        let (n_rows, n_cols) = self.require_2d()?;
        if rows.start > rows.end || rows.end > n_rows || cols.start > cols.end || cols.end > n_cols
        {
            return Err(TensorError::ShapeMismatch {
                expected: vec![rows.end, cols.end],
                actual: self.shape.clone(),
            });
        }
        let width = cols.end - cols.start;
        let mut data = Vec::with_capacity((rows.end - rows.start) * width);
        for r in rows.clone() {
            let base = r * n_cols;
            data.extend_from_slice(&self.data[base + cols.start..base + cols.end]);
        }
        Tensor::from_data(&[rows.end - rows.start, width], data)
    }

    /// Returns a copy of this 2-D tensor extended with zero rows up to `rows`.
    ///
    /// Tensors that already have at least `rows` rows are returned unchanged.
    pub fn pad_rows(&self, rows: usize) -> TensorResult<Tensor> {
        let (n_rows, n_cols) = self.require_2d()?;
        if n_rows >= rows {
            return Ok(self.clone());
        }
        let mut data = self.data.clone();
        data.resize(rows * n_cols, 0.0);
        Tensor::from_data(&[rows, n_cols], data)
    }

    /// Returns whether every element is finite.
    pub fn is_finite(&self) -> bool {
        self.data.iter().all(|v| v.is_finite())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid() -> Tensor {
        Tensor::from_data(&[3, 4], (0..12).map(|v| v as f32).collect()).unwrap()
    }

    #[test]
    fn test_from_data_rejects_bad_length() {
        let err = Tensor::from_data(&[2, 2], vec![1.0; 3]).unwrap_err();
        assert!(err.to_string().contains("doesn't match shape"));
    }

    #[test]
    fn test_from_rows_ragged() {
        let rows = vec![vec![1.0, 2.0], vec![3.0]];
        assert!(Tensor::from_rows(&rows).is_err());

        let rows = vec![vec![1.0, 2.0], vec![3.0, 4.0]];
        let t = Tensor::from_rows(&rows).unwrap();
        assert_eq!(t.shape(), &[2, 2]);
        assert_eq!(t.row(1), Some(&[3.0, 4.0][..]));
    }

    #[test]
    fn test_slice_2d_window() {
        let t = grid();
        let s = t.slice_2d(1..3, 2..4).unwrap();
        assert_eq!(s.shape(), &[2, 2]);
        assert_eq!(s.data(), &[6.0, 7.0, 10.0, 11.0]);
    }

    #[test]
    fn test_slice_2d_out_of_range() {
        let t = grid();
        assert!(matches!(
            t.slice_2d(2..4, 0..1),
            Err(TensorError::ShapeMismatch { .. })
        ));
        assert!(t.slice_2d(0..1, 3..5).is_err());
    }

    #[test]
    fn test_pad_rows() {
        let t = grid().slice_2d(0..1, 0..2).unwrap();
        let padded = t.pad_rows(3).unwrap();
        assert_eq!(padded.shape(), &[3, 2]);
        assert_eq!(padded.data(), &[0.0, 1.0, 0.0, 0.0, 0.0, 0.0]);

        let same = grid().pad_rows(2).unwrap();
        assert_eq!(same.shape(), &[3, 4]);
    }

    #[test]
    fn test_column_and_finite() {
        let mut labels = Tensor::column(vec![0.0, 1.0]);
        assert_eq!(labels.shape(), &[2, 1]);
        assert!(labels.is_finite());
        labels.data[0] = f32::NAN;
        assert!(!labels.is_finite());
    }
}
