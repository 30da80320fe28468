//! Core payload types for fieldnet
//!
//! This module contains the values that flow through the processing graph.
//! Every [`Data`](crate::graph::Data) object owns exactly one [`Buffer`],
//! and every data slot declares the [`DataKind`] it expects.
//!
//! # Main Types
//!
//! - [`DataKind`] - Declared type of a slot, used for connection type checks
//! - [`Buffer`] - The value stored inside a shared data object
//! - [`Matrix`] - Dense row-major matrix, the usual payload of a field
//!
//! # Compatibility
//!
//! A connection is type-compatible when the source buffer's kind equals the
//! kind declared on the target slot, or when the target declares
//! [`DataKind::Any`].

use serde::{Deserialize, Serialize};
use std::fmt;

/// Declared kind of the buffer behind a slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum DataKind {
    /// Single floating point value
    Scalar,
    /// One-dimensional array of floating point values
    Vector,
    /// Two-dimensional, row-major matrix
    #[default]
    Matrix,
    /// Raw bytes (for custom interpretation)
    Bytes,
    /// Accepts any buffer kind (only meaningful on input slots)
    Any,
}

impl DataKind {
    /// Whether a buffer of kind `produced` may be bound to a slot declaring `self`
    pub fn accepts(&self, produced: DataKind) -> bool {
        *self == DataKind::Any || *self == produced
    }
}

impl fmt::Display for DataKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataKind::Scalar => write!(f, "scalar"),
            DataKind::Vector => write!(f, "vector"),
            DataKind::Matrix => write!(f, "matrix"),
            DataKind::Bytes => write!(f, "bytes"),
            DataKind::Any => write!(f, "any"),
        }
    }
}

/// Dense row-major matrix
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Matrix {
    rows: usize,
    cols: usize,
    values: Vec<f64>,
}

impl Matrix {
    /// Create a matrix filled with zeros
    pub fn zeros(rows: usize, cols: usize) -> Self {
        Self::filled(rows, cols, 0.0)
    }

    /// Create a matrix where every element equals `value`
    pub fn filled(rows: usize, cols: usize, value: f64) -> Self {
        Self {
            rows,
            cols,
            values: vec![value; rows * cols],
        }
    }

    /// Build a matrix from row-major values, returning `None` on a size mismatch
    pub fn from_vec(rows: usize, cols: usize, values: Vec<f64>) -> Option<Self> {
        (values.len() == rows * cols).then_some(Self { rows, cols, values })
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    /// Shape as `(rows, cols)`
    pub fn shape(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    pub fn get(&self, row: usize, col: usize) -> Option<f64> {
        if row < self.rows && col < self.cols {
            Some(self.values[row * self.cols + col])
        } else {
            None
        }
    }

    pub fn set(&mut self, row: usize, col: usize, value: f64) -> bool {
        if row < self.rows && col < self.cols {
            self.values[row * self.cols + col] = value;
            true
        } else {
            false
        }
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn values_mut(&mut self) -> &mut [f64] {
        &mut self.values
    }
}

/// The value held by a shared data object
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Buffer {
    Scalar(f64),
    Vector(Vec<f64>),
    Matrix(Matrix),
    Bytes(Vec<u8>),
}

impl Default for Buffer {
    fn default() -> Self {
        Buffer::Scalar(0.0)
    }
}

impl Buffer {
    /// Kind of this buffer, as compared against slot declarations
    pub fn kind(&self) -> DataKind {
        match self {
            Buffer::Scalar(_) => DataKind::Scalar,
            Buffer::Vector(_) => DataKind::Vector,
            Buffer::Matrix(_) => DataKind::Matrix,
            Buffer::Bytes(_) => DataKind::Bytes,
        }
    }

    /// Create the zero value for a kind (`Any` falls back to a scalar)
    pub fn zero_of(kind: DataKind) -> Self {
        match kind {
            DataKind::Scalar | DataKind::Any => Buffer::Scalar(0.0),
            DataKind::Vector => Buffer::Vector(Vec::new()),
            DataKind::Matrix => Buffer::Matrix(Matrix::default()),
            DataKind::Bytes => Buffer::Bytes(Vec::new()),
        }
    }

    pub fn as_scalar(&self) -> Option<f64> {
        match self {
            Buffer::Scalar(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_vector(&self) -> Option<&[f64]> {
        match self {
            Buffer::Vector(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_matrix(&self) -> Option<&Matrix> {
        match self {
            Buffer::Matrix(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Buffer::Bytes(b) => Some(b),
            _ => None,
        }
    }

    /// Number of numeric elements (bytes count as elements)
    pub fn len(&self) -> usize {
        match self {
            Buffer::Scalar(_) => 1,
            Buffer::Vector(v) => v.len(),
            Buffer::Matrix(m) => m.values.len(),
            Buffer::Bytes(b) => b.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Apply `f` to every numeric element in place. Bytes are left untouched.
    pub fn map_in_place(&mut self, mut f: impl FnMut(f64) -> f64) {
        match self {
            Buffer::Scalar(v) => *v = f(*v),
            Buffer::Vector(values) => values.iter_mut().for_each(|v| *v = f(*v)),
            Buffer::Matrix(m) => m.values.iter_mut().for_each(|v| *v = f(*v)),
            Buffer::Bytes(_) => {}
        }
    }

    /// Element-wise `self += other * factor`.
    ///
    /// A scalar `other` is broadcast. Returns `false` when kinds or shapes
    /// don't line up, leaving `self` unchanged.
    pub fn add_scaled(&mut self, other: &Buffer, factor: f64) -> bool {
        match (self, other) {
            (Buffer::Scalar(a), Buffer::Scalar(b)) => {
                *a += b * factor;
                true
            }
            (Buffer::Vector(a), Buffer::Vector(b)) if a.len() == b.len() => {
                a.iter_mut().zip(b).for_each(|(x, y)| *x += y * factor);
                true
            }
            (Buffer::Matrix(a), Buffer::Matrix(b)) if a.shape() == b.shape() => {
                a.values
                    .iter_mut()
                    .zip(&b.values)
                    .for_each(|(x, y)| *x += y * factor);
                true
            }
            (target, Buffer::Scalar(b)) if !matches!(target, Buffer::Bytes(_)) => {
                let delta = b * factor;
                target.map_in_place(|x| x + delta);
                true
            }
            _ => false,
        }
    }
}

impl From<f64> for Buffer {
    fn from(value: f64) -> Self {
        Buffer::Scalar(value)
    }
}

impl From<Vec<f64>> for Buffer {
    fn from(values: Vec<f64>) -> Self {
        Buffer::Vector(values)
    }
}

impl From<Matrix> for Buffer {
    fn from(matrix: Matrix) -> Self {
        Buffer::Matrix(matrix)
    }
}

impl From<Vec<u8>> for Buffer {
    fn from(bytes: Vec<u8>) -> Self {
        Buffer::Bytes(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_accepts() {
        assert!(DataKind::Any.accepts(DataKind::Matrix));
        assert!(DataKind::Scalar.accepts(DataKind::Scalar));
        assert!(!DataKind::Scalar.accepts(DataKind::Vector));
    }

    #[test]
    fn test_matrix_bounds() {
        let mut m = Matrix::zeros(2, 3);
        assert!(m.set(1, 2, 5.0));
        assert_eq!(m.get(1, 2), Some(5.0));
        assert!(!m.set(2, 0, 1.0));
        assert_eq!(m.get(0, 3), None);
        assert!(Matrix::from_vec(2, 2, vec![1.0; 3]).is_none());
    }

    #[test]
    fn test_add_scaled_broadcasts_scalar() {
        let mut b = Buffer::Vector(vec![1.0, 2.0]);
        assert!(b.add_scaled(&Buffer::Scalar(1.0), 2.0));
        assert_eq!(b, Buffer::Vector(vec![3.0, 4.0]));
    }

    #[test]
    fn test_add_scaled_shape_mismatch() {
        let mut b = Buffer::Vector(vec![1.0, 2.0]);
        assert!(!b.add_scaled(&Buffer::Vector(vec![1.0]), 1.0));
        assert_eq!(b, Buffer::Vector(vec![1.0, 2.0]));

        let mut bytes = Buffer::Bytes(vec![1]);
        assert!(!bytes.add_scaled(&Buffer::Scalar(1.0), 1.0));
    }

    #[test]
    fn test_zero_of() {
        assert_eq!(Buffer::zero_of(DataKind::Vector).kind(), DataKind::Vector);
        assert_eq!(Buffer::zero_of(DataKind::Any).kind(), DataKind::Scalar);
    }
}
