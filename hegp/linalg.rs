//! Key matrices: block-diagonal and dense.
//!
//! A key is a square orthogonal matrix applied to the sample axis of a data
//! matrix. Freshly generated keys are block-diagonal so that the quadratic
//! cost of rotation stays bounded by the block size rather than the full
//! sample count; keys loaded back from storage are plain dense matrices.
//! Both expose the same interface through [`KeyMatrix`].

use itertools::Itertools;
use ndarray::{Array2, ArrayView2, s};
use rayon::prelude::*;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum KeyMatrixError {
    #[error("A block-diagonal key must contain at least one block.")]
    NoBlocks,
    #[error("Block {index} is {rows}x{cols}, but key blocks must be square.")]
    NonSquareBlock {
        index: usize,
        rows: usize,
        cols: usize,
    },
    #[error(
        "Block {index} is {size}x{size}; a 1x1 orthogonal block is just a sign flip and performs no meaningful rotation."
    )]
    BlockTooSmall { index: usize, size: usize },
    #[error("A dense key must be square, but the matrix is {rows}x{cols}.")]
    NonSquareKey { rows: usize, cols: usize },
    #[error("The key has dimension {key_dim} but the operand has {operand_rows} row(s).")]
    DimensionMismatch {
        key_dim: usize,
        operand_rows: usize,
    },
}

/// The operations every key shape must support. Static dispatch only: the
/// encrypt/decrypt routines are generic over this trait.
pub trait KeyMatrix: Sized {
    /// The number of rows (= columns) of the key.
    fn dim(&self) -> usize;

    /// The transposed key, which for an orthogonal key is its inverse.
    fn transpose(&self) -> Self;

    /// Left-multiplies `rhs` by this key. `rhs` must have `dim()` rows.
    fn multiply(&self, rhs: ArrayView2<'_, f64>) -> Result<Array2<f64>, KeyMatrixError>;
}

/// A square matrix stored as an ordered sequence of independent square blocks
/// along the diagonal, zero elsewhere. The dense form is never materialized
/// on the multiplication path.
#[derive(Debug, Clone, PartialEq)]
pub struct BlockDiagonalMatrix {
    blocks: Vec<Array2<f64>>,
    dim: usize,
}

impl BlockDiagonalMatrix {
    /// Builds a block-diagonal matrix from its diagonal blocks. Every block
    /// must be square and at least 2x2.
    pub fn new(blocks: Vec<Array2<f64>>) -> Result<Self, KeyMatrixError> {
        if blocks.is_empty() {
            return Err(KeyMatrixError::NoBlocks);
        }
        for (index, block) in blocks.iter().enumerate() {
            let (rows, cols) = block.dim();
            if rows != cols {
                return Err(KeyMatrixError::NonSquareBlock { index, rows, cols });
            }
            if rows < 2 {
                return Err(KeyMatrixError::BlockTooSmall { index, size: rows });
            }
        }
        let dim = blocks.iter().map(|block| block.nrows()).sum();
        Ok(Self { blocks, dim })
    }

    pub fn blocks(&self) -> &[Array2<f64>] {
        &self.blocks
    }

    pub fn block_sizes(&self) -> Vec<usize> {
        self.blocks.iter().map(|block| block.nrows()).collect()
    }

    /// The half-open row range each block occupies within the full matrix.
    fn block_bounds(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        std::iter::once(0)
            .chain(self.blocks.iter().scan(0, |offset, block| {
                *offset += block.nrows();
                Some(*offset)
            }))
            .tuple_windows()
    }

    /// Materializes the dense form. This is for storage only; it is never on
    /// the multiplication path.
    pub fn to_dense(&self) -> Array2<f64> {
        let mut dense = Array2::zeros((self.dim, self.dim));
        for ((start, stop), block) in self.block_bounds().zip(&self.blocks) {
            dense.slice_mut(s![start..stop, start..stop]).assign(block);
        }
        dense
    }
}

impl KeyMatrix for BlockDiagonalMatrix {
    fn dim(&self) -> usize {
        self.dim
    }

    fn transpose(&self) -> Self {
        Self {
            blocks: self
                .blocks
                .iter()
                .map(|block| block.t().to_owned())
                .collect(),
            dim: self.dim,
        }
    }

    fn multiply(&self, rhs: ArrayView2<'_, f64>) -> Result<Array2<f64>, KeyMatrixError> {
        if rhs.nrows() != self.dim {
            return Err(KeyMatrixError::DimensionMismatch {
                key_dim: self.dim,
                operand_rows: rhs.nrows(),
            });
        }
        // Blocks touch disjoint row ranges of the operand, so each local
        // product is computed independently.
        let bounds: Vec<(usize, usize)> = self.block_bounds().collect();
        let locals: Vec<Array2<f64>> = self
            .blocks
            .par_iter()
            .zip(bounds.par_iter())
            .map(|(block, &(start, stop))| block.dot(&rhs.slice(s![start..stop, ..])))
            .collect();
        let mut product = Array2::zeros((self.dim, rhs.ncols()));
        for (&(start, stop), local) in bounds.iter().zip(&locals) {
            product.slice_mut(s![start..stop, ..]).assign(local);
        }
        Ok(product)
    }
}

/// A key held in dense form, as read back from a key file.
#[derive(Debug, Clone, PartialEq)]
pub struct DenseKey {
    matrix: Array2<f64>,
}

impl DenseKey {
    pub fn new(matrix: Array2<f64>) -> Result<Self, KeyMatrixError> {
        let (rows, cols) = matrix.dim();
        if rows != cols {
            return Err(KeyMatrixError::NonSquareKey { rows, cols });
        }
        Ok(Self { matrix })
    }

    pub fn matrix(&self) -> &Array2<f64> {
        &self.matrix
    }
}

impl KeyMatrix for DenseKey {
    fn dim(&self) -> usize {
        self.matrix.nrows()
    }

    fn transpose(&self) -> Self {
        Self {
            matrix: self.matrix.t().to_owned(),
        }
    }

    fn multiply(&self, rhs: ArrayView2<'_, f64>) -> Result<Array2<f64>, KeyMatrixError> {
        if rhs.nrows() != self.matrix.nrows() {
            return Err(KeyMatrixError::DimensionMismatch {
                key_dim: self.matrix.nrows(),
                operand_rows: rhs.nrows(),
            });
        }
        Ok(self.matrix.dot(&rhs))
    }
}
