//! Random orthogonal key generation.
//!
//! Keys are block-diagonal: the sample dimension is split into nearly equal
//! parts and each part gets an independent rotation drawn uniformly from the
//! orthogonal group of its size. A rotation over a too-small block is easy to
//! defeat by brute force, so blocks are kept as close to equal size as
//! possible for a requested block count, and no block may be smaller than 2.

use crate::linalg::{BlockDiagonalMatrix, DenseKey, KeyMatrix, KeyMatrixError};
use ndarray::{Array2, ArrayView2};
use ndarray_linalg::QR;
use rand::Rng;
use rand_distr::StandardNormal;
use thiserror::Error;

/// Target block size when no explicit block count is requested. Larger blocks
/// are harder to attack but rotation cost grows quadratically in block size.
pub const DEFAULT_BLOCK_SIZE: usize = 1500;

#[derive(Error, Debug)]
pub enum KeyError {
    #[error("Requested zero blocks for a key of dimension {dimension}.")]
    NoBlocks { dimension: usize },
    #[error(
        "Cannot split a key of dimension {dimension} into {blocks} block(s): every block must be at least 2x2."
    )]
    BlockTooSmall { dimension: usize, blocks: usize },
    #[error("QR factorization failed while sampling an orthogonal block: {0}")]
    Factorization(#[from] ndarray_linalg::error::LinalgError),
    #[error(transparent)]
    Structure(#[from] KeyMatrixError),
}

/// Splits `dimension` into `blocks` nearly equal parts: the first `blocks - 1`
/// parts take the floor size and the last absorbs the remainder.
fn block_sizes(dimension: usize, blocks: usize) -> Result<Vec<usize>, KeyError> {
    if blocks == 0 {
        return Err(KeyError::NoBlocks { dimension });
    }
    let floor = dimension / blocks;
    if floor < 2 {
        return Err(KeyError::BlockTooSmall { dimension, blocks });
    }
    let mut sizes = vec![floor; blocks];
    if let Some(last) = sizes.last_mut() {
        *last += dimension - floor * blocks;
    }
    Ok(sizes)
}

/// Draws a matrix uniformly from the orthogonal group O(n).
///
/// A standard-normal matrix is QR-factored and each column of Q is flipped to
/// match the sign of the corresponding diagonal entry of R. Without the sign
/// correction the distribution depends on the factorization's sign
/// convention; with it, Q follows the Haar measure over the full orthogonal
/// group, so keys of both orientations (det +1 and -1) occur.
pub fn random_orthogonal<R: Rng + ?Sized>(
    rng: &mut R,
    size: usize,
) -> Result<Array2<f64>, KeyError> {
    let gaussian: Array2<f64> = Array2::from_shape_fn((size, size), |_| rng.sample(StandardNormal));
    let (mut q, r) = gaussian.qr()?;
    for (column_index, mut column) in q.columns_mut().into_iter().enumerate() {
        if r[(column_index, column_index)] < 0.0 {
            column.mapv_inplace(|value| -value);
        }
    }
    Ok(q)
}

/// Generates a block-diagonal orthogonal key of the given dimension.
///
/// When `blocks` is `None` the block count defaults to
/// `ceil(dimension / DEFAULT_BLOCK_SIZE)`.
pub fn generate<R: Rng + ?Sized>(
    rng: &mut R,
    dimension: usize,
    blocks: Option<usize>,
) -> Result<BlockDiagonalMatrix, KeyError> {
    let blocks = blocks.unwrap_or_else(|| dimension.div_ceil(DEFAULT_BLOCK_SIZE));
    let sizes = block_sizes(dimension, blocks)?;
    log::info!(
        "Generating a {dimension}x{dimension} key with {} block(s)",
        sizes.len()
    );
    let blocks = sizes
        .iter()
        .map(|&size| random_orthogonal(rng, size))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(BlockDiagonalMatrix::new(blocks)?)
}

/// The key actually applied during a run: either freshly generated (block
/// diagonal) or loaded back from storage (dense).
#[derive(Debug, Clone)]
pub enum Key {
    BlockDiagonal(BlockDiagonalMatrix),
    Dense(DenseKey),
}

impl Key {
    /// Dense form for persistence.
    pub fn to_dense(&self) -> Array2<f64> {
        match self {
            Key::BlockDiagonal(key) => key.to_dense(),
            Key::Dense(key) => key.matrix().clone(),
        }
    }
}

impl KeyMatrix for Key {
    fn dim(&self) -> usize {
        match self {
            Key::BlockDiagonal(key) => key.dim(),
            Key::Dense(key) => key.dim(),
        }
    }

    fn transpose(&self) -> Self {
        match self {
            Key::BlockDiagonal(key) => Key::BlockDiagonal(key.transpose()),
            Key::Dense(key) => Key::Dense(key.transpose()),
        }
    }

    fn multiply(&self, rhs: ArrayView2<'_, f64>) -> Result<Array2<f64>, KeyMatrixError> {
        match self {
            Key::BlockDiagonal(key) => key.multiply(rhs),
            Key::Dense(key) => key.multiply(rhs),
        }
    }
}
