//! Centering, standardization, and the rotation transform itself.
//!
//! For any orthogonal key K, `decrypt(encrypt(x, K), K) == x` up to rounding
//! because `K' * K = I`, and `solve(K*A, K*b) == solve(A, b)` because
//! `(K*A)^-1 * (K*b) = A^-1 * K^-1 * K * b`. The second identity is the
//! load-bearing property: linear analyses run unchanged on disguised data.

use crate::linalg::{KeyMatrix, KeyMatrixError};
use ndarray::{Array2, ArrayView1, ArrayView2};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TransformError {
    #[error("The matrix has {columns} column(s) but {stats} statistic value(s) were supplied.")]
    StatsLengthMismatch { columns: usize, stats: usize },
    #[error(
        "Column {column} has a standard deviation of exactly zero; zero-variance variants must be excluded before standardization."
    )]
    ZeroStandardDeviation { column: usize },
    #[error(transparent)]
    Key(#[from] KeyMatrixError),
}

fn check_stats_length(
    matrix: ArrayView2<'_, f64>,
    stats: ArrayView1<'_, f64>,
) -> Result<(), TransformError> {
    if matrix.ncols() != stats.len() {
        return Err(TransformError::StatsLengthMismatch {
            columns: matrix.ncols(),
            stats: stats.len(),
        });
    }
    Ok(())
}

/// Subtracts the per-column mean, broadcast over rows.
pub fn center(
    matrix: ArrayView2<'_, f64>,
    mean: ArrayView1<'_, f64>,
) -> Result<Array2<f64>, TransformError> {
    check_stats_length(matrix, mean)?;
    Ok(&matrix - &mean)
}

/// Exact inverse of [`center`].
pub fn uncenter(
    matrix: ArrayView2<'_, f64>,
    mean: ArrayView1<'_, f64>,
) -> Result<Array2<f64>, TransformError> {
    check_stats_length(matrix, mean)?;
    Ok(&matrix + &mean)
}

/// Centers, then scales each column by `1 / std`.
///
/// Fails when any standard deviation is exactly zero; the aligner excludes
/// zero-variance variants before this point.
pub fn standardize(
    matrix: ArrayView2<'_, f64>,
    mean: ArrayView1<'_, f64>,
    std: ArrayView1<'_, f64>,
) -> Result<Array2<f64>, TransformError> {
    check_stats_length(matrix, mean)?;
    check_stats_length(matrix, std)?;
    if let Some(column) = std.iter().position(|&value| value == 0.0) {
        return Err(TransformError::ZeroStandardDeviation { column });
    }
    Ok((&matrix - &mean) / &std)
}

/// Exact inverse of [`standardize`].
pub fn unstandardize(
    matrix: ArrayView2<'_, f64>,
    mean: ArrayView1<'_, f64>,
    std: ArrayView1<'_, f64>,
) -> Result<Array2<f64>, TransformError> {
    check_stats_length(matrix, mean)?;
    check_stats_length(matrix, std)?;
    Ok(&(&matrix * &std) + &mean)
}

/// Rotates the plaintext by the key. Rows of the plaintext correspond to the
/// key's dimension: one row per sample.
pub fn encrypt<K: KeyMatrix>(
    plaintext: ArrayView2<'_, f64>,
    key: &K,
) -> Result<Array2<f64>, TransformError> {
    Ok(key.multiply(plaintext)?)
}

/// Inverse rotation: multiplies by the transposed key.
pub fn decrypt<K: KeyMatrix>(
    ciphertext: ArrayView2<'_, f64>,
    key: &K,
) -> Result<Array2<f64>, TransformError> {
    Ok(key.transpose().multiply(ciphertext)?)
}
