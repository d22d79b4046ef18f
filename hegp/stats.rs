//! Per-column summary statistics and their lossless pooling.
//!
//! Pooling lets multiple sites combine independently computed statistics over
//! disjoint sample sets into the statistics of the union without exchanging
//! raw data, via the pooled-variance identity. The combination is associative
//! and commutative up to floating-point rounding.

use ndarray::{Array1, ArrayView2, Axis};
use thiserror::Error;

/// Per-column accumulator: sample count, mean, and sample standard deviation
/// (divisor `n - 1`). With `n == 1` the standard deviation is NaN.
#[derive(Debug, Clone, PartialEq)]
pub struct Stats {
    pub n: usize,
    pub mean: Array1<f64>,
    pub std: Array1<f64>,
}

#[derive(Error, Debug)]
pub enum StatsError {
    #[error("Cannot pool an empty set of summary statistics.")]
    EmptyPool,
    #[error(
        "Pooled statistics must describe the same variants: expected {expected} value(s) per accumulator, found {found}."
    )]
    LengthMismatch { expected: usize, found: usize },
}

/// Column means and sample standard deviations over the row axis.
pub fn compute(matrix: ArrayView2<'_, f64>) -> Stats {
    let n = matrix.nrows();
    let columns = matrix.ncols();
    if n == 0 {
        return Stats {
            n,
            mean: Array1::zeros(columns),
            std: Array1::zeros(columns),
        };
    }
    // The unwrap is safe: the axis is non-empty.
    let mean = matrix.mean_axis(Axis(0)).unwrap();
    let std = matrix.std_axis(Axis(0), 1.0);
    Stats { n, mean, std }
}

/// Merges statistics computed over disjoint sample sets into the statistics
/// of their union.
///
/// `n = sum(n_i)`, `mean = sum(n_i * mean_i) / n`, and the pooled variance
/// recovers the union's sum of squares from each accumulator's
/// `(n_i - 1) * std_i^2 + n_i * mean_i^2`. A single-sample accumulator has no
/// deviation from its own mean, so its variance term is exactly zero and it
/// pools exactly despite the NaN its own `std` holds.
pub fn pool(stats: &[Stats]) -> Result<Stats, StatsError> {
    let first = stats.first().ok_or(StatsError::EmptyPool)?;
    let columns = first.mean.len();
    let mut n = 0usize;
    let mut sum = Array1::<f64>::zeros(columns);
    let mut sum_of_squares = Array1::<f64>::zeros(columns);
    for accumulator in stats {
        if accumulator.mean.len() != columns {
            return Err(StatsError::LengthMismatch {
                expected: columns,
                found: accumulator.mean.len(),
            });
        }
        if accumulator.std.len() != columns {
            return Err(StatsError::LengthMismatch {
                expected: columns,
                found: accumulator.std.len(),
            });
        }
        let weight = accumulator.n as f64;
        n += accumulator.n;
        sum += &(&accumulator.mean * weight);
        if accumulator.n > 1 {
            sum_of_squares += &(&(&accumulator.std * &accumulator.std) * (weight - 1.0));
        }
        sum_of_squares += &(&(&accumulator.mean * &accumulator.mean) * weight);
    }
    let total = n as f64;
    let mean = sum / total;
    let variance = (sum_of_squares - &(&mean * &mean) * total) / (total - 1.0);
    Ok(Stats {
        n,
        mean,
        std: variance.mapv(f64::sqrt),
    })
}
