//! The operations behind the command-line interface: summarizing, pooling,
//! encrypting, decrypting, and reassembling sharded tables.
//!
//! Every operation is a pure, in-memory computation; randomness enters only
//! through the caller's random source at key generation, so runs are
//! reproducible from a seed. Dropped-variant counts are carried in the result
//! types as informational reports, never raised as errors.

use crate::align::{self, AlignError};
use crate::data::{DataError, GenotypeTable, PhenotypeTable, Summary};
use crate::key::{self, Key, KeyError};
use crate::linalg::DenseKey;
use crate::stats::{self, Stats, StatsError};
use crate::transform::{self, TransformError};
use ndarray::Axis;
use rand::Rng;
use thiserror::Error;

pub use crate::align::{cat_genotype, cat_phenotype};

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error(transparent)]
    Align(#[from] AlignError),
    #[error(transparent)]
    Data(#[from] DataError),
    #[error(transparent)]
    Key(#[from] KeyError),
    #[error(transparent)]
    Stats(#[from] StatsError),
    #[error(transparent)]
    Transform(#[from] TransformError),
}

/// Per-variant summary statistics of a genotype table. Statistics are taken
/// across samples, i.e. over the columns of the variants-by-samples dosage
/// matrix.
pub fn summarize(genotype: &GenotypeTable) -> Result<Summary, PipelineError> {
    let stats = stats::compute(genotype.dosages().t());
    Ok(Summary::new(
        stats.n,
        genotype.variants().clone(),
        stats.mean,
        stats.std,
    )?)
}

pub struct Pooled {
    pub summary: Summary,
    /// Variants seen in some input but not common to all, hence dropped.
    pub variants_dropped: usize,
}

/// Pools per-site summaries over disjoint sample sets into one summary for
/// the union, restricted to the variants common to every input.
pub fn pool(summaries: &[Summary]) -> Result<Pooled, PipelineError> {
    let common = align::common_variants(summaries)?;
    let accumulators: Vec<Stats> = summaries
        .iter()
        .zip(&common.rows)
        .map(|(summary, rows)| Stats {
            n: summary.n(),
            mean: summary.mean().select(Axis(0), rows),
            std: summary.std().select(Axis(0), rows),
        })
        .collect();
    let pooled = stats::pool(&accumulators)?;
    Ok(Pooled {
        summary: Summary::new(pooled.n, common.variants, pooled.mean, pooled.std)?,
        variants_dropped: common.dropped,
    })
}

#[derive(Debug, Default)]
pub struct EncryptOptions {
    /// Statistics to standardize against; defaults to the genotype's own.
    pub summary: Option<Summary>,
    /// A previously stored key to apply instead of generating a fresh one.
    pub key_input: Option<DenseKey>,
    /// Block-count override for a freshly generated key.
    pub key_blocks: Option<usize>,
    /// Center without scaling by the standard deviation.
    pub only_center: bool,
    /// Prepend the synthetic all-ones intercept column to the phenotype.
    pub add_intercept: bool,
}

pub struct Encrypted {
    pub genotype: GenotypeTable,
    pub phenotype: Option<PhenotypeTable>,
    /// The key that was applied, for persistence when freshly generated.
    pub key: Key,
    /// Genotype variants without a usable summary row, hence dropped.
    pub variants_dropped: usize,
}

/// Standardizes (or centers) the genotype against the summary and rotates it,
/// along with any phenotype, by one private orthogonal key over the sample
/// axis.
pub fn encrypt<R: Rng + ?Sized>(
    rng: &mut R,
    genotype: GenotypeTable,
    phenotype: Option<PhenotypeTable>,
    options: EncryptOptions,
) -> Result<Encrypted, PipelineError> {
    let summary = match options.summary {
        Some(summary) => summary,
        None => summarize(&genotype)?,
    };
    let (summary, _) = align::drop_zero_variance(summary);
    let aligned = align::align(genotype, summary)?;

    let n_samples = aligned.genotype.n_samples();
    let key = match options.key_input {
        Some(dense) => Key::Dense(dense),
        None => Key::BlockDiagonal(key::generate(rng, n_samples, options.key_blocks)?),
    };

    // One sample per row, so the rotation mixes samples, not variants.
    let samples_by_variants = aligned.genotype.dosages().t();
    let disguised = if options.only_center {
        transform::center(samples_by_variants, aligned.summary.mean().view())?
    } else {
        transform::standardize(
            samples_by_variants,
            aligned.summary.mean().view(),
            aligned.summary.std().view(),
        )?
    };
    let ciphertext = transform::encrypt(disguised.view(), &key)?;
    let genotype = GenotypeTable::new(
        aligned.genotype.variants().clone(),
        aligned.genotype.sample_names().to_vec(),
        ciphertext.t().to_owned(),
    )?;

    let phenotype = match phenotype {
        Some(table) => {
            // Phenotype rows must line up with the key's sample order.
            let table = table.permute_samples(genotype.sample_names())?;
            let table = if options.add_intercept {
                table.with_intercept()?
            } else {
                table
            };
            let rotated = transform::encrypt(table.values().view(), &key)?;
            Some(PhenotypeTable::new(
                table.sample_ids().to_vec(),
                table.phenotype_names().to_vec(),
                rotated,
            )?)
        }
        None => None,
    };

    Ok(Encrypted {
        genotype,
        phenotype,
        key,
        variants_dropped: aligned.dropped,
    })
}

#[derive(Debug, Default)]
pub struct DecryptOptions {
    /// Statistics to unstandardize with after the inverse rotation.
    pub summary: Option<Summary>,
    /// The ciphertext was centered but not scaled.
    pub only_center: bool,
}

pub struct Decrypted {
    pub genotype: GenotypeTable,
    /// Ciphertext variants without a summary row, hence not restored.
    pub variants_dropped: usize,
}

/// Applies the inverse rotation and, when a summary is supplied, restores the
/// original scale and location.
pub fn decrypt(
    ciphertext: GenotypeTable,
    key: &Key,
    options: DecryptOptions,
) -> Result<Decrypted, PipelineError> {
    let (table, summary, dropped) = match options.summary {
        Some(summary) => {
            let aligned = align::align(ciphertext, summary)?;
            (aligned.genotype, Some(aligned.summary), aligned.dropped)
        }
        None => (ciphertext, None, 0),
    };

    let rotated = transform::decrypt(table.dosages().t(), key)?;
    let values = match &summary {
        Some(summary) if options.only_center => {
            transform::uncenter(rotated.view(), summary.mean().view())?
        }
        Some(summary) => transform::unstandardize(
            rotated.view(),
            summary.mean().view(),
            summary.std().view(),
        )?,
        None => rotated,
    };

    Ok(Decrypted {
        genotype: GenotypeTable::new(
            table.variants().clone(),
            table.sample_names().to_vec(),
            values.t().to_owned(),
        )?,
        variants_dropped: dropped,
    })
}
