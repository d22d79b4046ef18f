//! Variant-set reconciliation across tables.
//!
//! All joins here are inner joins on variant identity. Variants present on
//! only one side are silently dropped and the drop count is surfaced to the
//! caller as an informational report, never as an error. The `reference`
//! allele participates in a join key only when both sides carry it.

use crate::data::{DataError, GenotypeTable, PhenotypeTable, Summary, VariantId, VariantIndex};
use ahash::{AHashMap, AHashSet};
use ndarray::{Array2, s};
use thiserror::Error;

/// Absolute tolerance below which a standard deviation is treated as zero.
pub const ZERO_VARIANCE_TOLERANCE: f64 = 1e-8;

#[derive(Error, Debug)]
pub enum AlignError {
    #[error("At least one input table is required.")]
    NoInputTables,
    #[error("Phenotype shards disagree on phenotype columns: expected {expected:?}, found {found:?}.")]
    PhenotypeColumnMismatch {
        expected: Vec<String>,
        found: Vec<String>,
    },
    #[error(transparent)]
    Data(#[from] DataError),
}

fn join_id<'a>(index: &'a VariantIndex, row: usize, use_reference: bool) -> VariantId<'a> {
    if use_reference {
        index.id(row)
    } else {
        index.id_without_reference(row)
    }
}

/// Removes variants whose standard deviation is within tolerance of zero.
/// Such variants have no discriminatory power and would force a division by
/// zero during standardization. Returns the surviving summary and the count
/// removed.
pub fn drop_zero_variance(summary: Summary) -> (Summary, usize) {
    let keep: Vec<usize> = (0..summary.len())
        .filter(|&row| summary.std()[row].abs() > ZERO_VARIANCE_TOLERANCE)
        .collect();
    let dropped = summary.len() - keep.len();
    if dropped > 0 {
        log::info!("Excluding {dropped} zero-variance variant(s) from the summary");
    }
    (summary.select(&keep), dropped)
}

/// A genotype and summary reconciled to the same variant set, in the
/// genotype's row order, plus the number of genotype variants that had no
/// usable summary row.
pub struct Aligned {
    pub genotype: GenotypeTable,
    pub summary: Summary,
    pub dropped: usize,
}

/// Inner-joins a genotype table with a summary on variant identity.
pub fn align(genotype: GenotypeTable, summary: Summary) -> Result<Aligned, AlignError> {
    let use_reference = genotype.variants().has_reference() && summary.variants().has_reference();
    let mut summary_rows: AHashMap<VariantId<'_>, usize> = AHashMap::with_capacity(summary.len());
    for row in 0..summary.len() {
        summary_rows
            .entry(join_id(summary.variants(), row, use_reference))
            .or_insert(row);
    }

    let mut genotype_keep = Vec::new();
    let mut summary_keep = Vec::new();
    for row in 0..genotype.n_variants() {
        if let Some(&summary_row) =
            summary_rows.get(&join_id(genotype.variants(), row, use_reference))
        {
            genotype_keep.push(row);
            summary_keep.push(summary_row);
        }
    }

    let dropped = genotype.n_variants() - genotype_keep.len();
    Ok(Aligned {
        genotype: genotype.select_variants(&genotype_keep),
        summary: summary.select(&summary_keep),
        dropped,
    })
}

/// The variant set common to every input summary: for each input, the rows
/// matching the common set in the output's order, plus the identity columns
/// of the common set and the count of variants seen anywhere but not common
/// to all inputs.
pub struct CommonVariants {
    pub rows: Vec<Vec<usize>>,
    pub variants: VariantIndex,
    pub dropped: usize,
}

pub fn common_variants(summaries: &[Summary]) -> Result<CommonVariants, AlignError> {
    let first = summaries.first().ok_or(AlignError::NoInputTables)?;
    let use_reference = summaries
        .iter()
        .all(|summary| summary.variants().has_reference());

    let maps: Vec<AHashMap<VariantId<'_>, usize>> = summaries
        .iter()
        .map(|summary| {
            let mut map = AHashMap::with_capacity(summary.len());
            for row in 0..summary.len() {
                map.entry(join_id(summary.variants(), row, use_reference))
                    .or_insert(row);
            }
            map
        })
        .collect();

    // Walk the first input in order; a variant is kept iff every input has it.
    let mut taken = AHashSet::new();
    let mut first_rows = Vec::new();
    let mut rows: Vec<Vec<usize>> = vec![Vec::new(); summaries.len()];
    for row in 0..first.len() {
        let id = join_id(first.variants(), row, use_reference);
        if !taken.insert(id) {
            continue;
        }
        if let Some(matches) = maps
            .iter()
            .map(|map| map.get(&id).copied())
            .collect::<Option<Vec<usize>>>()
        {
            first_rows.push(row);
            for (input, matched_row) in matches.into_iter().enumerate() {
                rows[input].push(matched_row);
            }
        }
    }

    let distinct: AHashSet<VariantId<'_>> = maps.iter().flat_map(|map| map.keys().copied()).collect();
    let dropped = distinct.len() - first_rows.len();

    let variants = first.variants().select(&first_rows);
    let variants = if use_reference {
        variants
    } else {
        variants.without_reference()
    };
    Ok(CommonVariants {
        rows,
        variants,
        dropped,
    })
}

/// Reassembles a genotype table from column-wise shards that each retain the
/// identity columns: the designated inverse of splitting a table by sample.
pub fn cat_genotype(parts: Vec<GenotypeTable>) -> Result<GenotypeTable, AlignError> {
    let mut parts = parts.into_iter();
    let first = parts.next().ok_or(AlignError::NoInputTables)?;
    parts.try_fold(first, join_genotype_pair)
}

fn join_genotype_pair(
    left: GenotypeTable,
    right: GenotypeTable,
) -> Result<GenotypeTable, AlignError> {
    let use_reference = left.variants().has_reference() && right.variants().has_reference();
    let mut right_rows: AHashMap<VariantId<'_>, usize> = AHashMap::with_capacity(right.n_variants());
    for row in 0..right.n_variants() {
        right_rows
            .entry(join_id(right.variants(), row, use_reference))
            .or_insert(row);
    }

    let mut left_keep = Vec::new();
    let mut right_keep = Vec::new();
    for row in 0..left.n_variants() {
        if let Some(&right_row) = right_rows.get(&join_id(left.variants(), row, use_reference)) {
            left_keep.push(row);
            right_keep.push(right_row);
        }
    }

    let left_selected = left.select_variants(&left_keep);
    let right_selected = right.select_variants(&right_keep);

    let mut sample_names = left_selected.sample_names().to_vec();
    sample_names.extend(right_selected.sample_names().iter().cloned());

    let left_samples = left_selected.n_samples();
    let mut dosages = Array2::zeros((left_keep.len(), sample_names.len()));
    dosages
        .slice_mut(s![.., ..left_samples])
        .assign(left_selected.dosages());
    dosages
        .slice_mut(s![.., left_samples..])
        .assign(right_selected.dosages());

    let variants = if use_reference {
        left_selected.variants().clone()
    } else {
        left_selected.variants().without_reference()
    };
    Ok(GenotypeTable::new(variants, sample_names, dosages)?)
}

/// Reassembles a phenotype table from row-wise shards: the designated inverse
/// of splitting a table by sample rows. Shards must agree on their phenotype
/// columns and sample ids must stay unique across shards.
pub fn cat_phenotype(parts: Vec<PhenotypeTable>) -> Result<PhenotypeTable, AlignError> {
    let first = parts.first().ok_or(AlignError::NoInputTables)?;
    let names = first.phenotype_names().to_vec();
    for part in &parts {
        if part.phenotype_names() != names {
            return Err(AlignError::PhenotypeColumnMismatch {
                expected: names,
                found: part.phenotype_names().to_vec(),
            });
        }
    }

    let total: usize = parts.iter().map(|part| part.n_samples()).sum();
    let mut sample_ids = Vec::with_capacity(total);
    let mut values = Array2::zeros((total, names.len()));
    let mut offset = 0;
    for part in &parts {
        sample_ids.extend(part.sample_ids().iter().cloned());
        values
            .slice_mut(s![offset..offset + part.n_samples(), ..])
            .assign(part.values());
        offset += part.n_samples();
    }
    Ok(PhenotypeTable::new(sample_ids, names, values)?)
}
