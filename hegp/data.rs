//! Table model for genotype, phenotype, and summary data.
//!
//! Construction validates the invariants every downstream operation relies
//! on: identity tuples are unique within a table, sample names are unique and
//! disjoint from the reserved metadata names, and the value matrices agree
//! in shape with their labels. Whether a table carries the optional
//! `reference` column is a table-level property, not a per-lookup probe.

use ahash::AHashSet;
use ndarray::{Array1, Array2, Axis};
use std::fmt;
use thiserror::Error;

/// Column names that identify a variant rather than carry sample data.
pub const GENOTYPE_METADATA_COLUMNS: [&str; 3] = ["chromosome", "position", "reference"];

/// The phenotype table's identity column.
pub const PHENOTYPE_ID_COLUMN: &str = "sample-id";

/// Name of the synthetic all-ones column added at encryption time.
pub const INTERCEPT_COLUMN: &str = "intercept";

pub fn is_genotype_metadata_column(name: &str) -> bool {
    GENOTYPE_METADATA_COLUMNS
        .iter()
        .any(|reserved| name.eq_ignore_ascii_case(reserved))
}

#[derive(Error, Debug)]
pub enum DataError {
    #[error("Row {row} repeats the variant {variant}; variant identities must be unique within a table.")]
    DuplicateVariant { row: usize, variant: String },
    #[error("The sample name '{0}' appears more than once.")]
    DuplicateSample(String),
    #[error("'{0}' is a reserved metadata column name and cannot be used as a sample name.")]
    ReservedSampleName(String),
    #[error("The sample id '{0}' appears more than once.")]
    DuplicateSampleId(String),
    #[error("The phenotype name '{0}' appears more than once.")]
    DuplicatePhenotypeName(String),
    #[error("'{0}' is a reserved column name and cannot be used as a phenotype name.")]
    ReservedPhenotypeName(String),
    #[error("{context}: expected {expected} row(s) or value(s), found {found}.")]
    ShapeMismatch {
        context: &'static str,
        expected: usize,
        found: usize,
    },
    #[error("The sample '{0}' is not present in the phenotype table.")]
    UnknownSample(String),
    #[error("The genotype has {genotype} sample(s) but the phenotype has {phenotype}.")]
    SampleCountMismatch { genotype: usize, phenotype: usize },
}

/// The identity of a single variant, borrowed from its table. Two rows from
/// different tables refer to the same variant iff these tuples match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VariantId<'a> {
    pub chromosome: &'a str,
    pub position: u64,
    pub reference: Option<&'a str>,
}

impl fmt::Display for VariantId<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.reference {
            Some(reference) => write!(f, "{}:{}:{}", self.chromosome, self.position, reference),
            None => write!(f, "{}:{}", self.chromosome, self.position),
        }
    }
}

/// The identity columns of a genotype table or summary: chromosome, position,
/// and (optionally, table-wide) reference allele.
#[derive(Debug, Clone, PartialEq)]
pub struct VariantIndex {
    chromosome: Vec<String>,
    position: Vec<u64>,
    reference: Option<Vec<String>>,
}

impl VariantIndex {
    pub fn new(
        chromosome: Vec<String>,
        position: Vec<u64>,
        reference: Option<Vec<String>>,
    ) -> Result<Self, DataError> {
        if position.len() != chromosome.len() {
            return Err(DataError::ShapeMismatch {
                context: "position column",
                expected: chromosome.len(),
                found: position.len(),
            });
        }
        if let Some(reference) = &reference {
            if reference.len() != chromosome.len() {
                return Err(DataError::ShapeMismatch {
                    context: "reference column",
                    expected: chromosome.len(),
                    found: reference.len(),
                });
            }
        }
        let index = Self {
            chromosome,
            position,
            reference,
        };
        let mut seen = AHashSet::with_capacity(index.len());
        for row in 0..index.len() {
            if !seen.insert(index.id(row)) {
                let variant = index.id(row).to_string();
                return Err(DataError::DuplicateVariant { row, variant });
            }
        }
        Ok(index)
    }

    pub fn len(&self) -> usize {
        self.chromosome.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chromosome.is_empty()
    }

    pub fn has_reference(&self) -> bool {
        self.reference.is_some()
    }

    pub fn chromosome(&self) -> &[String] {
        &self.chromosome
    }

    pub fn position(&self) -> &[u64] {
        &self.position
    }

    pub fn reference(&self) -> Option<&[String]> {
        self.reference.as_deref()
    }

    pub fn id(&self, row: usize) -> VariantId<'_> {
        VariantId {
            chromosome: &self.chromosome[row],
            position: self.position[row],
            reference: self.reference.as_ref().map(|column| column[row].as_str()),
        }
    }

    /// The identity with the reference allele masked out of the key, for
    /// joins where only one side carries a reference column.
    pub fn id_without_reference(&self, row: usize) -> VariantId<'_> {
        VariantId {
            reference: None,
            ..self.id(row)
        }
    }

    /// A new index holding the given rows, in the given order. Selecting a
    /// subset of unique identities keeps them unique.
    pub fn select(&self, rows: &[usize]) -> Self {
        Self {
            chromosome: rows.iter().map(|&row| self.chromosome[row].clone()).collect(),
            position: rows.iter().map(|&row| self.position[row]).collect(),
            reference: self
                .reference
                .as_ref()
                .map(|column| rows.iter().map(|&row| column[row].clone()).collect()),
        }
    }

    /// The same rows without the reference column.
    pub fn without_reference(&self) -> Self {
        Self {
            chromosome: self.chromosome.clone(),
            position: self.position.clone(),
            reference: None,
        }
    }
}

/// An ordered set of variant rows by named sample columns, each value a
/// real-valued dosage.
#[derive(Debug, Clone, PartialEq)]
pub struct GenotypeTable {
    variants: VariantIndex,
    sample_names: Vec<String>,
    /// Shape: variants x samples.
    dosages: Array2<f64>,
}

impl GenotypeTable {
    pub fn new(
        variants: VariantIndex,
        sample_names: Vec<String>,
        dosages: Array2<f64>,
    ) -> Result<Self, DataError> {
        if dosages.nrows() != variants.len() {
            return Err(DataError::ShapeMismatch {
                context: "dosage matrix rows",
                expected: variants.len(),
                found: dosages.nrows(),
            });
        }
        if dosages.ncols() != sample_names.len() {
            return Err(DataError::ShapeMismatch {
                context: "dosage matrix columns",
                expected: sample_names.len(),
                found: dosages.ncols(),
            });
        }
        let mut seen = AHashSet::with_capacity(sample_names.len());
        for name in &sample_names {
            if is_genotype_metadata_column(name) {
                return Err(DataError::ReservedSampleName(name.clone()));
            }
            if !seen.insert(name.as_str()) {
                return Err(DataError::DuplicateSample(name.clone()));
            }
        }
        Ok(Self {
            variants,
            sample_names,
            dosages,
        })
    }

    pub fn variants(&self) -> &VariantIndex {
        &self.variants
    }

    pub fn sample_names(&self) -> &[String] {
        &self.sample_names
    }

    pub fn dosages(&self) -> &Array2<f64> {
        &self.dosages
    }

    pub fn n_variants(&self) -> usize {
        self.variants.len()
    }

    pub fn n_samples(&self) -> usize {
        self.sample_names.len()
    }

    /// The table restricted to the given variant rows, in the given order.
    pub fn select_variants(&self, rows: &[usize]) -> Self {
        Self {
            variants: self.variants.select(rows),
            sample_names: self.sample_names.clone(),
            dosages: self.dosages.select(Axis(0), rows),
        }
    }
}

/// One row per sample, identified by a unique sample id, with one or more
/// real-valued phenotype columns.
#[derive(Debug, Clone, PartialEq)]
pub struct PhenotypeTable {
    sample_ids: Vec<String>,
    phenotype_names: Vec<String>,
    /// Shape: samples x phenotypes.
    values: Array2<f64>,
}

impl PhenotypeTable {
    pub fn new(
        sample_ids: Vec<String>,
        phenotype_names: Vec<String>,
        values: Array2<f64>,
    ) -> Result<Self, DataError> {
        if values.nrows() != sample_ids.len() {
            return Err(DataError::ShapeMismatch {
                context: "phenotype matrix rows",
                expected: sample_ids.len(),
                found: values.nrows(),
            });
        }
        if values.ncols() != phenotype_names.len() {
            return Err(DataError::ShapeMismatch {
                context: "phenotype matrix columns",
                expected: phenotype_names.len(),
                found: values.ncols(),
            });
        }
        let mut seen_ids = AHashSet::with_capacity(sample_ids.len());
        for id in &sample_ids {
            if !seen_ids.insert(id.as_str()) {
                return Err(DataError::DuplicateSampleId(id.clone()));
            }
        }
        let mut seen_names = AHashSet::with_capacity(phenotype_names.len());
        for name in &phenotype_names {
            if name.eq_ignore_ascii_case(PHENOTYPE_ID_COLUMN) {
                return Err(DataError::ReservedPhenotypeName(name.clone()));
            }
            if !seen_names.insert(name.as_str()) {
                return Err(DataError::DuplicatePhenotypeName(name.clone()));
            }
        }
        Ok(Self {
            sample_ids,
            phenotype_names,
            values,
        })
    }

    pub fn sample_ids(&self) -> &[String] {
        &self.sample_ids
    }

    pub fn phenotype_names(&self) -> &[String] {
        &self.phenotype_names
    }

    pub fn values(&self) -> &Array2<f64> {
        &self.values
    }

    pub fn n_samples(&self) -> usize {
        self.sample_ids.len()
    }

    /// A copy with the synthetic all-ones intercept column prepended. A table
    /// that already has an `intercept` column is rejected.
    pub fn with_intercept(&self) -> Result<Self, DataError> {
        if self
            .phenotype_names
            .iter()
            .any(|name| name.eq_ignore_ascii_case(INTERCEPT_COLUMN))
        {
            return Err(DataError::DuplicatePhenotypeName(
                INTERCEPT_COLUMN.to_string(),
            ));
        }
        let mut names = Vec::with_capacity(self.phenotype_names.len() + 1);
        names.push(INTERCEPT_COLUMN.to_string());
        names.extend(self.phenotype_names.iter().cloned());
        let mut values = Array2::ones((self.n_samples(), self.phenotype_names.len() + 1));
        values
            .slice_mut(ndarray::s![.., 1..])
            .assign(&self.values);
        Self::new(self.sample_ids.clone(), names, values)
    }

    /// The table's rows permuted into the given sample order. Every requested
    /// sample must be present and no sample may be left over.
    pub fn permute_samples(&self, order: &[String]) -> Result<Self, DataError> {
        if order.len() != self.n_samples() {
            return Err(DataError::SampleCountMismatch {
                genotype: order.len(),
                phenotype: self.n_samples(),
            });
        }
        let positions: ahash::AHashMap<&str, usize> = self
            .sample_ids
            .iter()
            .enumerate()
            .map(|(row, id)| (id.as_str(), row))
            .collect();
        let mut rows = Vec::with_capacity(order.len());
        for id in order {
            match positions.get(id.as_str()) {
                Some(&row) => rows.push(row),
                None => return Err(DataError::UnknownSample(id.clone())),
            }
        }
        Ok(Self {
            sample_ids: rows.iter().map(|&row| self.sample_ids[row].clone()).collect(),
            phenotype_names: self.phenotype_names.clone(),
            values: self.values.select(Axis(0), &rows),
        })
    }
}

/// Per-variant summary statistics over `n` samples.
#[derive(Debug, Clone, PartialEq)]
pub struct Summary {
    n: usize,
    variants: VariantIndex,
    mean: Array1<f64>,
    std: Array1<f64>,
}

impl Summary {
    pub fn new(
        n: usize,
        variants: VariantIndex,
        mean: Array1<f64>,
        std: Array1<f64>,
    ) -> Result<Self, DataError> {
        if mean.len() != variants.len() {
            return Err(DataError::ShapeMismatch {
                context: "mean column",
                expected: variants.len(),
                found: mean.len(),
            });
        }
        if std.len() != variants.len() {
            return Err(DataError::ShapeMismatch {
                context: "standard-deviation column",
                expected: variants.len(),
                found: std.len(),
            });
        }
        Ok(Self {
            n,
            variants,
            mean,
            std,
        })
    }

    pub fn n(&self) -> usize {
        self.n
    }

    pub fn variants(&self) -> &VariantIndex {
        &self.variants
    }

    pub fn mean(&self) -> &Array1<f64> {
        &self.mean
    }

    pub fn std(&self) -> &Array1<f64> {
        &self.std
    }

    pub fn len(&self) -> usize {
        self.variants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.variants.is_empty()
    }

    /// The summary restricted to the given rows, in the given order.
    pub fn select(&self, rows: &[usize]) -> Self {
        Self {
            n: self.n,
            variants: self.variants.select(rows),
            mean: self.mean.select(Axis(0), rows),
            std: self.std.select(Axis(0), rows),
        }
    }
}
