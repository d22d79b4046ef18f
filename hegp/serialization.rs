//! On-disk encodings: tab-separated tables for genotype, phenotype, summary,
//! and key records.
//!
//! A summary file starts with comment header lines (`# hegp summary file
//! version 1`, then `# number-of-samples <n>`) followed by a TSV table of the
//! identity columns plus `mean` and `standard-deviation`. Keys are dense
//! row-major TSV matrices; floats are written in their shortest
//! round-trippable form. Readers validate the schema up front and abort
//! before producing any partial table.

use crate::data::{DataError, GenotypeTable, PhenotypeTable, Summary, VariantIndex};
use crate::linalg::{DenseKey, KeyMatrixError};
use ahash::AHashMap;
use ndarray::{Array1, Array2, ArrayView2};
use std::io::{BufRead, Read, Write};
use thiserror::Error;

/// The version line every summary file must start with (after `#`).
pub const SUMMARY_FORMAT: &str = "hegp summary file version 1";

const NUMBER_OF_SAMPLES: &str = "number-of-samples";

#[derive(Error, Debug)]
pub enum SerializationError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Malformed table: {0}")]
    Csv(#[from] csv::Error),
    #[error("The required column '{0}' was not found in the input file.")]
    ColumnNotFound(String),
    #[error(
        "A summary table must end with 'mean' and 'standard-deviation' columns; found {found:?}."
    )]
    BadSummaryColumns { found: Vec<String> },
    #[error("Data row {row}: could not parse '{value}' as a {expected}.")]
    ParseValue {
        row: usize,
        value: String,
        expected: &'static str,
    },
    #[error("Not a summary file: expected the header line '# hegp summary file version 1', found '{0}'.")]
    UnsupportedFormat(String),
    #[error("Malformed summary header line '{0}': expected '# <property> <value>'.")]
    MalformedProperty(String),
    #[error("The summary header is missing the '{0}' property.")]
    MissingProperty(&'static str),
    #[error("The summary header property '{property}' has an unreadable value '{value}'.")]
    BadProperty { property: String, value: String },
    #[error(transparent)]
    Data(#[from] DataError),
    #[error(transparent)]
    Key(#[from] KeyMatrixError),
}

fn parse_position(field: &str, row: usize) -> Result<u64, SerializationError> {
    field
        .parse::<u64>()
        .map_err(|_| SerializationError::ParseValue {
            row,
            value: field.to_string(),
            expected: "non-negative integer position",
        })
}

fn parse_value(field: &str, row: usize) -> Result<f64, SerializationError> {
    field
        .parse::<f64>()
        .map_err(|_| SerializationError::ParseValue {
            row,
            value: field.to_string(),
            expected: "real number",
        })
}

/// Checks the leading identity columns and reports whether the optional
/// `reference` column is present.
fn identity_prefix(headers: &csv::StringRecord) -> Result<bool, SerializationError> {
    if headers.get(0) != Some("chromosome") {
        return Err(SerializationError::ColumnNotFound("chromosome".to_string()));
    }
    if headers.get(1) != Some("position") {
        return Err(SerializationError::ColumnNotFound("position".to_string()));
    }
    Ok(headers.get(2) == Some("reference"))
}

fn tsv_reader<R: Read>(reader: R) -> csv::Reader<R> {
    csv::ReaderBuilder::new()
        .delimiter(b'\t')
        .from_reader(reader)
}

fn tsv_writer<W: Write>(writer: W) -> csv::Writer<W> {
    csv::WriterBuilder::new().delimiter(b'\t').from_writer(writer)
}

pub fn read_genotype<R: Read>(reader: R) -> Result<GenotypeTable, SerializationError> {
    let mut csv = tsv_reader(reader);
    let headers = csv.headers()?.clone();
    let has_reference = identity_prefix(&headers)?;
    let sample_start = if has_reference { 3 } else { 2 };
    let sample_names: Vec<String> = headers.iter().skip(sample_start).map(String::from).collect();

    let mut chromosome = Vec::new();
    let mut position = Vec::new();
    let mut reference = Vec::new();
    let mut values = Vec::new();
    for (row, record) in csv.records().enumerate() {
        let record = record?;
        chromosome.push(record[0].to_string());
        position.push(parse_position(&record[1], row + 1)?);
        if has_reference {
            reference.push(record[2].to_string());
        }
        for field in record.iter().skip(sample_start) {
            values.push(parse_value(field, row + 1)?);
        }
    }

    let dosages = Array2::from_shape_vec((chromosome.len(), sample_names.len()), values)
        .expect("record width is enforced by the reader");
    let variants = VariantIndex::new(chromosome, position, has_reference.then_some(reference))?;
    Ok(GenotypeTable::new(variants, sample_names, dosages)?)
}

pub fn write_genotype<W: Write>(
    writer: W,
    genotype: &GenotypeTable,
) -> Result<(), SerializationError> {
    let mut csv = tsv_writer(writer);
    let mut header: Vec<&str> = vec!["chromosome", "position"];
    if genotype.variants().has_reference() {
        header.push("reference");
    }
    header.extend(genotype.sample_names().iter().map(String::as_str));
    csv.write_record(&header)?;

    for row in 0..genotype.n_variants() {
        let variants = genotype.variants();
        let mut record = vec![
            variants.chromosome()[row].clone(),
            variants.position()[row].to_string(),
        ];
        if let Some(reference) = variants.reference() {
            record.push(reference[row].clone());
        }
        record.extend(genotype.dosages().row(row).iter().map(|value| value.to_string()));
        csv.write_record(&record)?;
    }
    csv.flush()?;
    Ok(())
}

pub fn read_phenotype<R: Read>(reader: R) -> Result<PhenotypeTable, SerializationError> {
    let mut csv = tsv_reader(reader);
    let headers = csv.headers()?.clone();
    if headers.get(0) != Some("sample-id") {
        return Err(SerializationError::ColumnNotFound("sample-id".to_string()));
    }
    let phenotype_names: Vec<String> = headers.iter().skip(1).map(String::from).collect();

    let mut sample_ids = Vec::new();
    let mut values = Vec::new();
    for (row, record) in csv.records().enumerate() {
        let record = record?;
        sample_ids.push(record[0].to_string());
        for field in record.iter().skip(1) {
            values.push(parse_value(field, row + 1)?);
        }
    }

    let values = Array2::from_shape_vec((sample_ids.len(), phenotype_names.len()), values)
        .expect("record width is enforced by the reader");
    Ok(PhenotypeTable::new(sample_ids, phenotype_names, values)?)
}

pub fn write_phenotype<W: Write>(
    writer: W,
    phenotype: &PhenotypeTable,
) -> Result<(), SerializationError> {
    let mut csv = tsv_writer(writer);
    let mut header: Vec<&str> = vec!["sample-id"];
    header.extend(phenotype.phenotype_names().iter().map(String::as_str));
    csv.write_record(&header)?;

    for row in 0..phenotype.n_samples() {
        let mut record = vec![phenotype.sample_ids()[row].clone()];
        record.extend(phenotype.values().row(row).iter().map(|value| value.to_string()));
        csv.write_record(&record)?;
    }
    csv.flush()?;
    Ok(())
}

/// Parses the `#`-prefixed header lines of a summary file into properties.
/// Whitespace after the `#` is tolerated; a property's value is everything
/// after the first space.
fn parse_summary_headers(
    lines: &[String],
) -> Result<AHashMap<String, String>, SerializationError> {
    let version = lines
        .first()
        .ok_or_else(|| SerializationError::UnsupportedFormat(String::new()))?;
    if version.trim_start_matches('#').trim() != SUMMARY_FORMAT {
        return Err(SerializationError::UnsupportedFormat(version.clone()));
    }
    let mut properties = AHashMap::new();
    for line in &lines[1..] {
        let stripped = line.trim_start_matches('#').trim_start();
        let (key, value) = stripped
            .split_once(' ')
            .ok_or_else(|| SerializationError::MalformedProperty(line.clone()))?;
        properties.insert(key.to_string(), value.to_string());
    }
    Ok(properties)
}

pub fn read_summary<R: BufRead>(reader: R) -> Result<Summary, SerializationError> {
    let mut header_lines = Vec::new();
    let mut body = String::new();
    let mut lines = reader.lines();
    for line in &mut lines {
        let line = line?;
        if line.starts_with('#') {
            header_lines.push(line);
        } else {
            body.push_str(&line);
            body.push('\n');
            break;
        }
    }
    for line in lines {
        let line = line?;
        body.push_str(&line);
        body.push('\n');
    }

    let properties = parse_summary_headers(&header_lines)?;
    let n_text = properties
        .get(NUMBER_OF_SAMPLES)
        .ok_or(SerializationError::MissingProperty(NUMBER_OF_SAMPLES))?;
    let n = n_text
        .trim()
        .parse::<usize>()
        .map_err(|_| SerializationError::BadProperty {
            property: NUMBER_OF_SAMPLES.to_string(),
            value: n_text.clone(),
        })?;

    let mut csv = tsv_reader(body.as_bytes());
    let headers = csv.headers()?.clone();
    let has_reference = identity_prefix(&headers)?;
    let stats_start = if has_reference { 3 } else { 2 };
    let tail: Vec<&str> = headers.iter().skip(stats_start).collect();
    if tail != ["mean", "standard-deviation"] {
        return Err(SerializationError::BadSummaryColumns {
            found: tail.into_iter().map(String::from).collect(),
        });
    }

    let mut chromosome = Vec::new();
    let mut position = Vec::new();
    let mut reference = Vec::new();
    let mut mean = Vec::new();
    let mut std = Vec::new();
    for (row, record) in csv.records().enumerate() {
        let record = record?;
        chromosome.push(record[0].to_string());
        position.push(parse_position(&record[1], row + 1)?);
        if has_reference {
            reference.push(record[2].to_string());
        }
        mean.push(parse_value(&record[stats_start], row + 1)?);
        std.push(parse_value(&record[stats_start + 1], row + 1)?);
    }

    let variants = VariantIndex::new(chromosome, position, has_reference.then_some(reference))?;
    Ok(Summary::new(n, variants, Array1::from(mean), Array1::from(std))?)
}

pub fn write_summary<W: Write>(mut writer: W, summary: &Summary) -> Result<(), SerializationError> {
    writeln!(writer, "# {SUMMARY_FORMAT}")?;
    writeln!(writer, "# {NUMBER_OF_SAMPLES} {}", summary.n())?;

    let mut csv = tsv_writer(&mut writer);
    let mut header: Vec<&str> = vec!["chromosome", "position"];
    if summary.variants().has_reference() {
        header.push("reference");
    }
    header.extend(["mean", "standard-deviation"]);
    csv.write_record(&header)?;

    for row in 0..summary.len() {
        let variants = summary.variants();
        let mut record = vec![
            variants.chromosome()[row].clone(),
            variants.position()[row].to_string(),
        ];
        if let Some(reference) = variants.reference() {
            record.push(reference[row].clone());
        }
        record.push(summary.mean()[row].to_string());
        record.push(summary.std()[row].to_string());
        csv.write_record(&record)?;
    }
    csv.flush()?;
    Ok(())
}

pub fn read_key<R: Read>(reader: R) -> Result<DenseKey, SerializationError> {
    let mut csv = csv::ReaderBuilder::new()
        .delimiter(b'\t')
        .has_headers(false)
        .from_reader(reader);
    let mut values = Vec::new();
    let mut rows = 0;
    let mut columns = None;
    for (row, record) in csv.records().enumerate() {
        let record = record?;
        columns.get_or_insert(record.len());
        for field in record.iter() {
            values.push(parse_value(field, row + 1)?);
        }
        rows += 1;
    }
    let matrix = Array2::from_shape_vec((rows, columns.unwrap_or(0)), values)
        .expect("record width is enforced by the reader");
    Ok(DenseKey::new(matrix)?)
}

pub fn write_key<W: Write>(writer: W, key: ArrayView2<'_, f64>) -> Result<(), SerializationError> {
    let mut csv = tsv_writer(writer);
    for row in key.rows() {
        csv.write_record(row.iter().map(|value| value.to_string()))?;
    }
    csv.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::{self, Key};
    use approx::assert_abs_diff_eq;
    use ndarray::arr2;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn example_genotype(with_reference: bool) -> GenotypeTable {
        let reference = with_reference.then(|| vec!["A".to_string(), "G".to_string()]);
        GenotypeTable::new(
            VariantIndex::new(vec!["1".into(), "2".into()], vec![100, 250], reference).unwrap(),
            vec!["s1".into(), "s2".into(), "s3".into()],
            arr2(&[[0.0, 1.25, 2.0], [1.0, 0.5, -0.75]]),
        )
        .unwrap()
    }

    #[test]
    fn genotype_round_trips() {
        for with_reference in [false, true] {
            let genotype = example_genotype(with_reference);
            let mut buffer = Vec::new();
            write_genotype(&mut buffer, &genotype).unwrap();
            let recovered = read_genotype(&buffer[..]).unwrap();
            assert_eq!(recovered, genotype);
        }
    }

    #[test]
    fn genotype_requires_identity_columns() {
        let text = "position\tchromosome\ts1\n100\t1\t0.5\n";
        assert!(matches!(
            read_genotype(text.as_bytes()),
            Err(SerializationError::ColumnNotFound(column)) if column == "chromosome"
        ));
    }

    #[test]
    fn phenotype_round_trips() {
        let phenotype = PhenotypeTable::new(
            vec!["a".into(), "b".into()],
            vec!["height".into(), "weight".into()],
            arr2(&[[170.5, 60.25], [180.0, -0.5]]),
        )
        .unwrap();
        let mut buffer = Vec::new();
        write_phenotype(&mut buffer, &phenotype).unwrap();
        assert_eq!(read_phenotype(&buffer[..]).unwrap(), phenotype);
    }

    #[test]
    fn summary_round_trips() {
        let summary = Summary::new(
            12,
            VariantIndex::new(
                vec!["1".into(), "X".into()],
                vec![100, 9000],
                Some(vec!["A".into(), "T".into()]),
            )
            .unwrap(),
            ndarray::arr1(&[0.5, 1.125]),
            ndarray::arr1(&[1.0, 0.25]),
        )
        .unwrap();
        let mut buffer = Vec::new();
        write_summary(&mut buffer, &summary).unwrap();
        assert_eq!(read_summary(&buffer[..]).unwrap(), summary);
    }

    #[test]
    fn summary_header_tolerates_extra_whitespace() {
        let text = "#   hegp summary file version 1\n\
                    #number-of-samples 7\n\
                    chromosome\tposition\tmean\tstandard-deviation\n\
                    1\t100\t0.5\t1\n";
        let summary = read_summary(text.as_bytes()).unwrap();
        assert_eq!(summary.n(), 7);
        assert_eq!(summary.len(), 1);
    }

    #[test]
    fn summary_rejects_unknown_version() {
        let text = "# hegp summary file version 2\n\
                    # number-of-samples 7\n\
                    chromosome\tposition\tmean\tstandard-deviation\n";
        assert!(matches!(
            read_summary(text.as_bytes()),
            Err(SerializationError::UnsupportedFormat(_))
        ));
    }

    #[test]
    fn summary_requires_the_sample_count() {
        let text = "# hegp summary file version 1\n\
                    chromosome\tposition\tmean\tstandard-deviation\n\
                    1\t100\t0.5\t1\n";
        assert!(matches!(
            read_summary(text.as_bytes()),
            Err(SerializationError::MissingProperty(NUMBER_OF_SAMPLES))
        ));
    }

    #[test]
    fn key_round_trips_within_tolerance() {
        let mut rng = StdRng::seed_from_u64(5);
        let key = Key::BlockDiagonal(key::generate(&mut rng, 6, Some(2)).unwrap());
        let dense = key.to_dense();
        let mut buffer = Vec::new();
        write_key(&mut buffer, dense.view()).unwrap();
        let recovered = read_key(&buffer[..]).unwrap();
        assert_eq!(recovered.matrix().dim(), (6, 6));
        for (a, b) in dense.iter().zip(recovered.matrix().iter()) {
            assert_abs_diff_eq!(a, b, epsilon = 1e-12);
        }
    }

    #[test]
    fn malformed_dosage_is_a_parse_error() {
        let text = "chromosome\tposition\ts1\n1\t100\tnot-a-number\n";
        assert!(matches!(
            read_genotype(text.as_bytes()),
            Err(SerializationError::ParseValue { row: 1, .. })
        ));
    }
}
