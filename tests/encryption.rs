//! End-to-end exercises of the full pipeline, including the serialization
//! boundary: tables and keys go through their on-disk encodings between
//! steps, the way separate sites would actually exchange them.

use approx::assert_abs_diff_eq;
use ndarray::{Array1, Array2, arr2};
use rand::SeedableRng;
use rand::rngs::StdRng;

use hegp::data::{GenotypeTable, PhenotypeTable, Summary, VariantIndex};
use hegp::key::Key;
use hegp::pipeline::{self, DecryptOptions, EncryptOptions};
use hegp::serialization::{
    read_genotype, read_key, read_summary, write_genotype, write_key, write_summary,
};

fn genotype(rows: &[(&str, u64)], samples: &[&str], dosages: Array2<f64>) -> GenotypeTable {
    GenotypeTable::new(
        VariantIndex::new(
            rows.iter().map(|r| r.0.to_string()).collect(),
            rows.iter().map(|r| r.1).collect(),
            None,
        )
        .unwrap(),
        samples.iter().map(|s| s.to_string()).collect(),
        dosages,
    )
    .unwrap()
}

#[test]
fn encrypt_aligns_to_the_summary_and_reports_the_dropped_variant() {
    // Four variants, three samples; the summary only covers three variants.
    let table = genotype(
        &[("1", 10), ("1", 20), ("2", 5), ("2", 30)],
        &["s1", "s2", "s3"],
        arr2(&[
            [0.0, 1.0, 2.0],
            [1.0, 1.5, 0.5],
            [2.0, 0.0, 1.0],
            [0.5, 2.0, 1.5],
        ]),
    );
    let summary = Summary::new(
        3,
        VariantIndex::new(
            vec!["1".into(), "1".into(), "2".into()],
            vec![10, 20, 5],
            None,
        )
        .unwrap(),
        Array1::from(vec![1.0, 1.0, 1.0]),
        Array1::from(vec![1.0, 0.5, 1.0]),
    )
    .unwrap();

    let mut rng = StdRng::seed_from_u64(23);
    let encrypted = pipeline::encrypt(
        &mut rng,
        table,
        None,
        EncryptOptions {
            summary: Some(summary),
            ..EncryptOptions::default()
        },
    )
    .unwrap();

    assert_eq!(encrypted.variants_dropped, 1);
    assert_eq!(encrypted.genotype.n_variants(), 3);
    assert_eq!(encrypted.genotype.n_samples(), 3);
}

#[test]
fn zero_variance_variants_count_toward_the_drop_report() {
    let table = genotype(
        &[("1", 10), ("1", 20)],
        &["s1", "s2", "s3"],
        arr2(&[[0.0, 1.0, 2.0], [1.0, 1.0, 1.0]]),
    );
    // The second variant has zero variance across samples.
    let summary = pipeline::summarize(&table).unwrap();
    let mut rng = StdRng::seed_from_u64(31);
    let encrypted = pipeline::encrypt(
        &mut rng,
        table,
        None,
        EncryptOptions {
            summary: Some(summary),
            ..EncryptOptions::default()
        },
    )
    .unwrap();
    assert_eq!(encrypted.variants_dropped, 1);
    assert_eq!(encrypted.genotype.n_variants(), 1);
}

#[test]
fn full_cycle_through_the_serialization_boundary() {
    let table = genotype(
        &[("1", 10), ("1", 20), ("2", 5), ("2", 30), ("3", 7)],
        &["s1", "s2", "s3", "s4"],
        arr2(&[
            [0.0, 1.0, 2.0, 1.0],
            [1.0, 0.5, 0.0, 2.0],
            [2.0, 2.0, 1.0, 0.0],
            [0.5, 1.5, 2.5, 1.0],
            [1.0, 0.0, 0.5, 2.0],
        ]),
    );

    // Site A publishes its summary as a file.
    let summary = pipeline::summarize(&table).unwrap();
    let mut summary_file = Vec::new();
    write_summary(&mut summary_file, &summary).unwrap();

    // Encrypt against the summary read back from the file; persist both the
    // ciphertext and the key.
    let mut rng = StdRng::seed_from_u64(47);
    let encrypted = pipeline::encrypt(
        &mut rng,
        table.clone(),
        None,
        EncryptOptions {
            summary: Some(read_summary(&summary_file[..]).unwrap()),
            ..EncryptOptions::default()
        },
    )
    .unwrap();
    assert_eq!(encrypted.variants_dropped, 0);

    let mut ciphertext_file = Vec::new();
    write_genotype(&mut ciphertext_file, &encrypted.genotype).unwrap();
    let mut key_file = Vec::new();
    write_key(&mut key_file, encrypted.key.to_dense().view()).unwrap();

    // Decrypt from the persisted artifacts alone.
    let decrypted = pipeline::decrypt(
        read_genotype(&ciphertext_file[..]).unwrap(),
        &Key::Dense(read_key(&key_file[..]).unwrap()),
        DecryptOptions {
            summary: Some(read_summary(&summary_file[..]).unwrap()),
            only_center: false,
        },
    )
    .unwrap();

    assert_eq!(decrypted.genotype.variants(), table.variants());
    for (a, b) in decrypted
        .genotype
        .dosages()
        .iter()
        .zip(table.dosages().iter())
    {
        assert_abs_diff_eq!(a, b, epsilon = 1e-6);
    }
}

#[test]
fn sharding_and_concatenation_are_inverses() {
    let whole = genotype(
        &[("1", 10), ("1", 20), ("2", 5)],
        &["s1", "s2", "s3", "s4", "s5"],
        arr2(&[
            [0.0, 1.0, 2.0, 1.0, 0.5],
            [1.0, 0.5, 0.0, 2.0, 1.5],
            [2.0, 2.0, 1.0, 0.0, 1.0],
        ]),
    );

    // Column-wise shards, each retaining the identity columns.
    let shards = vec![
        genotype(
            &[("1", 10), ("1", 20), ("2", 5)],
            &["s1", "s2"],
            arr2(&[[0.0, 1.0], [1.0, 0.5], [2.0, 2.0]]),
        ),
        genotype(
            &[("1", 10), ("1", 20), ("2", 5)],
            &["s3"],
            arr2(&[[2.0], [0.0], [1.0]]),
        ),
        genotype(
            &[("1", 10), ("1", 20), ("2", 5)],
            &["s4", "s5"],
            arr2(&[[1.0, 0.5], [2.0, 1.5], [0.0, 1.0]]),
        ),
    ];
    assert_eq!(pipeline::cat_genotype(shards).unwrap(), whole);

    let phenotype = PhenotypeTable::new(
        vec!["s1".into(), "s2".into(), "s3".into()],
        vec!["height".into()],
        arr2(&[[1.0], [2.0], [3.0]]),
    )
    .unwrap();
    let parts = vec![
        PhenotypeTable::new(
            vec!["s1".into()],
            vec!["height".into()],
            arr2(&[[1.0]]),
        )
        .unwrap(),
        PhenotypeTable::new(
            vec!["s2".into(), "s3".into()],
            vec!["height".into()],
            arr2(&[[2.0], [3.0]]),
        )
        .unwrap(),
    ];
    assert_eq!(pipeline::cat_phenotype(parts).unwrap(), phenotype);
}

#[test]
fn tables_survive_a_trip_through_real_files() {
    let dir = tempfile::tempdir().unwrap();
    let genotype_path = dir.path().join("genotype.tsv");
    let summary_path = dir.path().join("summary.tsv");

    let table = genotype(
        &[("1", 10), ("2", 5)],
        &["s1", "s2", "s3"],
        arr2(&[[0.0, 1.25, 2.0], [1.0, 0.5, -0.75]]),
    );
    let summary = pipeline::summarize(&table).unwrap();

    write_genotype(std::fs::File::create(&genotype_path).unwrap(), &table).unwrap();
    write_summary(std::fs::File::create(&summary_path).unwrap(), &summary).unwrap();

    let read_back = read_genotype(std::fs::File::open(&genotype_path).unwrap()).unwrap();
    assert_eq!(read_back, table);
    let summary_back = read_summary(std::io::BufReader::new(
        std::fs::File::open(&summary_path).unwrap(),
    ))
    .unwrap();
    assert_eq!(summary_back, summary);
}

#[test]
fn pooled_summaries_drive_a_multi_site_encryption() {
    // Two sites with disjoint samples over the same variants.
    let site_a = genotype(
        &[("1", 10), ("1", 20), ("2", 5)],
        &["a1", "a2", "a3"],
        arr2(&[[0.0, 1.0, 2.0], [1.0, 0.5, 0.0], [2.0, 2.0, 1.0]]),
    );
    let site_b = genotype(
        &[("1", 10), ("1", 20), ("2", 5)],
        &["b1", "b2", "b3", "b4"],
        arr2(&[
            [1.0, 2.0, 0.0, 0.5],
            [2.0, 1.5, 1.0, 0.0],
            [0.0, 1.0, 2.0, 1.5],
        ]),
    );

    let pooled = pipeline::pool(&[
        pipeline::summarize(&site_a).unwrap(),
        pipeline::summarize(&site_b).unwrap(),
    ])
    .unwrap();
    assert_eq!(pooled.variants_dropped, 0);
    assert_eq!(pooled.summary.n(), 7);

    // Each site encrypts its own slice against the pooled statistics.
    let mut rng = StdRng::seed_from_u64(53);
    let encrypted_a = pipeline::encrypt(
        &mut rng,
        site_a.clone(),
        None,
        EncryptOptions {
            summary: Some(pooled.summary.clone()),
            ..EncryptOptions::default()
        },
    )
    .unwrap();
    let decrypted_a = pipeline::decrypt(
        encrypted_a.genotype,
        &encrypted_a.key,
        DecryptOptions {
            summary: Some(pooled.summary),
            only_center: false,
        },
    )
    .unwrap();
    for (a, b) in decrypted_a
        .genotype
        .dosages()
        .iter()
        .zip(site_a.dosages().iter())
    {
        assert_abs_diff_eq!(a, b, epsilon = 1e-6);
    }
}
