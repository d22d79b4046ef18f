//! Command-line interface: argument handling and file plumbing around the
//! pure operations in `hegp::pipeline`. Core computations run to completion
//! before any output file is created, so a rejected configuration never
//! leaves partial output behind.

use clap::{Args, Parser, Subcommand};
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::error::Error;
use std::fs::File;
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::process;

use hegp::key::Key;
use hegp::pipeline::{self, DecryptOptions, EncryptOptions};
use hegp::serialization::{
    read_genotype, read_key, read_phenotype, read_summary, write_genotype, write_key,
    write_phenotype, write_summary,
};

#[derive(Parser)]
#[command(
    name = "hegp",
    version,
    about = "Homomorphic encryption of genotypes and phenotypes."
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Compute per-variant summary statistics of a genotype file.
    Summary(SummaryArgs),
    /// Pool per-site summary statistics into one summary.
    Pool(PoolArgs),
    /// Disguise a genotype (and optionally a phenotype) with a random
    /// orthogonal key.
    Encrypt(EncryptArgs),
    /// Undo the rotation with the stored key.
    Decrypt(DecryptArgs),
    /// Reassemble a genotype table from column-wise shards.
    CatGenotype(CatArgs),
    /// Reassemble a phenotype table from row-wise shards.
    CatPhenotype(CatArgs),
}

#[derive(Args)]
struct SummaryArgs {
    /// Genotype file (TSV).
    genotype_file: PathBuf,

    /// Output file; standard output when omitted.
    #[arg(short, long)]
    output: Option<PathBuf>,
}

#[derive(Args)]
struct PoolArgs {
    /// Summary files, one per site.
    #[arg(required = true)]
    summary_files: Vec<PathBuf>,

    /// Output file; standard output when omitted.
    #[arg(short, long)]
    output: Option<PathBuf>,
}

#[derive(Args)]
struct EncryptArgs {
    /// Genotype file (TSV).
    genotype_file: PathBuf,

    /// Summary statistics file; defaults to statistics of the genotype itself.
    #[arg(short, long)]
    summary: Option<PathBuf>,

    /// Phenotype file to disguise with the same key.
    #[arg(short, long, requires = "phenotype_output")]
    phenotype: Option<PathBuf>,

    /// Where to write the disguised phenotype.
    #[arg(long, requires = "phenotype")]
    phenotype_output: Option<PathBuf>,

    /// Where to write the key. A key that is not written cannot be recovered.
    #[arg(short, long)]
    key: Option<PathBuf>,

    /// Reuse a previously stored key instead of generating a fresh one.
    #[arg(long)]
    key_in: Option<PathBuf>,

    /// Number of key blocks; defaults to one block per 1500 samples.
    #[arg(long)]
    key_blocks: Option<usize>,

    /// Center the genotype without scaling by the standard deviation.
    #[arg(long)]
    only_center: bool,

    /// Prepend the synthetic all-ones intercept column to the phenotype.
    #[arg(long)]
    add_intercept: bool,

    /// Seed for key generation, for reproducible runs.
    #[arg(long)]
    seed: Option<u64>,

    /// Output file for the disguised genotype; standard output when omitted.
    #[arg(short, long)]
    output: Option<PathBuf>,
}

#[derive(Args)]
struct DecryptArgs {
    /// Disguised genotype file (TSV).
    ciphertext_file: PathBuf,

    /// The key the ciphertext was produced with.
    #[arg(short, long)]
    key: PathBuf,

    /// Summary used at encryption time; restores original scale and location.
    #[arg(short, long)]
    summary: Option<PathBuf>,

    /// The ciphertext was centered but not scaled.
    #[arg(long)]
    only_center: bool,

    /// Output file; standard output when omitted.
    #[arg(short, long)]
    output: Option<PathBuf>,
}

#[derive(Args)]
struct CatArgs {
    /// Shard files, in order.
    #[arg(required = true)]
    parts: Vec<PathBuf>,

    /// Output file; standard output when omitted.
    #[arg(short, long)]
    output: Option<PathBuf>,
}

fn open_input(path: &Path) -> io::Result<BufReader<File>> {
    Ok(BufReader::new(File::open(path)?))
}

fn open_output(path: Option<&PathBuf>) -> io::Result<Box<dyn Write>> {
    match path {
        Some(path) => Ok(Box::new(BufWriter::new(File::create(path)?))),
        None => Ok(Box::new(io::stdout().lock())),
    }
}

fn report_dropped(count: usize) {
    if count > 0 {
        eprintln!("Dropped {count} SNP(s)");
    }
}

fn run() -> Result<(), Box<dyn Error>> {
    match Cli::parse().command {
        Command::Summary(args) => {
            let genotype = read_genotype(open_input(&args.genotype_file)?)?;
            let summary = pipeline::summarize(&genotype)?;
            write_summary(open_output(args.output.as_ref())?, &summary)?;
        }
        Command::Pool(args) => {
            let summaries = args
                .summary_files
                .iter()
                .map(|path| Ok(read_summary(open_input(path)?)?))
                .collect::<Result<Vec<_>, Box<dyn Error>>>()?;
            let pooled = pipeline::pool(&summaries)?;
            report_dropped(pooled.variants_dropped);
            write_summary(open_output(args.output.as_ref())?, &pooled.summary)?;
        }
        Command::Encrypt(args) => {
            let genotype = read_genotype(open_input(&args.genotype_file)?)?;
            let phenotype = args
                .phenotype
                .as_ref()
                .map(|path| read_phenotype(open_input(path)?))
                .transpose()?;
            let summary = args
                .summary
                .as_ref()
                .map(|path| read_summary(open_input(path)?))
                .transpose()?;
            let key_input = args
                .key_in
                .as_ref()
                .map(|path| read_key(open_input(path)?))
                .transpose()?;

            let mut rng = match args.seed {
                Some(seed) => StdRng::seed_from_u64(seed),
                None => StdRng::from_entropy(),
            };
            let encrypted = pipeline::encrypt(
                &mut rng,
                genotype,
                phenotype,
                EncryptOptions {
                    summary,
                    key_input,
                    key_blocks: args.key_blocks,
                    only_center: args.only_center,
                    add_intercept: args.add_intercept,
                },
            )?;
            report_dropped(encrypted.variants_dropped);

            write_genotype(open_output(args.output.as_ref())?, &encrypted.genotype)?;
            if let (Some(path), Some(phenotype)) =
                (args.phenotype_output.as_ref(), encrypted.phenotype.as_ref())
            {
                write_phenotype(open_output(Some(path))?, phenotype)?;
            }
            if let Some(path) = args.key.as_ref() {
                write_key(open_output(Some(path))?, encrypted.key.to_dense().view())?;
            }
        }
        Command::Decrypt(args) => {
            let ciphertext = read_genotype(open_input(&args.ciphertext_file)?)?;
            let key = Key::Dense(read_key(open_input(&args.key)?)?);
            let summary = args
                .summary
                .as_ref()
                .map(|path| read_summary(open_input(path)?))
                .transpose()?;
            let decrypted = pipeline::decrypt(
                ciphertext,
                &key,
                DecryptOptions {
                    summary,
                    only_center: args.only_center,
                },
            )?;
            report_dropped(decrypted.variants_dropped);
            write_genotype(open_output(args.output.as_ref())?, &decrypted.genotype)?;
        }
        Command::CatGenotype(args) => {
            let parts = args
                .parts
                .iter()
                .map(|path| Ok(read_genotype(open_input(path)?)?))
                .collect::<Result<Vec<_>, Box<dyn Error>>>()?;
            let genotype = pipeline::cat_genotype(parts)?;
            write_genotype(open_output(args.output.as_ref())?, &genotype)?;
        }
        Command::CatPhenotype(args) => {
            let parts = args
                .parts
                .iter()
                .map(|path| Ok(read_phenotype(open_input(path)?)?))
                .collect::<Result<Vec<_>, Box<dyn Error>>>()?;
            let phenotype = pipeline::cat_phenotype(parts)?;
            write_phenotype(open_output(args.output.as_ref())?, &phenotype)?;
        }
    }
    Ok(())
}

fn main() {
    env_logger::init();
    if let Err(error) = run() {
        eprintln!("error: {error}");
        process::exit(1);
    }
}
