//! Command-line interface definition.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::options::{Options, ProbAlgo};

/// Streaming k-mer counting, enrichment, and iterative knockout analysis
/// for FASTA, FASTQ, and raw one-sequence-per-line files (optionally gzip-
/// or zlib-compressed).
#[derive(Parser, Debug)]
#[command(name = "kenrich")]
#[command(version, author, about, long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,

    /// Output format
    #[arg(short, long, value_enum, default_value = "tsv", global = true)]
    pub format: OutputFormat,

    /// Suppress diagnostics on stderr
    #[arg(short, long, global = true)]
    pub quiet: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Count every k-mer of the input
    Count {
        /// Input file
        path: PathBuf,

        #[command(flatten)]
        common: CommonOpts,
    },
    /// Per-k-mer enrichment against a control corpus or background model
    Enrich {
        /// Test file
        test: PathBuf,

        /// Control file (required unless --prob is set)
        #[arg(short, long)]
        control: Option<PathBuf>,

        #[command(flatten)]
        common: CommonOpts,

        /// Report enrichments as log2
        #[arg(short, long)]
        normalize: bool,
    },
    /// Iterative k-mer knockout enrichment
    Ikke {
        /// Test file
        test: PathBuf,

        /// Control file (required unless --prob is set)
        #[arg(short, long)]
        control: Option<PathBuf>,

        /// Number of motifs to extract
        #[arg(short, long, default_value = "10")]
        iters: u64,

        #[command(flatten)]
        common: CommonOpts,

        /// Report enrichments as log2
        #[arg(short, long)]
        normalize: bool,
    },
}

/// Options shared by every subcommand.
#[derive(Parser, Debug)]
pub struct CommonOpts {
    /// K-mer length (1-16)
    #[arg(short, long, value_parser = parse_k, default_value = "5")]
    pub kmer: u32,

    /// Worker threads for counting passes
    #[arg(short, long, default_value = "1")]
    pub threads: u32,

    /// Leave output rows in hash order instead of sorting by score
    #[arg(long)]
    pub no_sort: bool,

    /// Bootstrap iterations (0 disables bootstrapping)
    #[arg(long, default_value = "0")]
    pub bootstrap_iters: u32,

    /// Subsample per bootstrap iteration, in milli-percent (25000 = 25%)
    #[arg(long, default_value = "25000")]
    pub bootstrap_sample: u32,

    /// Background model
    #[arg(long, value_enum, default_value = "none")]
    pub prob: ProbChoice,

    /// k-let length preserved by shuffling (default: round(sqrt(k)))
    #[arg(long)]
    pub klet: Option<u32>,

    /// RNG seed for subsampling (negative: time-based)
    #[arg(long, default_value = "-1", allow_hyphen_values = true)]
    pub seed: i64,

    /// Render k-mers with U instead of T
    #[arg(long)]
    pub rna: bool,
}

/// Output format for result rows.
#[derive(Debug, Clone, Copy, ValueEnum, Default)]
pub enum OutputFormat {
    /// Tab-separated values
    #[default]
    Tsv,
    /// JSON array
    Json,
}

/// Background model names accepted on the command line.
#[derive(Debug, Clone, Copy, ValueEnum, Default)]
pub enum ProbChoice {
    /// No background model (control file required where one applies)
    #[default]
    None,
    /// Count a k-let-preserving shuffle of the corpus as control
    Ushuffle,
    /// Predict frequencies from mono-/dinucleotide counts
    Regular,
    /// Probabilistic enrichment against the shuffled corpus
    Both,
}

impl From<ProbChoice> for ProbAlgo {
    fn from(choice: ProbChoice) -> Self {
        match choice {
            ProbChoice::None => ProbAlgo::None,
            ProbChoice::Ushuffle => ProbAlgo::Ushuffle,
            ProbChoice::Regular => ProbAlgo::Regular,
            ProbChoice::Both => ProbAlgo::Both,
        }
    }
}

impl CommonOpts {
    /// Builds the library options record, folding in per-subcommand flags.
    #[must_use]
    pub fn to_options(&self, normalize: bool, iters: u64, quiet: bool) -> Options {
        let mut opts = Options::new(self.kmer);
        opts.iters = iters;
        opts.threads = self.threads;
        opts.normalize = normalize;
        opts.sort = !self.no_sort;
        opts.bootstrap_iters = self.bootstrap_iters;
        opts.bootstrap_sample = self.bootstrap_sample;
        opts.prob_algo = self.prob.into();
        opts.prob_ntprec = self.klet;
        opts.seed = self.seed;
        opts.use_t = !self.rna;
        opts.warnings = !quiet;
        opts
    }
}

fn parse_k(s: &str) -> Result<u32, String> {
    let k: u32 = s
        .parse()
        .map_err(|_| format!("'{s}' is not a valid number"))?;
    if k == 0 {
        return Err("k-mer length must be at least 1".to_string());
    }
    if k > 16 {
        return Err("k-mer length must be at most 16".to_string());
    }
    Ok(k)
}
