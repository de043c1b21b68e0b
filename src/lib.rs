//! # kenrich
//!
//! `kenrich` analyzes very large nucleotide sequence files (raw
//! one-sequence-per-line, FASTA, or FASTQ, optionally gzip- or
//! zlib-compressed) and computes, for every k-mer of a chosen length
//! k in 1..=16:
//!
//! - its **count**,
//! - its **enrichment** against a control corpus, a shuffled corpus, or a
//!   probabilistic mono-/dinucleotide background, and
//! - iterative **knockout** enrichments (IKKE), where the top-scoring motif
//!   is masked out and counts are recomputed until the requested number of
//!   distinct motifs has been extracted.
//!
//! Bootstrap subsampling adds a per-k-mer standard deviation and a Welch
//! two-sample t-test p-value to any of the above.
//!
//! The high-level entry points live in [`api`]:
//!
//! ```rust,no_run
//! use kenrich::api;
//! use kenrich::options::Options;
//!
//! let mut opts = Options::new(5);
//! opts.normalize = true;
//! let data = api::enrichment("bound.fastq.gz", Some("input.fastq.gz"), &opts)?;
//! for row in data.rows().iter().take(10) {
//!     println!("{}\t{}", data.kmer_string(row), row.score);
//! }
//! # Ok::<(), kenrich::error::KenrichError>(())
//! ```
//!
//! The lower layers are public for callers that need them: [`stream`]
//! (decompressing record-respecting reader), [`detect`] (file-type
//! detection), [`hasher`] (rolling k-mer hashing), [`table`] (dense
//! `4^k`-slot count table), [`counter`] (counting passes), [`shuffle`]
//! (k-let-preserving shuffling), [`enrichment`], [`bootstrap`], and
//! [`stats`].

pub mod api;
pub mod bootstrap;
pub mod cli;
pub mod counter;
pub mod data;
pub mod detect;
pub mod enrichment;
pub mod error;
pub mod hasher;
pub mod mask;
pub mod nucleotide;
pub mod options;
pub mod shuffle;
pub mod stats;
pub mod stream;
pub mod table;

pub use data::{KmerData, KmerRow};
pub use error::{KenrichError, Result};
pub use options::{Options, ProbAlgo};
pub use table::KmerTable;
