//! Error types for kenrich.
//!
//! Every fallible operation in the crate surfaces one of these strongly-typed
//! errors. The stream layer keeps the historical human-readable messages of
//! its error table; everything else names its origin (I/O, configuration,
//! capacity, protocol) so callers can match on the kind.

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by the sequence stream layer.
#[derive(Debug, Error)]
pub enum StreamError {
    /// Failed to open the underlying file.
    #[error("failed to open '{path}': {source}")]
    Open {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Read failure on the underlying descriptor.
    #[error("read failed: {0}")]
    Io(#[from] std::io::Error),

    /// The decompressor rejected the stream.
    #[error("decompression failed: {0}")]
    Decompress(std::io::Error),

    /// A single record did not fit in the chunk or the stream's output
    /// buffer.
    #[error("read failed, sequence is larger than input buffer")]
    RecordTooLarge,
}

/// Errors raised while classifying an input file.
#[derive(Debug, Error)]
pub enum DetectError {
    /// None of the known framings matched the first lines of the file.
    #[error(
        "unable to read sequence from file; supported file types are \
         FASTA, FASTQ, and one sequence per line"
    )]
    UnknownFormat,

    #[error(transparent)]
    Stream(#[from] StreamError),
}

/// Errors raised by [`KmerTable`](crate::table::KmerTable) lookups.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TableError {
    /// Hash value does not address a slot of this table.
    #[error("hash {hash} is outside table capacity {capacity}")]
    HashOutOfRange { hash: u32, capacity: u32 },

    /// The k-mer string contains a byte outside the nucleotide alphabet.
    #[error("k-mer string contains non-nucleotide byte 0x{base:02x}")]
    InvalidBase { base: u8 },

    /// The k-mer string length does not match the table's k.
    #[error("k-mer string length {got} does not match table k {expected}")]
    WrongLength { expected: u32, got: u32 },
}

/// Errors raised while validating an [`Options`](crate::options::Options)
/// record.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum OptionsError {
    /// k must be between 1 and 16.
    #[error("kmer={0} must be between 1 and 16")]
    KmerOutOfRange(u32),

    /// Knockout iterations must be at least 1 and at most 4^k.
    #[error("iters={iters} must be between 1 and 4^{kmer}")]
    ItersOutOfRange { iters: u64, kmer: u32 },

    /// Worker count must be at least 1.
    #[error("threads={0} must be greater than 0")]
    ThreadsOutOfRange(u32),

    /// Bootstrap subsample is expressed in milli-percent, 1..=100000.
    #[error("bootstrap_sample={0} must be in range of 1-100000")]
    SampleOutOfRange(u32),

    /// The requested algorithm combination is not implemented.
    #[error("{context}: {algo} is not supported")]
    UnsupportedAlgo {
        context: &'static str,
        algo: &'static str,
    },

    /// Control-based enrichment requires a control file.
    #[error("if no probabilistic algorithm is set, a control file is required")]
    MissingControl,
}

/// Top-level error type covering every pipeline in the crate.
#[derive(Debug, Error)]
pub enum KenrichError {
    #[error(transparent)]
    Stream(#[from] StreamError),

    #[error(transparent)]
    Detect(#[from] DetectError),

    #[error(transparent)]
    Table(#[from] TableError),

    #[error(transparent)]
    Options(#[from] OptionsError),

    /// Enrichment requires both tables to use the same k.
    #[error("test table (k={test}) and control table (k={control}) differ in k")]
    KmerMismatch { test: u32, control: u32 },

    /// Probabilistic enrichment needs mononucleotide and dinucleotide
    /// background tables.
    #[error("probabilistic enrichment requires background tables with k=1 and k=2")]
    BadBackgroundTables,

    /// Output could not be written.
    #[error("unable to write output: {0}")]
    Write(#[from] std::io::Error),

    /// Output could not be serialized.
    #[error("unable to serialize JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Convenience alias used throughout the crate.
pub type Result<T, E = KenrichError> = std::result::Result<T, E>;
