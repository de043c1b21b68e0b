//! Analysis options and validation.

use std::time::{SystemTime, UNIX_EPOCH};

use crate::error::OptionsError;
use crate::nucleotide::num_kmers;

/// Background model used in place of (or alongside) a control corpus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProbAlgo {
    /// No background model; a control corpus is required where one applies.
    #[default]
    None,
    /// Control counts come from a k-let-preserving shuffle of the corpus.
    Ushuffle,
    /// Predicted frequencies from overlapping mono-/dinucleotide counts.
    Regular,
    /// Probabilistic enrichment measured against the shuffled corpus's
    /// probabilistic enrichment.
    Both,
}

impl ProbAlgo {
    /// Numeric codes accepted by the scripting surface:
    /// `0 => None, 1 => Ushuffle, 2 => Regular, 3 => Both`.
    #[must_use]
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Self::None),
            1 => Some(Self::Ushuffle),
            2 => Some(Self::Regular),
            3 => Some(Self::Both),
            _ => None,
        }
    }

    /// Short display name, used in diagnostics.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Ushuffle => "ushuffle",
            Self::Regular => "regular",
            Self::Both => "both",
        }
    }
}

/// Options record accepted by the [`api`](crate::api) entry points.
#[derive(Debug, Clone)]
pub struct Options {
    /// K-mer length, 1..=16.
    pub kmer: u32,
    /// Knockout iterations for IKKE, 1..=4^k.
    pub iters: u64,
    /// Worker count for counting passes (clamped to 128 internally).
    pub threads: u32,
    /// Report enrichments as log2.
    pub normalize: bool,
    /// Order output rows by descending score, NaN trailing.
    pub sort: bool,
    /// Bootstrap iterations; 0 disables bootstrapping.
    pub bootstrap_iters: u32,
    /// Subsample kept per bootstrap iteration, in milli-percent
    /// (1..=100000; 25000 means 25%).
    pub bootstrap_sample: u32,
    /// Background model.
    pub prob_algo: ProbAlgo,
    /// k-let length preserved by shuffling; `None` defaults to
    /// `round(sqrt(k))`.
    pub prob_ntprec: Option<u32>,
    /// RNG seed for subsampling; negative means time-based.
    pub seed: i64,
    /// Render k-mer strings with `T` (DNA) rather than `U` (RNA).
    pub use_t: bool,
    /// Emit non-fatal diagnostics about ignored or conflicting fields.
    pub warnings: bool,
}

impl Options {
    /// Options for k-mers of length `k` with every other field defaulted:
    /// one iteration, one thread, no normalization, sorted output, no
    /// bootstrap (25% subsample when enabled), no background model,
    /// time-based seed, DNA rendering, warnings on.
    #[must_use]
    pub fn new(kmer: u32) -> Self {
        Self {
            kmer,
            iters: 1,
            threads: 1,
            normalize: false,
            sort: true,
            bootstrap_iters: 0,
            bootstrap_sample: 25_000,
            prob_algo: ProbAlgo::None,
            prob_ntprec: None,
            seed: -1,
            use_t: true,
            warnings: true,
        }
    }

    /// Validates every field and fills in the derived defaults.
    ///
    /// # Errors
    ///
    /// Returns the first [`OptionsError`] encountered, in field order.
    pub fn validated(&self) -> Result<Resolved, OptionsError> {
        if self.kmer == 0 || self.kmer > 16 {
            return Err(OptionsError::KmerOutOfRange(self.kmer));
        }
        if self.iters == 0 || self.iters > num_kmers(self.kmer) {
            return Err(OptionsError::ItersOutOfRange {
                iters: self.iters,
                kmer: self.kmer,
            });
        }
        if self.threads == 0 {
            return Err(OptionsError::ThreadsOutOfRange(self.threads));
        }
        if self.bootstrap_sample == 0 || self.bootstrap_sample > 100_000 {
            return Err(OptionsError::SampleOutOfRange(self.bootstrap_sample));
        }

        let ntprec = match self.prob_ntprec {
            Some(n) => n.max(1),
            None => (f64::from(self.kmer)).sqrt().round() as u32,
        };
        let seed = if self.seed < 0 {
            SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_secs())
                .unwrap_or(1)
        } else {
            self.seed as u64
        };

        Ok(Resolved {
            kmer: self.kmer,
            iters: self.iters,
            threads: self.threads,
            normalize: self.normalize,
            sort: self.sort,
            bootstrap_iters: self.bootstrap_iters,
            bootstrap_sample: self.bootstrap_sample,
            prob_algo: self.prob_algo,
            ntprec,
            seed,
            use_t: self.use_t,
            warnings: self.warnings,
        })
    }
}

/// A validated options record with derived defaults resolved.
#[derive(Debug, Clone, Copy)]
pub struct Resolved {
    pub kmer: u32,
    pub iters: u64,
    pub threads: u32,
    pub normalize: bool,
    pub sort: bool,
    pub bootstrap_iters: u32,
    pub bootstrap_sample: u32,
    pub prob_algo: ProbAlgo,
    /// k-let length preserved by shuffling.
    pub ntprec: u32,
    /// Concrete RNG seed.
    pub seed: u64,
    pub use_t: bool,
    pub warnings: bool,
}
