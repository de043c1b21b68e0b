//! Bootstrap aggregation: repeated subsampled passes with per-k-mer running
//! statistics.
//!
//! Each iteration counts one or more independent subsamples and folds the
//! results into two per-k-mer aggregates: a [`Welford`] over the iteration
//! statistic (the enrichment ratio, or the count itself for plain
//! counting), and a Welch [`TTest2`] over the `(test, control)` sample
//! pairs. A zero count is a missing sample: it contributes to neither side
//! of the t-test and skips the ratio update.
//!
//! Sub-seeds are drawn from one master RNG seeded with the caller's seed,
//! one per subsampled stream per iteration, so test and control subsamples
//! are independent while the whole run stays reproducible: the same base
//! seed produces bit-identical output.

use std::path::Path;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::debug;

use crate::counter::{count_kmers_bootstrap_mt, count_kmers_shuffled_bootstrap};
use crate::data::KmerRow;
use crate::enrichment::prob_values;
use crate::error::Result;
use crate::nucleotide::num_kmers;
use crate::options::Resolved;
use crate::stats::{TTest2, Welford};
use crate::table::KmerTable;

/// Per-k-mer aggregates for one bootstrap run.
struct Aggregates {
    welford: Vec<Welford>,
    ttest: Vec<TTest2>,
}

impl Aggregates {
    fn new(k: u32) -> Self {
        let len = num_kmers(k) as usize;
        Self {
            welford: vec![Welford::new(); len],
            ttest: vec![TTest2::new(); len],
        }
    }

    /// Folds one iteration's `(test, control)` counts for one k-mer.
    /// Zero counts become missing samples.
    fn update_counts(&mut self, hash: u32, test: f64, control: f64, t_total: f64, c_total: f64) {
        let t_sample = if test == 0.0 { f64::NAN } else { test };
        let c_sample = if control == 0.0 { f64::NAN } else { control };
        self.ttest[hash as usize].update(t_sample, c_sample);
        if test > 0.0 && control > 0.0 {
            self.welford[hash as usize].update((test / t_total) / (control / c_total));
        }
    }

    /// Folds one iteration's pre-computed statistic pair (already on the
    /// enrichment scale) for one k-mer.
    fn update_rvals(&mut self, hash: u32, test_rval: f64, ctrl_rval: f64) {
        self.ttest[hash as usize].update(test_rval, ctrl_rval);
        let ratio = test_rval / ctrl_rval;
        if ratio.is_finite() {
            self.welford[hash as usize].update(ratio);
        }
    }

    /// Emits one row per k-mer: mean (optionally log2), standard deviation,
    /// and the t-test p-value when requested.
    fn finalize(self, normalize: bool, with_pval: bool) -> Vec<KmerRow> {
        self.welford
            .into_iter()
            .zip(self.ttest)
            .enumerate()
            .map(|(hash, (welford, ttest))| {
                let mean = welford.mean();
                let score = if normalize { mean.log2() } else { mean };
                KmerRow {
                    kmer: hash as u32,
                    score,
                    count: None,
                    stdev: Some(welford.stdev()),
                    pval: with_pval.then(|| ttest.finalize().pval),
                }
            })
            .collect()
    }
}

fn subseed(master: &mut StdRng) -> u64 {
    master.gen()
}

/// Bootstrap of plain counts: per-k-mer mean and standard deviation of the
/// subsampled count. No p-value is produced for counting.
///
/// # Errors
///
/// Fails when any counting pass does.
pub fn bootstrap_count(path: &Path, opts: &Resolved) -> Result<Vec<KmerRow>> {
    let mut master = StdRng::seed_from_u64(opts.seed);
    let mut welford = vec![Welford::new(); num_kmers(opts.kmer) as usize];

    for iteration in 0..opts.bootstrap_iters {
        debug!(iteration, "bootstrap counting iteration");
        let table = count_kmers_bootstrap_mt(
            path,
            opts.kmer,
            opts.bootstrap_sample,
            subseed(&mut master),
            opts.threads,
        )?;
        fold_counts(&table, &mut welford);
    }

    Ok(count_rows(welford))
}

/// Bootstrap of shuffled counts: like [`bootstrap_count`] over the
/// k-let-preserving shuffle of each subsample.
///
/// # Errors
///
/// Fails when any counting pass does.
pub fn bootstrap_count_shuffled(path: &Path, opts: &Resolved) -> Result<Vec<KmerRow>> {
    let mut master = StdRng::seed_from_u64(opts.seed);
    let mut welford = vec![Welford::new(); num_kmers(opts.kmer) as usize];

    for iteration in 0..opts.bootstrap_iters {
        debug!(iteration, "bootstrap shuffled counting iteration");
        let table = count_kmers_shuffled_bootstrap(
            path,
            opts.kmer,
            opts.ntprec,
            opts.bootstrap_sample,
            subseed(&mut master),
        )?;
        fold_counts(&table, &mut welford);
    }

    Ok(count_rows(welford))
}

fn fold_counts(table: &KmerTable, welford: &mut [Welford]) {
    table.with_counts(|view| {
        for (hash, agg) in welford.iter_mut().enumerate() {
            agg.update(view.get_f64(hash as u32));
        }
    });
}

fn count_rows(welford: Vec<Welford>) -> Vec<KmerRow> {
    welford
        .into_iter()
        .enumerate()
        .map(|(hash, agg)| KmerRow {
            kmer: hash as u32,
            score: agg.mean(),
            count: None,
            stdev: Some(agg.stdev()),
            pval: None,
        })
        .collect()
}

/// Bootstrap of control-based enrichment: test and control receive
/// independent sub-seeds each iteration.
///
/// # Errors
///
/// Fails when any counting pass does.
pub fn bootstrap_enrichment(test: &Path, ctrl: &Path, opts: &Resolved) -> Result<Vec<KmerRow>> {
    let mut master = StdRng::seed_from_u64(opts.seed);
    let mut aggregates = Aggregates::new(opts.kmer);

    for iteration in 0..opts.bootstrap_iters {
        debug!(iteration, "bootstrap enrichment iteration");
        let test_seed = subseed(&mut master);
        let ctrl_seed = subseed(&mut master);
        let test_counts = count_kmers_bootstrap_mt(
            test,
            opts.kmer,
            opts.bootstrap_sample,
            test_seed,
            opts.threads,
        )?;
        let ctrl_counts = count_kmers_bootstrap_mt(
            ctrl,
            opts.kmer,
            opts.bootstrap_sample,
            ctrl_seed,
            opts.threads,
        )?;

        let t_total = test_counts.total() as f64;
        let c_total = ctrl_counts.total() as f64;
        test_counts.with_counts(|t| {
            ctrl_counts.with_counts(|c| {
                for hash in 0..num_kmers(opts.kmer) as u32 {
                    aggregates.update_counts(hash, t.get_f64(hash), c.get_f64(hash), t_total, c_total);
                }
            });
        });
    }

    Ok(aggregates.finalize(opts.normalize, true))
}

/// Bootstrap of probabilistic enrichment: test, mono, and di tables are
/// subsampled with three independent sub-seeds; the control sample of the
/// t-test is the predicted count.
///
/// # Errors
///
/// Fails when any counting pass does.
pub fn bootstrap_enrichment_prob(test: &Path, opts: &Resolved) -> Result<Vec<KmerRow>> {
    let mut master = StdRng::seed_from_u64(opts.seed);
    let mut aggregates = Aggregates::new(opts.kmer);

    for iteration in 0..opts.bootstrap_iters {
        debug!(iteration, "bootstrap probabilistic enrichment iteration");
        let test_seed = subseed(&mut master);
        let mono_seed = subseed(&mut master);
        let di_seed = subseed(&mut master);
        let sample = opts.bootstrap_sample;
        let test_counts =
            count_kmers_bootstrap_mt(test, opts.kmer, sample, test_seed, opts.threads)?;
        let mono_counts = count_kmers_bootstrap_mt(test, 1, sample, mono_seed, opts.threads)?;
        let di_counts = count_kmers_bootstrap_mt(test, 2, sample, di_seed, opts.threads)?;

        let mono_freqs = crate::enrichment::base_frequencies(&mono_counts);
        let di_freqs = crate::enrichment::pair_frequencies(&di_counts);
        let total = test_counts.total() as f64;
        test_counts.with_counts(|t| {
            for hash in 0..num_kmers(opts.kmer) as u32 {
                let pred_frq =
                    crate::enrichment::predict_freq(hash, opts.kmer, &mono_freqs, &di_freqs);
                let count = t.get_f64(hash);
                aggregates.update_counts(hash, count, pred_frq * total, total, total);
            }
        });
    }

    Ok(aggregates.finalize(opts.normalize, true))
}

/// Bootstrap of shuffle enrichment: the control is a shuffled subsample
/// drawn with its own sub-seed.
///
/// # Errors
///
/// Fails when any counting pass does.
pub fn bootstrap_enrichment_shuffle(test: &Path, opts: &Resolved) -> Result<Vec<KmerRow>> {
    let mut master = StdRng::seed_from_u64(opts.seed);
    let mut aggregates = Aggregates::new(opts.kmer);

    for iteration in 0..opts.bootstrap_iters {
        debug!(iteration, "bootstrap shuffle enrichment iteration");
        let test_seed = subseed(&mut master);
        let shuf_seed = subseed(&mut master);
        let test_counts = count_kmers_bootstrap_mt(
            test,
            opts.kmer,
            opts.bootstrap_sample,
            test_seed,
            opts.threads,
        )?;
        let shuf_counts = count_kmers_shuffled_bootstrap(
            test,
            opts.kmer,
            opts.ntprec,
            opts.bootstrap_sample,
            shuf_seed,
        )?;

        let t_total = test_counts.total() as f64;
        let c_total = shuf_counts.total() as f64;
        test_counts.with_counts(|t| {
            shuf_counts.with_counts(|c| {
                for hash in 0..num_kmers(opts.kmer) as u32 {
                    aggregates.update_counts(hash, t.get_f64(hash), c.get_f64(hash), t_total, c_total);
                }
            });
        });
    }

    Ok(aggregates.finalize(opts.normalize, true))
}

/// Bootstrap of the combined model: each iteration compares the
/// probabilistic enrichment of a plain subsample against that of a shuffled
/// subsample (six independent sub-seeds per iteration).
///
/// # Errors
///
/// Fails when any counting pass does.
pub fn bootstrap_enrichment_both(test: &Path, opts: &Resolved) -> Result<Vec<KmerRow>> {
    let mut master = StdRng::seed_from_u64(opts.seed);
    let mut aggregates = Aggregates::new(opts.kmer);
    let sample = opts.bootstrap_sample;

    for iteration in 0..opts.bootstrap_iters {
        debug!(iteration, "bootstrap combined enrichment iteration");
        let seeds: [u64; 6] = std::array::from_fn(|_| subseed(&mut master));

        let shuf_test =
            count_kmers_shuffled_bootstrap(test, opts.kmer, opts.ntprec, sample, seeds[0])?;
        let shuf_mono = count_kmers_shuffled_bootstrap(test, 1, opts.ntprec, sample, seeds[1])?;
        let shuf_di = count_kmers_shuffled_bootstrap(test, 2, opts.ntprec, sample, seeds[2])?;
        let shuf_rvals = prob_values(&shuf_test, &shuf_mono, &shuf_di, false)?;

        let test_counts =
            count_kmers_bootstrap_mt(test, opts.kmer, sample, seeds[3], opts.threads)?;
        let mono_counts = count_kmers_bootstrap_mt(test, 1, sample, seeds[4], opts.threads)?;
        let di_counts = count_kmers_bootstrap_mt(test, 2, sample, seeds[5], opts.threads)?;
        let prob_rvals = prob_values(&test_counts, &mono_counts, &di_counts, false)?;

        for (hash, (prob, shuf)) in prob_rvals.iter().zip(&shuf_rvals).enumerate() {
            aggregates.update_rvals(hash as u32, *prob, *shuf);
        }
    }

    Ok(aggregates.finalize(opts.normalize, true))
}
