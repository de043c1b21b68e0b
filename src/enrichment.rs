//! Enrichment computation and iterative k-mer knockout (IKKE).
//!
//! Plain enrichment compares a test table against a control table counted
//! over a second corpus; probabilistic enrichment predicts each k-mer's
//! frequency from overlapping mono- and dinucleotide frequencies of the same
//! corpus; shuffle enrichment counts a k-let-preserving shuffle of the
//! corpus as its control. IKKE repeatedly takes the top-enriched k-mer,
//! masks every occurrence, and recounts, extracting one distinct motif per
//! iteration.

use std::cmp::Ordering;
use std::path::Path;

use rayon::prelude::*;

use crate::counter::{
    count_kmers, count_kmers_mt, count_kmers_shuffled, recount_kmer, recount_kmer_mt,
    recount_kmer_shuffled,
};
use crate::error::{KenrichError, Result};
use crate::nucleotide::num_kmers;
use crate::table::KmerTable;

/// One k-mer's enrichment value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EnrichedKmer {
    /// K-mer hash.
    pub hash: u32,
    /// Enrichment r-value (`NaN` where undefined).
    pub rval: f64,
}

/// The most enriched k-mer of one scan.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TopKmer {
    /// K-mer hash; 0 in the empty sentinel.
    pub hash: u32,
    /// Enrichment score; `-inf` in the empty sentinel (zero totals or no
    /// scorable slot).
    pub score: f64,
}

impl TopKmer {
    const EMPTY: Self = Self {
        hash: 0,
        score: f64::NEG_INFINITY,
    };

    /// `true` when the scan found nothing to score.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.score == f64::NEG_INFINITY
    }
}

/// Descending by value with `NaN` sinking to the end; equal values compare
/// equal so a stable sort preserves hash order.
pub(crate) fn cmp_desc_nan_last(a: f64, b: f64) -> Ordering {
    match (a.is_nan(), b.is_nan()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (false, false) => b.partial_cmp(&a).unwrap_or(Ordering::Equal),
    }
}

fn sorted_rows(values: Vec<f64>) -> Vec<EnrichedKmer> {
    let mut rows: Vec<EnrichedKmer> = values
        .into_iter()
        .enumerate()
        .map(|(hash, rval)| EnrichedKmer {
            hash: hash as u32,
            rval,
        })
        .collect();
    rows.par_sort_by(|a, b| cmp_desc_nan_last(a.rval, b.rval));
    rows
}

/// Per-hash enrichment values of test against control, unsorted.
pub(crate) fn enrichment_values(
    test: &KmerTable,
    control: &KmerTable,
    normalize: bool,
) -> Result<Vec<f64>> {
    if test.k() != control.k() {
        return Err(KenrichError::KmerMismatch {
            test: test.k(),
            control: control.k(),
        });
    }
    // A table compared against itself enriches to exactly 1 wherever it has
    // counts; short-circuiting also keeps the nested lock below sound.
    if std::ptr::eq(test, control) {
        let values = test.with_counts(|t| {
            (0..=test.capacity())
                .into_par_iter()
                .map(|hash| {
                    if t.get(hash) == 0 {
                        f64::NAN
                    } else if normalize {
                        0.0
                    } else {
                        1.0
                    }
                })
                .collect()
        });
        return Ok(values);
    }
    let values = test.with_counts(|t| {
        control.with_counts(|c| {
            let t_total = t.total() as f64;
            let c_total = c.total() as f64;
            (0..=test.capacity())
                .into_par_iter()
                .map(|hash| {
                    let t_count = t.get_f64(hash);
                    let c_count = c.get_f64(hash);
                    if t_count == 0.0 || c_count == 0.0 {
                        return f64::NAN;
                    }
                    let rval = (t_count / t_total) / (c_count / c_total);
                    if normalize {
                        rval.log2()
                    } else {
                        rval
                    }
                })
                .collect()
        })
    });
    Ok(values)
}

/// Computes the enrichment of every k-mer in `test` against `control`.
///
/// `r(h) = (T[h]/ΣT) / (C[h]/ΣC)` where both counts are positive, `NaN`
/// otherwise; `log2` when `normalize` is set. Rows come back sorted by
/// descending r-value with `NaN` rows trailing (ties keep hash order).
///
/// # Errors
///
/// Returns [`KenrichError::KmerMismatch`] when the tables disagree on k.
pub fn enrichments(
    test: &KmerTable,
    control: &KmerTable,
    normalize: bool,
) -> Result<Vec<EnrichedKmer>> {
    enrichment_values(test, control, normalize).map(sorted_rows)
}

/// Relative base frequencies of a k=1 table.
pub(crate) fn base_frequencies(mono: &KmerTable) -> [f64; 4] {
    mono.with_counts(|view| {
        let total = view.total() as f64;
        std::array::from_fn(|i| view.get_f64(i as u32) / total)
    })
}

/// Relative pair frequencies of a k=2 table.
pub(crate) fn pair_frequencies(di: &KmerTable) -> [f64; 16] {
    di.with_counts(|view| {
        let total = view.total() as f64;
        std::array::from_fn(|i| view.get_f64(i as u32) / total)
    })
}

/// Predicted frequency of a k-mer from overlapping mono- and dinucleotide
/// frequencies: the product of its dinucleotide frequencies divided by the
/// product of its interior base frequencies.
pub(crate) fn predict_freq(hash: u32, k: u32, mono: &[f64; 4], di: &[f64; 16]) -> f64 {
    let base = |i: u32| (hash >> (2 * (k - 1 - i))) & 3;

    let mut di_prob = 1.0;
    for i in 0..k.saturating_sub(1) {
        di_prob *= di[(base(i) * 4 + base(i + 1)) as usize];
    }
    let mut mono_prob = 1.0;
    for i in 1..k.saturating_sub(1) {
        mono_prob *= mono[base(i) as usize];
    }
    di_prob / mono_prob
}

fn check_background(mono: &KmerTable, di: &KmerTable) -> Result<()> {
    if mono.k() != 1 || di.k() != 2 {
        return Err(KenrichError::BadBackgroundTables);
    }
    Ok(())
}

/// Per-hash probabilistic enrichment values, unsorted.
pub(crate) fn prob_values(
    test: &KmerTable,
    mono: &KmerTable,
    di: &KmerTable,
    normalize: bool,
) -> Result<Vec<f64>> {
    check_background(mono, di)?;
    let mono_freqs = base_frequencies(mono);
    let di_freqs = pair_frequencies(di);
    let k = test.k();
    let values = test.with_counts(|t| {
        let total = t.total() as f64;
        (0..=test.capacity())
            .into_par_iter()
            .map(|hash| {
                let test_frq = t.get_f64(hash) / total;
                let pred_frq = predict_freq(hash, k, &mono_freqs, &di_freqs);
                if test_frq == 0.0 || pred_frq == 0.0 {
                    return f64::NAN;
                }
                let rval = test_frq / pred_frq;
                if normalize {
                    rval.log2()
                } else {
                    rval
                }
            })
            .collect()
    });
    Ok(values)
}

/// Computes the enrichment of every k-mer in `test` against the
/// probabilistic background predicted from its own mono- and dinucleotide
/// tables. Rows come back sorted like [`enrichments`].
///
/// # Errors
///
/// Returns [`KenrichError::BadBackgroundTables`] unless `mono` has k=1 and
/// `di` has k=2.
pub fn prob_enrichments(
    test: &KmerTable,
    mono: &KmerTable,
    di: &KmerTable,
    normalize: bool,
) -> Result<Vec<EnrichedKmer>> {
    prob_values(test, mono, di, normalize).map(sorted_rows)
}

/// Combined shuffle + probabilistic enrichment: the probabilistic
/// enrichment of the dataset divided, per k-mer, by the probabilistic
/// enrichment of its shuffled counterpart.
///
/// # Errors
///
/// Fails on unreadable input or k outside 1..=16.
pub fn both_enrichments<P: AsRef<Path>>(
    path: P,
    k: u32,
    klet: u32,
    normalize: bool,
) -> Result<Vec<EnrichedKmer>> {
    let path = path.as_ref();
    let shuf_test = count_kmers_shuffled(path, k, klet)?;
    let shuf_mono = count_kmers_shuffled(path, 1, klet)?;
    let shuf_di = count_kmers_shuffled(path, 2, klet)?;
    let shuf = prob_values(&shuf_test, &shuf_mono, &shuf_di, false)?;

    let test = count_kmers(path, k)?;
    let mono = count_kmers(path, 1)?;
    let di = count_kmers(path, 2)?;
    let prob = prob_values(&test, &mono, &di, false)?;

    let values = prob
        .into_iter()
        .zip(shuf)
        .map(|(p, s)| {
            let rval = p / s;
            if normalize {
                rval.log2()
            } else {
                rval
            }
        })
        .collect();
    Ok(sorted_rows(values))
}

/// Scans for the most enriched k-mer of `test` against `control`, ignoring
/// slots where either count is zero. Ties resolve to the smallest hash;
/// zero totals produce the empty sentinel.
///
/// # Errors
///
/// Returns [`KenrichError::KmerMismatch`] when the tables disagree on k.
pub fn top_enrichment(
    test: &KmerTable,
    control: &KmerTable,
    normalize: bool,
) -> Result<TopKmer> {
    if test.k() != control.k() {
        return Err(KenrichError::KmerMismatch {
            test: test.k(),
            control: control.k(),
        });
    }
    if test.total() == 0 || control.total() == 0 {
        return Ok(TopKmer::EMPTY);
    }
    if std::ptr::eq(test, control) {
        // Every occupied slot ties at 1; the smallest occupied hash wins.
        let top = test.with_counts(|t| {
            (0..=test.capacity())
                .find(|&hash| t.get(hash) > 0)
                .map_or(TopKmer::EMPTY, |hash| TopKmer {
                    hash,
                    score: if normalize { 0.0 } else { 1.0 },
                })
        });
        return Ok(top);
    }

    let top = test.with_counts(|t| {
        control.with_counts(|c| {
            let t_total = t.total() as f64;
            let c_total = c.total() as f64;
            let mut top = TopKmer::EMPTY;
            for hash in 0..=test.capacity() {
                let t_count = t.get_f64(hash);
                let c_count = c.get_f64(hash);
                if t_count == 0.0 || c_count == 0.0 {
                    continue;
                }
                let mut score = (t_count / t_total) / (c_count / c_total);
                if normalize {
                    score = score.log2();
                }
                if score > top.score {
                    top = TopKmer { hash, score };
                }
            }
            top
        })
    });
    Ok(top)
}

/// Scans for the k-mer most enriched over its predicted frequency, skipping
/// slots whose prediction is zero.
///
/// # Errors
///
/// Returns [`KenrichError::BadBackgroundTables`] unless `mono` has k=1 and
/// `di` has k=2.
pub fn top_prediction(
    test: &KmerTable,
    mono: &KmerTable,
    di: &KmerTable,
    normalize: bool,
) -> Result<TopKmer> {
    check_background(mono, di)?;
    let mono_freqs = base_frequencies(mono);
    let di_freqs = pair_frequencies(di);
    let k = test.k();

    let top = test.with_counts(|t| {
        let total = t.total() as f64;
        let mut top = TopKmer::EMPTY;
        for hash in 0..=test.capacity() {
            let kmer_frq = t.get_f64(hash) / total;
            let pred_frq = predict_freq(hash, k, &mono_freqs, &di_freqs);
            if pred_frq == 0.0 {
                continue;
            }
            let mut score = kmer_frq / pred_frq;
            if normalize {
                score = score.log2();
            }
            if score > top.score {
                top = TopKmer { hash, score };
            }
        }
        top
    });
    Ok(top)
}

fn clamp_iters(iters: u64, k: u32) -> u64 {
    iters.min(num_kmers(k))
}

/// Iterative k-mer knockout enrichment against a control corpus.
///
/// Counts both corpora once, then per iteration takes the top-enriched
/// k-mer, masks it in both corpora, and recounts with cumulative masks.
/// Produces `min(iters, 4^k)` rows in knockout order.
///
/// # Errors
///
/// Fails on unreadable input or k outside 1..=16.
pub fn ikke<P: AsRef<Path>>(
    test_path: P,
    ctrl_path: P,
    k: u32,
    iters: u64,
    normalize: bool,
    threads: u32,
) -> Result<Vec<EnrichedKmer>> {
    let test_path = test_path.as_ref();
    let ctrl_path = ctrl_path.as_ref();
    let mut test = count_kmers_mt(test_path, k, threads)?;
    let mut control = count_kmers_mt(ctrl_path, k, threads)?;

    let iters = clamp_iters(iters, k);
    let mut rows = Vec::with_capacity(iters as usize);
    let top = top_enrichment(&test, &control, normalize)?;
    rows.push(EnrichedKmer {
        hash: top.hash,
        rval: top.score,
    });

    for _ in 1..iters {
        let masked = test.unhash(rows[rows.len() - 1].hash, true);
        recount_kmer_mt(&mut test, test_path, &masked, threads)?;
        recount_kmer_mt(&mut control, ctrl_path, &masked, threads)?;
        let top = top_enrichment(&test, &control, normalize)?;
        rows.push(EnrichedKmer {
            hash: top.hash,
            rval: top.score,
        });
    }
    Ok(rows)
}

/// Iterative knockout against the probabilistic background of the corpus
/// itself: the mono- and dinucleotide tables are recounted (and re-masked)
/// alongside the test table each iteration.
///
/// # Errors
///
/// Fails on unreadable input or k outside 1..=16.
pub fn prob_ikke<P: AsRef<Path>>(
    test_path: P,
    k: u32,
    iters: u64,
    normalize: bool,
    threads: u32,
) -> Result<Vec<EnrichedKmer>> {
    let test_path = test_path.as_ref();
    let mut test = count_kmers_mt(test_path, k, threads)?;
    let mut mono = count_kmers_mt(test_path, 1, threads)?;
    let mut di = count_kmers_mt(test_path, 2, threads)?;

    let iters = clamp_iters(iters, k);
    let mut rows = Vec::with_capacity(iters as usize);
    let top = top_prediction(&test, &mono, &di, normalize)?;
    rows.push(EnrichedKmer {
        hash: top.hash,
        rval: top.score,
    });

    for _ in 1..iters {
        let masked = test.unhash(rows[rows.len() - 1].hash, true);
        recount_kmer_mt(&mut test, test_path, &masked, threads)?;
        recount_kmer_mt(&mut mono, test_path, &masked, threads)?;
        recount_kmer_mt(&mut di, test_path, &masked, threads)?;
        let top = top_prediction(&test, &mono, &di, normalize)?;
        rows.push(EnrichedKmer {
            hash: top.hash,
            rval: top.score,
        });
    }
    Ok(rows)
}

/// Iterative knockout against the shuffled corpus: the control table counts
/// the k-let-preserving shuffle of the test corpus and is recounted with the
/// same cumulative masks.
///
/// # Errors
///
/// Fails on unreadable input or k outside 1..=16.
pub fn shuffle_ikke<P: AsRef<Path>>(
    test_path: P,
    k: u32,
    klet: u32,
    iters: u64,
    normalize: bool,
) -> Result<Vec<EnrichedKmer>> {
    let test_path = test_path.as_ref();
    let mut test = count_kmers(test_path, k)?;
    let mut control = count_kmers_shuffled(test_path, k, klet)?;

    let iters = clamp_iters(iters, k);
    let mut rows = Vec::with_capacity(iters as usize);
    let top = top_enrichment(&test, &control, normalize)?;
    rows.push(EnrichedKmer {
        hash: top.hash,
        rval: top.score,
    });

    for _ in 1..iters {
        let masked = test.unhash(rows[rows.len() - 1].hash, true);
        recount_kmer(&mut test, test_path, &masked)?;
        recount_kmer_shuffled(&mut control, test_path, klet, &masked)?;
        let top = top_enrichment(&test, &control, normalize)?;
        rows.push(EnrichedKmer {
            hash: top.hash,
            rval: top.score,
        });
    }
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nucleotide::hash_kmer;

    fn table_with(k: u32, counts: &[(&str, u64)]) -> KmerTable {
        let mut table = KmerTable::new(k).unwrap();
        for &(kmer, count) in counts {
            let hash = hash_kmer(kmer.as_bytes()).unwrap();
            for _ in 0..count {
                table.increment(hash);
            }
        }
        table
    }

    #[test]
    fn identical_tables_enrich_to_one() {
        let test = table_with(2, &[("AC", 5), ("GT", 5), ("TT", 2)]);
        let control = table_with(2, &[("AC", 5), ("GT", 5), ("TT", 2)]);
        let rows = enrichments(&test, &control, false).unwrap();
        for row in &rows {
            if !row.rval.is_nan() {
                assert!((row.rval - 1.0).abs() < 1e-12);
            }
        }
        let log_rows = enrichments(&test, &control, true).unwrap();
        for row in &log_rows {
            if !row.rval.is_nan() {
                assert!(row.rval.abs() < 1e-12);
            }
        }
    }

    #[test]
    fn zero_count_on_either_side_is_nan() {
        let test = table_with(2, &[("AC", 10)]);
        let control = table_with(2, &[("GT", 10)]);
        let rows = enrichments(&test, &control, false).unwrap();
        assert!(rows.iter().all(|r| r.rval.is_nan()));
    }

    #[test]
    fn swapping_tables_negates_log2_enrichment() {
        let test = table_with(2, &[("AC", 8), ("GT", 2), ("TT", 5)]);
        let control = table_with(2, &[("AC", 2), ("GT", 8), ("TT", 5)]);
        let forward = enrichment_values(&test, &control, true).unwrap();
        let backward = enrichment_values(&control, &test, true).unwrap();
        for (f, b) in forward.iter().zip(&backward) {
            if f.is_nan() {
                assert!(b.is_nan());
            } else {
                assert!((f + b).abs() < 1e-12);
            }
        }
    }

    #[test]
    fn rows_sort_descending_with_nan_trailing() {
        let test = table_with(2, &[("AC", 8), ("GT", 1), ("TT", 4)]);
        let control = table_with(2, &[("AC", 1), ("GT", 8), ("TT", 4)]);
        let rows = enrichments(&test, &control, false).unwrap();
        let mut seen_nan = false;
        for pair in rows.windows(2) {
            if pair[1].rval.is_nan() {
                seen_nan = true;
            } else {
                assert!(!seen_nan, "finite value after NaN");
                assert!(pair[0].rval >= pair[1].rval);
            }
        }
        assert_eq!(rows[0].hash, hash_kmer(b"AC").unwrap());
    }

    #[test]
    fn mismatched_k_is_an_error() {
        let test = table_with(2, &[("AC", 1)]);
        let control = table_with(3, &[("ACG", 1)]);
        assert!(matches!(
            enrichments(&test, &control, false),
            Err(KenrichError::KmerMismatch { test: 2, control: 3 })
        ));
    }

    #[test]
    fn top_enrichment_finds_maximum() {
        let test = table_with(2, &[("AC", 9), ("GT", 1), ("TT", 5)]);
        let control = table_with(2, &[("AC", 1), ("GT", 9), ("TT", 5)]);
        let top = top_enrichment(&test, &control, false).unwrap();
        assert_eq!(top.hash, hash_kmer(b"AC").unwrap());
        assert!(top.score > 1.0);
    }

    #[test]
    fn top_enrichment_ties_resolve_to_smallest_hash() {
        let test = table_with(2, &[("AA", 3), ("TT", 3)]);
        let control = table_with(2, &[("AA", 3), ("TT", 3)]);
        let top = top_enrichment(&test, &control, false).unwrap();
        assert_eq!(top.hash, hash_kmer(b"AA").unwrap());
    }

    #[test]
    fn top_enrichment_scans_the_last_slot() {
        let test = table_with(2, &[("TT", 9), ("AA", 1)]);
        let control = table_with(2, &[("TT", 1), ("AA", 9)]);
        let top = top_enrichment(&test, &control, false).unwrap();
        assert_eq!(top.hash, hash_kmer(b"TT").unwrap());
    }

    #[test]
    fn top_enrichment_zero_totals_is_empty_sentinel() {
        let test = table_with(2, &[]);
        let control = table_with(2, &[("AC", 5)]);
        let top = top_enrichment(&test, &control, false).unwrap();
        assert!(top.is_empty());
        assert_eq!(top.score, f64::NEG_INFINITY);
    }

    #[test]
    fn predict_freq_uniform_background() {
        let mono = [0.25; 4];
        let di = [1.0 / 16.0; 16];
        // k=3: di^2 / mono = (1/256) / (1/4) = 1/64
        let pred = predict_freq(0, 3, &mono, &di);
        assert!((pred - 1.0 / 64.0).abs() < 1e-12);
        // k=1: empty products
        assert!((predict_freq(2, 1, &mono, &di) - 1.0).abs() < 1e-12);
        // k=2: single dinucleotide frequency
        assert!((predict_freq(5, 2, &mono, &di) - 1.0 / 16.0).abs() < 1e-12);
    }

    #[test]
    fn prob_enrichment_uniform_corpus_is_flat() {
        let mut test = KmerTable::new(3).unwrap();
        for hash in 0..=test.capacity() {
            test.increment(hash);
        }
        let mut mono = KmerTable::new(1).unwrap();
        for hash in 0..=mono.capacity() {
            for _ in 0..4 {
                mono.increment(hash);
            }
        }
        let mut di = KmerTable::new(2).unwrap();
        for hash in 0..=di.capacity() {
            di.increment(hash);
        }
        let rows = prob_enrichments(&test, &mono, &di, false).unwrap();
        for row in rows {
            assert!((row.rval - 1.0).abs() < 1e-9);
        }
    }

    #[test]
    fn prob_enrichment_requires_background_shapes() {
        let test = table_with(3, &[("ACG", 1)]);
        let mono = table_with(2, &[("AC", 1)]);
        let di = table_with(2, &[("AC", 1)]);
        assert!(matches!(
            prob_enrichments(&test, &mono, &di, false),
            Err(KenrichError::BadBackgroundTables)
        ));
    }

    #[test]
    fn table_against_itself_is_flat_ones() {
        let table = table_with(2, &[("AC", 3), ("GT", 1)]);
        let rows = enrichments(&table, &table, false).unwrap();
        for row in &rows {
            if !row.rval.is_nan() {
                assert!((row.rval - 1.0).abs() < 1e-12);
            }
        }
        let top = top_enrichment(&table, &table, false).unwrap();
        assert_eq!(top.hash, hash_kmer(b"AC").unwrap());
        assert!((top.score - 1.0).abs() < 1e-12);
    }

    #[test]
    fn cmp_sorts_nan_after_finite() {
        let mut values = vec![f64::NAN, 2.0, 1.0, f64::NAN, 3.0];
        values.sort_by(|a, b| cmp_desc_nan_last(*a, *b));
        assert_eq!(&values[..3], &[3.0, 2.0, 1.0]);
        assert!(values[3].is_nan() && values[4].is_nan());
    }
}
