//! Analysis entry points: `count`, `enrichment`, and `ikke`.
//!
//! Each entry point validates an [`Options`] record, dispatches across the
//! bootstrap × background-model matrix, and emits a [`KmerData`] table. A
//! failure anywhere in a pipeline propagates as the typed error; no partial
//! tables are returned. Non-fatal option conflicts (an ignored control
//! file, for example) are reported through `tracing` warnings when
//! `Options::warnings` is set.

use std::path::Path;

use tracing::warn;

use crate::bootstrap;
use crate::counter::{count_kmers_mt, count_kmers_shuffled};
use crate::data::{KmerData, KmerRow};
use crate::enrichment::{self, cmp_desc_nan_last, EnrichedKmer};
use crate::error::{KenrichError, OptionsError, Result};
use crate::options::{Options, ProbAlgo, Resolved};
use crate::table::KmerTable;

/// Counts every k-mer of the input, optionally bootstrapped or shuffled.
///
/// Produces `4^k` rows. Without bootstrap the score is the count itself;
/// with bootstrap the score is the mean subsampled count and `stdev` is
/// populated. The probabilistic background models (`regular`, `both`) do
/// not apply to counting.
///
/// # Errors
///
/// Fails on invalid options or any counting failure.
pub fn count<P: AsRef<Path>>(path: P, opts: &Options) -> Result<KmerData> {
    let path = path.as_ref();
    let resolved = opts.validated()?;

    let mut rows = if resolved.bootstrap_iters == 0 {
        match resolved.prob_algo {
            ProbAlgo::None => {
                count_rows(&count_kmers_mt(path, resolved.kmer, resolved.threads)?)
            }
            ProbAlgo::Ushuffle => {
                count_rows(&count_kmers_shuffled(path, resolved.kmer, resolved.ntprec)?)
            }
            other => return Err(unsupported("count", other, &resolved)),
        }
    } else {
        match resolved.prob_algo {
            ProbAlgo::None => bootstrap::bootstrap_count(path, &resolved)?,
            ProbAlgo::Ushuffle => bootstrap::bootstrap_count_shuffled(path, &resolved)?,
            other => return Err(unsupported("count", other, &resolved)),
        }
    };

    sort_rows(&mut rows, resolved.sort);
    Ok(KmerData::new(resolved.kmer, resolved.use_t, rows))
}

/// Computes per-k-mer enrichment of the test corpus against a control
/// corpus or a probabilistic background.
///
/// Produces `4^k` rows; with bootstrap, `stdev` and `pval` are populated.
///
/// # Errors
///
/// Fails on invalid options, a missing control when the background model is
/// `none`, or any counting failure.
pub fn enrichment<P: AsRef<Path>>(
    test: P,
    ctrl: Option<P>,
    opts: &Options,
) -> Result<KmerData> {
    let test = test.as_ref();
    let ctrl = ctrl.as_ref().map(|p| p.as_ref());
    let resolved = opts.validated()?;
    check_control("enrichment", ctrl, &resolved)?;

    let mut rows = if resolved.bootstrap_iters == 0 {
        match resolved.prob_algo {
            ProbAlgo::None => {
                let test_counts = count_kmers_mt(test, resolved.kmer, resolved.threads)?;
                let ctrl_counts = count_kmers_mt(
                    ctrl.ok_or(OptionsError::MissingControl)?,
                    resolved.kmer,
                    resolved.threads,
                )?;
                scored_rows(enrichment::enrichments(
                    &test_counts,
                    &ctrl_counts,
                    resolved.normalize,
                )?)
            }
            ProbAlgo::Regular => {
                let test_counts = count_kmers_mt(test, resolved.kmer, resolved.threads)?;
                let mono = count_kmers_mt(test, 1, resolved.threads)?;
                let di = count_kmers_mt(test, 2, resolved.threads)?;
                scored_rows(enrichment::prob_enrichments(
                    &test_counts,
                    &mono,
                    &di,
                    resolved.normalize,
                )?)
            }
            ProbAlgo::Ushuffle => {
                let test_counts = count_kmers_mt(test, resolved.kmer, resolved.threads)?;
                let shuf_counts = count_kmers_shuffled(test, resolved.kmer, resolved.ntprec)?;
                scored_rows(enrichment::enrichments(
                    &test_counts,
                    &shuf_counts,
                    resolved.normalize,
                )?)
            }
            ProbAlgo::Both => scored_rows(enrichment::both_enrichments(
                test,
                resolved.kmer,
                resolved.ntprec,
                resolved.normalize,
            )?),
        }
    } else {
        match resolved.prob_algo {
            ProbAlgo::None => bootstrap::bootstrap_enrichment(
                test,
                ctrl.ok_or(OptionsError::MissingControl)?,
                &resolved,
            )?,
            ProbAlgo::Regular => bootstrap::bootstrap_enrichment_prob(test, &resolved)?,
            ProbAlgo::Ushuffle => bootstrap::bootstrap_enrichment_shuffle(test, &resolved)?,
            ProbAlgo::Both => bootstrap::bootstrap_enrichment_both(test, &resolved)?,
        }
    };

    sort_rows(&mut rows, resolved.sort);
    Ok(KmerData::new(resolved.kmer, resolved.use_t, rows))
}

/// Iterative k-mer knockout enrichment.
///
/// Produces `min(iters, 4^k)` rows, one motif per knockout iteration.
/// Bootstrapped IKKE and the `both` background are not supported.
///
/// # Errors
///
/// Fails on invalid options, a missing control when the background model is
/// `none`, or any counting failure.
pub fn ikke<P: AsRef<Path>>(test: P, ctrl: Option<P>, opts: &Options) -> Result<KmerData> {
    let test = test.as_ref();
    let ctrl = ctrl.as_ref().map(|p| p.as_ref());
    let resolved = opts.validated()?;
    check_control("ikke", ctrl, &resolved)?;

    if resolved.bootstrap_iters > 0 {
        if resolved.warnings {
            warn!("ikke: bootstrapped knockout is not supported");
        }
        return Err(OptionsError::UnsupportedAlgo {
            context: "ikke",
            algo: "bootstrap",
        }
        .into());
    }

    let mut rows = match resolved.prob_algo {
        ProbAlgo::None => scored_rows(enrichment::ikke(
            test,
            ctrl.ok_or(OptionsError::MissingControl)?,
            resolved.kmer,
            resolved.iters,
            resolved.normalize,
            resolved.threads,
        )?),
        ProbAlgo::Regular => scored_rows(enrichment::prob_ikke(
            test,
            resolved.kmer,
            resolved.iters,
            resolved.normalize,
            resolved.threads,
        )?),
        ProbAlgo::Ushuffle => scored_rows(enrichment::shuffle_ikke(
            test,
            resolved.kmer,
            resolved.ntprec,
            resolved.iters,
            resolved.normalize,
        )?),
        other => return Err(unsupported("ikke", other, &resolved)),
    };

    sort_rows(&mut rows, resolved.sort);
    Ok(KmerData::new(resolved.kmer, resolved.use_t, rows))
}

fn unsupported(context: &'static str, algo: ProbAlgo, resolved: &Resolved) -> KenrichError {
    if resolved.warnings {
        warn!("{context}: probabilistic algorithm '{}' is not supported", algo.name());
    }
    OptionsError::UnsupportedAlgo {
        context,
        algo: algo.name(),
    }
    .into()
}

/// Validates the control-file / background-model combination.
fn check_control(
    context: &'static str,
    ctrl: Option<&Path>,
    resolved: &Resolved,
) -> Result<()> {
    match (ctrl, resolved.prob_algo) {
        (None, ProbAlgo::None) => {
            if resolved.warnings {
                warn!("{context}: if no probabilistic algorithm is set, a control is required");
            }
            Err(OptionsError::MissingControl.into())
        }
        (Some(path), algo) if algo != ProbAlgo::None => {
            if resolved.warnings {
                warn!("{context}: ignoring control '{}'", path.display());
            }
            Ok(())
        }
        _ => Ok(()),
    }
}

fn count_rows(table: &KmerTable) -> Vec<KmerRow> {
    table.with_counts(|view| {
        (0..=table.capacity())
            .map(|hash| {
                let count = view.get(hash);
                KmerRow {
                    kmer: hash,
                    score: count as f64,
                    count: Some(u32::try_from(count).unwrap_or(u32::MAX)),
                    stdev: None,
                    pval: None,
                }
            })
            .collect()
    })
}

fn scored_rows(rows: Vec<EnrichedKmer>) -> Vec<KmerRow> {
    rows.into_iter()
        .map(|r| KmerRow::scored(r.hash, r.rval))
        .collect()
}

fn sort_rows(rows: &mut [KmerRow], sort: bool) {
    if sort {
        rows.sort_by(|a, b| cmp_desc_nan_last(a.score, b.score));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_file(contents: &[u8]) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(contents).unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn count_validates_options() {
        let file = write_file(b">a\nACGT\n");
        let opts = Options::new(0);
        assert!(matches!(
            count(file.path(), &opts),
            Err(KenrichError::Options(OptionsError::KmerOutOfRange(0)))
        ));
    }

    #[test]
    fn count_rejects_probabilistic_backgrounds() {
        let file = write_file(b">a\nACGT\n");
        let mut opts = Options::new(2);
        opts.prob_algo = ProbAlgo::Regular;
        assert!(matches!(
            count(file.path(), &opts),
            Err(KenrichError::Options(OptionsError::UnsupportedAlgo { .. }))
        ));
    }

    #[test]
    fn enrichment_requires_control_without_background() {
        let file = write_file(b">a\nACGT\n");
        let opts = Options::new(2);
        assert!(matches!(
            enrichment(file.path(), None, &opts),
            Err(KenrichError::Options(OptionsError::MissingControl))
        ));
    }

    #[test]
    fn ikke_rejects_bootstrap() {
        let test = write_file(b">a\nACGT\n");
        let ctrl = write_file(b">a\nTTTT\n");
        let mut opts = Options::new(2);
        opts.bootstrap_iters = 2;
        assert!(matches!(
            ikke(test.path(), Some(ctrl.path()), &opts),
            Err(KenrichError::Options(OptionsError::UnsupportedAlgo { .. }))
        ));
    }
}
