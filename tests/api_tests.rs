//! API surface tests: option validation, dispatch matrix edges, and output
//! serialization.

use std::io::Write;

use kenrich::api;
use kenrich::error::{KenrichError, OptionsError};
use kenrich::options::{Options, ProbAlgo};
use tempfile::NamedTempFile;

fn write_file(contents: &[u8]) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(contents).unwrap();
    file.flush().unwrap();
    file
}

fn small_fasta() -> NamedTempFile {
    write_file(b">a\nACGTACGTTGCA\n>b\nGGGTTTACACGT\n")
}

#[test]
fn invalid_k_is_rejected_before_io() {
    let opts = Options::new(17);
    // The path does not exist; validation must fail first.
    let err = api::count("no-such-file.fa", &opts).unwrap_err();
    assert!(matches!(
        err,
        KenrichError::Options(OptionsError::KmerOutOfRange(17))
    ));
}

#[test]
fn missing_file_is_an_open_error() {
    let opts = Options::new(3);
    let err = api::count("no-such-file.fa", &opts).unwrap_err();
    assert!(err.to_string().contains("no-such-file.fa"));
}

#[test]
fn invalid_bootstrap_sample_is_rejected() {
    let file = small_fasta();
    let mut opts = Options::new(3);
    opts.bootstrap_sample = 0;
    assert!(matches!(
        api::count(file.path(), &opts),
        Err(KenrichError::Options(OptionsError::SampleOutOfRange(0)))
    ));
}

#[test]
fn iters_above_table_size_is_rejected() {
    let file = small_fasta();
    let mut opts = Options::new(2);
    opts.iters = 17;
    assert!(matches!(
        api::ikke(file.path(), Some(file.path()), &opts),
        Err(KenrichError::Options(OptionsError::ItersOutOfRange { .. }))
    ));
}

#[test]
fn zero_threads_is_rejected() {
    let file = small_fasta();
    let mut opts = Options::new(3);
    opts.threads = 0;
    assert!(matches!(
        api::count(file.path(), &opts),
        Err(KenrichError::Options(OptionsError::ThreadsOutOfRange(0)))
    ));
}

#[test]
fn count_row_set_covers_the_table() {
    let file = small_fasta();
    let mut opts = Options::new(3);
    opts.sort = false;
    let data = api::count(file.path(), &opts).unwrap();
    assert_eq!(data.len(), 64);
    let mut hashes: Vec<u32> = data.rows().iter().map(|r| r.kmer).collect();
    hashes.sort_unstable();
    hashes.dedup();
    assert_eq!(hashes.len(), 64);
}

#[test]
fn count_scores_mirror_counts() {
    let file = small_fasta();
    let opts = Options::new(3);
    let data = api::count(file.path(), &opts).unwrap();
    for row in data.rows() {
        assert_eq!(row.score, f64::from(row.count.unwrap()));
        assert!(row.stdev.is_none());
        assert!(row.pval.is_none());
    }
}

#[test]
fn ushuffle_count_emits_full_table() {
    let file = small_fasta();
    let mut opts = Options::new(3);
    opts.prob_algo = ProbAlgo::Ushuffle;
    opts.prob_ntprec = Some(2);
    let data = api::count(file.path(), &opts).unwrap();
    assert_eq!(data.len(), 64);
    let total: u64 = data.rows().iter().map(|r| u64::from(r.count.unwrap())).sum();
    // The shuffle preserves record lengths, so the window count is
    // unchanged.
    assert_eq!(total, 20);
}

#[test]
fn count_with_both_background_is_unsupported() {
    let file = small_fasta();
    let mut opts = Options::new(3);
    opts.prob_algo = ProbAlgo::Both;
    assert!(matches!(
        api::count(file.path(), &opts),
        Err(KenrichError::Options(OptionsError::UnsupportedAlgo { .. }))
    ));
}

#[test]
fn ikke_with_both_background_is_unsupported() {
    let file = small_fasta();
    let mut opts = Options::new(3);
    opts.prob_algo = ProbAlgo::Both;
    assert!(matches!(
        api::ikke(file.path(), None, &opts),
        Err(KenrichError::Options(OptionsError::UnsupportedAlgo { .. }))
    ));
}

#[test]
fn tsv_output_has_one_row_per_kmer() {
    let file = small_fasta();
    let opts = Options::new(2);
    let data = api::count(file.path(), &opts).unwrap();
    let mut out = Vec::new();
    data.write_tsv(&mut out).unwrap();
    let text = String::from_utf8(out).unwrap();
    assert_eq!(text.lines().count(), 16);
    for line in text.lines() {
        let fields: Vec<&str> = line.split('\t').collect();
        assert_eq!(fields.len(), 3); // kmer, score, count
        assert_eq!(fields[0].len(), 2);
    }
}

#[test]
fn json_output_parses_back() {
    let file = small_fasta();
    let opts = Options::new(2);
    let data = api::count(file.path(), &opts).unwrap();
    let mut out = Vec::new();
    data.write_json(&mut out).unwrap();
    let parsed: serde_json::Value = serde_json::from_slice(&out).unwrap();
    let rows = parsed.as_array().unwrap();
    assert_eq!(rows.len(), 16);
    assert!(rows[0].get("kmer").is_some());
    assert!(rows[0].get("score").is_some());
    assert!(rows[0].get("count").is_some());
    assert!(rows[0].get("stdev").is_none());
}

#[test]
fn enrichment_row_count_is_table_sized() {
    let test = small_fasta();
    let ctrl = small_fasta();
    let opts = Options::new(4);
    let data = api::enrichment(test.path(), Some(ctrl.path()), &opts).unwrap();
    assert_eq!(data.len(), 256);
}

#[test]
fn ikke_row_count_is_min_of_iters_and_table() {
    let test = small_fasta();
    let ctrl = small_fasta();
    let mut opts = Options::new(3);
    opts.iters = 5;
    opts.sort = false;
    let data = api::ikke(test.path(), Some(ctrl.path()), &opts).unwrap();
    assert_eq!(data.len(), 5);
}

#[test]
fn quiet_options_still_fail_on_missing_control() {
    let test = small_fasta();
    let mut opts = Options::new(3);
    opts.warnings = false;
    assert!(matches!(
        api::enrichment(test.path(), None, &opts),
        Err(KenrichError::Options(OptionsError::MissingControl))
    ));
}
