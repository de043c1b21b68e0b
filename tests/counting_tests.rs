//! End-to-end counting scenarios across framings and compression modes.

use std::io::Write;

use flate2::write::{GzEncoder, ZlibEncoder};
use flate2::Compression;
use kenrich::api;
use kenrich::options::Options;
use kenrich::KmerData;
use tempfile::NamedTempFile;

fn write_file(contents: &[u8]) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(contents).unwrap();
    file.flush().unwrap();
    file
}

fn count_of(data: &KmerData, kmer: &str) -> u32 {
    data.rows()
        .iter()
        .find(|row| data.kmer_string(row) == kmer)
        .and_then(|row| row.count)
        .unwrap()
}

#[test]
fn ten_identical_raw_lines() {
    let file = write_file(&b"AAAAAAAAAAAA\n".repeat(10));
    let opts = Options::new(2);
    let data = api::count(file.path(), &opts).unwrap();

    assert_eq!(data.len(), 16);
    assert_eq!(count_of(&data, "AA"), 110);
    // Sorted output: the only non-zero row leads.
    assert_eq!(data.kmer_string(&data.rows()[0]), "AA");
    assert!(data.rows()[1..].iter().all(|r| r.count == Some(0)));
}

#[test]
fn raw_lines_count_overlapping_windows() {
    let mut body = Vec::new();
    for _ in 0..5 {
        body.extend_from_slice(b"ACGTACGTACGT\n");
        body.extend_from_slice(b"CGATCGATCGAT\n");
    }
    let file = write_file(&body);
    let opts = Options::new(3);
    let data = api::count(file.path(), &opts).unwrap();

    // Per "ACGTACGTACGT" line: ACG 3, CGT 3, GTA 2, TAC 2.
    assert_eq!(count_of(&data, "ACG"), 15);
    assert_eq!(count_of(&data, "CGT"), 15);
    assert_eq!(count_of(&data, "GTA"), 10);
    assert_eq!(count_of(&data, "TAC"), 10);
    // Per "CGATCGATCGAT" line: CGA 3, GAT 3, ATC 2, TCG 2.
    assert_eq!(count_of(&data, "CGA"), 15);
    assert_eq!(count_of(&data, "GAT"), 15);
    assert_eq!(count_of(&data, "ATC"), 10);
    assert_eq!(count_of(&data, "TCG"), 10);
    assert_eq!(count_of(&data, "TTT"), 0);
}

#[test]
fn fasta_record_newlines_are_silent() {
    let file = write_file(b">h\nACGT\nACGT\n");
    let opts = Options::new(2);
    let data = api::count(file.path(), &opts).unwrap();

    assert_eq!(count_of(&data, "AC"), 2);
    assert_eq!(count_of(&data, "CG"), 2);
    assert_eq!(count_of(&data, "GT"), 2);
    assert_eq!(count_of(&data, "TA"), 1);
    let total: u64 = data.rows().iter().map(|r| u64::from(r.count.unwrap())).sum();
    assert_eq!(total, 7);
}

#[test]
fn fastq_quality_lines_do_not_contribute() {
    // Second record's quality line starts with '@' and is pure A's; it must
    // not leak into the counts.
    let file = write_file(b"@r1\nACGTG\n+\n@AAAA\n@r2\nACGTG\n+\nAAAAA\n");
    let opts = Options::new(3);
    let data = api::count(file.path(), &opts).unwrap();

    assert_eq!(count_of(&data, "ACG"), 2);
    assert_eq!(count_of(&data, "CGT"), 2);
    assert_eq!(count_of(&data, "GTG"), 2);
    assert_eq!(count_of(&data, "AAA"), 0);
}

#[test]
fn gzip_and_plain_counts_agree() {
    let body = b">a\nACGTACGTTGCA\n>b\nGGGTTTACACGT\n";
    let plain = write_file(body);
    let mut enc = GzEncoder::new(Vec::new(), Compression::default());
    enc.write_all(body).unwrap();
    let gz = write_file(&enc.finish().unwrap());

    let opts = Options::new(4);
    let plain_data = api::count(plain.path(), &opts).unwrap();
    let gz_data = api::count(gz.path(), &opts).unwrap();

    for (p, g) in plain_data.rows().iter().zip(gz_data.rows()) {
        assert_eq!(p.kmer, g.kmer);
        assert_eq!(p.count, g.count);
    }
}

#[test]
fn zlib_and_plain_counts_agree() {
    let body = b">a\nACGTACGTTGCA\n";
    let plain = write_file(body);
    let mut enc = ZlibEncoder::new(Vec::new(), Compression::default());
    enc.write_all(body).unwrap();
    let z = write_file(&enc.finish().unwrap());

    let opts = Options::new(3);
    let plain_data = api::count(plain.path(), &opts).unwrap();
    let z_data = api::count(z.path(), &opts).unwrap();

    for (p, g) in plain_data.rows().iter().zip(z_data.rows()) {
        assert_eq!(p.count, g.count);
    }
}

#[test]
fn multi_threaded_counts_match_single_threaded() {
    let body: String = (0..500)
        .map(|i| format!(">r{i}\nACGTACGTTGCAGCATGCATGGCATCGATTACGGAT\n"))
        .collect();
    let file = write_file(body.as_bytes());

    let mut st_opts = Options::new(5);
    st_opts.threads = 1;
    let mut mt_opts = Options::new(5);
    mt_opts.threads = 8;

    let st = api::count(file.path(), &st_opts).unwrap();
    let mt = api::count(file.path(), &mt_opts).unwrap();
    for (a, b) in st.rows().iter().zip(mt.rows()) {
        assert_eq!(a.kmer, b.kmer);
        assert_eq!(a.count, b.count);
    }
}

#[test]
fn empty_sequence_input_yields_all_zero_counts() {
    let file = write_file(b">header only\n");
    let opts = Options::new(3);
    let data = api::count(file.path(), &opts).unwrap();
    assert_eq!(data.len(), 64);
    assert!(data.rows().iter().all(|r| r.count == Some(0)));
}

#[test]
fn single_nucleotide_input_concentrates_on_hash_zero() {
    let file = write_file(b">a\nAAAAAAAAAA\n");
    let mut opts = Options::new(4);
    opts.sort = false;
    let data = api::count(file.path(), &opts).unwrap();
    // Hash order: AAAA is row 0.
    assert_eq!(data.rows()[0].count, Some(7));
    assert!(data.rows()[1..].iter().all(|r| r.count == Some(0)));
}

#[test]
fn unknown_file_type_is_an_error() {
    let file = write_file(b"not a sequence file at all\njust words\n");
    let opts = Options::new(3);
    assert!(api::count(file.path(), &opts).is_err());
}

#[test]
fn unsorted_output_is_in_hash_order() {
    let file = write_file(b">a\nACGTACGT\n");
    let mut opts = Options::new(2);
    opts.sort = false;
    let data = api::count(file.path(), &opts).unwrap();
    for (hash, row) in data.rows().iter().enumerate() {
        assert_eq!(row.kmer, hash as u32);
    }
}

#[test]
fn boundary_k_values_succeed() {
    let file = write_file(b">a\nACGTACGTACGTACGTACGT\n");
    for k in [1u32, 12, 13] {
        let mut opts = Options::new(k);
        opts.sort = false;
        let data = api::count(file.path(), &opts).unwrap();
        assert_eq!(data.len() as u64, 1u64 << (2 * k), "k={k}");
    }
}

#[test]
fn record_boundary_exactly_at_chunk_edge_is_not_split() {
    // The first raw line fills the counting chunk exactly (including its
    // newline); the following lines must still be read intact.
    let chunk = 64 * 1024;
    let mut body = vec![b'A'; chunk - 1];
    body.push(b'\n');
    for _ in 0..9 {
        body.extend_from_slice(b"ACGTACGTACGT\n");
    }
    let file = write_file(&body);

    let opts = Options::new(2);
    let data = api::count(file.path(), &opts).unwrap();
    // AA windows come only from the long line: len - 1 of them.
    assert_eq!(u64::from(count_of(&data, "AA")), (chunk - 2) as u64);
    // Each short line contributes three AC windows.
    assert_eq!(count_of(&data, "AC"), 27);
}

#[test]
fn rna_rendering_uses_u() {
    let file = write_file(b">a\nACGU\n");
    let mut opts = Options::new(2);
    opts.use_t = false;
    let data = api::count(file.path(), &opts).unwrap();
    assert_eq!(count_of(&data, "GU"), 1);
    assert!(data
        .rows()
        .iter()
        .all(|r| !data.kmer_string(r).contains('T')));
}
