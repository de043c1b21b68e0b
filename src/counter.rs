//! Counting passes: single- and multi-threaded, bootstrap-subsampled,
//! shuffle-based, and mask-respecting recounts.
//!
//! Every pass drives the same machinery: a [`SeqStream`] delivering
//! record-respecting chunks (or whole records), masked substrings crossed
//! out with `'X'`, and a [`RollingHasher`] draining hashes into a
//! [`KmerTable`]. Multi-threaded passes share one stream behind a mutex and
//! flush per-worker hash batches under the table lock, so the sum of counts
//! equals the sequential count regardless of worker interleaving.

use std::path::Path;
use std::sync::Mutex;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::debug;

use crate::detect::detect_format;
use crate::error::{Result, StreamError};
use crate::hasher::RollingHasher;
use crate::mask::cross_out;
use crate::shuffle::Shuffler;
use crate::stream::{SeqStream, SequenceKind, DEFAULT_INPUT_CAPACITY};
use crate::table::KmerTable;

/// Chunk size used by counting passes.
pub const CHUNK_SIZE: usize = 64 * 1024;

/// Per-worker hash batch flushed under the table lock.
const BATCH_CAPACITY: usize = 250_000;

/// Worker count is clamped into `[1, MAX_THREADS]`.
pub const MAX_THREADS: u32 = 128;

/// Bootstrap subsample scale: samples are expressed in milli-percent.
pub const SAMPLE_SCALE: u32 = 100_000;

fn open_stream(path: &Path, kind: SequenceKind) -> Result<SeqStream, StreamError> {
    // The output buffer must hold a full chunk's record tail.
    SeqStream::open_with_capacities(path, kind, DEFAULT_INPUT_CAPACITY, CHUNK_SIZE)
}

/// Counts every k-mer in `path` with a single-threaded pass.
///
/// # Errors
///
/// Fails on unreadable or unclassifiable input, or k outside 1..=16.
pub fn count_kmers<P: AsRef<Path>>(path: P, k: u32) -> Result<KmerTable> {
    let path = path.as_ref();
    let kind = detect_format(path)?;
    let mut table = KmerTable::new(k)?;
    count_into(&mut table, path, kind)?;
    Ok(table)
}

/// Counts every k-mer in `path` with `threads` workers sharing one stream.
///
/// One worker falls back to the sequential pass. The count vector is
/// identical to the sequential result up to the order-independence of
/// addition.
///
/// # Errors
///
/// Fails on unreadable or unclassifiable input, or k outside 1..=16.
pub fn count_kmers_mt<P: AsRef<Path>>(path: P, k: u32, threads: u32) -> Result<KmerTable> {
    let threads = threads.clamp(1, MAX_THREADS);
    if threads == 1 {
        return count_kmers(path, k);
    }
    let path = path.as_ref();
    let kind = detect_format(path)?;
    let table = KmerTable::new(k)?;
    let stream = open_stream(path, kind)?;
    debug!(path = %path.display(), k, threads, "multi-threaded counting pass");
    run_chunk_workers(&table, stream, kind, threads, &[])?;
    Ok(table)
}

/// Counts k-mers over a random subsample of records.
///
/// Each record is kept with probability `sample / 100000`, drawn from a
/// deterministic RNG seeded with `seed`: one seed produces one table.
///
/// # Errors
///
/// Fails on unreadable or unclassifiable input, or k outside 1..=16.
pub fn count_kmers_bootstrap<P: AsRef<Path>>(
    path: P,
    k: u32,
    sample: u32,
    seed: u64,
) -> Result<KmerTable> {
    let path = path.as_ref();
    let sample = sample.clamp(1, SAMPLE_SCALE);
    let kind = detect_format(path)?;
    let mut table = KmerTable::new(k)?;
    let mut stream = open_stream(path, kind)?;
    let mut hasher = RollingHasher::new(k);
    let mut rng = StdRng::seed_from_u64(seed);
    let mut record = Vec::new();

    while stream.read_record(&mut record)? {
        if rng.gen_range(0..SAMPLE_SCALE) >= sample {
            continue;
        }
        hash_record(&mut table, &mut hasher, &record);
    }
    Ok(table)
}

/// Multi-threaded bootstrap counting.
///
/// Workers share one stream and one RNG inside the same critical section,
/// so the seed fully determines the set of sampled records (though not
/// their per-worker assignment).
///
/// # Errors
///
/// Fails on unreadable or unclassifiable input, or k outside 1..=16.
pub fn count_kmers_bootstrap_mt<P: AsRef<Path>>(
    path: P,
    k: u32,
    sample: u32,
    seed: u64,
    threads: u32,
) -> Result<KmerTable> {
    let threads = threads.clamp(1, MAX_THREADS);
    if threads == 1 {
        return count_kmers_bootstrap(path, k, sample, seed);
    }
    let path = path.as_ref();
    let sample = sample.clamp(1, SAMPLE_SCALE);
    let kind = detect_format(path)?;
    let table = KmerTable::new(k)?;
    let source = Mutex::new(SampledSource {
        stream: open_stream(path, kind)?,
        rng: StdRng::seed_from_u64(seed),
        sample,
    });

    std::thread::scope(|scope| {
        let handles: Vec<_> = (0..threads)
            .map(|_| scope.spawn(|| sampled_worker(&source, &table, k)))
            .collect();
        handles
            .into_iter()
            .map(|h| h.join().expect("counting worker panicked"))
            .collect::<Result<Vec<()>, StreamError>>()
    })?;
    Ok(table)
}

/// Counts k-mers of the k-let-preserving shuffle of every record.
///
/// The shuffle RNG is re-seeded at pass entry so the shuffled corpus is
/// reproducible.
///
/// # Errors
///
/// Fails on unreadable or unclassifiable input, or k outside 1..=16.
pub fn count_kmers_shuffled<P: AsRef<Path>>(path: P, k: u32, klet: u32) -> Result<KmerTable> {
    let mut table = KmerTable::new(k)?;
    count_shuffled_into(&mut table, path.as_ref(), klet, None)?;
    Ok(table)
}

/// Shuffle counting over a random subsample of records.
///
/// A full sample (100000) degenerates to [`count_kmers_shuffled`]. The
/// subsampling RNG is seeded with `seed`; the shuffle RNG keeps its own
/// pass-entry seed.
///
/// # Errors
///
/// Fails on unreadable or unclassifiable input, or k outside 1..=16.
pub fn count_kmers_shuffled_bootstrap<P: AsRef<Path>>(
    path: P,
    k: u32,
    klet: u32,
    sample: u32,
    seed: u64,
) -> Result<KmerTable> {
    let sample = sample.clamp(1, SAMPLE_SCALE);
    if sample == SAMPLE_SCALE {
        return count_kmers_shuffled(path, k, klet);
    }
    let mut table = KmerTable::new(k)?;
    count_shuffled_into(&mut table, path.as_ref(), klet, Some((sample, seed)))?;
    Ok(table)
}

/// Clears the table, adds `kmer` to its cumulative mask list, and recounts
/// the file with every masked substring crossed out before hashing.
///
/// # Errors
///
/// Fails on unreadable or unclassifiable input.
pub fn recount_kmer<P: AsRef<Path>>(table: &mut KmerTable, path: P, kmer: &str) -> Result<()> {
    let path = path.as_ref();
    let kind = detect_format(path)?;
    table.clear();
    table.mask_push(kmer.to_string());
    count_into(table, path, kind)
}

/// Multi-threaded [`recount_kmer`].
///
/// # Errors
///
/// Fails on unreadable or unclassifiable input.
pub fn recount_kmer_mt<P: AsRef<Path>>(
    table: &mut KmerTable,
    path: P,
    kmer: &str,
    threads: u32,
) -> Result<()> {
    let threads = threads.clamp(1, MAX_THREADS);
    if threads == 1 {
        return recount_kmer(table, path, kmer);
    }
    let path = path.as_ref();
    let kind = detect_format(path)?;
    table.clear();
    table.mask_push(kmer.to_string());
    let masks = table.masked().to_vec();
    let stream = open_stream(path, kind)?;
    run_chunk_workers(table, stream, kind, threads, &masks)
}

/// [`recount_kmer`] over the shuffled corpus: the mask list is applied to
/// each shuffled record before hashing.
///
/// # Errors
///
/// Fails on unreadable or unclassifiable input.
pub fn recount_kmer_shuffled<P: AsRef<Path>>(
    table: &mut KmerTable,
    path: P,
    klet: u32,
    kmer: &str,
) -> Result<()> {
    table.clear();
    table.mask_push(kmer.to_string());
    count_shuffled_into(table, path.as_ref(), klet, None)
}

/// The sequential chunked pass shared by plain counting and recounting.
fn count_into(table: &mut KmerTable, path: &Path, kind: SequenceKind) -> Result<()> {
    let masks = table.masked().to_vec();
    let mut stream = open_stream(path, kind)?;
    let mut hasher = RollingHasher::new(table.k());
    let mut buf = vec![0u8; CHUNK_SIZE];
    debug!(path = %path.display(), k = table.k(), %kind, masks = masks.len(), "counting pass");

    loop {
        let n = stream.read_records(&mut buf)?;
        if n == 0 {
            break;
        }
        let chunk = &mut buf[..n];
        for mask in &masks {
            cross_out(chunk, mask, kind);
        }
        hasher.set_seq(chunk);
        while let Some(hash) = hasher.next_hash(chunk, kind) {
            table.increment(hash);
        }
    }
    Ok(())
}

/// The record-at-a-time shuffled pass shared by shuffle counting, shuffled
/// bootstrap, and shuffled recounts.
fn count_shuffled_into(
    table: &mut KmerTable,
    path: &Path,
    klet: u32,
    subsample: Option<(u32, u64)>,
) -> Result<()> {
    let kind = detect_format(path)?;
    let masks = table.masked().to_vec();
    let mut stream = open_stream(path, kind)?;
    let mut hasher = RollingHasher::new(table.k());
    let mut shuffler = Shuffler::new();
    let mut sampler = subsample.map(|(sample, seed)| (sample, StdRng::seed_from_u64(seed)));
    let mut record = Vec::new();

    while stream.read_record(&mut record)? {
        if let Some((sample, rng)) = sampler.as_mut() {
            if rng.gen_range(0..SAMPLE_SCALE) >= *sample {
                continue;
            }
        }
        let mut shuffled = shuffler.shuffle(&record, klet);
        for mask in &masks {
            cross_out(&mut shuffled, mask, SequenceKind::Raw);
        }
        hash_record(table, &mut hasher, &shuffled);
    }
    Ok(())
}

/// Hashes one standalone record (pure sequence bytes) into the table.
fn hash_record(table: &mut KmerTable, hasher: &mut RollingHasher, record: &[u8]) {
    hasher.reset();
    hasher.set_seq(record);
    while let Some(hash) = hasher.next_hash(record, SequenceKind::Raw) {
        table.increment(hash);
    }
}

/// Spawns chunk-pulling workers over a shared stream.
fn run_chunk_workers(
    table: &KmerTable,
    stream: SeqStream,
    kind: SequenceKind,
    threads: u32,
    masks: &[String],
) -> Result<()> {
    let shared = Mutex::new(stream);
    std::thread::scope(|scope| {
        let handles: Vec<_> = (0..threads)
            .map(|_| scope.spawn(|| chunk_worker(&shared, table, kind, masks)))
            .collect();
        handles
            .into_iter()
            .map(|h| h.join().expect("counting worker panicked"))
            .collect::<Result<Vec<()>, StreamError>>()
    })?;
    Ok(())
}

fn chunk_worker(
    shared: &Mutex<SeqStream>,
    table: &KmerTable,
    kind: SequenceKind,
    masks: &[String],
) -> Result<(), StreamError> {
    let mut hasher = RollingHasher::new(table.k());
    let mut buf = vec![0u8; CHUNK_SIZE];
    let mut batch = Vec::with_capacity(BATCH_CAPACITY);

    loop {
        let n = {
            let mut stream = shared.lock().expect("stream lock poisoned");
            stream.read_records(&mut buf)?
        };
        if n == 0 {
            break;
        }
        let chunk = &mut buf[..n];
        for mask in masks {
            cross_out(chunk, mask, kind);
        }
        hasher.set_seq(chunk);
        while let Some(hash) = hasher.next_hash(chunk, kind) {
            batch.push(hash);
            if batch.len() == BATCH_CAPACITY {
                table.increment_batch(&batch);
                batch.clear();
            }
        }
    }
    table.increment_batch(&batch);
    Ok(())
}

/// Shared record source for bootstrap workers: the keep/skip draw happens
/// inside the same critical section as the record read.
struct SampledSource {
    stream: SeqStream,
    rng: StdRng,
    sample: u32,
}

impl SampledSource {
    fn next_kept(&mut self, record: &mut Vec<u8>) -> Result<bool, StreamError> {
        loop {
            if !self.stream.read_record(record)? {
                return Ok(false);
            }
            if self.rng.gen_range(0..SAMPLE_SCALE) < self.sample {
                return Ok(true);
            }
        }
    }
}

fn sampled_worker(
    source: &Mutex<SampledSource>,
    table: &KmerTable,
    k: u32,
) -> Result<(), StreamError> {
    let mut hasher = RollingHasher::new(k);
    let mut batch = Vec::with_capacity(BATCH_CAPACITY);
    let mut record = Vec::new();

    loop {
        let got = {
            let mut source = source.lock().expect("stream lock poisoned");
            source.next_kept(&mut record)?
        };
        if !got {
            break;
        }
        hasher.reset();
        hasher.set_seq(&record);
        while let Some(hash) = hasher.next_hash(&record, SequenceKind::Raw) {
            batch.push(hash);
            if batch.len() == BATCH_CAPACITY {
                table.increment_batch(&batch);
                batch.clear();
            }
        }
    }
    table.increment_batch(&batch);
    Ok(())
}
