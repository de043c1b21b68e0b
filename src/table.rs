//! Fixed-capacity k-mer count table.
//!
//! The key space of k-mer hashes is exactly `[0, 4^k)` and dense, so the
//! table is a direct-addressed slot array rather than a hash map: `u64`
//! slots for k ≤ 12 and `u32` slots for 13 ≤ k ≤ 16 (halving the footprint
//! where a single slot can no longer overflow realistic inputs).
//!
//! Concurrency follows the counting passes: exclusive (`&mut`) single
//! increments bypass any locking, while shared batched increments and
//! decrements serialize through an internal mutex. The table also owns the
//! FIFO list of masked k-mer strings consumed by recount passes.

use std::sync::Mutex;

use crate::error::{OptionsError, TableError};
use crate::nucleotide::{self, num_kmers};

/// Slot storage, sized by k.
#[derive(Debug)]
enum Slots {
    /// k ≤ 12: 64-bit counters.
    Small(Vec<u64>),
    /// 13 ≤ k ≤ 16: 32-bit counters.
    Medium(Vec<u32>),
}

impl Slots {
    #[inline]
    fn get(&self, hash: u32) -> u64 {
        match self {
            Self::Small(v) => v[hash as usize],
            Self::Medium(v) => u64::from(v[hash as usize]),
        }
    }

    #[inline]
    fn bump(&mut self, hash: u32) {
        match self {
            Self::Small(v) => v[hash as usize] += 1,
            Self::Medium(v) => v[hash as usize] += 1,
        }
    }

    #[inline]
    fn drop_one(&mut self, hash: u32) {
        match self {
            Self::Small(v) => v[hash as usize] -= 1,
            Self::Medium(v) => v[hash as usize] -= 1,
        }
    }

    fn zero(&mut self) {
        match self {
            Self::Small(v) => v.fill(0),
            Self::Medium(v) => v.fill(0),
        }
    }

    fn sum(&self) -> u64 {
        match self {
            Self::Small(v) => v.iter().sum(),
            Self::Medium(v) => v.iter().map(|&c| u64::from(c)).sum(),
        }
    }
}

#[derive(Debug)]
struct Inner {
    slots: Slots,
    total: u64,
}

/// Read-only view over the slots, handed out under the table lock for
/// whole-table scans.
pub(crate) struct CountsView<'a> {
    inner: &'a Inner,
}

impl CountsView<'_> {
    #[inline]
    pub(crate) fn get(&self, hash: u32) -> u64 {
        self.inner.slots.get(hash)
    }

    #[inline]
    pub(crate) fn get_f64(&self, hash: u32) -> f64 {
        self.inner.slots.get(hash) as f64
    }

    #[inline]
    pub(crate) fn total(&self) -> u64 {
        self.inner.total
    }
}

/// Numeric types a count can be read back as, with saturation on narrowing.
pub trait CountValue: Sized {
    /// Converts a raw slot count, clamping to the destination's maximum.
    fn from_count(count: u64) -> Self;
}

macro_rules! impl_count_value_int {
    ($($ty:ty),*) => {
        $(impl CountValue for $ty {
            #[inline]
            fn from_count(count: u64) -> Self {
                <$ty>::try_from(count).unwrap_or(<$ty>::MAX)
            }
        })*
    };
}

impl_count_value_int!(u8, u16, u32, u64);

impl CountValue for f32 {
    #[inline]
    fn from_count(count: u64) -> Self {
        count as f32
    }
}

impl CountValue for f64 {
    #[inline]
    fn from_count(count: u64) -> Self {
        count as f64
    }
}

/// Dense table of `4^k` k-mer counters.
#[derive(Debug)]
pub struct KmerTable {
    k: u32,
    /// Highest addressable hash: `4^k - 1`.
    capacity: u32,
    inner: Mutex<Inner>,
    masked: Vec<String>,
}

impl KmerTable {
    /// Allocates a zeroed table for k-mers of length `k`.
    ///
    /// # Errors
    ///
    /// Returns [`OptionsError::KmerOutOfRange`] unless 1 ≤ k ≤ 16.
    pub fn new(k: u32) -> Result<Self, OptionsError> {
        if k == 0 || k > 16 {
            return Err(OptionsError::KmerOutOfRange(k));
        }
        let len = num_kmers(k) as usize;
        let slots = if k <= 12 {
            Slots::Small(vec![0u64; len])
        } else {
            Slots::Medium(vec![0u32; len])
        };
        Ok(Self {
            k,
            capacity: (num_kmers(k) - 1) as u32,
            inner: Mutex::new(Inner { slots, total: 0 }),
            masked: Vec::new(),
        })
    }

    /// The configured k.
    #[must_use]
    pub fn k(&self) -> u32 {
        self.k
    }

    /// Highest addressable hash (`4^k - 1`); one less than the slot count.
    #[must_use]
    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    /// Number of slots (`4^k`).
    #[must_use]
    pub fn len(&self) -> u64 {
        u64::from(self.capacity) + 1
    }

    /// `true` when no k-mer has been counted.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }

    /// Sum of all increments applied so far.
    #[must_use]
    pub fn total(&self) -> u64 {
        self.lock().total
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        // A poisoned lock means a worker panicked mid-batch; the counts are
        // garbage either way, so propagate the panic.
        self.inner.lock().expect("kmer table lock poisoned")
    }

    /// Adds one to slot `hash`. Exclusive access, no locking.
    #[inline]
    pub fn increment(&mut self, hash: u32) {
        let inner = self.inner.get_mut().expect("kmer table lock poisoned");
        inner.slots.bump(hash);
        inner.total += 1;
    }

    /// Applies a worker's batch of hashes under the table lock.
    pub fn increment_batch(&self, hashes: &[u32]) {
        if hashes.is_empty() {
            return;
        }
        let mut inner = self.lock();
        for &hash in hashes {
            inner.slots.bump(hash);
        }
        inner.total += hashes.len() as u64;
    }

    /// Subtracts one from slot `hash` under the table lock.
    pub fn decrement(&self, hash: u32) {
        let mut inner = self.lock();
        inner.slots.drop_one(hash);
        inner.total -= 1;
    }

    /// Reads the count at `hash`, saturating into `T`.
    ///
    /// # Errors
    ///
    /// Returns [`TableError::HashOutOfRange`] when `hash` does not address
    /// this table.
    pub fn get_by_hash<T: CountValue>(&self, hash: u32) -> Result<T, TableError> {
        if hash > self.capacity {
            return Err(TableError::HashOutOfRange {
                hash,
                capacity: self.capacity,
            });
        }
        Ok(T::from_count(self.lock().slots.get(hash)))
    }

    /// Reads the count for a k-mer string (uppercase `A`/`C`/`G`/`T`/`U`),
    /// saturating into `T`.
    ///
    /// # Errors
    ///
    /// Returns [`TableError::WrongLength`] when the string length is not k
    /// and [`TableError::InvalidBase`] on a non-alphabet byte.
    pub fn get_by_string<T: CountValue>(&self, kmer: &str) -> Result<T, TableError> {
        if kmer.len() as u32 != self.k {
            return Err(TableError::WrongLength {
                expected: self.k,
                got: kmer.len() as u32,
            });
        }
        let hash = nucleotide::hash_kmer(kmer.as_bytes())?;
        self.get_by_hash(hash)
    }

    /// Renders the k-mer string for a hash of this table.
    #[must_use]
    pub fn unhash(&self, hash: u32, use_t: bool) -> String {
        nucleotide::unhash(hash, self.k, use_t)
    }

    /// Appends a k-mer string to the masked list. Insertion order is
    /// preserved; recount passes cross out every listed string.
    pub fn mask_push(&mut self, kmer: String) {
        self.masked.push(kmer);
    }

    /// The masked k-mer strings, in insertion order.
    #[must_use]
    pub fn masked(&self) -> &[String] {
        &self.masked
    }

    /// Zeroes every slot and the running total. The masked list survives:
    /// masks are cumulative across recounts.
    pub fn clear(&mut self) {
        let inner = self.inner.get_mut().expect("kmer table lock poisoned");
        inner.slots.zero();
        inner.total = 0;
    }

    /// Runs `f` over a consistent read-only view of the slots.
    pub(crate) fn with_counts<R>(&self, f: impl FnOnce(CountsView<'_>) -> R) -> R {
        let inner = self.lock();
        f(CountsView { inner: &inner })
    }

    /// Sum of every slot; equals [`total`](Self::total) at synchronization
    /// points. Exposed for integrity checks.
    #[must_use]
    pub fn slot_sum(&self) -> u64 {
        self.lock().slots.sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capacity_is_one_less_than_slot_count() {
        for k in [1u32, 2, 5, 12] {
            let table = KmerTable::new(k).unwrap();
            assert_eq!(u64::from(table.capacity()) + 1, num_kmers(k));
            assert_eq!(table.len(), num_kmers(k));
        }
    }

    #[test]
    fn rejects_k_out_of_range() {
        assert!(KmerTable::new(0).is_err());
        assert!(KmerTable::new(17).is_err());
    }

    #[test]
    fn medium_variant_used_above_k12() {
        let table = KmerTable::new(13).unwrap();
        assert!(matches!(&table.lock().slots, Slots::Medium(_)));
        let table = KmerTable::new(12).unwrap();
        assert!(matches!(&table.lock().slots, Slots::Small(_)));
    }

    #[test]
    fn increment_and_get() {
        let mut table = KmerTable::new(2).unwrap();
        table.increment(5);
        table.increment(5);
        table.increment(0);
        assert_eq!(table.get_by_hash::<u64>(5).unwrap(), 2);
        assert_eq!(table.get_by_hash::<u64>(0).unwrap(), 1);
        assert_eq!(table.get_by_hash::<u64>(1).unwrap(), 0);
        assert_eq!(table.total(), 3);
        assert_eq!(table.slot_sum(), 3);
    }

    #[test]
    fn batch_updates_keep_total_in_sync() {
        let table = KmerTable::new(2).unwrap();
        table.increment_batch(&[1, 1, 2, 3, 15]);
        table.increment_batch(&[]);
        assert_eq!(table.total(), 5);
        assert_eq!(table.slot_sum(), 5);
        assert_eq!(table.get_by_hash::<u32>(1).unwrap(), 2);
    }

    #[test]
    fn decrement_under_lock() {
        let table = KmerTable::new(1).unwrap();
        table.increment_batch(&[0, 0, 3]);
        table.decrement(0);
        assert_eq!(table.get_by_hash::<u64>(0).unwrap(), 1);
        assert_eq!(table.total(), 2);
    }

    #[test]
    fn get_by_string_validates() {
        let mut table = KmerTable::new(3).unwrap();
        table.increment(nucleotide::hash_kmer(b"ACG").unwrap());
        assert_eq!(table.get_by_string::<u32>("ACG").unwrap(), 1);
        assert_eq!(table.get_by_string::<u32>("ACU").unwrap(), 0);
        assert_eq!(
            table.get_by_string::<u32>("AC"),
            Err(TableError::WrongLength {
                expected: 3,
                got: 2
            })
        );
        assert_eq!(
            table.get_by_string::<u32>("ACX"),
            Err(TableError::InvalidBase { base: b'X' })
        );
    }

    #[test]
    fn get_by_hash_range_checked() {
        let table = KmerTable::new(1).unwrap();
        assert!(table.get_by_hash::<u64>(3).is_ok());
        assert_eq!(
            table.get_by_hash::<u64>(4),
            Err(TableError::HashOutOfRange {
                hash: 4,
                capacity: 3
            })
        );
    }

    #[test]
    fn narrow_reads_saturate() {
        let mut table = KmerTable::new(1).unwrap();
        for _ in 0..300 {
            table.increment(2);
        }
        assert_eq!(table.get_by_hash::<u8>(2).unwrap(), u8::MAX);
        assert_eq!(table.get_by_hash::<u16>(2).unwrap(), 300);
        assert!((table.get_by_hash::<f64>(2).unwrap() - 300.0).abs() < f64::EPSILON);
    }

    #[test]
    fn clear_keeps_masked_list() {
        let mut table = KmerTable::new(2).unwrap();
        table.increment(7);
        table.mask_push("AC".to_string());
        table.clear();
        assert_eq!(table.total(), 0);
        assert_eq!(table.get_by_hash::<u64>(7).unwrap(), 0);
        assert_eq!(table.masked(), ["AC".to_string()]);
    }

    #[test]
    fn masked_list_preserves_insertion_order() {
        let mut table = KmerTable::new(2).unwrap();
        table.mask_push("GT".to_string());
        table.mask_push("AC".to_string());
        table.mask_push("TT".to_string());
        assert_eq!(table.masked(), ["GT", "AC", "TT"]);
    }

    #[test]
    fn concurrent_batches_sum_correctly() {
        let table = KmerTable::new(2).unwrap();
        std::thread::scope(|scope| {
            for _ in 0..4 {
                scope.spawn(|| {
                    for _ in 0..100 {
                        table.increment_batch(&[0, 5, 10]);
                    }
                });
            }
        });
        assert_eq!(table.total(), 1200);
        assert_eq!(table.get_by_hash::<u64>(5).unwrap(), 400);
        assert_eq!(table.slot_sum(), 1200);
    }
}
