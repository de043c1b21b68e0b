//! Masking of k-mer occurrences inside read chunks.
//!
//! Recount passes replace every occurrence of each masked k-mer with `'X'`
//! before hashing; the hasher treats `X` as a non-nucleotide and resets its
//! window, which knocks out the masked k-mer and every window overlapping
//! it. Matching is case-insensitive with `U ≡ T`. In FASTA framing a match
//! may span wrapped lines: newlines inside the match are preserved and only
//! the nucleotide bytes are crossed out, and header lines are never
//! searched.

use crate::nucleotide::clean_nt;
use crate::stream::SequenceKind;

/// Crosses out every occurrence of `pattern` in `buf` with `'X'`.
pub fn cross_out(buf: &mut [u8], pattern: &str, kind: SequenceKind) {
    let pattern: Vec<u8> = pattern.bytes().map(clean_nt).collect();
    if pattern.is_empty() {
        return;
    }
    match kind {
        SequenceKind::Fasta => cross_out_fasta(buf, &pattern),
        _ => cross_out_plain(buf, &pattern),
    }
}

fn cross_out_plain(buf: &mut [u8], pattern: &[u8]) {
    if buf.len() < pattern.len() {
        return;
    }
    let mut i = 0;
    while i + pattern.len() <= buf.len() {
        if buf[i..i + pattern.len()]
            .iter()
            .zip(pattern)
            .all(|(&b, &p)| clean_nt(b) == p)
        {
            buf[i..i + pattern.len()].fill(b'X');
            i += pattern.len();
        } else {
            i += 1;
        }
    }
}

fn cross_out_fasta(buf: &mut [u8], pattern: &[u8]) {
    let mut i = 0;
    while i < buf.len() {
        match buf[i] {
            b'>' => {
                // Header line: never part of a match.
                while i < buf.len() && buf[i] != b'\n' {
                    i += 1;
                }
            }
            b'\n' => i += 1,
            _ => {
                if let Some(matched) = match_at_skipping_newlines(buf, i, pattern) {
                    let end = *matched.last().unwrap_or(&i) + 1;
                    for pos in matched {
                        buf[pos] = b'X';
                    }
                    i = end;
                } else {
                    i += 1;
                }
            }
        }
    }
}

/// Attempts to match `pattern` starting at `start`, skipping newlines in the
/// haystack. Returns the matched byte positions on success.
fn match_at_skipping_newlines(buf: &[u8], start: usize, pattern: &[u8]) -> Option<Vec<usize>> {
    let mut positions = Vec::with_capacity(pattern.len());
    let mut s = start;
    for &p in pattern {
        loop {
            if s >= buf.len() {
                return None;
            }
            if buf[s] == b'\n' {
                s += 1;
                continue;
            }
            break;
        }
        if clean_nt(buf[s]) != p {
            return None;
        }
        positions.push(s);
        s += 1;
    }
    Some(positions)
}
