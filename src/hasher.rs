//! Incremental rolling hash over buffers of sequence bytes.
//!
//! [`RollingHasher`] turns a (possibly truncated) buffer into the lazy
//! sequence of 32-bit k-mer hashes it contains, skipping record headers,
//! quality lines, and newlines according to the declared framing, and
//! carrying partial state across buffer boundaries. It is the single
//! authority on what "a k-mer occurs at position i" means; every counting
//! path drives it instead of re-implementing framing.
//!
//! The hash of a k-mer is `sum(base(s[i]) * 4^(k-1-i))` and rolling updates
//! are `h' = ((h << 2) | base(x)) & (4^k - 1)`.

use crate::nucleotide::hash_mask;
use crate::stream::SequenceKind;

// Byte classes: 0-3 bases (A/C/G/T-U), 5 '>', 6 '@', 7 '+', 8 '\n',
// 9 everything else. Class 4 (end of data) arises from the buffer length.
const CLASS_OTHER: u8 = 9;
const CLASS_GT: u8 = 5;
const CLASS_AT: u8 = 6;
const CLASS_PLUS: u8 = 7;
const CLASS_NEWLINE: u8 = 8;

const fn class_table() -> [u8; 256] {
    let mut table = [CLASS_OTHER; 256];
    table[b'A' as usize] = 0;
    table[b'a' as usize] = 0;
    table[b'C' as usize] = 1;
    table[b'c' as usize] = 1;
    table[b'G' as usize] = 2;
    table[b'g' as usize] = 2;
    table[b'T' as usize] = 3;
    table[b't' as usize] = 3;
    table[b'U' as usize] = 3;
    table[b'u' as usize] = 3;
    table[b'>' as usize] = CLASS_GT;
    table[b'@' as usize] = CLASS_AT;
    table[b'+' as usize] = CLASS_PLUS;
    table[b'\n' as usize] = CLASS_NEWLINE;
    table
}

static CLASS: [u8; 256] = class_table();

/// How the hasher left the previous buffer, so the next [`set_seq`] can
/// resume correctly even when a buffer boundary fell inside a header or
/// quality line.
///
/// [`set_seq`]: RollingHasher::set_seq
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum EndReason {
    /// Ended inside (or exactly at the end of) sequence data.
    #[default]
    Clean,
    /// Still inside a header or quality line: skip to the end of the next
    /// line before hashing.
    SkipLine,
    /// Still inside a FASTQ `+` header: skip two lines before hashing.
    SkipTwoLines,
}

/// Stateful rolling hasher for one counting pass.
#[derive(Debug)]
pub struct RollingHasher {
    k: u32,
    mask: u32,
    prev: u32,
    has_prev: bool,
    end_of_seq: bool,
    /// Bases accumulated in a partially-built hash, `0..k`.
    pos: u32,
    /// Cursor into the buffer most recently passed to [`set_seq`].
    ///
    /// [`set_seq`]: RollingHasher::set_seq
    idx: usize,
    end_reason: EndReason,
}

impl RollingHasher {
    /// Creates a hasher for k-mers of length `k` (1..=16).
    #[must_use]
    pub fn new(k: u32) -> Self {
        Self {
            k,
            mask: hash_mask(k),
            prev: 0,
            has_prev: false,
            end_of_seq: false,
            pos: 0,
            idx: 0,
            end_reason: EndReason::Clean,
        }
    }

    /// The configured k.
    #[must_use]
    pub fn k(&self) -> u32 {
        self.k
    }

    /// Drops all carried state. Use between independent records so a
    /// partially-built hash never spans two of them.
    pub fn reset(&mut self) {
        self.prev = 0;
        self.has_prev = false;
        self.end_of_seq = false;
        self.pos = 0;
        self.idx = 0;
        self.end_reason = EndReason::Clean;
    }

    /// Starts hashing a new buffer, first resolving any skip carried over
    /// from the previous one.
    pub fn set_seq(&mut self, buf: &[u8]) {
        self.idx = 0;
        self.end_of_seq = false;

        let mut lines_to_skip = match self.end_reason {
            EndReason::Clean => 0,
            EndReason::SkipLine => 1,
            EndReason::SkipTwoLines => 2,
        };
        self.end_reason = EndReason::Clean;
        while lines_to_skip > 0 {
            if !self.skip_past_newline(buf) {
                // Ran out of buffer mid-skip; remember what is left.
                self.end_reason = if lines_to_skip == 2 {
                    EndReason::SkipTwoLines
                } else {
                    EndReason::SkipLine
                };
                self.end_of_seq = true;
                return;
            }
            lines_to_skip -= 1;
        }
        if self.idx >= buf.len() {
            self.end_of_seq = true;
        }
    }

    /// Produces the next k-mer hash from the current buffer, or `None` once
    /// the buffer is drained. Call [`set_seq`](Self::set_seq) with the next
    /// chunk to continue.
    pub fn next_hash(&mut self, buf: &[u8], kind: SequenceKind) -> Option<u32> {
        if self.end_of_seq {
            return None;
        }
        let kind = match kind {
            SequenceKind::Binary => SequenceKind::Raw,
            other => other,
        };

        if !self.has_prev {
            return self.build(buf, kind);
        }

        // Newlines are silent inside FASTA/FASTQ records.
        if kind != SequenceKind::Raw && self.idx < buf.len() && buf[self.idx] == b'\n' {
            self.idx += 1;
        }
        if self.idx >= buf.len() {
            // Mid-sequence boundary: keep the previous hash for the next
            // chunk.
            self.end_of_seq = true;
            return None;
        }

        let class = CLASS[buf[self.idx] as usize];
        if class < 4 {
            let hash = ((self.prev << 2) | u32::from(class)) & self.mask;
            self.idx += 1;
            self.prev = hash;
            Some(hash)
        } else {
            self.build(buf, kind)
        }
    }

    /// Builds a hash base-by-base, resuming a partial build when `pos > 0`.
    fn build(&mut self, buf: &[u8], kind: SequenceKind) -> Option<u32> {
        let mut hash = if self.pos > 0 { self.prev } else { 0 };
        let mut filled = self.pos;

        while filled < self.k {
            if self.idx >= buf.len() {
                self.end_of_seq = true;
                self.has_prev = false;
                self.pos = filled;
                self.prev = hash;
                return None;
            }
            let class = CLASS[buf[self.idx] as usize];
            match class {
                0..=3 => {
                    hash = hash * 4 + u32::from(class);
                    filled += 1;
                    self.idx += 1;
                }
                CLASS_NEWLINE if kind != SequenceKind::Raw => {
                    self.idx += 1;
                }
                CLASS_GT if kind == SequenceKind::Fasta => {
                    if !self.restart_after_header(buf, 1) {
                        return None;
                    }
                    hash = 0;
                    filled = 0;
                }
                CLASS_AT if kind == SequenceKind::Fastq => {
                    if !self.restart_after_header(buf, 1) {
                        return None;
                    }
                    hash = 0;
                    filled = 0;
                }
                CLASS_PLUS if kind == SequenceKind::Fastq => {
                    // '+' opens the quality header: its line and the quality
                    // line below it are skipped.
                    if !self.restart_after_header(buf, 2) {
                        return None;
                    }
                    hash = 0;
                    filled = 0;
                }
                _ => {
                    // Any other byte (including '\n' in raw framing) resets
                    // the window.
                    hash = 0;
                    filled = 0;
                    self.pos = 0;
                    self.idx += 1;
                }
            }
        }

        self.pos = 0;
        self.prev = hash;
        self.has_prev = true;
        Some(hash)
    }

    /// Skips `lines` lines starting at a header byte. On success the cursor
    /// sits at the first byte after the skipped lines; on buffer exhaustion
    /// the remaining skip is recorded for the next [`set_seq`].
    ///
    /// [`set_seq`]: RollingHasher::set_seq
    fn restart_after_header(&mut self, buf: &[u8], lines: u8) -> bool {
        self.pos = 0;
        for remaining in (1..=lines).rev() {
            if !self.skip_past_newline(buf) {
                self.end_reason = if remaining == 2 {
                    EndReason::SkipTwoLines
                } else {
                    EndReason::SkipLine
                };
                self.end_of_seq = true;
                self.has_prev = false;
                self.prev = 0;
                return false;
            }
        }
        true
    }

    fn skip_past_newline(&mut self, buf: &[u8]) -> bool {
        while self.idx < buf.len() {
            let byte = buf[self.idx];
            self.idx += 1;
            if byte == b'\n' {
                return true;
            }
        }
        false
    }
}
