//! Sequence file type detection.
//!
//! Classifies a file as FASTA, FASTQ, or raw one-sequence-per-line by
//! scoring its first ten lines. Known caveat, preserved on purpose: a FASTQ
//! file whose quality lines begin with `>` or `;` can be misclassified as
//! FASTA.

use std::path::Path;

use crate::error::DetectError;
use crate::nucleotide::is_nucleotide;
use crate::stream::{SeqStream, SequenceKind};

const DETECT_LINES: usize = 10;

/// Classifies the file at `path` by reading up to ten lines.
///
/// Scoring:
/// - a line starting with `@` at position 1 (mod 4) or `+` at position 3
///   (mod 4) counts toward FASTQ;
/// - a line starting with `>` or `;` counts toward FASTA;
/// - otherwise a line whose bytes are more than 90% nucleotides counts
///   toward raw.
///
/// Decision order: FASTQ wins with two hits, then FASTA with one, then raw
/// if every line scored as a sequence.
///
/// # Errors
///
/// Returns [`DetectError::UnknownFormat`] when no framing matches, and
/// propagates stream failures.
pub fn detect_format<P: AsRef<Path>>(path: P) -> Result<SequenceKind, DetectError> {
    let mut stream = SeqStream::open(path, SequenceKind::Binary)?;
    detect_from_stream(&mut stream)
}

/// Classifies an already-open binary stream. Consumes up to ten lines.
///
/// # Errors
///
/// Returns [`DetectError::UnknownFormat`] when no framing matches, and
/// propagates stream failures.
pub fn detect_from_stream(stream: &mut SeqStream) -> Result<SequenceKind, DetectError> {
    let mut fastq_score = 0u32;
    let mut fasta_score = 0u32;
    let mut sequence_lines = 0usize;
    let mut lines_read = 0usize;

    let mut line = Vec::new();
    while lines_read < DETECT_LINES && stream.read_line(&mut line)? {
        lines_read += 1;
        match line.first().copied() {
            Some(b'@') if lines_read % 4 == 1 => fastq_score += 1,
            Some(b'+') if lines_read % 4 == 3 => fastq_score += 1,
            Some(b'>' | b';') => fasta_score += 1,
            Some(_) => {
                // The trailing newline counts toward the total, as the
                // original line-oriented scorer did.
                let total = line.len();
                let nts = line.iter().filter(|&&b| is_nucleotide(b)).count();
                if nts as f64 / total as f64 > 0.9 {
                    sequence_lines += 1;
                }
            }
            None => {}
        }
    }

    if fastq_score >= 2 {
        Ok(SequenceKind::Fastq)
    } else if fasta_score >= 1 {
        Ok(SequenceKind::Fasta)
    } else if sequence_lines == DETECT_LINES {
        Ok(SequenceKind::Raw)
    } else {
        Err(DetectError::UnknownFormat)
    }
}
