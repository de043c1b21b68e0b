//! Streaming reader for nucleotide sequence files.
//!
//! [`SeqStream`] opens a path or any [`Read`] source, sniffs the first two
//! bytes for gzip (`1F 8B`) or zlib (`78 01/5E/9C/DA`) magic, and exposes the
//! decompressed stream through byte reads, line reads, record reads, and
//! record-respecting chunk reads. The record-respecting readers
//! ([`SeqStream::read_records`]) guarantee that a chunk never ends inside a
//! record: the tail of a partially-read record is copied back into the
//! stream's output buffer and delivered first on the next call.
//!
//! All methods take `&mut self`; the thread-safe variant used by parallel
//! counting passes is a `Mutex<SeqStream>` at the call site, which serializes
//! buffer fills exactly like the locked reader functions of classic C stream
//! libraries while the unlocked path stays free of overhead.

use std::fs::File;
use std::io::{BufReader, Cursor, Read};
use std::path::Path;

use flate2::bufread::{GzDecoder, ZlibDecoder};

use crate::error::StreamError;

/// Default capacity of the buffer feeding the decompressor.
pub const DEFAULT_INPUT_CAPACITY: usize = 8 * 1024;

/// Default capacity of the buffer holding decompressed bytes not yet
/// delivered to the caller.
pub const DEFAULT_OUTPUT_CAPACITY: usize = 16 * 1024;

/// Framing of the sequence data inside a stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SequenceKind {
    /// One sequence per `\n`-terminated line.
    Raw,
    /// `>`-headed records; sequence may wrap over several lines.
    Fasta,
    /// Four-line records; quality line preceded by a `+`-headed line.
    Fastq,
    /// No framing: bytes are delivered as-is.
    Binary,
}

impl std::fmt::Display for SequenceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Raw => write!(f, "raw"),
            Self::Fasta => write!(f, "fasta"),
            Self::Fastq => write!(f, "fastq"),
            Self::Binary => write!(f, "binary"),
        }
    }
}

enum Source {
    Plain(Box<dyn Read + Send>),
    Gzip(Box<GzDecoder<BufReader<ChainedSource>>>),
    Zlib(Box<ZlibDecoder<BufReader<ChainedSource>>>),
}

type ChainedSource = std::io::Chain<Cursor<Vec<u8>>, Box<dyn Read + Send>>;

impl Source {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, StreamError> {
        match self {
            Self::Plain(r) => r.read(buf).map_err(StreamError::Io),
            Self::Gzip(r) => r.read(buf).map_err(StreamError::Decompress),
            Self::Zlib(r) => r.read(buf).map_err(StreamError::Decompress),
        }
    }
}

/// A buffered, decompressing reader over one sequence file.
pub struct SeqStream {
    source: Source,
    kind: SequenceKind,
    out_buf: Vec<u8>,
    /// Start of the undelivered window in `out_buf`.
    next: usize,
    /// Number of undelivered bytes in `out_buf`.
    have: usize,
    eof: bool,
}

impl SeqStream {
    /// Opens a file with default buffer capacities.
    ///
    /// # Errors
    ///
    /// Returns [`StreamError::Open`] if the file cannot be opened.
    pub fn open<P: AsRef<Path>>(path: P, kind: SequenceKind) -> Result<Self, StreamError> {
        Self::open_with_capacities(path, kind, DEFAULT_INPUT_CAPACITY, DEFAULT_OUTPUT_CAPACITY)
    }

    /// Opens a file with explicit input (decompressor-side) and output
    /// (delivery-side) buffer capacities.
    ///
    /// # Errors
    ///
    /// Returns [`StreamError::Open`] if the file cannot be opened.
    pub fn open_with_capacities<P: AsRef<Path>>(
        path: P,
        kind: SequenceKind,
        input_capacity: usize,
        output_capacity: usize,
    ) -> Result<Self, StreamError> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|source| StreamError::Open {
            source,
            path: path.to_path_buf(),
        })?;
        Self::from_reader_with_capacities(Box::new(file), kind, input_capacity, output_capacity)
    }

    /// Wraps an already-open reader with default buffer capacities.
    ///
    /// # Errors
    ///
    /// Returns [`StreamError::Io`] if the magic-byte sniff fails.
    pub fn from_reader(
        reader: Box<dyn Read + Send>,
        kind: SequenceKind,
    ) -> Result<Self, StreamError> {
        Self::from_reader_with_capacities(
            reader,
            kind,
            DEFAULT_INPUT_CAPACITY,
            DEFAULT_OUTPUT_CAPACITY,
        )
    }

    /// Wraps an already-open reader with explicit buffer capacities.
    ///
    /// The first two bytes are read to select the decompression mode and are
    /// chained back in front of the remaining stream, so non-seekable sources
    /// (pipes, sockets) work as well as files.
    ///
    /// # Errors
    ///
    /// Returns [`StreamError::Io`] if the magic-byte sniff fails.
    pub fn from_reader_with_capacities(
        mut reader: Box<dyn Read + Send>,
        kind: SequenceKind,
        input_capacity: usize,
        output_capacity: usize,
    ) -> Result<Self, StreamError> {
        let mut magic = [0u8; 2];
        let mut got = 0;
        while got < 2 {
            match reader.read(&mut magic[got..]) {
                Ok(0) => break,
                Ok(n) => got += n,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => {}
                Err(e) => return Err(StreamError::Io(e)),
            }
        }

        let chained: ChainedSource = Cursor::new(magic[..got].to_vec()).chain(reader);
        let source = match (got, magic) {
            (2, [0x1F, 0x8B]) => Source::Gzip(Box::new(GzDecoder::new(BufReader::with_capacity(
                input_capacity.max(1),
                chained,
            )))),
            (2, [0x78, b]) if matches!(b, 0x01 | 0x5E | 0x9C | 0xDA) => Source::Zlib(Box::new(
                ZlibDecoder::new(BufReader::with_capacity(input_capacity.max(1), chained)),
            )),
            _ => Source::Plain(Box::new(chained)),
        };

        Ok(Self {
            source,
            kind,
            out_buf: vec![0u8; output_capacity.max(64)],
            next: 0,
            have: 0,
            eof: false,
        })
    }

    /// The framing this stream was opened with.
    #[must_use]
    pub fn kind(&self) -> SequenceKind {
        self.kind
    }

    /// `true` once the underlying stream is exhausted *and* all buffered
    /// bytes have been delivered.
    #[must_use]
    pub fn is_eof(&self) -> bool {
        self.eof && self.have == 0
    }

    /// Reads from the source until `buf` is full or the source is done.
    fn read_full(&mut self, buf: &mut [u8]) -> Result<usize, StreamError> {
        let mut filled = 0;
        while filled < buf.len() {
            let n = self.source.read(&mut buf[filled..])?;
            if n == 0 {
                self.eof = true;
                break;
            }
            filled += n;
        }
        Ok(filled)
    }

    /// Refills the internal output buffer.
    fn fetch(&mut self) -> Result<(), StreamError> {
        let mut out = std::mem::take(&mut self.out_buf);
        let n = self.read_full(&mut out);
        self.out_buf = out;
        self.have = n?;
        self.next = 0;
        Ok(())
    }

    /// Guarantees at least one buffered byte unless the stream is exhausted.
    fn ensure(&mut self) -> Result<bool, StreamError> {
        if self.have == 0 && !self.eof {
            self.fetch()?;
        }
        Ok(self.have > 0)
    }

    #[inline]
    fn peek(&self) -> u8 {
        self.out_buf[self.next]
    }

    #[inline]
    fn advance(&mut self, n: usize) {
        self.next += n;
        self.have -= n;
    }

    /// Fills `buf` with up to `buf.len()` decompressed bytes.
    ///
    /// A short read does not imply end of stream; only a zero return after a
    /// non-empty request does.
    ///
    /// # Errors
    ///
    /// Propagates read and decompression failures.
    pub fn read(&mut self, buf: &mut [u8]) -> Result<usize, StreamError> {
        if buf.is_empty() {
            return Ok(0);
        }

        let mut filled = 0;
        if self.have > 0 {
            let n = self.have.min(buf.len());
            buf[..n].copy_from_slice(&self.out_buf[self.next..self.next + n]);
            self.advance(n);
            filled = n;
        }
        if filled < buf.len() && !self.eof {
            filled += self.read_full(&mut buf[filled..])?;
        }
        Ok(filled)
    }

    /// Fills `buf` with as many *whole records* as fit.
    ///
    /// If the last record would not fit entirely, the chunk is truncated at
    /// the last record boundary and the tail is stashed internally for the
    /// next call. This is what makes multi-threaded counting safe: no k-mer
    /// ever spans two chunks handed to different workers.
    ///
    /// Returns 0 at end of stream.
    ///
    /// # Errors
    ///
    /// Returns [`StreamError::RecordTooLarge`] when a single record exceeds
    /// the chunk or the stream's output buffer, and propagates I/O failures.
    pub fn read_records(&mut self, buf: &mut [u8]) -> Result<usize, StreamError> {
        match self.kind {
            SequenceKind::Binary => self.read(buf),
            SequenceKind::Raw => self.read_records_delimited(buf, RecordBoundary::AfterNewline),
            SequenceKind::Fasta => self.read_records_delimited(buf, RecordBoundary::BeforeGt),
            SequenceKind::Fastq => self.read_records_fastq(buf),
        }
    }

    fn read_records_delimited(
        &mut self,
        buf: &mut [u8],
        boundary: RecordBoundary,
    ) -> Result<usize, StreamError> {
        let n = self.read(buf)?;
        if n == 0 {
            return Ok(0);
        }
        if n < buf.len() {
            return Ok(n);
        }

        let cut = match boundary {
            RecordBoundary::AfterNewline => buf[..n]
                .iter()
                .rposition(|&b| b == b'\n')
                .map(|pos| pos + 1),
            RecordBoundary::BeforeGt => buf[..n].iter().rposition(|&b| b == b'>'),
        };
        let Some(cut) = cut.filter(|&c| c > 0) else {
            return Err(StreamError::RecordTooLarge);
        };
        self.stash_tail(&buf[cut..n])?;
        Ok(cut)
    }

    fn read_records_fastq(&mut self, buf: &mut [u8]) -> Result<usize, StreamError> {
        let n = self.read(buf)?;
        if n == 0 {
            return Ok(0);
        }
        if n < buf.len() {
            return Ok(n);
        }

        // Validate a trimming point: an '@' that opens a record must sit two
        // lines below a '+' quality header. Scan '@' candidates backwards
        // until one validates.
        let mut end = n;
        loop {
            let Some(at) = buf[..end].iter().rposition(|&b| b == b'@').filter(|&i| i > 0) else {
                return Err(StreamError::RecordTooLarge);
            };
            let mut pos = at;
            let mut newlines = 0;
            while pos > 0 && newlines < 3 {
                pos -= 1;
                if buf[pos] == b'\n' {
                    newlines += 1;
                }
            }
            if newlines == 3 && buf[pos + 1] == b'+' {
                self.stash_tail(&buf[at..n])?;
                return Ok(at);
            }
            end = at;
        }
    }

    /// Copies an unconsumed record tail back into the output buffer, ahead
    /// of any bytes still waiting there.
    fn stash_tail(&mut self, tail: &[u8]) -> Result<(), StreamError> {
        if tail.len() + self.have > self.out_buf.len() {
            return Err(StreamError::RecordTooLarge);
        }
        self.out_buf.copy_within(self.next..self.next + self.have, tail.len());
        self.out_buf[..tail.len()].copy_from_slice(tail);
        self.next = 0;
        self.have += tail.len();
        Ok(())
    }

    /// Reads one line including its terminating `\n` (when present), with no
    /// format dispatch. Returns `false` at end of stream.
    ///
    /// # Errors
    ///
    /// Propagates read and decompression failures.
    pub fn read_line(&mut self, out: &mut Vec<u8>) -> Result<bool, StreamError> {
        out.clear();
        if self.is_eof() {
            return Ok(false);
        }
        loop {
            if !self.ensure()? {
                return Ok(!out.is_empty());
            }
            let window = &self.out_buf[self.next..self.next + self.have];
            match window.iter().position(|&b| b == b'\n') {
                Some(pos) => {
                    out.extend_from_slice(&window[..=pos]);
                    self.advance(pos + 1);
                    return Ok(true);
                }
                None => {
                    out.extend_from_slice(window);
                    self.advance(window.len());
                }
            }
        }
    }

    /// Reads one record's sequence bytes: no header, no quality line, no
    /// newlines. Returns `false` at end of stream.
    ///
    /// # Errors
    ///
    /// Propagates read and decompression failures.
    pub fn read_record(&mut self, out: &mut Vec<u8>) -> Result<bool, StreamError> {
        match self.kind {
            SequenceKind::Raw | SequenceKind::Binary => {
                let got = self.read_line(out)?;
                if out.last() == Some(&b'\n') {
                    out.pop();
                }
                Ok(got)
            }
            SequenceKind::Fasta => self.read_record_fasta(out),
            SequenceKind::Fastq => self.read_record_fastq(out),
        }
    }

    fn read_record_fasta(&mut self, out: &mut Vec<u8>) -> Result<bool, StreamError> {
        out.clear();
        if !self.skip_header(b'>')? {
            return Ok(false);
        }
        loop {
            if !self.ensure()? {
                return Ok(true);
            }
            if self.peek() == b'>' {
                return Ok(true);
            }
            self.copy_line_bytes(out)?;
        }
    }

    fn read_record_fastq(&mut self, out: &mut Vec<u8>) -> Result<bool, StreamError> {
        out.clear();
        if !self.skip_header(b'@')? {
            return Ok(false);
        }
        loop {
            if !self.ensure()? {
                return Ok(true);
            }
            if self.peek() == b'+' {
                break;
            }
            self.copy_line_bytes(out)?;
        }
        // Skip the '+' header and the quality line.
        self.skip_line()?;
        self.skip_line()?;
        Ok(true)
    }

    /// Copies the current line into `out` without its newline.
    fn copy_line_bytes(&mut self, out: &mut Vec<u8>) -> Result<(), StreamError> {
        loop {
            if !self.ensure()? {
                return Ok(());
            }
            let window = &self.out_buf[self.next..self.next + self.have];
            match window.iter().position(|&b| b == b'\n') {
                Some(pos) => {
                    out.extend_from_slice(&window[..pos]);
                    self.advance(pos + 1);
                    return Ok(());
                }
                None => {
                    out.extend_from_slice(window);
                    self.advance(window.len());
                }
            }
        }
    }

    /// Advances past the next `\n`. Returns `false` if the stream ended
    /// first.
    fn skip_line(&mut self) -> Result<bool, StreamError> {
        loop {
            if !self.ensure()? {
                return Ok(false);
            }
            let window = &self.out_buf[self.next..self.next + self.have];
            match window.iter().position(|&b| b == b'\n') {
                Some(pos) => {
                    self.advance(pos + 1);
                    return Ok(true);
                }
                None => self.advance(window.len()),
            }
        }
    }

    /// Advances past the next `marker` byte and then past the end of that
    /// line. Returns `false` if the stream ended first.
    fn skip_header(&mut self, marker: u8) -> Result<bool, StreamError> {
        loop {
            if !self.ensure()? {
                return Ok(false);
            }
            let window = &self.out_buf[self.next..self.next + self.have];
            match window.iter().position(|&b| b == marker) {
                Some(pos) => {
                    self.advance(pos + 1);
                    return self.skip_line();
                }
                None => self.advance(window.len()),
            }
        }
    }

    /// Returns the next raw byte, or `None` at end of stream.
    ///
    /// # Errors
    ///
    /// Propagates read and decompression failures.
    pub fn next_byte(&mut self) -> Result<Option<u8>, StreamError> {
        if !self.ensure()? {
            return Ok(None);
        }
        let byte = self.peek();
        self.advance(1);
        Ok(Some(byte))
    }

    /// Returns the next sequence-line byte, skipping record headers, quality
    /// lines, and newlines according to the stream's framing. `None` at end
    /// of stream.
    ///
    /// # Errors
    ///
    /// Propagates read and decompression failures.
    pub fn next_nt(&mut self) -> Result<Option<u8>, StreamError> {
        if !self.ensure()? {
            return Ok(None);
        }
        if self.kind != SequenceKind::Binary && self.peek() == b'\n' {
            self.advance(1);
            if !self.ensure()? {
                return Ok(None);
            }
        }
        match self.kind {
            SequenceKind::Fasta => {
                while self.peek() == b'>' {
                    if !self.skip_line()? || !self.ensure()? {
                        return Ok(None);
                    }
                }
            }
            SequenceKind::Fastq => loop {
                match self.peek() {
                    b'@' => {
                        if !self.skip_line()? || !self.ensure()? {
                            return Ok(None);
                        }
                    }
                    b'+' => {
                        // Quality header: skip to the next record's sequence.
                        if !self.skip_header(b'@')? || !self.ensure()? {
                            return Ok(None);
                        }
                    }
                    _ => break,
                }
            },
            SequenceKind::Raw | SequenceKind::Binary => {}
        }
        let byte = self.peek();
        self.advance(1);
        Ok(Some(byte))
    }
}

enum RecordBoundary {
    /// Raw mode: cut just after the last `\n`.
    AfterNewline,
    /// FASTA mode: cut just before the last `>`.
    BeforeGt,
}
