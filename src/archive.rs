//! Streaming gzip line reader with a byte-preserving latin-1 codec, plus integrity validators.
//!
//! Raw pagecount dumps are not UTF-8 clean, so every byte decodes to the char with the same
//! code point and encodes back to the identical byte.

use crate::errors::ArchiveError;
use crate::util::open_with_backoff;
use flate2::read::MultiGzDecoder;
use std::borrow::Cow;
use std::fs::File;
use std::io::{self, BufRead, BufReader, Read};
use std::path::Path;
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};

// ----------------------------- Codec ------------------------------------

#[inline]
pub fn decode_latin1(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| b as char).collect()
}

/// Inverse of `decode_latin1`. Chars above U+00FF cannot come out of the decoder;
/// if one is handed in anyway it is written as `?`.
pub fn encode_latin1(s: &str, out: &mut Vec<u8>) {
    out.extend(s.chars().map(|c| u8::try_from(u32::from(c)).unwrap_or(b'?')));
}

/// Undo a latin-1 decode of UTF-8 text: if the code points are all bytes and those bytes
/// are valid UTF-8, return the UTF-8 reading, otherwise return the input unchanged.
pub fn restore_utf8(s: &str) -> Cow<'_, str> {
    if s.is_ascii() {
        return Cow::Borrowed(s);
    }
    let mut bytes = Vec::with_capacity(s.len());
    for c in s.chars() {
        match u8::try_from(u32::from(c)) {
            Ok(b) => bytes.push(b),
            Err(_) => return Cow::Borrowed(s),
        }
    }
    match String::from_utf8(bytes) {
        Ok(utf8) => Cow::Owned(utf8),
        Err(_) => Cow::Borrowed(s),
    }
}

// ----------------------------- Streaming ----------------------------------

/// One decoded archive line tagged with the archive's base filename.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RawLogLine {
    pub text: String,
    pub source: String,
}

/// A `Read` wrapper that counts compressed bytes read.
struct CountingReader<R: Read> {
    inner: R,
    counter: Arc<AtomicU64>,
}
impl<R: Read> Read for CountingReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.counter.fetch_add(n as u64, Ordering::Relaxed);
        Ok(n)
    }
}

/// Lazy, single-pass line source over one gzip archive.
///
/// Memory is one reusable line buffer plus the decoder window, independent of file size.
/// Iteration yields `Err` once on a decode failure and then stops.
pub struct ArchiveLines {
    reader: BufReader<MultiGzDecoder<CountingReader<File>>>,
    source: String,
    path: std::path::PathBuf,
    buf: Vec<u8>,
    counter: Arc<AtomicU64>,
    reported: u64,
    done: bool,
}

impl ArchiveLines {
    pub fn open(path: &Path, read_buf_bytes: usize) -> Result<Self, ArchiveError> {
        let file = open_with_backoff(path, 16, 50)
            .map_err(|source| ArchiveError { path: path.to_path_buf(), source })?;
        let counter = Arc::new(AtomicU64::new(0));
        let cnt = CountingReader { inner: file, counter: counter.clone() };
        let decoder = MultiGzDecoder::new(cnt);
        let source = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Ok(Self {
            reader: BufReader::with_capacity(read_buf_bytes.max(8 * 1024), decoder),
            source,
            path: path.to_path_buf(),
            buf: Vec::with_capacity(1024),
            counter,
            reported: 0,
            done: false,
        })
    }

    /// Base filename every yielded line is tagged with.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Compressed bytes consumed since the previous call.
    pub fn take_progress(&mut self) -> u64 {
        let cur = self.counter.load(Ordering::Relaxed);
        let delta = cur.saturating_sub(self.reported);
        self.reported = cur;
        delta
    }

    /// Read the next line into the internal buffer and return it decoded, without
    /// allocating a `RawLogLine`. Used by the filter hot loop.
    pub fn next_text(&mut self) -> Option<Result<String, ArchiveError>> {
        if self.done {
            return None;
        }
        self.buf.clear();
        match self.reader.read_until(b'\n', &mut self.buf) {
            Ok(0) => {
                self.done = true;
                None
            }
            Ok(_) => {
                while matches!(self.buf.last(), Some(b'\n') | Some(b'\r')) {
                    self.buf.pop();
                }
                Some(Ok(decode_latin1(&self.buf)))
            }
            Err(source) => {
                self.done = true;
                Some(Err(ArchiveError { path: self.path.clone(), source }))
            }
        }
    }
}

impl Iterator for ArchiveLines {
    type Item = Result<RawLogLine, ArchiveError>;

    fn next(&mut self) -> Option<Self::Item> {
        let text = self.next_text()?;
        Some(text.map(|text| RawLogLine { text, source: self.source.clone() }))
    }
}

// ----------------------------- Integrity checks ----------------------------------

/// QUICK check: attempt to decode up to `max_decompressed_bytes` and stop.
pub fn quick_validate_gz(path: &Path, max_decompressed_bytes: u64) -> io::Result<()> {
    let file = open_with_backoff(path, 16, 50)?;
    let mut limited = MultiGzDecoder::new(file).take(max_decompressed_bytes);
    io::copy(&mut limited, &mut io::sink())?;
    Ok(())
}

/// FULL check: decode every member to EOF (validates CRC32 trailers).
pub fn validate_gz_full(path: &Path) -> io::Result<()> {
    let file = open_with_backoff(path, 16, 50)?;
    let mut decoder = MultiGzDecoder::new(file);
    io::copy(&mut decoder, &mut io::sink())?;
    Ok(())
}
