//! One-pass filter over a single raw archive: stream, prefix-match, stage matches to a part file.

use crate::archive::{encode_latin1, ArchiveLines};
use crate::filters::TitlePrefixes;
use crate::paths::ArchiveJob;
use crate::util::create_with_backoff;
use anyhow::{Context, Result};
use indicatif::ProgressBar;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

const PROGRESS_EVERY: u64 = 4096;

/// Matches of one archive staged on disk, not yet in the cache.
#[derive(Debug)]
pub struct StagedPart {
    pub path: PathBuf,
    pub lines_scanned: u64,
    pub lines_matched: u64,
}

/// Part file name for the `idx`-th job of a pass. Archives in different folders can share a
/// base name, so the index keeps concurrent parts apart.
pub fn part_name_for_job(idx: u64, job: &ArchiveJob) -> String {
    format!("{idx:06}-{}.part", job.name)
}

/// Stream `job`, keep lines accepted by `filter`, and write each as
/// `<original bytes>|<basename>\n` to `part_path`.
///
/// Any read or write error fails the whole file; the caller discards the part and keeps
/// the input.
pub fn stage_matches(
    job: &ArchiveJob,
    filter: &TitlePrefixes,
    part_path: &Path,
    read_buf_bytes: usize,
    write_buf_bytes: usize,
    pb: Option<&ProgressBar>,
) -> Result<StagedPart> {
    let mut lines = ArchiveLines::open(&job.path, read_buf_bytes)?;
    let source = lines.source().as_bytes().to_vec();

    let file = create_with_backoff(part_path, 16, 50).with_context(|| format!("create {}", part_path.display()))?;
    let mut w = BufWriter::with_capacity(write_buf_bytes, file);
    let mut encoded = Vec::with_capacity(512);
    let mut scanned = 0u64;
    let mut matched = 0u64;

    while let Some(text) = lines.next_text() {
        let text = text?;
        scanned += 1;
        if filter.matches(&text) {
            encoded.clear();
            encode_latin1(&text, &mut encoded);
            encoded.push(b'|');
            encoded.extend_from_slice(&source);
            encoded.push(b'\n');
            w.write_all(&encoded)?;
            matched += 1;
        }
        if scanned % PROGRESS_EVERY == 0 {
            if let Some(pb) = pb { pb.inc(lines.take_progress()); }
        }
    }
    if let Some(pb) = pb { pb.inc(lines.take_progress()); }

    w.flush().with_context(|| format!("flush {}", part_path.display()))?;
    Ok(StagedPart { path: part_path.to_path_buf(), lines_scanned: scanned, lines_matched: matched })
}
