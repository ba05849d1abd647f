//! Concurrency helper: limit the number of archives decoded in parallel.

use crate::paths::ArchiveJob;
use rayon::prelude::*;

/// Run `f` over every job with at most `limit` in flight. Per-job outcomes are returned in
/// job order; one failing job never stops the others.
pub fn map_files_limited<T, F>(files: &[ArchiveJob], limit: usize, f: F) -> Vec<T>
where
    T: Send,
    F: Sync + Fn(&ArchiveJob) -> T,
{
    if limit <= 1 {
        return files.iter().map(&f).collect();
    }
    let mut out = Vec::with_capacity(files.len());
    for chunk in files.chunks(limit) {
        out.extend(chunk.par_iter().map(&f).collect::<Vec<_>>());
    }
    out
}
