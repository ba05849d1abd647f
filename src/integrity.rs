use crate::archive::{quick_validate_gz, validate_gz_full};
use crate::paths::{compile_patterns, discover_archives, plan_archives};
use crate::progress::make_count_progress;
use crate::util::init_tracing_once;
use crate::PageviewETL;
use anyhow::Result;
use rayon::prelude::*;
use std::path::PathBuf;

/// Mode for integrity checks.
#[derive(Clone, Copy, Debug)]
pub enum IntegrityMode {
    /// Decode only the first `sample_bytes` (decompressed) per file.
    /// Fast and catches early corruption; cannot detect late/trailing corruption.
    Quick { sample_bytes: u64 },
    /// Decode every gzip member to EOF, checking CRC trailers.
    Full,
}

impl PageviewETL {
    /// Check every raw archive selected by the configured input folder, patterns and date
    /// range. Returns `(path, error_message)` for archives that fail to decode.
    /// Nothing is filtered, appended or deleted.
    pub fn check_integrity(&self, mode: IntegrityMode) -> Result<Vec<(PathBuf, String)>> {
        init_tracing_once();
        self.install_thread_pool();

        let patterns = compile_patterns(&self.opts.archive_patterns)?;
        let files = plan_archives(discover_archives(&self.opts.input_dir, &patterns), self.opts.start, self.opts.end);

        let label = match mode {
            IntegrityMode::Quick { .. } => "Integrity (quick)",
            IntegrityMode::Full => "Integrity (full)",
        };
        let pb = if self.opts.progress { Some(make_count_progress(files.len() as u64, label)) } else { None };

        let check = |path: &std::path::Path| match mode {
            IntegrityMode::Quick { sample_bytes } => quick_validate_gz(path, sample_bytes),
            IntegrityMode::Full => validate_gz_full(path),
        };

        let mut errors = Vec::new();
        // Bound parallelism to file_concurrency to avoid excessive I/O pressure.
        for chunk in files.chunks(self.opts.file_concurrency.max(1)) {
            let bad: Vec<(PathBuf, String)> = chunk
                .par_iter()
                .filter_map(|job| {
                    let res = check(&job.path);
                    if let Some(pb) = &pb { pb.inc(1); }
                    res.err().map(|e| (job.path.clone(), e.to_string()))
                })
                .collect();
            errors.extend(bad);
        }

        if let Some(pb) = pb {
            pb.finish_with_message("done");
        }
        for (path, err) in &errors {
            tracing::warn!(path=%path.display(), error=%err, "Archive failed integrity check");
        }
        Ok(errors)
    }
}
