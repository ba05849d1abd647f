use crate::aggregate::{ReduceJob, ReduceMode, ReduceReport};
use crate::cache::CacheAppender;
use crate::config::PipelineOptions;
use crate::date::PageDate;
use crate::filters::TitlePrefixes;
use crate::key_extractor::KeyExtractor;
use crate::paths::{compile_patterns, discover_archives, plan_archives, ArchiveJob};
use crate::progress::{file_len, make_progress_bar_labeled, total_compressed_size};
use crate::streaming::{part_name_for_job, stage_matches};
use crate::titles::{TitleExceptions, TitleExpander, TitleRegistry, VariantIndex};
use crate::util::{init_tracing_once, remove_with_backoff};
use anyhow::{Context, Result};
use indicatif::ProgressBar;
use parking_lot::Mutex;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

#[derive(Clone)]
pub struct PageviewETL {
    pub(crate) opts: PipelineOptions,
}

impl Default for PageviewETL {
    fn default() -> Self {
        Self::new()
    }
}

/// Outcome of one filter pass.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FilterReport {
    pub files_seen: u64,
    /// Archives read to the end and (unless dry-running) appended.
    pub files_processed: u64,
    pub lines_scanned: u64,
    /// Lines written to the cache; in a dry run, lines that would have been.
    pub lines_appended: u64,
    pub deleted: Vec<PathBuf>,
    /// Archives left in place because filtering, appending or deletion failed.
    pub failed: Vec<(PathBuf, String)>,
}

/// Per-archive result inside a filter pass.
struct FileDone {
    scanned: u64,
    appended: u64,
    deleted: bool,
}

impl PageviewETL {
    pub fn new() -> Self {
        Self { opts: PipelineOptions::default() }
    }

    pub fn from_options(opts: PipelineOptions) -> Self {
        Self { opts }
    }

    pub fn options(&self) -> &PipelineOptions {
        &self.opts
    }

    // -------- Builder methods --------
    pub fn input_dir(mut self, dir: impl AsRef<Path>) -> Self { self.opts = self.opts.with_input_dir(dir); self }
    pub fn cache_path(mut self, path: impl AsRef<Path>) -> Self { self.opts = self.opts.with_cache_path(path); self }
    pub fn counts_path(mut self, path: impl AsRef<Path>) -> Self { self.opts = self.opts.with_counts_path(path); self }
    pub fn work_dir(mut self, dir: impl AsRef<Path>) -> Self { self.opts = self.opts.with_work_dir(dir); self }
    pub fn project(mut self, project: impl AsRef<str>) -> Self { self.opts = self.opts.with_project(project); self }
    pub fn archive_patterns<I, S>(mut self, patterns: I) -> Self where I: IntoIterator<Item = S>, S: Into<String> { self.opts = self.opts.with_archive_patterns(patterns); self }
    pub fn date_range(mut self, start: Option<PageDate>, end: Option<PageDate>) -> Self { self.opts = self.opts.with_date_range(start, end); self }
    pub fn delete_inputs(mut self, yes: bool) -> Self { self.opts = self.opts.with_delete_inputs(yes); self }
    pub fn dry_run(mut self, yes: bool) -> Self { self.opts = self.opts.with_dry_run(yes); self }
    pub fn parallelism(mut self, threads: usize) -> Self { self.opts = self.opts.with_parallelism(threads); self }
    pub fn file_concurrency(mut self, n: usize) -> Self { self.opts = self.opts.with_file_concurrency(n); self }
    pub fn progress(mut self, yes: bool) -> Self { self.opts = self.opts.with_progress(yes); self }
    pub fn progress_label(mut self, label: impl Into<String>) -> Self { self.opts = self.opts.with_progress_label(label); self }
    pub fn reduce_mode(mut self, mode: ReduceMode) -> Self { self.opts = self.opts.with_reduce_mode(mode); self }
    pub fn canonical_titles(mut self, yes: bool) -> Self { self.opts = self.opts.with_canonical_titles(yes); self }
    pub fn io_buffers(mut self, read_bytes: usize, write_bytes: usize) -> Self { self.opts = self.opts.with_io_buffers(read_bytes, write_bytes); self }

    pub(crate) fn install_thread_pool(&self) {
        if let Some(n) = self.opts.parallelism {
            if n > 0 {
                rayon::ThreadPoolBuilder::new().num_threads(n).build_global().ok();
            }
        }
    }

    pub(crate) fn ensure_work_dir(&self) -> Result<PathBuf> {
        let dir = match &self.opts.work_dir {
            Some(d) => d.clone(),
            None => self
                .opts
                .cache_path
                .parent()
                .map(|p| p.join(".pvetl_work"))
                .unwrap_or_else(|| PathBuf::from(".pvetl_work")),
        };
        fs::create_dir_all(&dir).with_context(|| format!("create {}", dir.display()))?;
        Ok(dir)
    }

    /// Archives the next filter pass would read.
    pub fn planned_archives(&self) -> Result<Vec<ArchiveJob>> {
        let patterns = compile_patterns(&self.opts.archive_patterns)?;
        Ok(plan_archives(discover_archives(&self.opts.input_dir, &patterns), self.opts.start, self.opts.end))
    }

    // -------- Filter stage --------

    /// Filter every planned archive against `"<project> <title> "` prefixes and append the
    /// matches, tagged with their source filename, to the cache.
    ///
    /// Each archive is staged, appended as one synced gzip member, and only then deleted
    /// (when deletion is enabled). An archive that fails anywhere before its append is left
    /// untouched and contributes nothing to the cache.
    pub fn filter_raws<S: AsRef<str>>(&self, titles: &[S]) -> Result<FilterReport> {
        init_tracing_once();
        self.install_thread_pool();
        let t0 = Instant::now();

        let filter = TitlePrefixes::new(&self.opts.project, titles.iter().map(|t| t.as_ref().to_string()));
        let files = self.planned_archives()?;
        let total = files.len();
        let mut report = FilterReport { files_seen: total as u64, ..Default::default() };

        if files.is_empty() {
            tracing::warn!("No archives found under {}. Check input folder and patterns.", self.opts.input_dir.display());
            return Ok(report);
        }
        tracing::info!("Processing {} files against {} title spellings..", total, filter.len());
        if self.opts.dry_run {
            tracing::info!("Dry run: nothing will be appended or deleted");
        }

        let parts_dir = self.ensure_work_dir()?.join("filter_parts");
        fs::create_dir_all(&parts_dir).with_context(|| format!("create {}", parts_dir.display()))?;

        let appender = if self.opts.dry_run { None } else { Some(Mutex::new(CacheAppender::open(&self.opts.cache_path)?)) };
        let pb = if self.opts.progress {
            Some(make_progress_bar_labeled(total_compressed_size(&files), self.opts.progress_label.as_deref()))
        } else {
            None
        };
        let started = AtomicU64::new(0);

        let outcomes = crate::concurrency::map_files_limited(&files, self.opts.file_concurrency, |job| {
            let i = started.fetch_add(1, Ordering::Relaxed) + 1;
            tracing::info!("Input {}/{}: {}", i, total, job.name);
            self.filter_one(i, job, &filter, &parts_dir, appender.as_ref(), pb.as_ref())
        });

        for (job, outcome) in files.iter().zip(outcomes) {
            match outcome {
                Ok(done) => {
                    report.files_processed += 1;
                    report.lines_scanned += done.scanned;
                    report.lines_appended += done.appended;
                    if done.deleted {
                        report.deleted.push(job.path.clone());
                    }
                }
                Err(e) => {
                    tracing::warn!(path=%job.path.display(), error=%format!("{e:#}"), "Archive left in place");
                    report.failed.push((job.path.clone(), format!("{e:#}")));
                }
            }
        }
        if let Some(pb) = pb { pb.finish_with_message("done"); }

        if self.opts.dry_run {
            tracing::info!("Dry run matched {} lines", report.lines_appended);
        } else {
            tracing::info!("Appended {} lines to: {}", report.lines_appended, self.opts.cache_path.display());
        }
        if !report.deleted.is_empty() {
            tracing::info!("Deleted {} input files", report.deleted.len());
        }
        if !report.failed.is_empty() {
            tracing::warn!("{} archives failed and were kept for a later run", report.failed.len());
        }
        tracing::info!("--- {:.3} minutes ---", t0.elapsed().as_secs_f64() / 60.0);
        Ok(report)
    }

    fn filter_one(
        &self,
        idx: u64,
        job: &ArchiveJob,
        filter: &TitlePrefixes,
        parts_dir: &Path,
        appender: Option<&Mutex<CacheAppender>>,
        pb: Option<&ProgressBar>,
    ) -> Result<FileDone> {
        let part_path = parts_dir.join(part_name_for_job(idx, job));
        let staged = match stage_matches(
            job,
            filter,
            &part_path,
            self.opts.read_buffer_bytes,
            self.opts.write_buffer_bytes,
            pb,
        ) {
            Ok(s) => s,
            Err(e) => {
                let _ = fs::remove_file(&part_path);
                return Err(e.context(format!("filtering {}", job.path.display())));
            }
        };
        tracing::debug!(name=%job.name, scanned=staged.lines_scanned, matched=staged.lines_matched, "Staged part");

        let appended = match appender {
            Some(app) if staged.lines_matched > 0 => {
                let res = app.lock().append_part(&staged.path);
                let _ = fs::remove_file(&staged.path);
                res?;
                staged.lines_matched
            }
            _ => {
                let _ = fs::remove_file(&staged.path);
                if appender.is_some() { 0 } else { staged.lines_matched }
            }
        };

        let mut deleted = false;
        if self.opts.delete_inputs && appender.is_some() {
            remove_with_backoff(&job.path, 16, 50)
                .with_context(|| format!("{} lines appended but input not deleted", appended))?;
            tracing::info!(path=%job.path.display(), "Deleted input file");
            deleted = true;
        }
        Ok(FileDone { scanned: staged.lines_scanned, appended, deleted })
    }

    /// Filter using every spelling the expander derives from `registry` and `exceptions`.
    pub fn filter_with_registry(&self, registry: &TitleRegistry, exceptions: &TitleExceptions) -> Result<FilterReport> {
        let titles = TitleExpander::new(registry, exceptions).expand();
        self.filter_raws(&titles)
    }

    // -------- Reduce stage --------

    /// Sum views per `(date, title)` over the whole cache and write the counts table.
    /// With an index, logged spellings are folded into their canonical titles and
    /// unmapped titles are dropped and counted.
    pub fn reduce_counts(&self, index: Option<&VariantIndex>) -> Result<ReduceReport> {
        init_tracing_once();
        self.install_thread_pool();
        let t0 = Instant::now();
        let cache = &self.opts.cache_path;
        tracing::info!("Calculating views per day from: {}", cache.display());

        let work_dir = self.ensure_work_dir()?;
        let job = ReduceJob {
            extractor: KeyExtractor::new(),
            index,
            mode: self.opts.reduce_mode,
            work_dir: &work_dir,
            read_buf_bytes: self.opts.read_buffer_bytes,
            write_buf_bytes: self.opts.write_buffer_bytes,
        };
        let pb = if self.opts.progress {
            Some(make_progress_bar_labeled(file_len(cache), Some("Reduce")))
        } else {
            None
        };
        let report = job.run(cache, &self.opts.counts_path, pb.as_ref())?;
        if let Some(pb) = pb { pb.finish_with_message("done"); }

        if report.malformed > 0 || report.unmapped > 0 {
            tracing::warn!(
                "Dropped {} malformed and {} unmapped lines out of {}",
                report.malformed, report.unmapped, report.lines_read
            );
        }
        tracing::info!("Saved {} rows: {}", report.records, self.opts.counts_path.display());
        tracing::info!("--- {:.3} minutes ---", t0.elapsed().as_secs_f64() / 60.0);
        Ok(report)
    }

    /// Filter then reduce, canonicalizing titles unless disabled in the options.
    pub fn run(&self, registry: &TitleRegistry, exceptions: &TitleExceptions) -> Result<(FilterReport, ReduceReport)> {
        let filtered = self.filter_with_registry(registry, exceptions)?;
        let index = if self.opts.canonicalize_titles { Some(VariantIndex::build(registry, exceptions)?) } else { None };
        let reduced = self.reduce_counts(index.as_ref())?;
        Ok((filtered, reduced))
    }
}
