use crate::aggregate::ReduceMode;
use crate::date::PageDate;
use crate::paths::DEFAULT_ARCHIVE_PATTERNS;
use std::path::{Path, PathBuf};

/// User-facing options with sensible defaults and builder chaining.
#[derive(Clone, Debug)]
pub struct PipelineOptions {
    pub input_dir: PathBuf,            // tree of raw hourly archives
    pub cache_path: PathBuf,           // accumulation cache (gzip, append-only)
    pub counts_path: PathBuf,          // final date,title,views table
    pub work_dir: Option<PathBuf>,     // if None, `<cache dir>/.pvetl_work/`
    pub project: String,               // log project code, e.g. "en"
    pub archive_patterns: Vec<String>, // regexes over base file names
    pub start: Option<PageDate>,       // inclusive
    pub end: Option<PageDate>,         // inclusive
    pub delete_inputs: bool,           // destructive; opt-in
    pub dry_run: bool,                 // filter and count only: no append, no delete
    pub parallelism: Option<usize>,    // Some(N) to set rayon threads, None to use default
    pub file_concurrency: usize,       // archives filtered concurrently
    pub progress: bool,
    pub progress_label: Option<String>,
    pub reduce_mode: ReduceMode,
    pub canonicalize_titles: bool,     // map logged spellings to registry titles in `run`

    // IO tuning
    pub read_buffer_bytes: usize,
    pub write_buffer_bytes: usize,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            input_dir: PathBuf::from("./pagecounts-raw"),
            cache_path: PathBuf::from("./cache/pv/pageviews.gz"),
            counts_path: PathBuf::from("./cache/viewsperday.csv"),
            work_dir: None,
            project: "en".to_string(),
            archive_patterns: DEFAULT_ARCHIVE_PATTERNS.iter().map(|s| s.to_string()).collect(),
            start: None,
            end: None,
            delete_inputs: false,
            dry_run: false,
            parallelism: None,
            file_concurrency: 1,
            progress: true,
            progress_label: None,
            reduce_mode: ReduceMode::default(),
            canonicalize_titles: true,

            read_buffer_bytes: 256 * 1024,
            write_buffer_bytes: 256 * 1024,
        }
    }
}

impl PipelineOptions {
    pub fn with_input_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.input_dir = dir.as_ref().to_path_buf();
        self
    }
    pub fn with_cache_path(mut self, path: impl AsRef<Path>) -> Self {
        self.cache_path = path.as_ref().to_path_buf();
        self
    }
    pub fn with_counts_path(mut self, path: impl AsRef<Path>) -> Self {
        self.counts_path = path.as_ref().to_path_buf();
        self
    }
    pub fn with_work_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.work_dir = Some(dir.as_ref().to_path_buf());
        self
    }
    pub fn with_project(mut self, project: impl AsRef<str>) -> Self {
        self.project = project.as_ref().trim().to_string();
        self
    }
    pub fn with_archive_patterns<I, S>(mut self, patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.archive_patterns = patterns.into_iter().map(Into::into).collect();
        self
    }
    pub fn with_date_range(mut self, start: Option<PageDate>, end: Option<PageDate>) -> Self {
        self.start = start;
        self.end = end;
        self
    }
    pub fn with_delete_inputs(mut self, yes: bool) -> Self {
        self.delete_inputs = yes;
        self
    }
    pub fn with_dry_run(mut self, yes: bool) -> Self {
        self.dry_run = yes;
        self
    }
    pub fn with_parallelism(mut self, threads: usize) -> Self {
        self.parallelism = Some(threads);
        self
    }
    pub fn with_file_concurrency(mut self, n: usize) -> Self {
        self.file_concurrency = n.max(1);
        self
    }
    pub fn with_progress(mut self, yes: bool) -> Self {
        self.progress = yes;
        self
    }
    pub fn with_progress_label(mut self, label: impl Into<String>) -> Self {
        self.progress_label = Some(label.into());
        self
    }
    pub fn with_reduce_mode(mut self, mode: ReduceMode) -> Self {
        self.reduce_mode = mode;
        self
    }
    pub fn with_canonical_titles(mut self, yes: bool) -> Self {
        self.canonicalize_titles = yes;
        self
    }
    pub fn with_io_buffers(mut self, read_bytes: usize, write_bytes: usize) -> Self {
        self.read_buffer_bytes = read_bytes.max(8 * 1024);
        self.write_buffer_bytes = write_bytes.max(8 * 1024);
        self
    }
}
