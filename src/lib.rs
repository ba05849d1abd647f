mod config;
mod date;
mod errors;
mod paths;
mod archive;
mod titles;

mod filters;
mod progress;
mod concurrency;
mod streaming;
mod cache;
mod util;
mod mem;
mod pipeline;

mod key_extractor;
mod kv_shard;
mod aggregate;
mod integrity;

pub use crate::config::PipelineOptions;
pub use crate::date::PageDate;
pub use crate::pipeline::{FilterReport, PageviewETL};

// Error kinds collected into run reports.
pub use crate::errors::{ArchiveError, MissingTitle, ParseError};

// Title expansion and canonical join.
pub use crate::titles::{raw_bytes_spelling, TitleExceptions, TitleExpander, TitleRegistry, VariantIndex};

// Streaming archive reader and its byte-preserving codec.
pub use crate::archive::{decode_latin1, encode_latin1, restore_utf8, ArchiveLines, RawLogLine};
pub use crate::archive::{quick_validate_gz, validate_gz_full};

pub use crate::filters::{matches, TitlePrefixes};
pub use crate::paths::{discover_archives, ArchiveJob, DEFAULT_ARCHIVE_PATTERNS};
pub use crate::cache::CacheAppender;

pub use crate::key_extractor::{split_key, CountKey, KeyExtractor};
pub use crate::aggregate::{CountRecord, DailyCounts, ReduceJob, ReduceMode, ReduceReport};

pub use crate::integrity::IntegrityMode;
pub use crate::progress::{make_count_progress, make_progress_bar_labeled};
pub use crate::util::init_tracing_once;
