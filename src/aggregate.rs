//! Reduce stage: group cache lines by `date|title`, sum views, write the daily counts table.
//!
//! Summation is order-independent, so the in-memory map, the disk shards, and any mix of the
//! two (adaptive spill) produce the same records.

use crate::archive::{restore_utf8, ArchiveLines};
use crate::key_extractor::{split_key, KeyExtractor};
use crate::kv_shard::ShardedKVWriter;
use crate::mem::MemoryProbe;
use crate::titles::VariantIndex;
use crate::util::{create_with_backoff, replace_file_atomic_backoff};
use ahash::AHashMap;
use anyhow::{anyhow, Context, Result};
use indicatif::ProgressBar;
use std::fs;
use std::io::{BufWriter, Write};
use std::path::Path;

const MEMORY_CHECK_EVERY: u64 = 65_536;
const LOW_MEMORY_FRACTION: f64 = 0.10;

/// How the group-by-key step is executed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReduceMode {
    /// One hash map for the whole cache.
    InMemory,
    /// Every pair goes through disk shards; shards are summed in parallel.
    Sharded { shards: usize },
    /// In memory until available RAM drops below 10%, then spill the partial map to shards.
    Adaptive { shards: usize },
}

impl Default for ReduceMode {
    fn default() -> Self {
        ReduceMode::Adaptive { shards: 64 }
    }
}

/// One output row.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CountRecord {
    pub date: String,
    pub title: String,
    pub views: u128,
}

/// Per-key view sums with a widening accumulator.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DailyCounts {
    sums: AHashMap<String, u128>,
}

impl DailyCounts {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ingest(&mut self, key: String, views: u128) -> Result<()> {
        let slot = self.sums.entry(key).or_insert(0);
        *slot = slot.checked_add(views).ok_or_else(|| anyhow!("view count overflow"))?;
        Ok(())
    }

    pub fn merge(&mut self, other: DailyCounts) -> Result<()> {
        for (k, v) in other.sums {
            self.ingest(k, v)?;
        }
        Ok(())
    }

    pub fn get(&self, date: &str, title: &str) -> Option<u128> {
        self.sums.get(&format!("{date}|{title}")).copied()
    }

    pub fn len(&self) -> usize { self.sums.len() }
    pub fn is_empty(&self) -> bool { self.sums.is_empty() }

    /// Records sorted by `(date, title)`.
    pub fn records(&self) -> Vec<CountRecord> {
        let mut out: Vec<CountRecord> = self.sums.iter().filter_map(|(k, v)| to_record(k, *v)).collect();
        out.sort();
        out
    }

    fn drain_into(&mut self, spill: &mut ShardedKVWriter) -> Result<()> {
        for (k, v) in self.sums.drain() {
            spill.write_kv(&k, v)?;
        }
        Ok(())
    }
}

impl From<AHashMap<String, u128>> for DailyCounts {
    fn from(sums: AHashMap<String, u128>) -> Self {
        Self { sums }
    }
}

fn to_record(key: &str, views: u128) -> Option<CountRecord> {
    let (date, title) = split_key(key)?;
    Some(CountRecord { date: date.to_string(), title: title.to_string(), views })
}

/// Outcome of one reduce run.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ReduceReport {
    pub lines_read: u64,
    pub records: u64,
    /// Lines dropped because they did not parse (bad schema, non-numeric views, bad date).
    pub malformed: u64,
    /// Lines dropped because their title has no registry mapping (canonicalizing runs only).
    pub unmapped: u64,
    pub spilled: bool,
}

/// Settings for one reduce pass.
pub struct ReduceJob<'a> {
    pub extractor: KeyExtractor,
    pub index: Option<&'a VariantIndex>,
    pub mode: ReduceMode,
    pub work_dir: &'a Path,
    pub read_buf_bytes: usize,
    pub write_buf_bytes: usize,
}

impl ReduceJob<'_> {
    /// Title as it goes into the key: canonical when an index is present, otherwise the
    /// logged spelling restored to UTF-8 where possible.
    fn resolve_title(&self, logged: &str) -> Result<String, crate::errors::MissingTitle> {
        match self.index {
            Some(index) => index
                .canonical(logged)
                .or_else(|e| index.canonical(&restore_utf8(logged)).map_err(|_| e))
                .map(str::to_string),
            None => Ok(restore_utf8(logged).into_owned()),
        }
    }

    /// Stream `cache`, reduce, and atomically write `out_csv`. A missing cache yields a
    /// header-only table.
    pub fn run(&self, cache: &Path, out_csv: &Path, pb: Option<&ProgressBar>) -> Result<ReduceReport> {
        let mut report = ReduceReport::default();
        let mut counts = DailyCounts::new();
        let mut spill: Option<ShardedKVWriter> = None;

        if let ReduceMode::Sharded { shards } = self.mode {
            spill = Some(ShardedKVWriter::create(self.work_dir, "reduce", shards, self.write_buf_bytes)?);
        }

        if !cache.exists() {
            tracing::warn!(path=%cache.display(), "Cache does not exist yet; writing an empty table");
        } else {
            self.consume(cache, &mut counts, &mut spill, &mut report, pb)?;
        }

        if let Some(parent) = out_csv.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).with_context(|| format!("create {}", parent.display()))?;
            }
        }
        let tmp = out_csv.with_extension("csv.tmp");
        let file = create_with_backoff(&tmp, 16, 50).with_context(|| format!("create {}", tmp.display()))?;
        let mut wr = csv::Writer::from_writer(BufWriter::with_capacity(self.write_buf_bytes, file));
        wr.write_record(["date", "title", "views"])?;

        let records = match spill {
            Some(mut s) => {
                report.spilled = true;
                counts.drain_into(&mut s)?;
                tracing::info!("Summing {} spilled pairs from disk shards", s.written());
                let mut all: Vec<CountRecord> = Vec::new();
                for shard in s.reduce_sum()? {
                    all.extend(DailyCounts::from(shard).records());
                }
                all.sort();
                all
            }
            None => counts.records(),
        };
        report.records = write_records(&mut wr, &records)?;

        let mut inner = wr.into_inner().map_err(|e| anyhow!("flush {}: {}", tmp.display(), e.error()))?;
        inner.flush()?;
        drop(inner);
        replace_file_atomic_backoff(&tmp, out_csv)?;
        Ok(report)
    }

    fn consume(
        &self,
        cache: &Path,
        counts: &mut DailyCounts,
        spill: &mut Option<ShardedKVWriter>,
        report: &mut ReduceReport,
        pb: Option<&ProgressBar>,
    ) -> Result<()> {
        let mut probe = MemoryProbe::new();
        let mut lines = ArchiveLines::open(cache, self.read_buf_bytes)?;

        while let Some(text) = lines.next_text() {
            // A decode failure in the only input aborts the reduce; no partial table is written.
            let text = text.with_context(|| format!("reading cache {}", cache.display()))?;
            if text.is_empty() {
                continue;
            }
            report.lines_read += 1;

            let parsed = match self.extractor.parse(&text) {
                Ok(p) => p,
                Err(e) => {
                    report.malformed += 1;
                    tracing::warn!(line = report.lines_read, error = %e, "Dropping malformed cache line");
                    continue;
                }
            };
            let title = match self.resolve_title(&parsed.title) {
                Ok(t) => t,
                Err(e) => {
                    report.unmapped += 1;
                    tracing::warn!(line = report.lines_read, error = %e, "Dropping record without title mapping");
                    continue;
                }
            };
            let key = format!("{}|{}", parsed.date, title);

            match (spill.as_mut(), self.mode) {
                (Some(s), ReduceMode::Sharded { .. }) => s.write_kv(&key, u128::from(parsed.views))?,
                _ => counts.ingest(key, u128::from(parsed.views))?,
            }

            if report.lines_read % MEMORY_CHECK_EVERY == 0 {
                if let Some(pb) = pb { pb.inc(lines.take_progress()); }
                if let ReduceMode::Adaptive { shards } = self.mode {
                    if probe.is_low(LOW_MEMORY_FRACTION) {
                        if spill.is_none() {
                            tracing::info!("Low memory: spilling partial counts to disk shards");
                            *spill = Some(ShardedKVWriter::create(self.work_dir, "reduce", shards, self.write_buf_bytes)?);
                        }
                        if let Some(s) = spill.as_mut() {
                            counts.drain_into(s)?;
                        }
                    }
                }
            }
        }
        if let Some(pb) = pb { pb.inc(lines.take_progress()); }
        Ok(())
    }
}

fn write_records<W: Write>(wr: &mut csv::Writer<W>, records: &[CountRecord]) -> Result<u64> {
    let mut n = 0u64;
    for r in records {
        wr.write_record([r.date.as_str(), r.title.as_str(), r.views.to_string().as_str()])?;
        n += 1;
    }
    Ok(n)
}
