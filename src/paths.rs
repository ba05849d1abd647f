use crate::date::{within_range, PageDate};
use anyhow::{Context, Result};
use regex::Regex;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Naming schemes of the hourly dumps, one per collection epoch.
/// Capture group 1 (when present) is the `YYYYMMDD` date.
pub const DEFAULT_ARCHIVE_PATTERNS: &[&str] = &[
    r"^pagecounts-(\d{8})-(\d{6})\.gz$",
    r"^pageviews-(\d{8})-(\d{6})\.gz$",
];

/// One raw hourly archive scheduled for filtering.
#[derive(Clone, Debug)]
pub struct ArchiveJob {
    pub path: PathBuf,
    pub name: String,
    pub date: Option<PageDate>,
}

pub fn compile_patterns(patterns: &[String]) -> Result<Vec<Regex>> {
    patterns
        .iter()
        .map(|p| Regex::new(p).with_context(|| format!("invalid archive pattern {p:?}")))
        .collect()
}

/// Recursively list files under `dir` whose base name matches any pattern, sorted by path.
/// A missing directory yields an empty plan.
pub fn discover_archives(dir: &Path, patterns: &[Regex]) -> Vec<ArchiveJob> {
    let mut jobs = Vec::new();
    if !dir.exists() {
        return jobs;
    }
    for entry in WalkDir::new(dir).min_depth(1).follow_links(false) {
        let ent = match entry {
            Ok(e) => e,
            Err(e) => {
                tracing::warn!(error=%e, "Skipping unreadable directory entry");
                continue;
            }
        };
        if !ent.file_type().is_file() {
            continue;
        }
        let Some(name) = ent.file_name().to_str() else { continue };
        for re in patterns {
            if let Some(caps) = re.captures(name) {
                let date = caps.get(1).and_then(|m| m.as_str().parse::<PageDate>().ok());
                jobs.push(ArchiveJob { path: ent.path().to_path_buf(), name: name.to_string(), date });
                break;
            }
        }
    }
    jobs.sort_by(|a, b| a.path.cmp(&b.path));
    jobs
}

/// Restrict to an inclusive date range. With no bounds every job is kept; with bounds,
/// jobs whose filename carries no valid date are dropped.
pub fn plan_archives(jobs: Vec<ArchiveJob>, start: Option<PageDate>, end: Option<PageDate>) -> Vec<ArchiveJob> {
    if start.is_none() && end.is_none() {
        return jobs;
    }
    jobs.into_iter()
        .filter(|j| match j.date {
            Some(d) => within_range(d, start, end),
            None => {
                tracing::warn!(path=%j.path.display(), "No date in archive name; outside any date range");
                false
            }
        })
        .collect()
}
