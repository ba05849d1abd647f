//! The accumulation cache: one append-only gzip file of filtered, filename-tagged lines.
//!
//! Every successfully filtered input archive lands as exactly one complete gzip member,
//! written in append mode and synced before the caller may delete that input. Readers use a
//! multi-member decoder, so the file stays a valid gzip stream across runs.

use crate::util::open_with_backoff;
use anyhow::{Context, Result};
use flate2::write::GzEncoder;
use flate2::Compression;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, Write};
use std::path::{Path, PathBuf};

pub struct CacheAppender {
    path: PathBuf,
    level: Compression,
}

impl CacheAppender {
    /// Prepares the cache location (creating parent folders). Existing content is kept.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).with_context(|| format!("create {}", parent.display()))?;
            }
        }
        Ok(Self { path: path.to_path_buf(), level: Compression::default() })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append the staged plain-text `part` as one gzip member and fsync the cache.
    /// Returns only after the data is durable. On failure the cache is truncated back to
    /// its previous length so no partial member is left behind.
    pub fn append_part(&mut self, part: &Path) -> Result<()> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("open {} for append", self.path.display()))?;
        let len_before = file.metadata()?.len();

        if let Err(e) = self.write_member(file, part) {
            if let Err(te) = truncate_to(&self.path, len_before) {
                tracing::error!(path=%self.path.display(), error=%te, "Could not roll back partial cache append");
            }
            return Err(e);
        }
        Ok(())
    }

    fn write_member(&self, file: File, part: &Path) -> Result<()> {
        let mut enc = GzEncoder::new(file, self.level);
        let mut r = BufReader::new(open_with_backoff(part, 16, 50).with_context(|| format!("open {}", part.display()))?);
        io::copy(&mut r, &mut enc).with_context(|| format!("append {} to {}", part.display(), self.path.display()))?;
        let mut file = enc.finish().with_context(|| format!("finish gzip member in {}", self.path.display()))?;
        file.flush()?;
        file.sync_all().with_context(|| format!("sync {}", self.path.display()))?;
        Ok(())
    }
}

fn truncate_to(path: &Path, len: u64) -> io::Result<()> {
    let f = OpenOptions::new().write(true).open(path)?;
    f.set_len(len)?;
    f.sync_all()
}
