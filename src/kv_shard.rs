use ahash::{AHashMap, RandomState};
use anyhow::{anyhow, Context, Result};
use rayon::prelude::*;
use std::fs::{self, File};
use std::hash::{BuildHasher, Hash, Hasher};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

/// Disk-backed, hash-sharded `key -> count` spill for reductions that outgrow memory.
/// Every key lands in exactly one shard, so shards can be summed independently.
pub struct ShardedKVWriter {
    base_dir: PathBuf,
    shards: Vec<BufWriter<File>>,
    count: usize,
    state: RandomState,
    written: u64,
}

impl ShardedKVWriter {
    pub fn create(work_dir: &Path, prefix: &str, count: usize, write_buf_bytes: usize) -> Result<Self> {
        let count = count.max(1);
        let dir = work_dir.join(format!("{prefix}_kv_shards"));
        fs::create_dir_all(&dir).with_context(|| format!("create {}", dir.display()))?;
        let mut shards = Vec::with_capacity(count);
        for i in 0..count {
            let p = dir.join(format!("kv_{:04}.tmp", i));
            let f = File::create(&p).with_context(|| format!("create {}", p.display()))?;
            shards.push(BufWriter::with_capacity(write_buf_bytes.max(8 * 1024), f));
        }
        let state = RandomState::with_seeds(
            0x0123_4567_89ab_cdef,
            0xfedc_ba98_7654_3210,
            0xcafe_babe_dead_beef,
            0xface_feed_0bad_f00d,
        );
        Ok(Self { base_dir: dir, shards, count, state, written: 0 })
    }

    #[inline]
    fn shard_index(&self, k: &str) -> usize {
        let mut h = self.state.build_hasher();
        k.hash(&mut h);
        (h.finish() as usize) % self.count
    }

    /// Keys must not contain tab or newline.
    pub fn write_kv(&mut self, key: &str, val: u128) -> Result<()> {
        let idx = self.shard_index(key);
        let w = &mut self.shards[idx];
        w.write_all(key.as_bytes())?;
        w.write_all(b"\t")?;
        w.write_all(val.to_string().as_bytes())?;
        w.write_all(b"\n")?;
        self.written += 1;
        Ok(())
    }

    pub fn written(&self) -> u64 {
        self.written
    }

    /// Flush, then sum each shard in parallel. Returns one summed map per shard.
    pub fn reduce_sum(self) -> Result<Vec<AHashMap<String, u128>>> {
        let ShardedKVWriter { base_dir, shards, count, .. } = self;
        for mut w in shards {
            w.flush()?;
        }
        let ins: Vec<PathBuf> = (0..count).map(|i| base_dir.join(format!("kv_{:04}.tmp", i))).collect();
        let out = ins.par_iter().map(|p| reduce_shard(p)).collect::<Result<Vec<_>>>()?;
        fs::remove_dir_all(&base_dir).with_context(|| format!("remove {}", base_dir.display()))?;
        Ok(out)
    }
}

fn reduce_shard(input: &Path) -> Result<AHashMap<String, u128>> {
    let mut acc: AHashMap<String, u128> = AHashMap::with_capacity(64_000);
    let r = BufReader::new(File::open(input).with_context(|| format!("open {}", input.display()))?);
    for line in r.lines() {
        let line = line?;
        if line.is_empty() { continue; }
        let (k, v) = line
            .rsplit_once('\t')
            .ok_or_else(|| anyhow!("malformed shard line in {}", input.display()))?;
        let val: u128 = v.parse().with_context(|| format!("shard value {v:?} in {}", input.display()))?;
        let slot = acc.entry(k.to_string()).or_insert(0);
        *slot = slot.checked_add(val).ok_or_else(|| anyhow!("view count overflow for key {k:?}"))?;
    }
    Ok(acc)
}
